// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node identity.

use core::fmt;

/// Sentinel value indicating "no node" in index fields.
pub const INVALID: u32 = u32::MAX;

/// A handle to a node in a [`ProducerTree`](crate::producer::ProducerTree).
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after a node is destroyed and the slot is reused. Consumer
/// nodes carry the id of the producer node they were synchronized from, so
/// the same value keys a node across the producer tree, every consumer tree
/// generation, and the damage tracker's rect history.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    /// Slot index into the producer tree's arrays.
    pub(crate) idx: u32,
    /// Generation counter; must match the producer tree's generation for this slot.
    pub(crate) generation: u32,
}

impl NodeId {
    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Packs the handle into a single integer, e.g. for trace records.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.idx as u64
    }

    /// Inverse of [`to_bits`](Self::to_bits).
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "each half of the packed value is exactly 32 bits"
    )]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            idx: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}@gen{})", self.idx, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip() {
        let id = NodeId {
            idx: 7,
            generation: 3,
        };
        assert_eq!(NodeId::from_bits(id.to_bits()), id);
    }

    #[test]
    fn ordering_is_by_slot_then_generation() {
        let a = NodeId {
            idx: 1,
            generation: 5,
        };
        let b = NodeId {
            idx: 2,
            generation: 0,
        };
        assert!(a < b);
    }
}
