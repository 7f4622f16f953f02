// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Immutable, thread-shareable content snapshots.

use alloc::sync::Arc;

use kurbo::{Rect, Size};

use super::paint::{PaintOp, Rgba8};
use crate::id::NodeId;

#[derive(Debug)]
struct RasterSnapshot {
    content_id: NodeId,
    size: Size,
    ops: Arc<[PaintOp]>,
    recorded_frame: u64,
    memory_usage: usize,
    solid_color: Option<Rgba8>,
}

/// A frozen view of a [`RecordingSource`](super::RecordingSource).
///
/// Cloning is a reference-count bump. There is no mutating API: a changed
/// recording produces a new `RasterSource` instead. Because the snapshot is
/// immutable it can be read from any number of threads without locking, and
/// it is the only value the producer and consumer sides share.
#[derive(Clone, Debug)]
pub struct RasterSource {
    inner: Arc<RasterSnapshot>,
}

impl RasterSource {
    pub(crate) fn new(
        content_id: NodeId,
        size: Size,
        ops: Arc<[PaintOp]>,
        recorded_frame: u64,
        memory_usage: usize,
    ) -> Self {
        let solid_color = analyze_solid_color(size, &ops);
        Self {
            inner: Arc::new(RasterSnapshot {
                content_id,
                size,
                ops,
                recorded_frame,
                memory_usage,
                solid_color,
            }),
        }
    }

    /// The node whose recording this snapshot was taken from.
    #[must_use]
    pub fn content_id(&self) -> NodeId {
        self.inner.content_id
    }

    /// Size of the recorded area.
    #[must_use]
    pub fn size(&self) -> Size {
        self.inner.size
    }

    /// Recorded paint ops.
    #[must_use]
    pub fn ops(&self) -> &[PaintOp] {
        &self.inner.ops
    }

    /// Source frame number of the update that last touched the recording.
    #[must_use]
    pub fn recorded_frame(&self) -> u64 {
        self.inner.recorded_frame
    }

    /// Approximate bytes reported by the content client.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.inner.memory_usage
    }

    /// If the whole recorded area is a single opaque fill, its color.
    ///
    /// Rasterizers can skip tiling such content and draw a quad instead.
    #[must_use]
    pub fn solid_color(&self) -> Option<Rgba8> {
        self.inner.solid_color
    }

    /// Returns `true` if both handles point at the same snapshot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn analyze_solid_color(size: Size, ops: &[PaintOp]) -> Option<Rgba8> {
    let full = Rect::from_origin_size((0.0, 0.0), size);
    // The last op that covers everything decides; anything drawn after it
    // breaks solidity.
    let (idx, color) = ops.iter().enumerate().rev().find_map(|(i, op)| match op {
        PaintOp::FillRect { rect, color } if rect.union(full) == *rect => Some((i, *color)),
        _ => None,
    })?;
    if idx + 1 != ops.len() || color.a != u8::MAX {
        return None;
    }
    Some(color)
}

#[cfg(test)]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;

    fn id() -> NodeId {
        NodeId {
            idx: 0,
            generation: 0,
        }
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn raster_source_is_thread_shareable() {
        assert_send_sync::<RasterSource>();
    }

    #[test]
    fn clone_shares_snapshot() {
        let ops: Arc<[PaintOp]> = Vec::<PaintOp>::new().into();
        let a = RasterSource::new(id(), Size::new(10.0, 10.0), ops, 1, 0);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn full_opaque_fill_is_solid() {
        let red = Rgba8::new(255, 0, 0, 255);
        let ops: Arc<[PaintOp]> = vec![
            PaintOp::DrawImage {
                rect: Rect::new(0.0, 0.0, 5.0, 5.0),
                image: 1,
            },
            PaintOp::FillRect {
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                color: red,
            },
        ]
        .into();
        let r = RasterSource::new(id(), Size::new(10.0, 10.0), ops, 1, 0);
        assert_eq!(r.solid_color(), Some(red));
    }

    #[test]
    fn later_op_breaks_solidity() {
        let ops: Arc<[PaintOp]> = vec![
            PaintOp::FillRect {
                rect: Rect::new(0.0, 0.0, 10.0, 10.0),
                color: Rgba8::WHITE,
            },
            PaintOp::DrawImage {
                rect: Rect::new(0.0, 0.0, 5.0, 5.0),
                image: 1,
            },
        ]
        .into();
        let r = RasterSource::new(id(), Size::new(10.0, 10.0), ops, 1, 0);
        assert_eq!(r.solid_color(), None);
    }
}
