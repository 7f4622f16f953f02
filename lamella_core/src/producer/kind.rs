// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Node kinds and their capability table.

use crate::content::Rgba8;

/// What a node draws.
///
/// Every node has exactly one kind. Behavior that differs between kinds is
/// looked up in a static [`Capabilities`] table instead of being dispatched
/// per kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Draws nothing itself; exists to position and group children.
    #[default]
    Group,
    /// Fills its bounds with one color.
    SolidColor(Rgba8),
    /// Draws recorded content supplied by a [`ContentClient`](crate::content::ContentClient).
    Content,
    /// Draws an externally decoded video frame.
    Video {
        /// Opaque handle of the frame currently shown.
        frame_id: u64,
    },
    /// Clips its descendants to its bounds without drawing.
    Mask,
}

/// Per-kind behavior flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// The node contributes pixels of its own.
    pub draws_content: bool,
    /// The node owns a recording refreshed during content update.
    pub records_content: bool,
    /// Descendants are clipped to the node's bounds.
    pub clips_descendants: bool,
}

const CAPABILITIES: [Capabilities; 5] = [
    // Group
    Capabilities {
        draws_content: false,
        records_content: false,
        clips_descendants: false,
    },
    // SolidColor
    Capabilities {
        draws_content: true,
        records_content: false,
        clips_descendants: false,
    },
    // Content
    Capabilities {
        draws_content: true,
        records_content: true,
        clips_descendants: false,
    },
    // Video
    Capabilities {
        draws_content: true,
        records_content: false,
        clips_descendants: false,
    },
    // Mask
    Capabilities {
        draws_content: false,
        records_content: false,
        clips_descendants: true,
    },
];

impl NodeKind {
    const fn tag(self) -> usize {
        match self {
            Self::Group => 0,
            Self::SolidColor(_) => 1,
            Self::Content => 2,
            Self::Video { .. } => 3,
            Self::Mask => 4,
        }
    }

    /// Looks up this kind's row of the capability table.
    #[inline]
    #[must_use]
    pub const fn capabilities(self) -> Capabilities {
        CAPABILITIES[self.tag()]
    }

    /// Returns `true` if the two values are the same kind, ignoring payload.
    #[must_use]
    pub const fn same_kind(self, other: Self) -> bool {
        self.tag() == other.tag()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_content_records() {
        let kinds = [
            NodeKind::Group,
            NodeKind::SolidColor(Rgba8::WHITE),
            NodeKind::Content,
            NodeKind::Video { frame_id: 1 },
            NodeKind::Mask,
        ];
        let recording: usize = kinds
            .iter()
            .filter(|k| k.capabilities().records_content)
            .count();
        assert_eq!(recording, 1);
        assert!(NodeKind::Content.capabilities().records_content);
    }

    #[test]
    fn mask_clips_but_does_not_draw() {
        let caps = NodeKind::Mask.capabilities();
        assert!(caps.clips_descendants);
        assert!(!caps.draws_content);
    }

    #[test]
    fn payload_ignored_by_same_kind() {
        assert!(NodeKind::Video { frame_id: 1 }.same_kind(NodeKind::Video { frame_id: 2 }));
        assert!(!NodeKind::Group.same_kind(NodeKind::Mask));
    }
}
