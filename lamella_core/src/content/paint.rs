// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint-output types exchanged with content clients.

use alloc::vec::Vec;

use kurbo::Rect;

use crate::id::NodeId;
use crate::producer::ProducerTree;
use crate::region::Region;

/// An 8-bit-per-channel RGBA color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgba8 {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Rgba8 {
    /// Fully transparent black.
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    /// Opaque white.
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    /// Creates a color from its channels.
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Returns `true` if the color is fully transparent.
    #[must_use]
    pub const fn is_transparent(self) -> bool {
        self.a == 0
    }
}

/// A single recorded paint operation, in the node's local coordinates.
///
/// Executing these is the rasterizer's business; the pipeline only stores,
/// replaces, and snapshots them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PaintOp {
    /// Fill a rectangle with a solid color.
    FillRect {
        /// Area to fill.
        rect: Rect,
        /// Fill color.
        color: Rgba8,
    },
    /// Draw an externally managed image into a rectangle.
    DrawImage {
        /// Destination area.
        rect: Rect,
        /// Opaque image handle.
        image: u64,
    },
}

impl PaintOp {
    /// Returns the area this op touches.
    #[must_use]
    pub const fn bounds(&self) -> Rect {
        match self {
            Self::FillRect { rect, .. } | Self::DrawImage { rect, .. } => *rect,
        }
    }
}

/// Diagnostic paint variants used for benchmarking.
///
/// The mode only changes how much work a content client does; the
/// invalidation it reports must be the same in every mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PaintMode {
    /// Regular recording.
    #[default]
    Normal,
    /// The client records no paint ops.
    PaintingDisabled,
    /// The recording is rebuilt from scratch every update instead of
    /// replacing only the invalidated ops.
    CachingDisabled,
    /// The client skips building its display structures.
    ConstructionDisabled,
}

/// What a content client is asked to repaint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefreshRequest {
    /// The content-bearing node being refreshed.
    pub node: NodeId,
    /// Area to re-record, in the node's local coordinates.
    pub clip: Rect,
    /// Diagnostic paint mode.
    pub mode: PaintMode,
    /// Source frame number of the commit this update feeds.
    pub frame_number: u64,
}

/// What a content client returns from a refresh.
#[derive(Clone, Debug, Default)]
pub struct ContentOutput {
    /// Paint ops covering (at least) the requested clip.
    pub ops: Vec<PaintOp>,
    /// Area the client reports as visually changed.
    pub invalidation: Region,
    /// Approximate bytes held by the recorded content.
    pub memory_usage: usize,
}

/// Produces paint content for one content-bearing node.
///
/// The client receives the producer tree so that refreshing can mutate
/// *other* nodes (for example, a text node resizing its container). Those
/// mutations are captured by the commit that follows the update. The node
/// being refreshed has its content source checked out for the duration of the
/// call, so its own content cannot be replaced from inside the refresh.
pub trait ContentClient {
    /// Re-records content for `request.clip`.
    fn refresh_content(&mut self, request: &RefreshRequest, tree: &mut ProducerTree)
    -> ContentOutput;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_bounds() {
        let op = PaintOp::DrawImage {
            rect: Rect::new(1.0, 2.0, 3.0, 4.0),
            image: 9,
        };
        assert_eq!(op.bounds(), Rect::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn transparent_color() {
        assert!(Rgba8::TRANSPARENT.is_transparent());
        assert!(!Rgba8::WHITE.is_transparent());
    }
}
