// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collaborator contracts at the edges of the pipeline.
//!
//! The pipeline owns the trees, damage, and promise bookkeeping; everything
//! that touches pixels or time is delegated:
//!
//! - **[`OutputBackend`]**: Receives the damage rectangle and the active
//!   tree's drawable nodes, and reports whether the frame was presented.
//!   Also owns context recreation after a loss.
//!
//! - **[`RasterScheduler`]**: Receives published [`RasterSource`] snapshots
//!   and reports readiness signals that gate activation and drawing.
//!   [`ImmediateRaster`] is always ready.
//!
//! - **[`Animator`]**: Advances time-driven properties on the producer tree
//!   at the start of each frame attempt.
//!
//! Content clients, which fill recordings, live in [`content`](crate::content).
//!
//! # Frame loop pseudocode
//!
//! ```rust,ignore
//! let mut pipeline = CommitOrchestrator::new(PipelineSettings::single_threaded());
//! build_scene(pipeline.producer_mut().tree_mut());
//!
//! loop {
//!     // Producer mutations between frames feed push-properties.
//!     scroll(pipeline.producer_mut().tree_mut());
//!
//!     let outcome = pipeline.run_frame(&mut output, &mut Tracer::none());
//!     if let Some(DrawOutcome::ContextLost) = outcome.draw {
//!         // The next frames abort until `output.recreate_context()` succeeds.
//!     }
//! }
//! ```

use kurbo::{Rect, Size};

use crate::content::{RasterSource, Rgba8};
use crate::id::NodeId;
use crate::producer::{NodeKind, ProducerTree};
use crate::transform::Transform3d;

/// One drawable node of the active tree, resolved to target space.
#[derive(Clone, Debug)]
pub struct DrawItem {
    /// The node this item was produced from.
    pub id: NodeId,
    /// What the node draws.
    pub kind: NodeKind,
    /// Visible target-space bounding box, after clipping.
    pub rect: Rect,
    /// Node-local to target-space transform.
    pub transform: Transform3d,
    /// Target-space clip inherited from ancestors, if any.
    pub clip: Option<Rect>,
    /// Opacity multiplied down from the root.
    pub opacity: f32,
    /// Content snapshot, for [`NodeKind::Content`] nodes that have one.
    pub raster: Option<RasterSource>,
}

/// Everything an output backend needs to draw one frame.
#[derive(Clone, Copy, Debug)]
pub struct DrawFrame<'a> {
    /// Source frame number of the active tree.
    pub source_frame_number: u64,
    /// Area that must be redrawn.
    pub damage: Rect,
    /// Full target area.
    pub content_rect: Rect,
    /// Color behind all content.
    pub background_color: Rgba8,
    /// Drawable nodes in paint order.
    pub items: &'a [DrawItem],
}

/// What an output backend reports for a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawResult {
    /// Drawn and presented.
    Swapped,
    /// Drawn but not presented (for example, presentation was throttled).
    DrawnNoSwap,
    /// Drawing failed; the damage is kept for the next attempt.
    Failed,
    /// The output context was lost.
    ContextLost,
}

/// Draws the active tree.
pub trait OutputBackend {
    /// Draws `frame`, restricted to `frame.damage`.
    fn draw(&mut self, frame: &DrawFrame<'_>) -> DrawResult;

    /// Tries to recreate a lost context. Returns `true` on success.
    fn recreate_context(&mut self) -> bool {
        true
    }
}

/// Receives raster snapshots and gates activation and drawing on readiness.
pub trait RasterScheduler {
    /// New snapshots committed for `source_frame_number`.
    fn publish(
        &mut self,
        source_frame_number: u64,
        rasters: &[RasterSource],
        viewport: Option<Size>,
    );

    /// Whether the pending tree may activate.
    fn ready_to_activate(&mut self) -> bool {
        true
    }

    /// Whether the active tree may draw.
    fn ready_to_draw(&mut self) -> bool {
        true
    }
}

/// A [`RasterScheduler`] that is always ready.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImmediateRaster;

impl RasterScheduler for ImmediateRaster {
    fn publish(&mut self, _: u64, _: &[RasterSource], _: Option<Size>) {}
}

/// Advances time-driven node properties.
pub trait Animator {
    /// Called once per frame attempt, before content update. Mutations made
    /// here are picked up by the same frame's commit.
    fn animate(&mut self, frame_number: u64, tree: &mut ProducerTree);
}
