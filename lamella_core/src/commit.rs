// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The copy-based unit of synchronization between producer and consumer.
//!
//! A [`CommitBatch`] is everything a synchronization pass copied out of the
//! producer tree. Once built it owns no references into the producer, so it
//! can be moved to the consumer thread and applied there while the producer
//! carries on with the next frame.

use alloc::vec::Vec;
use core::fmt;

use kurbo::{Point, Size, Vec2};

use crate::content::{RasterSource, Rgba8};
use crate::id::NodeId;
use crate::producer::NodeKind;
use crate::region::Region;
use crate::swap_promise::{DidNotSwapReason, PromiseEntry, fail_all};
use crate::trace::Tracer;
use crate::transform::Transform3d;

/// What happens to a node's raster snapshot.
#[derive(Clone, Debug, Default)]
pub enum RasterUpdate {
    /// Keep whatever the consumer node already references.
    #[default]
    Keep,
    /// Replace it with a new snapshot.
    Set(RasterSource),
    /// Drop it.
    Clear,
}

/// The pushed state of one producer node.
#[derive(Clone, Debug)]
pub struct NodeUpdate {
    /// Node identity; keys the consumer node.
    pub id: NodeId,
    /// Parent at push time.
    pub parent: Option<NodeId>,
    /// Children in paint order.
    pub children: Vec<NodeId>,
    /// What the node draws.
    pub kind: NodeKind,
    /// Size of the node's local rectangle.
    pub bounds: Size,
    /// Offset within the parent.
    pub position: Point,
    /// Local transform applied after the position.
    pub transform: Transform3d,
    /// Own opacity.
    pub opacity: f32,
    /// Offset applied to the children.
    pub scroll_offset: Vec2,
    /// Whether the subtree is hidden.
    pub hidden: bool,
    /// Whether descendants are clipped to the node's bounds.
    pub masks_to_bounds: bool,
    /// Snapshot change.
    pub raster: RasterUpdate,
    /// Node-local content area that changed since the previous commit.
    pub invalidation: Region,
}

/// One synchronization pass worth of producer state.
pub struct CommitBatch {
    /// Frame number stamped on the receiving tree.
    pub source_frame_number: u64,
    /// Root node, if the tree has one.
    pub root: Option<NodeId>,
    /// Viewport size, if set.
    pub viewport: Option<Size>,
    /// Color behind all content.
    pub background_color: Rgba8,
    /// Whether viewport or background color changed in this batch.
    pub tree_props_changed: bool,
    /// Pushed nodes, parents before children.
    pub updates: Vec<NodeUpdate>,
    /// Nodes destroyed since the previous commit.
    pub removed: Vec<NodeId>,
    /// Every node the pass visited, in visit order.
    pub visited: Vec<NodeId>,
    pub(crate) promises: Vec<PromiseEntry>,
}

impl fmt::Debug for CommitBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitBatch")
            .field("source_frame_number", &self.source_frame_number)
            .field("root", &self.root)
            .field("viewport", &self.viewport)
            .field("background_color", &self.background_color)
            .field("tree_props_changed", &self.tree_props_changed)
            .field("updates", &self.updates.len())
            .field("removed", &self.removed)
            .field("visited", &self.visited.len())
            .field("promises", &self.promises.len())
            .finish()
    }
}

impl CommitBatch {
    /// Number of swap promises riding on this batch.
    #[must_use]
    pub fn promise_count(&self) -> usize {
        self.promises.len()
    }

    /// Iterates over the new raster snapshots in the batch.
    pub fn rasters(&self) -> impl Iterator<Item = &RasterSource> {
        self.updates.iter().filter_map(|u| match &u.raster {
            RasterUpdate::Set(r) => Some(r),
            RasterUpdate::Keep | RasterUpdate::Clear => None,
        })
    }

    /// Copies the tree changes, leaving promises and the visit list behind.
    pub(crate) fn replica(&self) -> Self {
        Self {
            source_frame_number: self.source_frame_number,
            root: self.root,
            viewport: self.viewport,
            background_color: self.background_color,
            tree_props_changed: self.tree_props_changed,
            updates: self.updates.clone(),
            removed: self.removed.clone(),
            visited: Vec::new(),
            promises: Vec::new(),
        }
    }

    /// Breaks every promise riding on the batch, for a batch that will never
    /// be synchronized.
    pub fn break_promises(&mut self, reason: DidNotSwapReason, tracer: &mut Tracer<'_>) -> usize {
        fail_all(self.promises.drain(..), reason, tracer)
    }

    pub(crate) fn take_promises(&mut self) -> Vec<PromiseEntry> {
        core::mem::take(&mut self.promises)
    }
}
