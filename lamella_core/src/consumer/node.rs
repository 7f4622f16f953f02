// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Synchronized node copies.

use alloc::vec::Vec;

use kurbo::{Point, Rect, Size, Vec2};

use crate::commit::{NodeUpdate, RasterUpdate};
use crate::content::RasterSource;
use crate::id::NodeId;
use crate::producer::NodeKind;
use crate::region::Region;
use crate::transform::Transform3d;

/// Changes recorded on a consumer node since its damage was last consumed.
#[derive(Clone, Debug, Default)]
pub struct NodeDamage {
    /// A visual property changed without necessarily moving the node.
    pub property: bool,
    /// Node-local content area that changed.
    pub content: Region,
}

impl NodeDamage {
    /// Returns `true` if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.property && self.content.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.property = false;
        self.content.clear();
    }
}

/// The consumer-side copy of one producer node.
///
/// Holds the subset of producer state needed to compute damage and draw. The
/// id is the id of the producer node it was pushed from.
#[derive(Clone, Debug)]
pub struct ConsumerNode {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) kind: NodeKind,
    pub(crate) bounds: Size,
    pub(crate) position: Point,
    pub(crate) transform: Transform3d,
    pub(crate) opacity: f32,
    pub(crate) scroll_offset: Vec2,
    pub(crate) hidden: bool,
    pub(crate) masks_to_bounds: bool,
    pub(crate) raster: Option<RasterSource>,
    pub(crate) damage: NodeDamage,
    pub(crate) last_synced_frame: u64,
}

impl ConsumerNode {
    /// Creates a node from its first push.
    pub(crate) fn from_update(update: &NodeUpdate, frame_number: u64) -> Self {
        let mut node = Self {
            id: update.id,
            parent: update.parent,
            children: update.children.clone(),
            kind: update.kind,
            bounds: update.bounds,
            position: update.position,
            transform: update.transform,
            opacity: update.opacity,
            scroll_offset: update.scroll_offset,
            hidden: update.hidden,
            masks_to_bounds: update.masks_to_bounds,
            raster: None,
            damage: NodeDamage::default(),
            last_synced_frame: frame_number,
        };
        node.apply_raster(&update.raster);
        node.damage.content.union_with(&update.invalidation);
        node
    }

    /// Applies a later push. Returns `true` if the node's links changed.
    pub(crate) fn apply(&mut self, update: &NodeUpdate, frame_number: u64) -> bool {
        let structure_changed = self.parent != update.parent || self.children != update.children;
        if structure_changed {
            self.parent = update.parent;
            self.children.clone_from(&update.children);
        }

        // Geometry changes are found by the damage tracker's rect diff; these
        // change what is drawn without moving it.
        if self.kind != update.kind
            || self.opacity.to_bits() != update.opacity.to_bits()
            || self.hidden != update.hidden
            || self.masks_to_bounds != update.masks_to_bounds
            || self.scroll_offset != update.scroll_offset
        {
            self.damage.property = true;
        }

        self.kind = update.kind;
        self.bounds = update.bounds;
        self.position = update.position;
        self.transform = update.transform;
        self.opacity = update.opacity;
        self.scroll_offset = update.scroll_offset;
        self.hidden = update.hidden;
        self.masks_to_bounds = update.masks_to_bounds;
        self.apply_raster(&update.raster);
        self.damage.content.union_with(&update.invalidation);
        self.last_synced_frame = frame_number;
        structure_changed
    }

    fn apply_raster(&mut self, raster: &RasterUpdate) {
        match raster {
            RasterUpdate::Keep => {}
            RasterUpdate::Set(source) => {
                let full = Rect::from_origin_size(Point::ORIGIN, source.size());
                if self.raster.is_none() {
                    self.damage.content.insert(full);
                }
                self.raster = Some(source.clone());
            }
            RasterUpdate::Clear => {
                if let Some(old) = self.raster.take() {
                    self.damage
                        .content
                        .insert(Rect::from_origin_size(Point::ORIGIN, old.size()));
                }
            }
        }
    }

    /// Overwrites this node with `other`, keeping this node's allocations.
    pub(crate) fn copy_from(&mut self, other: &Self) {
        debug_assert_eq!(self.id, other.id, "recycled node copied from another id");
        self.parent = other.parent;
        self.children.clone_from(&other.children);
        self.kind = other.kind;
        self.bounds = other.bounds;
        self.position = other.position;
        self.transform = other.transform;
        self.opacity = other.opacity;
        self.scroll_offset = other.scroll_offset;
        self.hidden = other.hidden;
        self.masks_to_bounds = other.masks_to_bounds;
        self.raster.clone_from(&other.raster);
        self.damage.clone_from(&other.damage);
        self.last_synced_frame = other.last_synced_frame;
    }

    /// Id of the producer node this was pushed from.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Parent at the last push.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in paint order.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// What the node draws.
    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Size of the node's local rectangle.
    #[must_use]
    pub fn bounds(&self) -> Size {
        self.bounds
    }

    /// Offset within the parent.
    #[must_use]
    pub fn position(&self) -> Point {
        self.position
    }

    /// Local transform.
    #[must_use]
    pub fn transform(&self) -> Transform3d {
        self.transform
    }

    /// Own opacity.
    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Offset applied to the children.
    #[must_use]
    pub fn scroll_offset(&self) -> Vec2 {
        self.scroll_offset
    }

    /// Whether the subtree is hidden.
    #[must_use]
    pub fn hidden(&self) -> bool {
        self.hidden
    }

    /// Whether descendants are clipped to this node's bounds.
    #[must_use]
    pub fn masks_to_bounds(&self) -> bool {
        self.masks_to_bounds
    }

    /// Current content snapshot.
    #[must_use]
    pub fn raster(&self) -> Option<&RasterSource> {
        self.raster.as_ref()
    }

    /// Changes not yet consumed by the damage tracker.
    #[must_use]
    pub fn damage(&self) -> &NodeDamage {
        &self.damage
    }

    /// Source frame number of the commit that last pushed this node.
    #[must_use]
    pub fn last_synced_frame(&self) -> u64 {
        self.last_synced_frame
    }

    /// The node's rectangle in its own coordinate space.
    #[must_use]
    pub fn local_rect(&self) -> Rect {
        Rect::from_origin_size(Point::ORIGIN, self.bounds)
    }
}
