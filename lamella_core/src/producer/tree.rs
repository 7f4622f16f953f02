// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays producer node storage with allocation, topology, and
//! push-properties flag maintenance.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use kurbo::{Point, Rect, Size, Vec2};

use super::kind::NodeKind;
use super::traverse::Children;
use crate::content::{ContentClient, RecordingSource, Rgba8};
use crate::id::{INVALID, NodeId};
use crate::region::{DEFAULT_RECT_LIMIT, Region};
use crate::transform::Transform3d;

/// Per-node content state for nodes with a [`ContentClient`].
pub(crate) struct ContentSlot {
    pub(crate) client: Box<dyn ContentClient>,
    pub(crate) recording: Option<RecordingSource>,
    /// Invalidation gathered since the last commit.
    pub(crate) invalidation: Region,
    /// The recording changed since its last snapshot.
    pub(crate) raster_dirty: bool,
}

impl fmt::Debug for ContentSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSlot")
            .field("recording", &self.recording)
            .field("invalidation", &self.invalidation)
            .field("raster_dirty", &self.raster_dirty)
            .finish_non_exhaustive()
    }
}

/// The producer-side scene graph.
///
/// Nodes are addressed by [`NodeId`] handles. Internally, each node occupies
/// a slot in parallel arrays. Destroyed nodes are retired and their slots are
/// only recycled once every consumer tree that could still reference them
/// has moved past the frame that removed them; see
/// [`release_slots`](Self::release_slots).
///
/// Every mutator marks the node `needs_sync` and walks up setting
/// `subtree_needs_sync` on ancestors, stopping at the first ancestor that is
/// already marked. Setting a property to its current value is a no-op.
#[derive(Debug)]
pub struct ProducerTree {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,

    // -- Properties --
    pub(crate) kind: Vec<NodeKind>,
    pub(crate) bounds: Vec<Size>,
    pub(crate) position: Vec<Point>,
    pub(crate) transform: Vec<Transform3d>,
    pub(crate) opacity: Vec<f32>,
    pub(crate) scroll_offset: Vec<Vec2>,
    pub(crate) hidden: Vec<bool>,
    pub(crate) masks_to_bounds: Vec<bool>,

    // -- Content --
    pub(crate) content: Vec<Option<ContentSlot>>,
    pub(crate) needs_display: Vec<Option<Rect>>,
    /// Consumer trees were last sent a snapshot rather than a clear.
    pub(crate) raster_published: Vec<bool>,

    // -- Push-properties --
    pub(crate) needs_sync: Vec<bool>,
    pub(crate) subtree_needs_sync: Vec<bool>,
    pub(crate) persist: Vec<bool>,
    /// Slots with `persist` set, re-marked after every pass.
    pub(crate) persisted: Vec<u32>,
    pub(crate) last_synced_frame: Vec<u64>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) alive: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) retired: Vec<(u32, u64)>,
    pub(crate) len: u32,

    // -- Tree-wide state --
    pub(crate) root: u32,
    pub(crate) viewport: Option<Size>,
    pub(crate) background_color: Rgba8,
    pub(crate) props_dirty: bool,
    pub(crate) commit_requested: bool,
    pub(crate) removed: Vec<NodeId>,
    pub(crate) last_commit_frame: u64,
    pub(crate) rect_limit: usize,
}

impl Default for ProducerTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ProducerTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rect_limit(DEFAULT_RECT_LIMIT)
    }

    /// Creates an empty tree whose content invalidation regions keep at most
    /// `limit` rectangles.
    #[must_use]
    pub fn with_rect_limit(limit: usize) -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            kind: Vec::new(),
            bounds: Vec::new(),
            position: Vec::new(),
            transform: Vec::new(),
            opacity: Vec::new(),
            scroll_offset: Vec::new(),
            hidden: Vec::new(),
            masks_to_bounds: Vec::new(),
            content: Vec::new(),
            needs_display: Vec::new(),
            raster_published: Vec::new(),
            needs_sync: Vec::new(),
            subtree_needs_sync: Vec::new(),
            persist: Vec::new(),
            persisted: Vec::new(),
            last_synced_frame: Vec::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            retired: Vec::new(),
            len: 0,
            root: INVALID,
            viewport: None,
            background_color: Rgba8::TRANSPARENT,
            props_dirty: true,
            commit_requested: true,
            removed: Vec::new(),
            last_commit_frame: 0,
            rect_limit: limit,
        }
    }

    // -- Allocation API --

    /// Creates a new detached [`NodeKind::Group`] node and returns its handle.
    ///
    /// The node starts with zero bounds at the origin, an identity transform,
    /// full opacity, and no content. It is marked `needs_sync` so that it is
    /// pushed the first time it becomes reachable from the root.
    pub fn create_node(&mut self) -> NodeId {
        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a released slot.
            let i = idx as usize;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.kind[i] = NodeKind::Group;
            self.bounds[i] = Size::ZERO;
            self.position[i] = Point::ORIGIN;
            self.transform[i] = Transform3d::IDENTITY;
            self.opacity[i] = 1.0;
            self.scroll_offset[i] = Vec2::ZERO;
            self.hidden[i] = false;
            self.masks_to_bounds[i] = false;
            self.content[i] = None;
            self.needs_display[i] = None;
            self.raster_published[i] = false;
            self.needs_sync[i] = true;
            self.subtree_needs_sync[i] = false;
            self.persist[i] = false;
            self.last_synced_frame[i] = 0;
            self.alive[i] = true;
            idx
        } else {
            // Allocate a new slot.
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.kind.push(NodeKind::Group);
            self.bounds.push(Size::ZERO);
            self.position.push(Point::ORIGIN);
            self.transform.push(Transform3d::IDENTITY);
            self.opacity.push(1.0);
            self.scroll_offset.push(Vec2::ZERO);
            self.hidden.push(false);
            self.masks_to_bounds.push(false);
            self.content.push(None);
            self.needs_display.push(None);
            self.raster_published.push(false);
            self.needs_sync.push(true);
            self.subtree_needs_sync.push(false);
            self.persist.push(false);
            self.last_synced_frame.push(0);
            self.generation.push(0);
            self.alive.push(true);
            idx
        };

        self.id_at(idx)
    }

    /// Creates a detached node of the given kind.
    pub fn create_node_with_kind(&mut self, kind: NodeKind) -> NodeId {
        let id = self.create_node();
        self.kind[id.idx as usize] = kind;
        id
    }

    /// Destroys a node.
    ///
    /// The handle becomes stale immediately. The slot itself is retired with
    /// the next commit's frame number and only becomes reusable after
    /// [`release_slots`](Self::release_slots) reports that no consumer tree
    /// older than that frame is alive.
    ///
    /// # Panics
    ///
    /// Panics if the node has children (remove them first) or if the handle
    /// is stale.
    pub fn destroy_node(&mut self, id: NodeId) {
        self.validate(id);
        let idx = id.idx;
        assert!(
            self.first_child[idx as usize] == INVALID,
            "cannot destroy node with children"
        );

        if self.parent[idx as usize] != INVALID {
            self.detach(idx);
        }
        if self.root == idx {
            self.root = INVALID;
            self.props_dirty = true;
        }

        // Drop the client and recording now; consumer trees hold snapshots.
        self.content[idx as usize] = None;
        self.needs_sync[idx as usize] = false;
        self.subtree_needs_sync[idx as usize] = false;
        if core::mem::take(&mut self.persist[idx as usize]) {
            self.persisted.retain(|&p| p != idx);
        }

        // Bump generation so old handles immediately fail validation.
        self.generation[idx as usize] += 1;
        self.alive[idx as usize] = false;
        self.retired.push((idx, self.last_commit_frame + 1));
        self.removed.push(id);
        self.commit_requested = true;
    }

    /// Recycles retired slots that no live consumer tree can reference.
    ///
    /// `min_live_frame` is the oldest source frame number held by any live
    /// consumer tree, or `None` if there are none.
    pub fn release_slots(&mut self, min_live_frame: Option<u64>) {
        let free_list = &mut self.free_list;
        self.retired.retain(|&(idx, frame)| {
            if min_live_frame.is_none_or(|min| frame <= min) {
                free_list.push(idx);
                false
            } else {
                true
            }
        });
    }

    /// Returns whether the given handle refers to a live node.
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        id.idx < self.len
            && self.generation[id.idx as usize] == id.generation
            && self.alive[id.idx as usize]
    }

    /// Number of slots waiting for consumer trees to release them.
    #[must_use]
    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    // -- Topology API --

    /// Makes `id` the root of the tree, or clears the root.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the node has a parent.
    pub fn set_root(&mut self, id: Option<NodeId>) {
        let idx = match id {
            Some(id) => {
                self.validate(id);
                assert!(
                    self.parent[id.idx as usize] == INVALID,
                    "root cannot have a parent"
                );
                id.idx
            }
            None => INVALID,
        };
        if idx == self.root {
            return;
        }
        self.root = idx;
        self.props_dirty = true;
        self.commit_requested = true;
        if idx != INVALID {
            self.mark_subtree_needs_sync(idx);
        }
    }

    /// Returns the root node, if any.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        (self.root != INVALID).then(|| self.id_at(self.root))
    }

    /// Adds `child` as the last child of `parent`.
    ///
    /// The whole attached subtree is marked `needs_sync`, so consumer trees
    /// that dropped it receive it again in full.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale, if `child` already has a parent, or
    /// if `child` is the root.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.validate(parent);
        self.validate(child);
        let p = parent.idx;
        let c = child.idx;
        assert!(
            self.parent[c as usize] == INVALID,
            "child already has a parent"
        );
        assert!(c != self.root, "cannot attach the root node");
        assert!(!self.is_self_or_ancestor(c, p), "attaching would create a cycle");

        self.parent[c as usize] = p;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;

        if self.first_child[p as usize] == INVALID {
            self.first_child[p as usize] = c;
        } else {
            // Walk to last child.
            let mut last = self.first_child[p as usize];
            while self.next_sibling[last as usize] != INVALID {
                last = self.next_sibling[last as usize];
            }
            self.next_sibling[last as usize] = c;
            self.prev_sibling[c as usize] = last;
        }

        self.did_attach(c);
    }

    /// Inserts `child` before `sibling` in the sibling list.
    ///
    /// `child` must not already have a parent. `sibling` must have a parent.
    ///
    /// # Panics
    ///
    /// Panics if handles are stale, `child` already has a parent, or `sibling`
    /// has no parent.
    pub fn insert_before(&mut self, child: NodeId, sibling: NodeId) {
        self.validate(child);
        self.validate(sibling);
        let c = child.idx;
        let s = sibling.idx;
        assert!(
            self.parent[c as usize] == INVALID,
            "child already has a parent"
        );
        let p = self.parent[s as usize];
        assert!(p != INVALID, "sibling has no parent");
        assert!(c != self.root, "cannot attach the root node");
        assert!(!self.is_self_or_ancestor(c, p), "attaching would create a cycle");

        self.parent[c as usize] = p;
        self.next_sibling[c as usize] = s;
        self.prev_sibling[c as usize] = self.prev_sibling[s as usize];

        if self.prev_sibling[s as usize] != INVALID {
            self.next_sibling[self.prev_sibling[s as usize] as usize] = c;
        } else {
            // `sibling` was the first child.
            self.first_child[p as usize] = c;
        }
        self.prev_sibling[s as usize] = c;

        self.did_attach(c);
    }

    /// Removes `child` from its current parent.
    ///
    /// The parent is marked `needs_sync` because its child list changed. Its
    /// `subtree_needs_sync` flag is recomputed from the remaining children, so
    /// dirty state that left with the detached subtree does not keep the
    /// vacated path dirty.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the node has no parent.
    pub fn remove_from_parent(&mut self, child: NodeId) {
        self.validate(child);
        assert!(
            self.parent[child.idx as usize] != INVALID,
            "node has no parent"
        );
        self.detach(child.idx);
    }

    /// Moves `child` to be the last child of `new_parent`.
    ///
    /// # Panics
    ///
    /// Panics if either handle is stale or if the move would create a cycle.
    pub fn reparent(&mut self, child: NodeId, new_parent: NodeId) {
        self.validate(child);
        if self.parent[child.idx as usize] != INVALID {
            self.detach(child.idx);
        }
        self.add_child(new_parent, child);
    }

    /// Returns the parent of a node, if any.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.validate(id);
        let p = self.parent[id.idx as usize];
        (p != INVALID).then(|| self.id_at(p))
    }

    /// Returns an iterator over the direct children of a node.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Children<'_> {
        self.validate(id);
        Children::new(self, self.first_child[id.idx as usize])
    }

    /// Returns `true` if the node is the root or a descendant of it.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.validate(id);
        self.root != INVALID && self.is_self_or_ancestor(self.root, id.idx)
    }

    // -- Property getters (read-only, no flag changes) --

    /// Returns the node's kind.
    #[must_use]
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.validate(id);
        self.kind[id.idx as usize]
    }

    /// Returns the node's bounds (size of its local rectangle).
    #[must_use]
    pub fn bounds(&self, id: NodeId) -> Size {
        self.validate(id);
        self.bounds[id.idx as usize]
    }

    /// Returns the node's position within its parent.
    #[must_use]
    pub fn position(&self, id: NodeId) -> Point {
        self.validate(id);
        self.position[id.idx as usize]
    }

    /// Returns the node's local transform.
    #[must_use]
    pub fn transform(&self, id: NodeId) -> Transform3d {
        self.validate(id);
        self.transform[id.idx as usize]
    }

    /// Returns the node's own opacity.
    #[must_use]
    pub fn opacity(&self, id: NodeId) -> f32 {
        self.validate(id);
        self.opacity[id.idx as usize]
    }

    /// Returns the offset by which the node scrolls its children.
    #[must_use]
    pub fn scroll_offset(&self, id: NodeId) -> Vec2 {
        self.validate(id);
        self.scroll_offset[id.idx as usize]
    }

    /// Returns whether the node and its subtree are hidden.
    #[must_use]
    pub fn hidden(&self, id: NodeId) -> bool {
        self.validate(id);
        self.hidden[id.idx as usize]
    }

    /// Returns whether the node clips its descendants to its bounds.
    #[must_use]
    pub fn masks_to_bounds(&self, id: NodeId) -> bool {
        self.validate(id);
        self.masks_to_bounds[id.idx as usize]
    }

    /// Returns `true` if the node must be pushed by the next commit.
    #[must_use]
    pub fn needs_sync(&self, id: NodeId) -> bool {
        self.validate(id);
        self.needs_sync[id.idx as usize]
    }

    /// Returns `true` if some strict descendant must be pushed.
    #[must_use]
    pub fn subtree_needs_sync(&self, id: NodeId) -> bool {
        self.validate(id);
        self.subtree_needs_sync[id.idx as usize]
    }

    /// Returns whether the node is pushed on every commit.
    #[must_use]
    pub fn persist(&self, id: NodeId) -> bool {
        self.validate(id);
        self.persist[id.idx as usize]
    }

    /// Source frame number of the last commit that pushed this node.
    #[must_use]
    pub fn last_synced_frame(&self, id: NodeId) -> u64 {
        self.validate(id);
        self.last_synced_frame[id.idx as usize]
    }

    /// Returns the node's recording, if one exists.
    #[must_use]
    pub fn recording(&self, id: NodeId) -> Option<&RecordingSource> {
        self.validate(id);
        self.content[id.idx as usize]
            .as_ref()
            .and_then(|slot| slot.recording.as_ref())
    }

    /// Returns `true` if the node has a content client attached.
    #[must_use]
    pub fn has_content_client(&self, id: NodeId) -> bool {
        self.validate(id);
        self.content[id.idx as usize].is_some()
    }

    /// The viewport size, if one is set.
    #[must_use]
    pub fn viewport(&self) -> Option<Size> {
        self.viewport
    }

    /// The color drawn behind all content.
    #[must_use]
    pub fn background_color(&self) -> Rgba8 {
        self.background_color
    }

    /// Returns `true` if anything changed since the last commit.
    ///
    /// Persisted nodes alone do not count as a change.
    #[must_use]
    pub fn has_pending_changes(&self) -> bool {
        self.commit_requested
    }

    // -- Property setters (mark push-properties flags) --

    /// Sets the node's kind.
    ///
    /// Switching to a kind that does not record content drops the recording;
    /// consumer trees are told to release their snapshot on the next commit.
    pub fn set_kind(&mut self, id: NodeId, kind: NodeKind) {
        self.validate(id);
        let i = id.idx as usize;
        if self.kind[i] == kind {
            return;
        }
        self.kind[i] = kind;
        if !kind.capabilities().records_content {
            if let Some(slot) = self.content[i].as_mut() {
                if slot.recording.take().is_some() || self.raster_published[i] {
                    slot.raster_dirty = true;
                }
            }
        } else if self.content[i].is_some() {
            self.needs_display[i] = Some(self.local_rect(id.idx));
        }
        self.mark_needs_sync(id.idx);
    }

    /// Sets the node's bounds.
    pub fn set_bounds(&mut self, id: NodeId, bounds: Size) {
        self.validate(id);
        if self.bounds[id.idx as usize] == bounds {
            return;
        }
        self.bounds[id.idx as usize] = bounds;
        self.mark_needs_sync(id.idx);
    }

    /// Sets the node's position within its parent.
    pub fn set_position(&mut self, id: NodeId, position: Point) {
        self.validate(id);
        if self.position[id.idx as usize] == position {
            return;
        }
        self.position[id.idx as usize] = position;
        self.mark_needs_sync(id.idx);
    }

    /// Sets the node's local transform, applied after its position.
    pub fn set_transform(&mut self, id: NodeId, transform: Transform3d) {
        self.validate(id);
        if self.transform[id.idx as usize] == transform {
            return;
        }
        self.transform[id.idx as usize] = transform;
        self.mark_needs_sync(id.idx);
    }

    /// Sets the node's own opacity. Values are clamped to `0.0..=1.0`.
    pub fn set_opacity(&mut self, id: NodeId, opacity: f32) {
        self.validate(id);
        let opacity = opacity.clamp(0.0, 1.0);
        if self.opacity[id.idx as usize].to_bits() == opacity.to_bits() {
            return;
        }
        self.opacity[id.idx as usize] = opacity;
        self.mark_needs_sync(id.idx);
    }

    /// Sets the offset by which the node scrolls its children.
    pub fn set_scroll_offset(&mut self, id: NodeId, offset: Vec2) {
        self.validate(id);
        if self.scroll_offset[id.idx as usize] == offset {
            return;
        }
        self.scroll_offset[id.idx as usize] = offset;
        self.mark_needs_sync(id.idx);
    }

    /// Hides or shows the node and its subtree.
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        self.validate(id);
        if self.hidden[id.idx as usize] == hidden {
            return;
        }
        self.hidden[id.idx as usize] = hidden;
        self.mark_needs_sync(id.idx);
    }

    /// Sets whether the node clips its descendants to its bounds.
    pub fn set_masks_to_bounds(&mut self, id: NodeId, masks: bool) {
        self.validate(id);
        if self.masks_to_bounds[id.idx as usize] == masks {
            return;
        }
        self.masks_to_bounds[id.idx as usize] = masks;
        self.mark_needs_sync(id.idx);
    }

    /// Attaches or detaches the node's content client.
    ///
    /// A new client starts without a recording and is asked for its full
    /// bounds on the next content update. Removing the client makes consumer
    /// trees drop the node's snapshot on the next commit.
    pub fn set_content_client(&mut self, id: NodeId, client: Option<Box<dyn ContentClient>>) {
        self.validate(id);
        let i = id.idx as usize;
        let published = self.raster_published[i];
        match client {
            Some(client) => {
                self.content[i] = Some(ContentSlot {
                    client,
                    recording: None,
                    invalidation: Region::with_limit(self.rect_limit),
                    raster_dirty: published,
                });
                self.needs_display[i] = Some(self.local_rect(id.idx));
                self.commit_requested = true;
            }
            None => {
                self.content[i] = None;
                self.needs_display[i] = None;
                if published {
                    self.mark_needs_sync(id.idx);
                }
            }
        }
    }

    /// Requests that `rect` (in node-local coordinates) be re-recorded by the
    /// next content update.
    pub fn set_needs_display_rect(&mut self, id: NodeId, rect: Rect) {
        self.validate(id);
        let rect = rect.abs();
        if rect.is_zero_area() {
            return;
        }
        let slot = &mut self.needs_display[id.idx as usize];
        *slot = Some(slot.map_or(rect, |r| r.union(rect)));
        self.commit_requested = true;
    }

    /// Requests that the node's whole content be re-recorded.
    pub fn set_needs_display(&mut self, id: NodeId) {
        self.validate(id);
        let rect = self.local_rect(id.idx);
        self.set_needs_display_rect(id, rect);
    }

    /// Makes the node synchronize on every commit, changed or not.
    pub fn set_persist(&mut self, id: NodeId, persist: bool) {
        self.validate(id);
        let i = id.idx as usize;
        if self.persist[i] == persist {
            return;
        }
        self.persist[i] = persist;
        if persist {
            self.persisted.push(id.idx);
            self.mark_needs_sync(id.idx);
        } else {
            self.persisted.retain(|&p| p != id.idx);
        }
    }

    /// Sets the viewport size; damage is clipped to it when set.
    pub fn set_viewport(&mut self, viewport: Option<Size>) {
        if self.viewport == viewport {
            return;
        }
        self.viewport = viewport;
        self.props_dirty = true;
        self.commit_requested = true;
    }

    /// Sets the color drawn behind all content.
    pub fn set_background_color(&mut self, color: Rgba8) {
        if self.background_color == color {
            return;
        }
        self.background_color = color;
        self.props_dirty = true;
        self.commit_requested = true;
    }

    /// Forces the next commit to go ahead even if nothing changed.
    pub fn set_needs_commit(&mut self) {
        self.commit_requested = true;
    }

    /// Marks every live node `needs_sync` and every recording for a fresh
    /// snapshot, so the next commit rebuilds consumer trees from scratch.
    pub fn mark_all_needs_sync(&mut self) {
        for idx in 0..self.len {
            let i = idx as usize;
            if !self.alive[i] {
                continue;
            }
            self.needs_sync[i] = true;
            self.subtree_needs_sync[i] = self.first_child[i] != INVALID;
            let published = self.raster_published[i];
            if let Some(slot) = self.content[i].as_mut() {
                slot.raster_dirty = slot.recording.is_some() || published;
                if let Some(recording) = slot.recording.as_ref() {
                    slot.invalidation
                        .insert(Rect::from_origin_size(Point::ORIGIN, recording.size()));
                }
            }
        }
        self.props_dirty = true;
        self.commit_requested = true;
    }

    // -- Internal helpers --

    #[inline]
    pub(crate) fn id_at(&self, idx: u32) -> NodeId {
        NodeId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Panics if the handle is stale.
    pub(crate) fn validate(&self, id: NodeId) {
        assert!(
            self.is_alive(id),
            "stale NodeId: {id:?} (current gen: {})",
            if id.idx < self.len {
                self.generation[id.idx as usize]
            } else {
                u32::MAX
            }
        );
    }

    pub(crate) fn local_rect(&self, idx: u32) -> Rect {
        Rect::from_origin_size(Point::ORIGIN, self.bounds[idx as usize])
    }

    /// Returns `true` if `ancestor` is `idx` or one of its ancestors.
    fn is_self_or_ancestor(&self, ancestor: u32, idx: u32) -> bool {
        let mut n = idx;
        while n != INVALID {
            if n == ancestor {
                return true;
            }
            n = self.parent[n as usize];
        }
        false
    }

    /// Marks `idx` dirty and flags every strict ancestor, stopping at the
    /// first one that is already flagged.
    pub(crate) fn mark_needs_sync(&mut self, idx: u32) {
        self.needs_sync[idx as usize] = true;
        self.commit_requested = true;
        self.propagate_up(idx);
    }

    /// Sets `subtree_needs_sync` on the strict ancestors of `idx`.
    pub(crate) fn propagate_up(&mut self, idx: u32) {
        let mut p = self.parent[idx as usize];
        while p != INVALID {
            if self.subtree_needs_sync[p as usize] {
                break;
            }
            self.subtree_needs_sync[p as usize] = true;
            p = self.parent[p as usize];
        }
    }

    /// Marks every node of the subtree rooted at `idx` dirty.
    fn mark_subtree_needs_sync(&mut self, idx: u32) {
        let mut stack = alloc::vec![idx];
        while let Some(n) = stack.pop() {
            let i = n as usize;
            self.needs_sync[i] = true;
            self.subtree_needs_sync[i] = self.first_child[i] != INVALID;
            let mut c = self.first_child[i];
            while c != INVALID {
                stack.push(c);
                c = self.next_sibling[c as usize];
            }
        }
        self.commit_requested = true;
        self.propagate_up(idx);
    }

    fn did_attach(&mut self, child: u32) {
        let p = self.parent[child as usize];
        self.mark_subtree_needs_sync(child);
        self.mark_needs_sync(p);
    }

    /// Unlinks `idx` and fixes up the old parent's flags.
    fn detach(&mut self, idx: u32) {
        let p = self.parent[idx as usize];
        let prev = self.prev_sibling[idx as usize];
        let next = self.next_sibling[idx as usize];

        if prev != INVALID {
            self.next_sibling[prev as usize] = next;
        } else {
            // Was first child.
            self.first_child[p as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }
        self.parent[idx as usize] = INVALID;
        self.prev_sibling[idx as usize] = INVALID;
        self.next_sibling[idx as usize] = INVALID;

        self.recompute_subtree_flag(p);
        self.mark_needs_sync(p);
    }

    /// Recomputes `subtree_needs_sync` of `idx` from its direct children.
    fn recompute_subtree_flag(&mut self, idx: u32) {
        let mut dirty = false;
        let mut c = self.first_child[idx as usize];
        while c != INVALID {
            if self.needs_sync[c as usize] || self.subtree_needs_sync[c as usize] {
                dirty = true;
                break;
            }
            c = self.next_sibling[c as usize];
        }
        self.subtree_needs_sync[idx as usize] = dirty;
    }
}
