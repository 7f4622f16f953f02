// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One generation of the consumer-side tree.

use alloc::collections::btree_map::Entry;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec;
use alloc::vec::Vec;

use kurbo::Size;

use super::node::ConsumerNode;
use crate::commit::CommitBatch;
use crate::content::Rgba8;
use crate::id::NodeId;

/// A synchronized copy of the producer tree at one source frame number.
///
/// Nodes are keyed by the id of the producer node they were pushed from.
/// A tree only ever changes by [`apply`](Self::apply)ing commit batches in
/// frame order, or by being overwritten from a newer tree when it is
/// recycled.
#[derive(Clone, Debug, Default)]
pub struct ConsumerTree {
    pub(crate) nodes: BTreeMap<NodeId, ConsumerNode>,
    pub(crate) root: Option<NodeId>,
    pub(crate) source_frame_number: Option<u64>,
    pub(crate) viewport: Option<Size>,
    pub(crate) background_color: Rgba8,
    pub(crate) needs_full_damage: bool,
    /// Nodes whose damage is not empty.
    pub(crate) damaged: BTreeSet<NodeId>,
}

impl ConsumerTree {
    /// Creates an empty tree that has never been synchronized.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Root node, if any.
    #[must_use]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Frame number of the last batch applied, or `None` if none was.
    #[must_use]
    pub fn source_frame_number(&self) -> Option<u64> {
        self.source_frame_number
    }

    /// Viewport size, if set.
    #[must_use]
    pub fn viewport(&self) -> Option<Size> {
        self.viewport
    }

    /// Color behind all content.
    #[must_use]
    pub fn background_color(&self) -> Rgba8 {
        self.background_color
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the tree holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&ConsumerNode> {
        self.nodes.get(&id)
    }

    /// Iterates over all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &ConsumerNode> {
        self.nodes.values()
    }

    /// Whether a change since the last damage computation invalidates the
    /// whole surface (root, viewport, or background changed).
    #[must_use]
    pub fn needs_full_damage(&self) -> bool {
        self.needs_full_damage
    }

    /// Applies a commit batch.
    ///
    /// Pushed nodes are created or updated in place, destroyed nodes are
    /// dropped, and when links changed anything no longer reachable from the
    /// root is collected.
    ///
    /// # Panics
    ///
    /// Panics if the batch is not newer than the last one applied.
    pub fn apply(&mut self, batch: &CommitBatch) {
        let frame = batch.source_frame_number;
        if let Some(last) = self.source_frame_number {
            assert!(
                frame > last,
                "commit {frame} applied to a tree already at frame {last}"
            );
        }

        let mut structure_changed = !batch.removed.is_empty();
        for update in &batch.updates {
            let node = match self.nodes.entry(update.id) {
                Entry::Occupied(entry) => {
                    let node = entry.into_mut();
                    structure_changed |= node.apply(update, frame);
                    node
                }
                Entry::Vacant(entry) => {
                    structure_changed = true;
                    entry.insert(ConsumerNode::from_update(update, frame))
                }
            };
            if !node.damage.is_empty() {
                self.damaged.insert(update.id);
            }
        }
        for id in &batch.removed {
            self.nodes.remove(id);
        }

        if self.root != batch.root {
            self.root = batch.root;
            self.needs_full_damage = true;
            structure_changed = true;
        }
        if batch.tree_props_changed
            && (self.viewport != batch.viewport || self.background_color != batch.background_color)
        {
            self.viewport = batch.viewport;
            self.background_color = batch.background_color;
            self.needs_full_damage = true;
        }
        if structure_changed {
            self.collect_unreachable();
        }
        self.source_frame_number = Some(frame);
    }

    /// Overwrites this tree with `other`, reusing nodes with matching ids.
    pub(crate) fn sync_from(&mut self, other: &Self) {
        self.nodes.retain(|id, _| other.nodes.contains_key(id));
        for (id, node) in &other.nodes {
            match self.nodes.get_mut(id) {
                Some(mine) => mine.copy_from(node),
                None => {
                    self.nodes.insert(*id, node.clone());
                }
            }
        }
        self.root = other.root;
        self.source_frame_number = other.source_frame_number;
        self.viewport = other.viewport;
        self.background_color = other.background_color;
        self.needs_full_damage = other.needs_full_damage;
        self.damaged.clone_from(&other.damaged);
    }

    /// Replaces this tree's unconsumed damage with `other`'s. Both trees
    /// must hold the same nodes.
    pub(crate) fn adopt_damage(&mut self, other: &Self) {
        self.clear_damage();
        for id in &other.damaged {
            if let (Some(mine), Some(theirs)) = (self.nodes.get_mut(id), other.nodes.get(id)) {
                mine.damage.clone_from(&theirs.damage);
            }
        }
        self.damaged.clone_from(&other.damaged);
        self.needs_full_damage = other.needs_full_damage;
    }

    /// Forgets every recorded per-node change.
    pub(crate) fn clear_damage(&mut self) {
        for id in core::mem::take(&mut self.damaged) {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.damage.clear();
            }
        }
        self.needs_full_damage = false;
    }

    fn collect_unreachable(&mut self) {
        let Some(root) = self.root else {
            self.nodes.clear();
            return;
        };
        let mut reachable = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                reachable.push(id);
                stack.extend(node.children.iter().copied());
            }
        }
        reachable.sort_unstable();
        let before = self.nodes.len();
        self.nodes.retain(|id, _| reachable.binary_search(id).is_ok());
        let dropped = before - self.nodes.len();
        if dropped > 0 {
            log::trace!("dropped {dropped} unreachable consumer nodes");
        }
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Point;

    use super::*;
    use crate::producer::ProducerTree;
    use crate::trace::Tracer;

    #[test]
    fn first_batch_builds_the_tree() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        let child = producer.create_node();
        producer.set_root(Some(root));
        producer.add_child(root, child);

        let mut tree = ConsumerTree::new();
        tree.apply(&producer.synchronize(1, &mut Tracer::none()));
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.root(), Some(root));
        assert_eq!(tree.node(root).map(ConsumerNode::children), Some(&[child][..]));
        assert_eq!(tree.source_frame_number(), Some(1));
        assert!(tree.needs_full_damage());
    }

    #[test]
    fn removed_subtree_is_collected() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        let a = producer.create_node();
        let a1 = producer.create_node();
        producer.set_root(Some(root));
        producer.add_child(root, a);
        producer.add_child(a, a1);

        let mut tree = ConsumerTree::new();
        tree.apply(&producer.synchronize(1, &mut Tracer::none()));
        // Detached, not destroyed: only the parent's child list says so.
        producer.remove_from_parent(a);
        tree.apply(&producer.synchronize(2, &mut Tracer::none()));
        assert_eq!(tree.len(), 1);
        assert!(tree.node(a1).is_none());
    }

    #[test]
    fn opacity_change_is_property_damage() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        producer.set_root(Some(root));
        let mut tree = ConsumerTree::new();
        tree.apply(&producer.synchronize(1, &mut Tracer::none()));
        tree.clear_damage();

        producer.set_position(root, Point::new(1.0, 1.0));
        tree.apply(&producer.synchronize(2, &mut Tracer::none()));
        assert!(tree.node(root).is_some_and(|n| n.damage().is_empty()));

        producer.set_opacity(root, 0.5);
        tree.apply(&producer.synchronize(3, &mut Tracer::none()));
        assert!(tree.node(root).is_some_and(|n| n.damage().property));
        assert!(!tree.needs_full_damage());
    }

    #[test]
    fn sync_from_reuses_and_prunes() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        let a = producer.create_node();
        producer.set_root(Some(root));
        producer.add_child(root, a);
        let mut active = ConsumerTree::new();
        active.apply(&producer.synchronize(1, &mut Tracer::none()));

        let mut recycled = ConsumerTree::new();
        let stale = producer.create_node();
        producer.add_child(root, stale);
        recycled.apply(&producer.synchronize(2, &mut Tracer::none()));

        recycled.sync_from(&active);
        assert_eq!(recycled.len(), 2);
        assert!(recycled.node(stale).is_none());
        assert_eq!(recycled.source_frame_number(), Some(1));
    }

    #[test]
    #[should_panic(expected = "applied to a tree already at frame")]
    fn stale_batch_panics() {
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        producer.set_root(Some(root));
        let first = producer.synchronize(1, &mut Tracer::none());
        let mut tree = ConsumerTree::new();
        tree.apply(&producer.synchronize(2, &mut Tracer::none()));
        tree.apply(&first);
    }
}
