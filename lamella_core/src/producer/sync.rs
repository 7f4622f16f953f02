// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The push-properties pass: copying dirty producer state into a batch.

use alloc::vec;
use alloc::vec::Vec;

use super::tree::ProducerTree;
use crate::commit::{CommitBatch, NodeUpdate, RasterUpdate};
use crate::id::{INVALID, NodeId};
use crate::region::Region;
use crate::trace::{CommitEvent, Tracer};

impl ProducerTree {
    /// Copies every dirty node reachable from the root into a [`CommitBatch`]
    /// stamped with `frame_number`.
    ///
    /// The root is visited unconditionally. Below it, the pass only descends
    /// into children that have `needs_sync` or `subtree_needs_sync` set, so
    /// clean sibling subtrees are never visited. Each pushed node has both
    /// flags cleared, except persisted nodes, which keep `needs_sync` and
    /// re-flag their ancestors for the next pass.
    ///
    /// Content nodes whose recording changed are snapshotted into a new
    /// [`RasterSource`](crate::content::RasterSource) here.
    ///
    /// # Panics
    ///
    /// Panics if `frame_number` does not exceed the previous commit's.
    pub fn synchronize(&mut self, frame_number: u64, tracer: &mut Tracer<'_>) -> CommitBatch {
        assert!(
            frame_number > self.last_commit_frame,
            "commit frame numbers must increase: {frame_number} after {}",
            self.last_commit_frame
        );
        let mut batch = CommitBatch {
            source_frame_number: frame_number,
            root: self.root(),
            viewport: self.viewport,
            background_color: self.background_color,
            tree_props_changed: self.props_dirty,
            updates: Vec::new(),
            removed: core::mem::take(&mut self.removed),
            visited: Vec::new(),
            promises: Vec::new(),
        };

        if self.root != INVALID {
            let mut stack = vec![self.root];
            let mut dirty_children = Vec::new();
            while let Some(idx) = stack.pop() {
                let i = idx as usize;
                batch.visited.push(self.id_at(idx));

                if self.needs_sync[i] {
                    let update = self.push_node(idx);
                    #[cfg(feature = "trace-rich")]
                    tracer.node_push(&crate::trace::NodePushEvent {
                        frame_number,
                        node: update.id,
                        raster: matches!(update.raster, RasterUpdate::Set(_)),
                    });
                    batch.updates.push(update);
                    if !self.persist[i] {
                        self.needs_sync[i] = false;
                    }
                    self.last_synced_frame[i] = frame_number;
                }

                if core::mem::take(&mut self.subtree_needs_sync[i]) {
                    dirty_children.clear();
                    let mut c = self.first_child[i];
                    while c != INVALID {
                        if self.needs_sync[c as usize] || self.subtree_needs_sync[c as usize] {
                            dirty_children.push(c);
                        }
                        c = self.next_sibling[c as usize];
                    }
                    // Reverse so children pop in paint order.
                    stack.extend(dirty_children.iter().rev());
                }
            }
        }

        let persisted = core::mem::take(&mut self.persisted);
        for &idx in &persisted {
            self.needs_sync[idx as usize] = true;
            self.propagate_up(idx);
        }
        self.persisted = persisted;

        self.props_dirty = false;
        self.commit_requested = false;
        self.last_commit_frame = frame_number;

        let rasters = batch.rasters().count();
        log::trace!(
            "synchronized frame {frame_number}: visited {}, pushed {}, removed {}",
            batch.visited.len(),
            batch.updates.len(),
            batch.removed.len()
        );
        tracer.commit(&CommitEvent {
            frame_number,
            visited: saturate(batch.visited.len()),
            pushed: saturate(batch.updates.len()),
            removed: saturate(batch.removed.len()),
            rasters: saturate(rasters),
        });
        batch
    }

    /// Re-marks everything a batch carried, for a batch the consumer never
    /// synchronized.
    ///
    /// Promises riding on the batch must already have been resolved.
    pub fn restore_batch(&mut self, batch: CommitBatch) {
        debug_assert!(
            batch.promises.is_empty(),
            "restored batch still carries promises"
        );
        for update in batch.updates {
            if !self.is_alive(update.id) {
                continue;
            }
            let idx = update.id.idx;
            let i = idx as usize;
            match update.raster {
                RasterUpdate::Keep => {}
                RasterUpdate::Set(_) => {
                    if let Some(slot) = self.content[i].as_mut() {
                        slot.raster_dirty = true;
                    }
                }
                RasterUpdate::Clear => {
                    // The consumer still holds the old snapshot.
                    self.raster_published[i] = true;
                    if let Some(slot) = self.content[i].as_mut() {
                        slot.raster_dirty = true;
                    }
                }
            }
            if let Some(slot) = self.content[i].as_mut() {
                slot.invalidation.union_with(&update.invalidation);
            }
            self.mark_needs_sync(idx);
        }
        self.removed.extend(batch.removed);
        self.props_dirty |= batch.tree_props_changed;
        self.commit_requested = true;
    }

    fn push_node(&mut self, idx: u32) -> NodeUpdate {
        let i = idx as usize;
        let mut raster = RasterUpdate::Keep;
        let mut invalidation = Region::new();
        match self.content[i].as_mut() {
            Some(slot) => {
                if core::mem::take(&mut slot.raster_dirty) {
                    raster = match slot.recording.as_ref() {
                        Some(recording) => RasterUpdate::Set(recording.create_raster_source()),
                        None => RasterUpdate::Clear,
                    };
                }
                if let Some(recording) = slot.recording.as_mut() {
                    recording.take_invalidation();
                }
                invalidation = slot.invalidation.take();
            }
            None => {
                if self.raster_published[i] {
                    raster = RasterUpdate::Clear;
                }
            }
        }
        let raster = match raster {
            RasterUpdate::Set(source) => {
                self.raster_published[i] = true;
                RasterUpdate::Set(source)
            }
            RasterUpdate::Clear if self.raster_published[i] => {
                self.raster_published[i] = false;
                RasterUpdate::Clear
            }
            RasterUpdate::Clear | RasterUpdate::Keep => RasterUpdate::Keep,
        };

        let parent = self.parent[i];
        NodeUpdate {
            id: self.id_at(idx),
            parent: (parent != INVALID).then(|| self.id_at(parent)),
            children: self.children_of(idx),
            kind: self.kind[i],
            bounds: self.bounds[i],
            position: self.position[i],
            transform: self.transform[i],
            opacity: self.opacity[i],
            scroll_offset: self.scroll_offset[i],
            hidden: self.hidden[i],
            masks_to_bounds: self.masks_to_bounds[i],
            raster,
            invalidation,
        }
    }

    fn children_of(&self, idx: u32) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut c = self.first_child[idx as usize];
        while c != INVALID {
            out.push(self.id_at(c));
            c = self.next_sibling[c as usize];
        }
        out
    }
}

fn saturate(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use kurbo::{Point, Size};

    use super::*;

    fn tree_with_two_branches() -> (ProducerTree, [NodeId; 5]) {
        // root ─┬─ a ── a1
        //       └─ b ── b1
        let mut tree = ProducerTree::new();
        let root = tree.create_node();
        let a = tree.create_node();
        let a1 = tree.create_node();
        let b = tree.create_node();
        let b1 = tree.create_node();
        tree.set_root(Some(root));
        tree.add_child(root, a);
        tree.add_child(a, a1);
        tree.add_child(root, b);
        tree.add_child(b, b1);
        (tree, [root, a, a1, b, b1])
    }

    #[test]
    fn first_pass_pushes_everything_in_paint_order() {
        let (mut tree, ids) = tree_with_two_branches();
        let batch = tree.synchronize(1, &mut Tracer::none());
        let pushed: Vec<_> = batch.updates.iter().map(|u| u.id).collect();
        assert_eq!(pushed, ids);
        assert!(!tree.has_pending_changes());
        for id in ids {
            assert!(!tree.needs_sync(id));
            assert!(!tree.subtree_needs_sync(id));
            assert_eq!(tree.last_synced_frame(id), 1);
        }
    }

    #[test]
    fn clean_sibling_subtree_is_not_visited() {
        let (mut tree, [root, a, a1, b, _]) = tree_with_two_branches();
        let _ = tree.synchronize(1, &mut Tracer::none());

        tree.set_position(a1, Point::new(3.0, 3.0));
        let batch = tree.synchronize(2, &mut Tracer::none());
        assert_eq!(batch.visited, [root, a, a1]);
        assert_eq!(batch.updates.len(), 1);
        assert_eq!(batch.updates[0].id, a1);
        assert!(!batch.visited.contains(&b));
    }

    #[test]
    fn root_is_visited_without_changes() {
        let (mut tree, [root, ..]) = tree_with_two_branches();
        let _ = tree.synchronize(1, &mut Tracer::none());
        let batch = tree.synchronize(2, &mut Tracer::none());
        assert_eq!(batch.visited, [root]);
        assert!(batch.updates.is_empty());
    }

    #[test]
    fn persisted_node_is_pushed_every_pass() {
        let (mut tree, [root, _, _, b, b1]) = tree_with_two_branches();
        tree.set_persist(b1, true);
        let _ = tree.synchronize(1, &mut Tracer::none());
        assert!(tree.needs_sync(b1));
        assert!(tree.subtree_needs_sync(b));
        assert!(!tree.has_pending_changes());

        let batch = tree.synchronize(2, &mut Tracer::none());
        assert_eq!(batch.visited, [root, b, b1]);
        assert_eq!(batch.updates.len(), 1);
        assert_eq!(batch.updates[0].id, b1);
    }

    #[test]
    fn cleared_persist_stops_the_pushes() {
        let (mut tree, [root, _, _, _, b1]) = tree_with_two_branches();
        tree.set_persist(b1, true);
        let _ = tree.synchronize(1, &mut Tracer::none());
        tree.set_persist(b1, false);
        // Still marked from the last pass, so it goes out once more.
        assert_eq!(tree.synchronize(2, &mut Tracer::none()).updates.len(), 1);
        let batch = tree.synchronize(3, &mut Tracer::none());
        assert_eq!(batch.visited, [root]);
        assert!(batch.updates.is_empty());
    }

    #[test]
    fn removal_pushes_parent_and_reports_destroyed() {
        let (mut tree, [root, a, a1, ..]) = tree_with_two_branches();
        let _ = tree.synchronize(1, &mut Tracer::none());
        tree.remove_from_parent(a1);
        tree.destroy_node(a1);
        let batch = tree.synchronize(2, &mut Tracer::none());
        assert_eq!(batch.removed, [a1]);
        assert_eq!(batch.visited, [root, a]);
        assert!(batch.updates[0].children.is_empty());
    }

    #[test]
    fn tree_props_ride_on_the_batch() {
        let (mut tree, _) = tree_with_two_branches();
        let _ = tree.synchronize(1, &mut Tracer::none());
        tree.set_viewport(Some(Size::new(100.0, 80.0)));
        assert!(tree.has_pending_changes());
        let batch = tree.synchronize(2, &mut Tracer::none());
        assert!(batch.tree_props_changed);
        assert_eq!(batch.viewport, Some(Size::new(100.0, 80.0)));
    }

    #[test]
    fn restore_re_marks_pushed_nodes() {
        let (mut tree, [root, a, a1, ..]) = tree_with_two_branches();
        let _ = tree.synchronize(1, &mut Tracer::none());
        tree.set_opacity(a1, 0.25);
        let batch = tree.synchronize(2, &mut Tracer::none());
        assert!(!tree.needs_sync(a1));

        tree.restore_batch(batch);
        assert!(tree.needs_sync(a1));
        assert!(tree.subtree_needs_sync(a));
        assert!(tree.subtree_needs_sync(root));
        let again = tree.synchronize(3, &mut Tracer::none());
        assert_eq!(again.updates[0].id, a1);
    }

    #[test]
    #[should_panic(expected = "commit frame numbers must increase")]
    fn frame_numbers_must_increase() {
        let (mut tree, _) = tree_with_two_branches();
        let _ = tree.synchronize(2, &mut Tracer::none());
        let _ = tree.synchronize(2, &mut Tracer::none());
    }
}
