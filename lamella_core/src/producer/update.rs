// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content update: refreshing recordings of attached content nodes.

use alloc::vec;
use alloc::vec::Vec;

use kurbo::Rect;

use super::tree::{ContentSlot, ProducerTree};
use crate::content::{PaintMode, RecordingSource};
use crate::id::INVALID;

/// Counters from one [`ProducerTree::update_content`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct UpdateStats {
    /// Passes over the tree that found work.
    pub passes: usize,
    /// Content client invocations.
    pub refreshed: usize,
    /// Recordings that reported a visible change.
    pub changed: usize,
}

impl ProducerTree {
    /// Refreshes the recording of every attached content node that asked for
    /// it.
    ///
    /// A node is refreshed when it has a pending display rect, when its
    /// bounds differ from its recording's size, or when it has no recording
    /// yet. With [`PaintMode::CachingDisabled`] every content node is
    /// refreshed on the first pass.
    ///
    /// Content clients may mutate the tree while they run. Nodes invalidated
    /// by another node's client are picked up by a further pass, up to
    /// `max_passes` in total; anything still pending after that waits for
    /// the next frame. Property changes made by clients are captured by the
    /// commit that follows.
    ///
    /// Recordings of nodes that are no longer attached are dropped.
    pub fn update_content(
        &mut self,
        frame_number: u64,
        mode: PaintMode,
        max_passes: usize,
    ) -> UpdateStats {
        let mut stats = UpdateStats::default();
        for pass in 0..max_passes.max(1) {
            let attached = self.attached_mask();
            self.drop_detached_recordings(&attached);

            let work: Vec<u32> = (0..self.len)
                .filter(|&idx| attached[idx as usize] && self.wants_refresh(idx, pass == 0, mode))
                .collect();
            if work.is_empty() {
                break;
            }
            stats.passes += 1;
            for idx in work {
                stats.refreshed += 1;
                if self.refresh_node(idx, frame_number, mode) {
                    stats.changed += 1;
                }
            }
        }
        if stats.refreshed > 0 {
            log::debug!(
                "content update for frame {frame_number}: {} refreshed, {} changed in {} passes",
                stats.refreshed,
                stats.changed,
                stats.passes
            );
        }
        stats
    }

    fn wants_refresh(&self, idx: u32, first_pass: bool, mode: PaintMode) -> bool {
        let i = idx as usize;
        if !self.kind[i].capabilities().records_content {
            return false;
        }
        let Some(slot) = self.content[i].as_ref() else {
            return false;
        };
        if self.needs_display[i].is_some() {
            return true;
        }
        let bounds = self.bounds[i];
        match slot.recording.as_ref() {
            Some(recording) => {
                recording.size() != bounds || (first_pass && mode == PaintMode::CachingDisabled)
            }
            None => bounds.width > 0.0 && bounds.height > 0.0,
        }
    }

    /// Runs one content client with its slot checked out of the tree.
    fn refresh_node(&mut self, idx: u32, frame_number: u64, mode: PaintMode) -> bool {
        let i = idx as usize;
        let id = self.id_at(idx);
        let Some(mut slot) = self.content[i].take() else {
            return false;
        };
        let update_rect = self.needs_display[i].take().unwrap_or(Rect::ZERO);
        let bounds = self.bounds[i];

        let ContentSlot {
            client,
            recording,
            invalidation,
            ..
        } = &mut slot;
        let recording = recording.get_or_insert_with(|| RecordingSource::new(id));
        let changed = recording.update_and_expand_invalidation(
            client.as_mut(),
            self,
            invalidation,
            bounds,
            update_rect,
            frame_number,
            mode,
        );
        if !recording.has_recording() {
            slot.recording = None;
        }
        if changed {
            slot.raster_dirty = true;
        }

        // The client may have destroyed the node or installed a new client.
        if self.is_alive(id) && self.content[i].is_none() {
            self.content[i] = Some(slot);
            if changed {
                self.mark_needs_sync(idx);
            }
        }
        changed
    }

    /// Marks which slots are reachable from the root.
    pub(crate) fn attached_mask(&self) -> Vec<bool> {
        let mut mask = vec![false; self.len as usize];
        if self.root == INVALID {
            return mask;
        }
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            mask[idx as usize] = true;
            let mut c = self.first_child[idx as usize];
            while c != INVALID {
                stack.push(c);
                c = self.next_sibling[c as usize];
            }
        }
        mask
    }

    fn drop_detached_recordings(&mut self, attached: &[bool]) {
        for (i, slot) in self.content.iter_mut().enumerate() {
            let Some(slot) = slot.as_mut() else {
                continue;
            };
            if !attached[i] && slot.recording.take().is_some() {
                slot.raster_dirty = true;
            }
        }
    }
}
