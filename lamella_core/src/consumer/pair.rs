// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pending, active, and recycled consumer trees.

use alloc::vec::Vec;

use super::tree::ConsumerTree;
use crate::commit::CommitBatch;

/// The consumer's double-buffered trees.
///
/// ```text
///   commit ──► pending ──activate()──► active ──► recycle
///                 ▲                                  │
///                 └──── replay batches since ◄───────┘
/// ```
///
/// Commits land in the pending tree. If there is none, the recycled tree is
/// first brought up to date with the active tree by replaying the batches
/// the active tree received since the two parted, so the work is
/// proportional to what changed. A recycled tree that cannot be caught up
/// that way (a discarded pending tree) is overwritten from the active tree
/// instead. Activation moves pending to active and the old active tree to
/// the recycle slot. Draw only ever sees the active tree.
#[derive(Debug, Default)]
pub struct ConsumerTreePair {
    pending: Option<ConsumerTree>,
    active: ConsumerTree,
    recycle: Option<ConsumerTree>,
    /// Batches taking the recycled tree to the active tree, or `None` if
    /// the recycled tree is not an older active tree.
    behind: Option<Vec<CommitBatch>>,
    /// Batches applied to the pending tree.
    ahead: Vec<CommitBatch>,
}

impl ConsumerTreePair {
    /// Creates a pair with an empty active tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The tree commits are applied to, if one is waiting to activate.
    #[must_use]
    pub fn pending(&self) -> Option<&ConsumerTree> {
        self.pending.as_ref()
    }

    /// The tree driving output.
    #[must_use]
    pub fn active(&self) -> &ConsumerTree {
        &self.active
    }

    pub(crate) fn active_mut(&mut self) -> &mut ConsumerTree {
        &mut self.active
    }

    /// Returns `true` if a retired tree is waiting for reuse.
    #[must_use]
    pub fn has_recycle(&self) -> bool {
        self.recycle.is_some()
    }

    /// Applies `batch` to the pending tree, creating it if needed.
    ///
    /// Returns the source frame number of a pending tree that was still
    /// waiting to activate and is now superseded by `batch`.
    ///
    /// # Panics
    ///
    /// Panics if `batch` is not newer than both the pending and the active
    /// tree.
    pub fn synchronize(&mut self, batch: &CommitBatch) -> Option<u64> {
        let frame = batch.source_frame_number;
        if let Some(active) = self.active.source_frame_number {
            assert!(
                frame > active,
                "commit {frame} is not newer than the active tree ({active})"
            );
        }
        let superseded = self.pending.as_ref().and_then(|p| p.source_frame_number);
        let mut pending = match self.pending.take() {
            Some(tree) => tree,
            None => self.catch_up(),
        };
        pending.apply(batch);
        self.pending = Some(pending);
        self.ahead.push(batch.replica());
        superseded
    }

    /// Takes the recycled tree, or a fresh one, and brings it level with the
    /// active tree.
    fn catch_up(&mut self) -> ConsumerTree {
        match (self.recycle.take(), self.behind.take()) {
            (Some(mut tree), Some(batches)) => {
                for batch in &batches {
                    tree.apply(batch);
                }
                tree.adopt_damage(&self.active);
                log::trace!("recycled tree caught up by {} batches", batches.len());
                tree
            }
            (recycled, _) => {
                let mut tree = recycled.unwrap_or_default();
                tree.sync_from(&self.active);
                tree
            }
        }
    }

    /// Makes the pending tree active. Returns its source frame number, or
    /// `None` if there was no pending tree.
    ///
    /// # Panics
    ///
    /// Panics if the pending tree is older than the active one.
    pub fn activate(&mut self) -> Option<u64> {
        let pending = self.pending.take()?;
        let frame = pending.source_frame_number;
        assert!(
            frame > self.active.source_frame_number,
            "activation must move forward: {frame:?} after {:?}",
            self.active.source_frame_number
        );
        let old = core::mem::replace(&mut self.active, pending);
        self.recycle = Some(old);
        self.behind = Some(core::mem::take(&mut self.ahead));
        frame
    }

    /// Drops the pending tree without activating it. Returns its source
    /// frame number.
    pub fn discard_pending(&mut self) -> Option<u64> {
        let pending = self.pending.take()?;
        let frame = pending.source_frame_number;
        self.recycle = Some(pending);
        self.behind = None;
        self.ahead.clear();
        frame
    }

    /// Oldest source frame number any live tree is at, or `None` if no tree
    /// has been synchronized.
    ///
    /// The recycled tree does not count: it is brought level with the active
    /// tree before reuse, and the batches that do so remove whatever it holds
    /// that the active tree does not.
    #[must_use]
    pub fn min_live_frame(&self) -> Option<u64> {
        let pending = self.pending.as_ref().and_then(|p| p.source_frame_number);
        match (self.active.source_frame_number, pending) {
            (Some(a), Some(p)) => Some(a.min(p)),
            (a, p) => a.or(p),
        }
    }
}
