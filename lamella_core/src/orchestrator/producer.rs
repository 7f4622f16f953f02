// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The producer half of the frame loop.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::backend::Animator;
use crate::commit::CommitBatch;
use crate::producer::{ProducerTree, UpdateStats};
use crate::settings::PipelineSettings;
use crate::swap_promise::{PromiseEntry, SwapPromise, fail_all};
use crate::trace::{AbortEvent, BeginFrameEvent, CommitAbortReason, PipelineStage, Tracer};

/// What the producer learns back from a synchronized commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommitAck {
    /// Frame number of the commit that was synchronized.
    pub source_frame_number: u64,
    /// Oldest frame any live consumer tree is at, after the commit.
    pub min_live_frame: Option<u64>,
    /// Whether the commit was activated before the ack was sent.
    pub activated: bool,
}

/// Owns the producer tree and runs the producer-side states of a frame
/// attempt: `Start → Animate → UpdateContent → Commit`.
///
/// The frame number advances on every [`begin_frame`](Self::begin_frame),
/// whether or not the attempt ends up committing.
pub struct ProducerHost {
    tree: ProducerTree,
    settings: PipelineSettings,
    frame_number: u64,
    visible: bool,
    defer_commits: bool,
    context_lost: bool,
    in_flight: bool,
    latched_abort: Option<CommitAbortReason>,
    queued: Vec<PromiseEntry>,
    animator: Option<Box<dyn Animator>>,
}

impl fmt::Debug for ProducerHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerHost")
            .field("tree", &self.tree)
            .field("settings", &self.settings)
            .field("frame_number", &self.frame_number)
            .field("visible", &self.visible)
            .field("defer_commits", &self.defer_commits)
            .field("context_lost", &self.context_lost)
            .field("in_flight", &self.in_flight)
            .field("latched_abort", &self.latched_abort)
            .field("queued", &self.queued.len())
            .field("animator", &self.animator.is_some())
            .finish()
    }
}

impl ProducerHost {
    /// Creates a visible host with an empty tree.
    #[must_use]
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            tree: ProducerTree::with_rect_limit(settings.region_rect_limit),
            settings,
            frame_number: 0,
            visible: true,
            defer_commits: false,
            context_lost: false,
            in_flight: false,
            latched_abort: None,
            queued: Vec::new(),
            animator: None,
        }
    }

    /// The producer tree.
    #[must_use]
    pub fn tree(&self) -> &ProducerTree {
        &self.tree
    }

    /// The producer tree, for mutation between frames.
    pub fn tree_mut(&mut self) -> &mut ProducerTree {
        &mut self.tree
    }

    /// Number of the latest frame attempt; `0` before the first.
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Returns `true` between [`begin_frame`](Self::begin_frame) and the end
    /// of that attempt's commit.
    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Installs the animator run at the start of each frame attempt.
    pub fn set_animator(&mut self, animator: Option<Box<dyn Animator>>) {
        self.animator = animator;
    }

    /// Whether the producer is visible.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Shows or hides the producer.
    ///
    /// Hiding while a frame attempt is in flight aborts that attempt's
    /// commit even if visibility returns before it reaches `Commit`.
    pub fn set_visible(&mut self, visible: bool) {
        if !visible && self.in_flight {
            self.latched_abort = Some(CommitAbortReason::NotVisible);
        }
        self.visible = visible;
    }

    /// Holds back commits until cleared. Frame attempts still advance the
    /// frame number.
    pub fn set_defer_commits(&mut self, defer: bool) {
        self.defer_commits = defer;
    }

    /// Whether the output context is known to be lost.
    #[must_use]
    pub fn context_lost(&self) -> bool {
        self.context_lost
    }

    /// Queues a promise on the next commit.
    pub fn queue_swap_promise(&mut self, promise: Box<dyn SwapPromise>) {
        self.queued.push(PromiseEntry::new(promise));
    }

    /// Number of promises waiting for a commit.
    #[must_use]
    pub fn queued_promise_count(&self) -> usize {
        self.queued.len()
    }

    /// Starts a frame attempt and returns its frame number.
    pub fn begin_frame(&mut self, tracer: &mut Tracer<'_>) -> u64 {
        self.frame_number += 1;
        self.in_flight = true;
        self.latched_abort = None;
        tracer.begin_frame(&BeginFrameEvent {
            frame_number: self.frame_number,
        });
        tracer.stage(self.frame_number, PipelineStage::Start);
        self.frame_number
    }

    /// Runs the animator, if any.
    pub fn animate(&mut self, tracer: &mut Tracer<'_>) {
        tracer.stage(self.frame_number, PipelineStage::Animate);
        if let Some(animator) = self.animator.as_mut() {
            animator.animate(self.frame_number, &mut self.tree);
        }
    }

    /// Refreshes content recordings.
    pub fn update_content(&mut self, tracer: &mut Tracer<'_>) -> UpdateStats {
        tracer.stage(self.frame_number, PipelineStage::UpdateContent);
        if !self.visible {
            return UpdateStats::default();
        }
        self.tree.update_content(
            self.frame_number,
            self.settings.paint_mode,
            self.settings.max_update_passes,
        )
    }

    /// Synchronizes the producer tree into a batch, or aborts.
    ///
    /// On abort the queued promises are resolved right away and the tree's
    /// dirty state is left for the next attempt. On success they ride on
    /// the batch.
    pub fn prepare_commit(
        &mut self,
        tracer: &mut Tracer<'_>,
    ) -> Result<CommitBatch, CommitAbortReason> {
        let frame = self.frame_number;
        tracer.stage(frame, PipelineStage::Commit);
        if let Some(reason) = self.abort_reason() {
            self.abort(reason, tracer);
            return Err(reason);
        }

        let mut batch = self.tree.synchronize(frame, tracer);
        for mut entry in self.queued.drain(..) {
            entry.set_frame_number(frame);
            batch.promises.push(entry);
        }
        log::trace!(
            "frame {frame}: committing {} updates with {} promises",
            batch.updates.len(),
            batch.promises.len()
        );
        Ok(batch)
    }

    fn abort_reason(&self) -> Option<CommitAbortReason> {
        if let Some(reason) = self.latched_abort {
            return Some(reason);
        }
        if !self.visible {
            Some(CommitAbortReason::NotVisible)
        } else if self.context_lost {
            Some(CommitAbortReason::ContextLost)
        } else if self.defer_commits {
            Some(CommitAbortReason::Deferred)
        } else if !self.tree.has_pending_changes() {
            Some(CommitAbortReason::NoUpdate)
        } else {
            None
        }
    }

    fn abort(&mut self, reason: CommitAbortReason, tracer: &mut Tracer<'_>) {
        let frame = self.frame_number;
        let broken = fail_all(self.queued.drain(..), reason.did_not_swap_reason(), tracer);
        self.in_flight = false;
        self.latched_abort = None;
        log::debug!("frame {frame}: commit aborted ({reason:?}), {broken} promises broken");
        tracer.abort(&AbortEvent {
            frame_number: frame,
            reason,
        });
        tracer.stage(frame, PipelineStage::Aborted);
    }

    /// Completes an attempt after the consumer synchronized its batch.
    pub fn did_commit(&mut self, ack: CommitAck) {
        debug_assert_eq!(
            ack.source_frame_number, self.frame_number,
            "ack for a commit other than the one in flight"
        );
        self.in_flight = false;
        self.latched_abort = None;
        self.tree.release_slots(ack.min_live_frame);
    }

    /// Completes an attempt whose batch the consumer dropped unsynchronized.
    ///
    /// The batch's promises must already be resolved. Its changes are
    /// re-marked for the next commit.
    pub fn did_cancel_commit(&mut self, batch: CommitBatch, tracer: &mut Tracer<'_>) {
        let frame = batch.source_frame_number;
        self.tree.restore_batch(batch);
        self.in_flight = false;
        self.latched_abort = None;
        log::debug!("frame {frame}: commit cancelled before synchronization");
        tracer.abort(&AbortEvent {
            frame_number: frame,
            reason: CommitAbortReason::Cancelled,
        });
        tracer.stage(frame, PipelineStage::Aborted);
    }

    /// Records that the output context was lost; commits abort until
    /// [`did_recreate_context`](Self::did_recreate_context).
    pub fn did_lose_context(&mut self) {
        self.context_lost = true;
    }

    /// Records that the output context is back and re-pushes the whole tree.
    pub fn did_recreate_context(&mut self) {
        self.context_lost = false;
        self.tree.mark_all_needs_sync();
    }
}
