// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The commit state machine.
//!
//! A frame attempt walks these states:
//!
//! ```text
//!   ProducerHost                         ConsumerHost
//!   ────────────                         ────────────
//!   Start ─► Animate ─► UpdateContent ─► Commit ══batch══► Synchronize ─► Activate
//!                                          │                                 │
//!                                          └─► Aborted                       ▼
//!                                                             Draw ─► Swap ─► End
//!                                                               └─► NoSwap
//! ```
//!
//! [`ProducerHost`] and [`ConsumerHost`] each own one side's state and only
//! exchange [`CommitBatch`](crate::commit::CommitBatch)es and
//! [`CommitAck`]s, so they can live on different threads.
//! [`CommitOrchestrator`] drives both on one thread; in single-threaded mode
//! the commit activates inline and no pending tree is retained.
//!
//! Commit `N` is always synchronized before commit `N + 1` is prepared, and
//! draws only ever see the most recently activated tree.

mod consumer;
mod producer;

pub use consumer::{ConsumerHost, DrawOutcome};
pub use producer::{CommitAck, ProducerHost};

use alloc::boxed::Box;

use crate::backend::{OutputBackend, RasterScheduler};
use crate::settings::PipelineSettings;
use crate::trace::{CommitAbortReason, PipelineStage, Tracer};

/// How the commit of a frame attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitOutcome {
    /// The batch was synchronized into the pending tree.
    Committed {
        /// Nodes whose state was pushed.
        pushed: usize,
        /// Producer nodes the synchronization pass visited.
        visited: usize,
    },
    /// The commit was abandoned.
    Aborted(CommitAbortReason),
}

/// Everything that happened in one [`CommitOrchestrator::run_frame`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameOutcome {
    /// Frame number of the attempt.
    pub frame_number: u64,
    /// How the commit ended.
    pub commit: CommitOutcome,
    /// Whether a pending tree became active.
    pub activated: bool,
    /// The draw, if one was attempted.
    pub draw: Option<DrawOutcome>,
}

/// Producer and consumer hosts driven from one thread.
#[derive(Debug)]
pub struct CommitOrchestrator {
    producer: ProducerHost,
    consumer: ConsumerHost,
}

impl CommitOrchestrator {
    /// Creates a pipeline whose raster work is always ready.
    #[must_use]
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            producer: ProducerHost::new(settings),
            consumer: ConsumerHost::new(settings),
        }
    }

    /// Creates a pipeline that gates activation and drawing on `raster`.
    #[must_use]
    pub fn with_raster_scheduler(
        settings: PipelineSettings,
        raster: Box<dyn RasterScheduler + Send>,
    ) -> Self {
        Self {
            producer: ProducerHost::new(settings),
            consumer: ConsumerHost::with_raster_scheduler(settings, raster),
        }
    }

    /// The producer half.
    #[must_use]
    pub fn producer(&self) -> &ProducerHost {
        &self.producer
    }

    /// The producer half, for tree mutation and visibility changes.
    pub fn producer_mut(&mut self) -> &mut ProducerHost {
        &mut self.producer
    }

    /// The consumer half.
    #[must_use]
    pub fn consumer(&self) -> &ConsumerHost {
        &self.consumer
    }

    /// The consumer half, for activation gating and forced damage.
    pub fn consumer_mut(&mut self) -> &mut ConsumerHost {
        &mut self.consumer
    }

    /// Runs one frame attempt to completion.
    ///
    /// A lost context is recreated first if the output allows it. The draw
    /// is skipped while the producer is hidden or nothing needs redrawing.
    pub fn run_frame(
        &mut self,
        output: &mut dyn OutputBackend,
        tracer: &mut Tracer<'_>,
    ) -> FrameOutcome {
        if self.consumer.context_lost() && self.consumer.recover_context(output, tracer) {
            self.producer.did_recreate_context();
        }

        let frame_number = self.producer.begin_frame(tracer);
        self.producer.animate(tracer);
        let _ = self.producer.update_content(tracer);

        let mut activated = false;
        let commit = match self.producer.prepare_commit(tracer) {
            Ok(batch) => {
                let pushed = batch.updates.len();
                let visited = batch.visited.len();
                let ack = self.consumer.synchronize(batch, tracer);
                activated = ack.activated;
                self.producer.did_commit(ack);
                CommitOutcome::Committed { pushed, visited }
            }
            Err(reason) => CommitOutcome::Aborted(reason),
        };
        activated |= self.consumer.try_activate(tracer);

        let draw = if self.producer.is_visible()
            && !self.consumer.context_lost()
            && self.consumer.needs_redraw()
        {
            Some(self.consumer.draw(output, tracer))
        } else {
            None
        };
        if draw == Some(DrawOutcome::ContextLost) {
            self.producer.did_lose_context();
        }

        tracer.stage(frame_number, PipelineStage::End);
        FrameOutcome {
            frame_number,
            commit,
            activated,
            draw,
        }
    }
}
