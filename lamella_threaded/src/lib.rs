// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runs the lamella consumer host on its own thread.
//!
//! ```text
//!   producer thread                         consumer thread
//!   ───────────────                         ───────────────
//!   ThreadedPipeline::run_frame()
//!     begin / animate / update
//!     prepare_commit() ──Commit{batch, token}──► token cancelled? ─yes─► break promises
//!          ▲                                      │ no                  │
//!          │                                      ▼                     │
//!          └──────── CommitAck ◄──────── ConsumerHost::synchronize()    │
//!          └──────── Cancelled(batch) ◄──────────────────────────────────┘
//!                                                 │
//!                                     try_activate() / draw()
//!                                                 │
//!   poll_events() ◄──── Activated / Drawn / ContextLost / ContextRecovered
//! ```
//!
//! Commits are a blocking barrier: [`ThreadedPipeline::run_frame`] returns
//! once the consumer has synchronized (or cancelled) the batch, so the
//! producer tree is free to mutate again while the consumer activates and
//! draws on its own schedule.
//!
//! Visibility is controlled through a [`ControlHandle`] usable from any
//! thread. Hiding the output while a frame attempt is in flight cancels that
//! attempt's commit; its promises fail with
//! [`CommitFails`](lamella_core::swap_promise::DidNotSwapReason::CommitFails).

mod error;
mod worker;

pub use error::{PipelineError, PipelineResult};
pub use worker::{ConsumerEvent, ControlHandle};

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use lamella_core::backend::{ImmediateRaster, OutputBackend, RasterScheduler};
use lamella_core::cancel::CancellationToken;
use lamella_core::orchestrator::{CommitOutcome, ConsumerHost, ProducerHost};
use lamella_core::settings::PipelineSettings;
use lamella_core::swap_promise::SwapPromise;
use lamella_core::trace::{CommitAbortReason, NoopSink, PipelineStage, TraceSink, Tracer};

use crate::worker::{Command, CommitReply, Worker};

/// What happened on the producer side of one frame attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadedFrame {
    /// Frame number of the attempt.
    pub frame_number: u64,
    /// How the commit ended.
    pub commit: CommitOutcome,
}

/// A producer host driving a consumer host on a dedicated thread.
///
/// `S` is the trace sink used on the consumer thread; it is handed back by
/// [`shutdown`](Self::shutdown).
pub struct ThreadedPipeline<S: TraceSink + Send + 'static = NoopSink> {
    producer: ProducerHost,
    commands: Sender<Command>,
    events: Receiver<ConsumerEvent>,
    received: Vec<ConsumerEvent>,
    control: ControlHandle,
    worker: Option<JoinHandle<S>>,
}

impl<S: TraceSink + Send + 'static> fmt::Debug for ThreadedPipeline<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadedPipeline")
            .field("producer", &self.producer)
            .field("received", &self.received)
            .field("control", &self.control)
            .field("running", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

impl ThreadedPipeline {
    /// Starts a consumer thread drawing to `output`, with raster work that is
    /// always ready and no consumer-side tracing.
    pub fn spawn(
        settings: PipelineSettings,
        output: Box<dyn OutputBackend + Send>,
    ) -> PipelineResult<Self> {
        Self::spawn_with(settings, output, Box::new(ImmediateRaster), NoopSink)
    }
}

impl<S: TraceSink + Send + 'static> ThreadedPipeline<S> {
    /// Starts a consumer thread drawing to `output`, gated on `raster` and
    /// reporting consumer-side events to `sink`.
    pub fn spawn_with(
        settings: PipelineSettings,
        output: Box<dyn OutputBackend + Send>,
        raster: Box<dyn RasterScheduler + Send>,
        sink: S,
    ) -> PipelineResult<Self> {
        let (commands, command_rx) = mpsc::channel();
        let (event_tx, events) = mpsc::channel();
        let control = ControlHandle::new();
        let worker = Worker {
            host: ConsumerHost::with_raster_scheduler(settings, raster),
            output,
            sink,
            control: control.clone(),
            events: event_tx,
        };
        let handle = thread::Builder::new()
            .name("lamella-consumer".into())
            .spawn(move || worker.run(&command_rx))?;
        log::debug!("consumer thread started ({:?})", settings.mode);

        Ok(Self {
            producer: ProducerHost::new(settings),
            commands,
            events,
            received: Vec::new(),
            control,
            worker: Some(handle),
        })
    }

    /// The producer half.
    #[must_use]
    pub fn producer(&self) -> &ProducerHost {
        &self.producer
    }

    /// The producer half, for tree mutation between frames.
    pub fn producer_mut(&mut self) -> &mut ProducerHost {
        &mut self.producer
    }

    /// A handle for showing and hiding the output from any thread.
    #[must_use]
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Runs the producer side of one frame attempt and waits for the consumer
    /// to take the commit.
    ///
    /// Consumer events received so far are applied first, so a lost output
    /// context aborts the commit.
    pub fn run_frame(&mut self, tracer: &mut Tracer<'_>) -> PipelineResult<ThreadedFrame> {
        self.absorb_events();
        self.producer.set_visible(self.control.is_visible());

        let token = CancellationToken::new();
        self.control.begin_attempt(token.clone());
        let result = self.attempt(&token, tracer);
        self.control.end_attempt();
        result
    }

    fn attempt(
        &mut self,
        token: &CancellationToken,
        tracer: &mut Tracer<'_>,
    ) -> PipelineResult<ThreadedFrame> {
        let frame_number = self.producer.begin_frame(tracer);
        self.producer.animate(tracer);
        let _ = self.producer.update_content(tracer);

        if token.is_cancelled() {
            // Latches the abort for this attempt.
            self.producer.set_visible(false);
        }
        self.producer.set_visible(self.control.is_visible());

        let commit = match self.producer.prepare_commit(tracer) {
            Ok(batch) => {
                let pushed = batch.updates.len();
                let visited = batch.visited.len();
                let (reply, reply_rx) = mpsc::channel();
                self.commands
                    .send(Command::Commit {
                        batch: Box::new(batch),
                        token: token.clone(),
                        reply,
                    })
                    .map_err(|_| PipelineError::disconnected("commit"))?;
                match reply_rx
                    .recv()
                    .map_err(|_| PipelineError::disconnected("commit"))?
                {
                    CommitReply::Synchronized(ack) => {
                        self.producer.did_commit(ack);
                        CommitOutcome::Committed { pushed, visited }
                    }
                    CommitReply::Cancelled(batch) => {
                        self.producer.did_cancel_commit(*batch, tracer);
                        CommitOutcome::Aborted(CommitAbortReason::Cancelled)
                    }
                }
            }
            Err(reason) => CommitOutcome::Aborted(reason),
        };

        tracer.stage(frame_number, PipelineStage::End);
        Ok(ThreadedFrame {
            frame_number,
            commit,
        })
    }

    /// Returns the consumer events received since the last call.
    ///
    /// Context loss and recovery are applied to the producer as they are
    /// received, whether or not anyone polls.
    pub fn poll_events(&mut self) -> Vec<ConsumerEvent> {
        self.absorb_events();
        std::mem::take(&mut self.received)
    }

    fn absorb_events(&mut self) {
        for event in self.events.try_iter() {
            match event {
                ConsumerEvent::ContextLost => self.producer.did_lose_context(),
                ConsumerEvent::ContextRecovered => self.producer.did_recreate_context(),
                ConsumerEvent::Activated { .. } | ConsumerEvent::Drawn { .. } => {}
            }
            self.received.push(event);
        }
    }

    /// Holds back or releases activation of the pending tree.
    pub fn set_activation_blocked(&self, blocked: bool) -> PipelineResult<()> {
        self.send(Command::SetActivationBlocked(blocked), "set_activation_blocked")
    }

    /// Makes the consumer's next draw cover the full content rect.
    pub fn set_full_damage(&self) -> PipelineResult<()> {
        self.send(Command::ForceFullDamage, "set_full_damage")
    }

    /// Attaches a promise to the consumer's active tree.
    pub fn queue_pinned_promise(&self, promise: Box<dyn SwapPromise>) -> PipelineResult<()> {
        self.send(Command::QueuePinnedPromise(promise), "queue_pinned_promise")
    }

    /// Waits until the consumer has handled every command sent so far and
    /// had a chance to activate and draw.
    pub fn flush(&self) -> PipelineResult<()> {
        let (done, done_rx) = mpsc::channel();
        self.send(Command::Flush(done), "flush")?;
        done_rx
            .recv()
            .map_err(|_| PipelineError::disconnected("flush"))
    }

    /// Stops the consumer thread and returns its trace sink.
    ///
    /// Promises still held by the consumer resolve as not swapped.
    pub fn shutdown(mut self) -> PipelineResult<S> {
        let _ = self.commands.send(Command::Shutdown);
        let handle = self
            .worker
            .take()
            .ok_or(PipelineError::disconnected("shutdown"))?;
        handle.join().map_err(|_| PipelineError::WorkerPanicked)
    }

    fn send(&self, command: Command, during: &'static str) -> PipelineResult<()> {
        self.commands
            .send(command)
            .map_err(|_| PipelineError::disconnected(during))
    }
}

impl<S: TraceSink + Send + 'static> Drop for ThreadedPipeline<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = self.commands.send(Command::Shutdown);
            if handle.join().is_err() {
                log::warn!("consumer thread panicked");
            }
        }
    }
}
