// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The consumer thread.
//!
//! The worker owns the [`ConsumerHost`] and the output backend. It blocks on
//! the command channel and, after every command, gives the pending tree a
//! chance to activate and the active tree a chance to draw.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use lamella_core::backend::OutputBackend;
use lamella_core::cancel::CancellationToken;
use lamella_core::commit::CommitBatch;
use lamella_core::orchestrator::{CommitAck, ConsumerHost, DrawOutcome};
use lamella_core::swap_promise::{DidNotSwapReason, SwapPromise};
use lamella_core::trace::{TraceSink, Tracer};

/// Something the consumer thread reports back to the producer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ConsumerEvent {
    /// A pending tree became active.
    Activated {
        /// Source frame number of the newly active tree.
        source_frame_number: u64,
    },
    /// A draw of the active tree was attempted.
    Drawn {
        /// Source frame number of the active tree.
        source_frame_number: u64,
        /// How it went.
        outcome: DrawOutcome,
    },
    /// The output context was lost. The producer aborts commits until
    /// [`ContextRecovered`](Self::ContextRecovered).
    ContextLost,
    /// The output context was recreated.
    ContextRecovered,
}

pub(crate) enum CommitReply {
    Synchronized(CommitAck),
    Cancelled(Box<CommitBatch>),
}

pub(crate) enum Command {
    Commit {
        batch: Box<CommitBatch>,
        token: CancellationToken,
        reply: Sender<CommitReply>,
    },
    SetActivationBlocked(bool),
    ForceFullDamage,
    QueuePinnedPromise(Box<dyn SwapPromise>),
    Flush(Sender<()>),
    Shutdown,
}

#[derive(Debug, Default)]
struct Shared {
    visible: AtomicBool,
    in_flight: Mutex<Option<CancellationToken>>,
}

/// Visibility control that can be used from any thread.
///
/// Hiding while a frame attempt is in flight cancels that attempt's commit,
/// even if visibility is restored before the consumer gets to it.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    shared: Arc<Shared>,
}

impl ControlHandle {
    pub(crate) fn new() -> Self {
        let shared = Shared::default();
        shared.visible.store(true, Ordering::Relaxed);
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Shows or hides the output.
    pub fn set_visible(&self, visible: bool) {
        self.shared.visible.store(visible, Ordering::Release);
        if !visible {
            let in_flight = self
                .shared
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(token) = in_flight.as_ref() {
                token.cancel();
            }
        }
    }

    /// Whether the output is visible.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.shared.visible.load(Ordering::Acquire)
    }

    pub(crate) fn begin_attempt(&self, token: CancellationToken) {
        *self
            .shared
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    pub(crate) fn end_attempt(&self) {
        *self
            .shared
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

pub(crate) struct Worker<S> {
    pub(crate) host: ConsumerHost,
    pub(crate) output: Box<dyn OutputBackend + Send>,
    pub(crate) sink: S,
    pub(crate) control: ControlHandle,
    pub(crate) events: Sender<ConsumerEvent>,
}

impl<S: TraceSink> Worker<S> {
    /// Serves commands until told to stop or the producer hangs up, then
    /// hands back the trace sink.
    pub(crate) fn run(mut self, commands: &Receiver<Command>) -> S {
        while let Ok(command) = commands.recv() {
            let mut tracer = Tracer::new(&mut self.sink);
            let flushed = match command {
                Command::Commit {
                    batch,
                    token,
                    reply,
                } => {
                    let reply_msg = synchronize(&mut self.host, *batch, &token, &mut tracer);
                    // The producer only hangs up on shutdown.
                    let _ = reply.send(reply_msg);
                    None
                }
                Command::SetActivationBlocked(blocked) => {
                    self.host.set_activation_blocked(blocked);
                    None
                }
                Command::ForceFullDamage => {
                    self.host.set_full_damage();
                    None
                }
                Command::QueuePinnedPromise(promise) => {
                    self.host.queue_pinned_promise(promise);
                    None
                }
                Command::Flush(done) => Some(done),
                Command::Shutdown => break,
            };

            step(
                &mut self.host,
                self.output.as_mut(),
                &self.control,
                &self.events,
                &mut tracer,
            );
            if let Some(done) = flushed {
                let _ = done.send(());
            }
        }
        log::debug!("consumer thread exiting");
        self.sink
    }
}

fn synchronize(
    host: &mut ConsumerHost,
    mut batch: CommitBatch,
    token: &CancellationToken,
    tracer: &mut Tracer<'_>,
) -> CommitReply {
    if token.is_cancelled() {
        let frame = batch.source_frame_number;
        let broken = batch.break_promises(DidNotSwapReason::CommitFails, tracer);
        log::debug!("commit {frame} cancelled before synchronization, {broken} promises broken");
        return CommitReply::Cancelled(Box::new(batch));
    }
    CommitReply::Synchronized(host.synchronize(batch, tracer))
}

fn step(
    host: &mut ConsumerHost,
    output: &mut dyn OutputBackend,
    control: &ControlHandle,
    events: &Sender<ConsumerEvent>,
    tracer: &mut Tracer<'_>,
) {
    if host.context_lost() {
        if !host.recover_context(output, tracer) {
            return;
        }
        let _ = events.send(ConsumerEvent::ContextRecovered);
    }

    if host.try_activate(tracer) {
        let _ = events.send(ConsumerEvent::Activated {
            source_frame_number: host.active_tree().source_frame_number().unwrap_or(0),
        });
    }

    if control.is_visible() && host.needs_redraw() {
        let source_frame_number = host.active_tree().source_frame_number().unwrap_or(0);
        let outcome = host.draw(output, tracer);
        let _ = events.send(ConsumerEvent::Drawn {
            source_frame_number,
            outcome,
        });
        if outcome == DrawOutcome::ContextLost {
            let _ = events.send(ConsumerEvent::ContextLost);
        }
    }
}
