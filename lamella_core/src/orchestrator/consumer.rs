// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The consumer half of the frame loop.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use kurbo::Rect;

use super::producer::CommitAck;
use crate::backend::{DrawFrame, DrawResult, ImmediateRaster, OutputBackend, RasterScheduler};
use crate::commit::CommitBatch;
use crate::consumer::{ConsumerTree, ConsumerTreePair};
use crate::content::RasterSource;
use crate::damage::{DamageTracker, viewport_clip};
use crate::settings::{PipelineSettings, ThreadingMode};
use crate::swap_promise::{DidNotSwapReason, SwapPromise, SwapPromiseLedger};
use crate::trace::{
    ActivateEvent, ContextEvent, DrawEvent, PipelineStage, SupersedeEvent, SwapEvent, Tracer,
};

/// What a draw attempt on the active tree came to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawOutcome {
    /// The frame was drawn and presented.
    Swapped {
        /// Area that was redrawn.
        damage: Rect,
    },
    /// Nothing needed redrawing; the output was not invoked.
    NoDamage,
    /// The raster scheduler is not ready; the draw is retried later.
    NotReady,
    /// The output drew nothing to the screen. The damage is kept.
    NotSwapped {
        /// Area that was to be redrawn.
        damage: Rect,
        /// What the output reported.
        result: DrawResult,
    },
    /// The output context was lost.
    ContextLost,
}

/// Owns the consumer trees and runs the consumer-side states of a frame:
/// `Synchronize → Activate → Draw → Swap`.
pub struct ConsumerHost {
    pair: ConsumerTreePair,
    tracker: DamageTracker,
    ledger: SwapPromiseLedger,
    settings: PipelineSettings,
    raster: Box<dyn RasterScheduler + Send>,
    activation_blocked: bool,
    needs_redraw: bool,
    context_lost: bool,
}

impl fmt::Debug for ConsumerHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHost")
            .field("pair", &self.pair)
            .field("tracker", &self.tracker)
            .field("ledger", &self.ledger)
            .field("settings", &self.settings)
            .field("activation_blocked", &self.activation_blocked)
            .field("needs_redraw", &self.needs_redraw)
            .field("context_lost", &self.context_lost)
            .finish_non_exhaustive()
    }
}

impl ConsumerHost {
    /// Creates a host whose raster work is always ready.
    #[must_use]
    pub fn new(settings: PipelineSettings) -> Self {
        Self::with_raster_scheduler(settings, Box::new(ImmediateRaster))
    }

    /// Creates a host that publishes snapshots to `raster` and waits on its
    /// readiness before activating and drawing.
    #[must_use]
    pub fn with_raster_scheduler(
        settings: PipelineSettings,
        raster: Box<dyn RasterScheduler + Send>,
    ) -> Self {
        Self {
            pair: ConsumerTreePair::new(),
            tracker: DamageTracker::new(),
            ledger: SwapPromiseLedger::new(),
            settings,
            raster,
            activation_blocked: false,
            needs_redraw: false,
            context_lost: false,
        }
    }

    /// The pending/active tree pair.
    #[must_use]
    pub fn trees(&self) -> &ConsumerTreePair {
        &self.pair
    }

    /// The tree draws are computed against.
    #[must_use]
    pub fn active_tree(&self) -> &ConsumerTree {
        self.pair.active()
    }

    /// The damage tracker.
    #[must_use]
    pub fn tracker(&self) -> &DamageTracker {
        &self.tracker
    }

    /// Outstanding swap promises.
    #[must_use]
    pub fn ledger(&self) -> &SwapPromiseLedger {
        &self.ledger
    }

    /// Whether the active tree has something to draw.
    #[must_use]
    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    /// Whether the output context is lost.
    #[must_use]
    pub fn context_lost(&self) -> bool {
        self.context_lost
    }

    /// Holds back or releases activation of the pending tree. Commits keep
    /// landing in the pending tree while activation is blocked.
    pub fn set_activation_blocked(&mut self, blocked: bool) {
        self.activation_blocked = blocked;
    }

    /// Makes the next draw cover the full content rect.
    pub fn set_full_damage(&mut self) {
        self.tracker.set_full_damage();
        self.needs_redraw = true;
    }

    /// Attaches a promise to the active tree; it is resolved by the next
    /// draw without seeing `did_activate`.
    pub fn queue_pinned_promise(&mut self, promise: Box<dyn SwapPromise>) {
        let frame = self.pair.active().source_frame_number().unwrap_or(0);
        self.ledger.queue_pinned(promise, frame);
        self.needs_redraw = true;
    }

    /// Applies a commit to the pending tree.
    ///
    /// A pending tree that had not activated yet is superseded and its
    /// promises are broken. In single-threaded mode the new tree activates
    /// right away.
    pub fn synchronize(&mut self, mut batch: CommitBatch, tracer: &mut Tracer<'_>) -> CommitAck {
        let frame = batch.source_frame_number;
        tracer.stage(frame, PipelineStage::Synchronize);

        if let Some(superseded) = self.pair.synchronize(&batch) {
            let broken = self.ledger.break_pending(DidNotSwapReason::SwapFails, tracer);
            log::debug!(
                "pending tree {superseded} superseded by {frame} before activation, {broken} promises broken"
            );
            tracer.supersede(&SupersedeEvent {
                superseded_frame: superseded,
                by_frame: frame,
            });
        }

        let promises = batch.take_promises();
        debug_assert!(
            promises.iter().all(|p| p.frame_number() == frame),
            "promise attached to a different frame than its batch"
        );
        self.ledger.queue_pending(promises);

        let rasters: Vec<RasterSource> = batch.rasters().cloned().collect();
        self.raster.publish(frame, &rasters, batch.viewport);

        let activated = match self.settings.mode {
            ThreadingMode::SingleThreaded => {
                self.activate(tracer);
                true
            }
            ThreadingMode::Pipelined => false,
        };
        CommitAck {
            source_frame_number: frame,
            min_live_frame: self.pair.min_live_frame(),
            activated,
        }
    }

    /// Activates the pending tree if there is one, activation is not
    /// blocked, and the raster scheduler is ready. Returns whether it did.
    pub fn try_activate(&mut self, tracer: &mut Tracer<'_>) -> bool {
        if self.pair.pending().is_none() || self.activation_blocked {
            return false;
        }
        if !self.raster.ready_to_activate() {
            log::trace!("activation waiting on raster work");
            return false;
        }
        self.activate(tracer);
        true
    }

    fn activate(&mut self, tracer: &mut Tracer<'_>) {
        let Some(frame) = self.pair.activate() else {
            return;
        };
        // The replaced tree was never drawn; its frame will not be presented.
        let retired = self.ledger.retire_active(DidNotSwapReason::SwapFails, tracer);
        if retired > 0 {
            log::debug!("tree replaced by {frame} before it was drawn, {retired} promises broken");
        }
        self.ledger.activate_pending(tracer);
        self.needs_redraw = true;
        log::trace!("activated tree {frame}");
        tracer.stage(frame, PipelineStage::Activate);
        tracer.activate(&ActivateEvent {
            source_frame_number: frame,
        });
    }

    /// Draws the active tree.
    ///
    /// Active promises are resolved by the outcome: swapped on
    /// [`DrawOutcome::Swapped`], otherwise broken with
    /// [`DidNotSwapReason::SwapFails`]. A lost context also discards the
    /// pending tree and its promises.
    pub fn draw(&mut self, output: &mut dyn OutputBackend, tracer: &mut Tracer<'_>) -> DrawOutcome {
        let frame = self.pair.active().source_frame_number().unwrap_or(0);
        tracer.stage(frame, PipelineStage::Draw);
        if self.context_lost {
            return DrawOutcome::ContextLost;
        }
        if !self.raster.ready_to_draw() {
            log::trace!("draw of {frame} waiting on raster work");
            return DrawOutcome::NotReady;
        }

        let active = self.pair.active();
        let list = active.draw_list();
        let clip = if self.settings.clip_damage_to_viewport {
            viewport_clip(active)
        } else {
            None
        };
        let damage = self.tracker.compute_damage(active, &list, clip);
        self.pair.active_mut().clear_damage();
        self.needs_redraw = false;
        let item_count = u32::try_from(list.items.len()).unwrap_or(u32::MAX);

        let Some(damage) = damage else {
            let broken = self.ledger.break_active(DidNotSwapReason::SwapFails, tracer);
            log::trace!("frame {frame}: no damage, {broken} promises broken");
            tracer.draw(&DrawEvent {
                source_frame_number: frame,
                damage: None,
                item_count,
                result: None,
            });
            tracer.stage(frame, PipelineStage::NoSwap);
            tracer.swap(&SwapEvent {
                source_frame_number: frame,
                swapped: false,
            });
            return DrawOutcome::NoDamage;
        };

        let active = self.pair.active();
        let result = output.draw(&DrawFrame {
            source_frame_number: frame,
            damage,
            content_rect: list.content_rect,
            background_color: active.background_color(),
            items: &list.items,
        });
        tracer.draw(&DrawEvent {
            source_frame_number: frame,
            damage: Some(damage),
            item_count,
            result: Some(result),
        });

        match result {
            DrawResult::Swapped => {
                self.tracker.did_draw_damaged_area();
                let _ = self.ledger.resolve_swap(tracer);
                tracer.stage(frame, PipelineStage::Swap);
                tracer.swap(&SwapEvent {
                    source_frame_number: frame,
                    swapped: true,
                });
                DrawOutcome::Swapped { damage }
            }
            DrawResult::DrawnNoSwap | DrawResult::Failed => {
                let _ = self.ledger.break_active(DidNotSwapReason::SwapFails, tracer);
                self.needs_redraw = true;
                log::debug!("frame {frame}: draw did not swap ({result:?}), damage kept");
                tracer.stage(frame, PipelineStage::NoSwap);
                tracer.swap(&SwapEvent {
                    source_frame_number: frame,
                    swapped: false,
                });
                DrawOutcome::NotSwapped { damage, result }
            }
            DrawResult::ContextLost => {
                self.lose_context(tracer);
                DrawOutcome::ContextLost
            }
        }
    }

    /// Drops everything that depends on the output context: the pending
    /// tree, every outstanding promise, and the damage history.
    pub fn lose_context(&mut self, tracer: &mut Tracer<'_>) {
        let frame = self.pair.active().source_frame_number().unwrap_or(0);
        let discarded = self.pair.discard_pending();
        let broken = self.ledger.break_all(DidNotSwapReason::SwapFails, tracer);
        self.tracker.reset();
        self.context_lost = true;
        self.needs_redraw = false;
        log::warn!(
            "output context lost at frame {frame}: pending tree {discarded:?} discarded, {broken} promises broken"
        );
        tracer.stage(frame, PipelineStage::NoSwap);
        tracer.context(&ContextEvent {
            frame_number: frame,
            recovered: false,
        });
    }

    /// Asks the output to recreate its context. On success the next draw
    /// covers the full content rect.
    pub fn recover_context(
        &mut self,
        output: &mut dyn OutputBackend,
        tracer: &mut Tracer<'_>,
    ) -> bool {
        if !self.context_lost {
            return true;
        }
        if !output.recreate_context() {
            log::debug!("output context recreation failed");
            return false;
        }
        self.context_lost = false;
        self.set_full_damage();
        let frame = self.pair.active().source_frame_number().unwrap_or(0);
        log::debug!("output context recreated at frame {frame}");
        tracer.context(&ContextEvent {
            frame_number: frame,
            recovered: true,
        });
        true
    }
}
