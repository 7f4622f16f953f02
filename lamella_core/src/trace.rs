// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scheduler hooks for the commit pipeline.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! pipeline calls at every state-machine transition. All method bodies default
//! to no-ops, so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`; each method performs a
//! single `Option` branch before dispatching. The hooks carry no behavioral
//! obligation: a pipeline run with [`Tracer::none`] behaves identically.
//!
//! # Crate features
//!
//! - `trace-rich`: gates [`NodePushEvent`] and the corresponding
//!   `TraceSink` method, emitted once per pushed node.

use kurbo::Rect;

use crate::backend::DrawResult;
#[cfg(feature = "trace-rich")]
use crate::id::NodeId;
use crate::swap_promise::DidNotSwapReason;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// States of a frame attempt.
///
/// ```text
/// Start → Animate → UpdateContent → Commit → Synchronize → Activate → Draw → Swap → End
///                                      └─► Aborted                     └─► NoSwap
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// The frame attempt began and its frame number was assigned.
    Start,
    /// Time-driven properties are being advanced.
    Animate,
    /// Content clients are refreshing recordings.
    UpdateContent,
    /// The producer is deciding whether to commit.
    Commit,
    /// Dirty producer state is being copied into the pending tree.
    Synchronize,
    /// The pending tree became active.
    Activate,
    /// Damage is being computed and the output backend invoked.
    Draw,
    /// The drawn frame was presented.
    Swap,
    /// The frame attempt finished.
    End,
    /// The commit was aborted without synchronizing.
    Aborted,
    /// The draw ended without a swap.
    NoSwap,
}

/// Why the producer gave up on a commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitAbortReason {
    /// The producer is not visible.
    NotVisible,
    /// Commits are deferred by the embedder.
    Deferred,
    /// The output context is lost and not yet recreated.
    ContextLost,
    /// Nothing changed since the last commit.
    NoUpdate,
    /// The commit was cancelled before the consumer synchronized it.
    Cancelled,
}

impl CommitAbortReason {
    /// The promise failure this abort resolves queued promises with.
    #[must_use]
    pub const fn did_not_swap_reason(self) -> DidNotSwapReason {
        match self {
            Self::NoUpdate => DidNotSwapReason::CommitNoUpdate,
            Self::NotVisible | Self::Deferred | Self::ContextLost | Self::Cancelled => {
                DidNotSwapReason::CommitFails
            }
        }
    }
}

/// One step of a swap promise's life.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PromiseResolution {
    /// `did_activate` was called.
    Activated,
    /// `did_swap` was called.
    Swapped,
    /// `did_not_swap` was called.
    NotSwapped(DidNotSwapReason),
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when a frame attempt begins.
#[derive(Clone, Copy, Debug)]
pub struct BeginFrameEvent {
    /// Frame number assigned to the attempt.
    pub frame_number: u64,
}

/// Emitted on every state-machine transition.
#[derive(Clone, Copy, Debug)]
pub struct StageEvent {
    /// Frame number of the attempt (or of the active tree, on the consumer).
    pub frame_number: u64,
    /// The state entered.
    pub stage: PipelineStage,
}

/// Emitted after a successful synchronization pass.
#[derive(Clone, Copy, Debug)]
pub struct CommitEvent {
    /// Source frame number stamped on the pending tree.
    pub frame_number: u64,
    /// Producer nodes visited by the pass.
    pub visited: u32,
    /// Producer nodes whose state was pushed.
    pub pushed: u32,
    /// Nodes destroyed since the previous commit.
    pub removed: u32,
    /// New raster snapshots carried by the commit.
    pub rasters: u32,
}

/// Emitted when a commit is aborted.
#[derive(Clone, Copy, Debug)]
pub struct AbortEvent {
    /// Frame number of the aborted attempt.
    pub frame_number: u64,
    /// Why it was aborted.
    pub reason: CommitAbortReason,
}

/// Emitted when a pending tree is replaced by a newer commit before it
/// activated.
#[derive(Clone, Copy, Debug)]
pub struct SupersedeEvent {
    /// Source frame number of the pending tree that never activated.
    pub superseded_frame: u64,
    /// Source frame number of the commit replacing it.
    pub by_frame: u64,
}

/// Emitted when the pending tree becomes active.
#[derive(Clone, Copy, Debug)]
pub struct ActivateEvent {
    /// Source frame number of the newly active tree.
    pub source_frame_number: u64,
}

/// Emitted after damage is computed for a draw.
#[derive(Clone, Copy, Debug)]
pub struct DrawEvent {
    /// Source frame number of the active tree.
    pub source_frame_number: u64,
    /// The damage rectangle, or `None` if nothing needed redrawing.
    pub damage: Option<Rect>,
    /// Number of drawable nodes handed to the output.
    pub item_count: u32,
    /// What the output backend reported; `None` if it was not invoked.
    pub result: Option<DrawResult>,
}

/// Emitted once a draw finishes, swapped or not.
#[derive(Clone, Copy, Debug)]
pub struct SwapEvent {
    /// Source frame number of the active tree.
    pub source_frame_number: u64,
    /// Whether the frame was presented.
    pub swapped: bool,
}

/// Emitted for every swap promise transition.
#[derive(Clone, Copy, Debug)]
pub struct PromiseEvent {
    /// Frame number the promise is attached to.
    pub frame_number: u64,
    /// What happened.
    pub resolution: PromiseResolution,
}

/// Emitted when the output context is lost or recreated.
#[derive(Clone, Copy, Debug)]
pub struct ContextEvent {
    /// Latest frame number known to the emitting side.
    pub frame_number: u64,
    /// `false` when lost, `true` when recreated.
    pub recovered: bool,
}

/// A per-node push record.
#[cfg(feature = "trace-rich")]
#[derive(Clone, Copy, Debug)]
pub struct NodePushEvent {
    /// Source frame number of the commit.
    pub frame_number: u64,
    /// The pushed node.
    pub node: NodeId,
    /// Whether a new raster snapshot was pushed with it.
    pub raster: bool,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives pipeline events.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a frame attempt begins.
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        _ = e;
    }

    /// Called on every state-machine transition.
    fn on_stage(&mut self, e: &StageEvent) {
        _ = e;
    }

    /// Called after a synchronization pass.
    fn on_commit(&mut self, e: &CommitEvent) {
        _ = e;
    }

    /// Called when a commit is aborted.
    fn on_abort(&mut self, e: &AbortEvent) {
        _ = e;
    }

    /// Called when a pending tree is superseded.
    fn on_supersede(&mut self, e: &SupersedeEvent) {
        _ = e;
    }

    /// Called on activation.
    fn on_activate(&mut self, e: &ActivateEvent) {
        _ = e;
    }

    /// Called after damage computation.
    fn on_draw(&mut self, e: &DrawEvent) {
        _ = e;
    }

    /// Called when a draw finishes.
    fn on_swap(&mut self, e: &SwapEvent) {
        _ = e;
    }

    /// Called for every swap promise transition.
    fn on_promise(&mut self, e: &PromiseEvent) {
        _ = e;
    }

    /// Called on context loss and recreation.
    fn on_context(&mut self, e: &ContextEvent) {
        _ = e;
    }

    /// Called for each pushed node (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_node_push(&mut self, e: &NodePushEvent) {
        _ = e;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
pub struct Tracer<'a> {
    sink: Option<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        Self { sink: Some(sink) }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self { sink: None }
    }

    /// Emits a [`BeginFrameEvent`].
    #[inline]
    pub fn begin_frame(&mut self, e: &BeginFrameEvent) {
        if let Some(s) = &mut self.sink {
            s.on_begin_frame(e);
        }
    }

    /// Emits a [`StageEvent`].
    #[inline]
    pub fn stage(&mut self, frame_number: u64, stage: PipelineStage) {
        if let Some(s) = &mut self.sink {
            s.on_stage(&StageEvent {
                frame_number,
                stage,
            });
        }
    }

    /// Emits a [`CommitEvent`].
    #[inline]
    pub fn commit(&mut self, e: &CommitEvent) {
        if let Some(s) = &mut self.sink {
            s.on_commit(e);
        }
    }

    /// Emits an [`AbortEvent`].
    #[inline]
    pub fn abort(&mut self, e: &AbortEvent) {
        if let Some(s) = &mut self.sink {
            s.on_abort(e);
        }
    }

    /// Emits a [`SupersedeEvent`].
    #[inline]
    pub fn supersede(&mut self, e: &SupersedeEvent) {
        if let Some(s) = &mut self.sink {
            s.on_supersede(e);
        }
    }

    /// Emits an [`ActivateEvent`].
    #[inline]
    pub fn activate(&mut self, e: &ActivateEvent) {
        if let Some(s) = &mut self.sink {
            s.on_activate(e);
        }
    }

    /// Emits a [`DrawEvent`].
    #[inline]
    pub fn draw(&mut self, e: &DrawEvent) {
        if let Some(s) = &mut self.sink {
            s.on_draw(e);
        }
    }

    /// Emits a [`SwapEvent`].
    #[inline]
    pub fn swap(&mut self, e: &SwapEvent) {
        if let Some(s) = &mut self.sink {
            s.on_swap(e);
        }
    }

    /// Emits a [`PromiseEvent`].
    #[inline]
    pub fn promise(&mut self, e: &PromiseEvent) {
        if let Some(s) = &mut self.sink {
            s.on_promise(e);
        }
    }

    /// Emits a [`ContextEvent`].
    #[inline]
    pub fn context(&mut self, e: &ContextEvent) {
        if let Some(s) = &mut self.sink {
            s.on_context(e);
        }
    }

    /// Emits a [`NodePushEvent`] (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn node_push(&mut self, e: &NodePushEvent) {
        if let Some(s) = &mut self.sink {
            s.on_node_push(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    #[derive(Default)]
    struct Stages(Vec<PipelineStage>);

    impl TraceSink for Stages {
        fn on_stage(&mut self, e: &StageEvent) {
            self.0.push(e.stage);
        }
    }

    #[test]
    fn tracer_dispatches_to_sink() {
        let mut sink = Stages::default();
        {
            let mut tracer = Tracer::new(&mut sink);
            tracer.stage(1, PipelineStage::Start);
            tracer.stage(1, PipelineStage::Aborted);
        }
        assert_eq!(sink.0, [PipelineStage::Start, PipelineStage::Aborted]);
    }

    #[test]
    fn none_tracer_is_silent() {
        let mut tracer = Tracer::none();
        tracer.stage(1, PipelineStage::Start);
    }

    #[test]
    fn abort_reasons_map_to_promise_failures() {
        assert_eq!(
            CommitAbortReason::NoUpdate.did_not_swap_reason(),
            DidNotSwapReason::CommitNoUpdate
        );
        assert_eq!(
            CommitAbortReason::NotVisible.did_not_swap_reason(),
            DidNotSwapReason::CommitFails
        );
    }
}
