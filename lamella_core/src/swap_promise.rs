// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Swap promises: one-shot "did this frame reach the screen" notifications.
//!
//! A promise is queued on the producer for the next commit, travels with the
//! commit into the consumer's pending tree, and is resolved exactly once:
//!
//! ```text
//!   queued ──abort──────────────► did_not_swap(CommitFails | CommitNoUpdate)
//!     │
//!     ▼ commit
//!   pending ──superseded / lost──► did_not_swap(SwapFails)
//!     │
//!     ▼ activate ─► did_activate()
//!   active ──no damage / failed──► did_not_swap(SwapFails)
//!     │
//!     ▼ swap
//!   did_swap()
//! ```
//!
//! Exactly-once delivery is structural: the ledger holds each promise in a
//! [`PromiseEntry`] that is consumed by its terminal call. An entry that is
//! dropped unresolved (for example when the pipeline shuts down) resolves
//! itself with [`DidNotSwapReason::SwapFails`].

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use crate::trace::{PromiseEvent, PromiseResolution, Tracer};

/// Why a promise did not reach the screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DidNotSwapReason {
    /// The commit was aborted: producer invisible, deferred, cancelled, or
    /// the output context was lost.
    CommitFails,
    /// The commit was aborted because nothing changed.
    CommitNoUpdate,
    /// The tree was committed but its frame was superseded, had no damage, or
    /// failed to draw.
    SwapFails,
}

impl DidNotSwapReason {
    /// Returns `true` for reasons that only apply before activation.
    #[must_use]
    pub const fn is_pre_activation(self) -> bool {
        matches!(self, Self::CommitFails | Self::CommitNoUpdate)
    }
}

/// A commitment attached to a frame attempt.
///
/// Implementations receive `did_activate` at most once, followed by exactly
/// one of `did_swap` or `did_not_swap`. Promises cross from the producer to
/// the consumer thread, hence `Send`.
pub trait SwapPromise: Send {
    /// The tree carrying this promise became active.
    fn did_activate(&mut self) {}

    /// The frame carrying this promise was presented.
    fn did_swap(&mut self);

    /// The frame carrying this promise will never be presented.
    fn did_not_swap(&mut self, reason: DidNotSwapReason);
}

/// A promise together with its resolution state.
pub(crate) struct PromiseEntry {
    promise: Option<Box<dyn SwapPromise>>,
    frame_number: u64,
    activated: bool,
    pinned: bool,
}

impl fmt::Debug for PromiseEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseEntry")
            .field("frame_number", &self.frame_number)
            .field("activated", &self.activated)
            .field("pinned", &self.pinned)
            .finish_non_exhaustive()
    }
}

impl PromiseEntry {
    pub(crate) fn new(promise: Box<dyn SwapPromise>) -> Self {
        Self {
            promise: Some(promise),
            frame_number: 0,
            activated: false,
            pinned: false,
        }
    }

    /// An entry for a tree that is already active; it never sees
    /// `did_activate`.
    pub(crate) fn pinned(promise: Box<dyn SwapPromise>, frame_number: u64) -> Self {
        Self {
            promise: Some(promise),
            frame_number,
            activated: true,
            pinned: true,
        }
    }

    pub(crate) fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub(crate) fn set_frame_number(&mut self, frame_number: u64) {
        self.frame_number = frame_number;
    }

    fn activate(&mut self, tracer: &mut Tracer<'_>) {
        assert!(!self.activated, "swap promise activated twice");
        self.activated = true;
        if let Some(p) = self.promise.as_mut() {
            p.did_activate();
        }
        tracer.promise(&PromiseEvent {
            frame_number: self.frame_number,
            resolution: PromiseResolution::Activated,
        });
    }

    fn swap(mut self, tracer: &mut Tracer<'_>) {
        if let Some(mut p) = self.promise.take() {
            p.did_swap();
        }
        tracer.promise(&PromiseEvent {
            frame_number: self.frame_number,
            resolution: PromiseResolution::Swapped,
        });
    }

    pub(crate) fn fail(mut self, reason: DidNotSwapReason, tracer: &mut Tracer<'_>) {
        assert!(
            !(self.activated && reason.is_pre_activation()),
            "pre-activation failure {reason:?} reported for an activated swap promise"
        );
        if let Some(mut p) = self.promise.take() {
            p.did_not_swap(reason);
        }
        tracer.promise(&PromiseEvent {
            frame_number: self.frame_number,
            resolution: PromiseResolution::NotSwapped(reason),
        });
    }
}

impl Drop for PromiseEntry {
    fn drop(&mut self) {
        if let Some(mut p) = self.promise.take() {
            p.did_not_swap(DidNotSwapReason::SwapFails);
        }
    }
}

/// Resolves every entry with `reason`.
pub(crate) fn fail_all(
    entries: impl IntoIterator<Item = PromiseEntry>,
    reason: DidNotSwapReason,
    tracer: &mut Tracer<'_>,
) -> usize {
    let mut n = 0;
    for entry in entries {
        entry.fail(reason, tracer);
        n += 1;
    }
    n
}

/// Consumer-side bookkeeping of promises attached to the pending and active
/// trees.
#[derive(Debug, Default)]
pub struct SwapPromiseLedger {
    pending: Vec<PromiseEntry>,
    active: Vec<PromiseEntry>,
}

impl SwapPromiseLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of promises attached to the pending tree.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of promises attached to the active tree.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub(crate) fn queue_pending(&mut self, entries: impl IntoIterator<Item = PromiseEntry>) {
        self.pending.extend(entries);
    }

    /// Attaches a promise directly to the active tree.
    pub fn queue_pinned(&mut self, promise: Box<dyn SwapPromise>, frame_number: u64) {
        self.active.push(PromiseEntry::pinned(promise, frame_number));
    }

    /// Breaks every promise of the pending tree.
    pub fn break_pending(&mut self, reason: DidNotSwapReason, tracer: &mut Tracer<'_>) -> usize {
        fail_all(self.pending.drain(..), reason, tracer)
    }

    /// Moves the pending tree's promises to the active tree, calling
    /// `did_activate` on each.
    pub fn activate_pending(&mut self, tracer: &mut Tracer<'_>) {
        for mut entry in self.pending.drain(..) {
            entry.activate(tracer);
            self.active.push(entry);
        }
    }

    /// Resolves every active promise as swapped.
    pub fn resolve_swap(&mut self, tracer: &mut Tracer<'_>) -> usize {
        let mut n = 0;
        for entry in self.active.drain(..) {
            entry.swap(tracer);
            n += 1;
        }
        n
    }

    /// Breaks every promise of the active tree.
    pub fn break_active(&mut self, reason: DidNotSwapReason, tracer: &mut Tracer<'_>) -> usize {
        fail_all(self.active.drain(..), reason, tracer)
    }

    /// Breaks the promises of an active tree that is being replaced before
    /// it was drawn. Pinned promises are kept for the next draw.
    pub fn retire_active(&mut self, reason: DidNotSwapReason, tracer: &mut Tracer<'_>) -> usize {
        let (pinned, retired): (Vec<_>, Vec<_>) =
            self.active.drain(..).partition(|entry| entry.pinned);
        self.active = pinned;
        fail_all(retired, reason, tracer)
    }

    /// Breaks every outstanding promise.
    pub fn break_all(&mut self, reason: DidNotSwapReason, tracer: &mut Tracer<'_>) -> usize {
        self.break_pending(reason, tracer) + self.break_active(reason, tracer)
    }
}

const REASON_NONE: u8 = 0;

fn encode_reason(reason: DidNotSwapReason) -> u8 {
    match reason {
        DidNotSwapReason::CommitFails => 1,
        DidNotSwapReason::CommitNoUpdate => 2,
        DidNotSwapReason::SwapFails => 3,
    }
}

fn decode_reason(v: u8) -> Option<DidNotSwapReason> {
    match v {
        1 => Some(DidNotSwapReason::CommitFails),
        2 => Some(DidNotSwapReason::CommitNoUpdate),
        3 => Some(DidNotSwapReason::SwapFails),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct ProbeState {
    activations: AtomicU32,
    swaps: AtomicU32,
    failures: AtomicU32,
    last_reason: AtomicU8,
}

/// Observes the promises it hands out, from any thread.
///
/// Every promise created by [`promise`](Self::promise) reports into the same
/// shared counters.
#[derive(Clone, Debug, Default)]
pub struct PromiseProbe {
    state: Arc<ProbeState>,
}

impl PromiseProbe {
    /// Creates a probe with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a promise reporting into this probe.
    #[must_use]
    pub fn promise(&self) -> Box<dyn SwapPromise> {
        Box::new(ProbePromise {
            state: Arc::clone(&self.state),
        })
    }

    /// Number of `did_activate` calls.
    #[must_use]
    pub fn activations(&self) -> u32 {
        self.state.activations.load(Ordering::SeqCst)
    }

    /// Number of `did_swap` calls.
    #[must_use]
    pub fn swaps(&self) -> u32 {
        self.state.swaps.load(Ordering::SeqCst)
    }

    /// Number of `did_not_swap` calls.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.state.failures.load(Ordering::SeqCst)
    }

    /// Number of terminal calls of either kind.
    #[must_use]
    pub fn resolutions(&self) -> u32 {
        self.swaps() + self.failures()
    }

    /// The reason passed to the most recent `did_not_swap`.
    #[must_use]
    pub fn last_reason(&self) -> Option<DidNotSwapReason> {
        match self.state.last_reason.load(Ordering::SeqCst) {
            REASON_NONE => None,
            v => decode_reason(v),
        }
    }
}

#[derive(Debug)]
struct ProbePromise {
    state: Arc<ProbeState>,
}

impl SwapPromise for ProbePromise {
    fn did_activate(&mut self) {
        self.state.activations.fetch_add(1, Ordering::SeqCst);
    }

    fn did_swap(&mut self) {
        self.state.swaps.fetch_add(1, Ordering::SeqCst);
    }

    fn did_not_swap(&mut self, reason: DidNotSwapReason) {
        self.state
            .last_reason
            .store(encode_reason(reason), Ordering::SeqCst);
        self.state.failures.fetch_add(1, Ordering::SeqCst);
    }
}
