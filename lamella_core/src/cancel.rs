// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cancellation tokens carried across the producer/consumer boundary.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

/// A shared flag that marks a piece of cross-thread work as no longer wanted.
///
/// The sender keeps one clone and ships another with the work; the receiver
/// checks [`is_cancelled`](Self::is_cancelled) before acting. Cancelling is
/// sticky.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a live token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the work; every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once any clone has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
