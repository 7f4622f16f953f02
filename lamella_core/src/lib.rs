// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dual-tree scene synchronization for compositors.
//!
//! `lamella_core` moves a mutable layer tree edited by a producer into
//! double-buffered consumer trees that drive output, copying only what
//! changed, computing the area that must be redrawn, and resolving
//! per-frame swap promises exactly once. It is `no_std` compatible (with
//! `alloc`).
//!
//! # Architecture
//!
//! ```text
//!   ProducerTree ──update_content()──► RecordingSource ──► RasterSource
//!       │ needs_sync / subtree_needs_sync                      │
//!       ▼                                                      │
//!   synchronize() ──► CommitBatch ─────────────────────────────┘
//!                         │ (copied, Send)
//!                         ▼
//!   ConsumerTreePair:  pending ──activate()──► active ──► recycle
//!                                                │
//!                                                ▼
//!   DamageTracker::compute_damage() ──► OutputBackend::draw() ──► SwapPromiseLedger
//! ```
//!
//! **[`producer`]**: Struct-of-arrays producer tree with generational
//! handles and push-properties flags. Content update and the
//! synchronization pass live here.
//!
//! **[`content`]**: Recordings, their immutable snapshots, and the
//! [`ContentClient`](content::ContentClient) contract.
//!
//! **[`commit`]**: The [`CommitBatch`](commit::CommitBatch) carried from
//! producer to consumer.
//!
//! **[`consumer`]**: Consumer trees, the pending/active/recycle pair, and
//! draw-list resolution.
//!
//! **[`damage`]**: Per-node rect history and damage accumulation.
//!
//! **[`swap_promise`]**: Exactly-once frame notifications.
//!
//! **[`orchestrator`]**: Producer and consumer hosts and the
//! single-thread [`CommitOrchestrator`](orchestrator::CommitOrchestrator).
//!
//! **[`backend`]**: Output, raster scheduler, and animator contracts.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) hooks at every state
//! transition.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace-rich` (disabled by default): Gates per-node push events.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod backend;
pub mod cancel;
pub mod commit;
pub mod consumer;
pub mod content;
pub mod damage;
pub mod id;
pub mod orchestrator;
pub mod producer;
pub mod region;
pub mod settings;
pub mod swap_promise;
pub mod trace;
pub mod transform;
