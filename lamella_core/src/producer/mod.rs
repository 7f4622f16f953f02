// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Producer-side scene graph.
//!
//! The producer tree is the only tree application code mutates. Each node has:
//!
//! - An identity ([`NodeId`](crate::id::NodeId)), a generational handle that
//!   becomes stale when the node is destroyed.
//! - Topology: parent, first-child, and sibling links forming an ordered tree.
//! - **Properties**: [`kind`](ProducerTree::set_kind),
//!   [`bounds`](ProducerTree::set_bounds), [`position`](ProducerTree::set_position),
//!   [`transform`](ProducerTree::set_transform), [`opacity`](ProducerTree::set_opacity),
//!   [`scroll offset`](ProducerTree::set_scroll_offset), visibility, clipping,
//!   and an optional content client.
//!
//! Nodes are stored in struct-of-arrays layout with index-based handles.
//!
//! # Push-properties
//!
//! Every mutator sets `needs_sync` on the node and `subtree_needs_sync` on its
//! strict ancestors, stopping at the first ancestor that is already flagged:
//!
//! ```text
//!   root  subtree_needs_sync
//!    ├─ a  subtree_needs_sync
//!    │   └─ a1  needs_sync      ◄── set_position(a1, ..)
//!    └─ b  (clean, never visited)
//! ```
//!
//! [`synchronize`](ProducerTree::synchronize) then walks only flagged paths
//! and copies the dirty nodes into a [`CommitBatch`](crate::commit::CommitBatch).
//! Detaching a child recomputes the old parent's `subtree_needs_sync` from its
//! remaining children, so a vacated path does not stay flagged.

mod kind;
mod sync;
mod traverse;
mod tree;
mod update;

pub use kind::{Capabilities, NodeKind};
pub use traverse::Children;
pub use tree::ProducerTree;
pub use update::UpdateStats;
