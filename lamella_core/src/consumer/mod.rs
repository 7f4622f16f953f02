// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Consumer-side trees.
//!
//! A consumer tree is a copy of the producer tree built only from
//! [`CommitBatch`](crate::commit::CommitBatch)es. Each [`ConsumerNode`] is
//! keyed by the id of the producer node it came from and belongs to exactly
//! one tree; the pending, active, and recycled generations in
//! [`ConsumerTreePair`] never share nodes, only immutable
//! [`RasterSource`](crate::content::RasterSource) snapshots.

mod draw;
mod node;
mod pair;
mod tree;

pub use draw::DrawList;
pub use node::{ConsumerNode, NodeDamage};
pub use pair::ConsumerTreePair;
pub use tree::ConsumerTree;
