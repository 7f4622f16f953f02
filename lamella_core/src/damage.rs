// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Damage tracking for partial redraws.
//!
//! The tracker keeps the target-space rect, effective opacity, and clip each
//! drawable node had when damage was last computed, keyed by node id so history survives across
//! consumer tree generations. Each computation compares the active tree's
//! drawable nodes against that history:
//!
//! | Node state                         | Damage                 |
//! |------------------------------------|------------------------|
//! | not in history                     | current rect           |
//! | rect changed                       | old rect ∪ new rect    |
//! | inherited opacity or clip changed  | current rect           |
//! | same rect, property changed        | current rect           |
//! | content invalidated                | mapped, clipped region |
//! | in history, no longer drawable     | last known rect        |
//!
//! Damage from frames that were not presented accumulates until
//! [`DamageTracker::did_draw_damaged_area`].

use alloc::collections::BTreeMap;

use kurbo::{Point, Rect};

use crate::consumer::{ConsumerTree, DrawList};
use crate::id::NodeId;

#[derive(Clone, Copy, Debug)]
struct HistoryEntry {
    rect: Rect,
    // Effective values, so ancestor changes show up on drawable nodes.
    opacity: f32,
    clip: Option<Rect>,
    seen: u64,
}

/// Per-node rect history and accumulated damage.
#[derive(Clone, Debug, Default)]
pub struct DamageTracker {
    history: BTreeMap<NodeId, HistoryEntry>,
    generation: u64,
    accumulated: Option<Rect>,
    force_full: bool,
    primed: bool,
}

impl DamageTracker {
    /// Creates a tracker with no history; the first computation damages the
    /// full content rect.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the damage for drawing `list`, which must have been built
    /// from `tree`, and records the list's rects as the new history.
    ///
    /// The result includes damage still accumulated from earlier frames and
    /// is clipped to `clip` when given. Returns `None` when nothing needs
    /// redrawing.
    pub fn compute_damage(
        &mut self,
        tree: &ConsumerTree,
        list: &DrawList,
        clip: Option<Rect>,
    ) -> Option<Rect> {
        self.generation += 1;
        let generation = self.generation;
        let mut frame = None;

        for item in &list.items {
            match self.history.insert(
                item.id,
                HistoryEntry {
                    rect: item.rect,
                    opacity: item.opacity,
                    clip: item.clip,
                    seen: generation,
                },
            ) {
                None => add(&mut frame, item.rect),
                Some(old) if old.rect != item.rect => {
                    add(&mut frame, old.rect);
                    add(&mut frame, item.rect);
                }
                Some(old)
                    if old.opacity.to_bits() != item.opacity.to_bits()
                        || old.clip != item.clip =>
                {
                    add(&mut frame, item.rect);
                }
                Some(_) => {
                    if tree.node(item.id).is_some_and(|n| n.damage().property) {
                        add(&mut frame, item.rect);
                    }
                }
            }
            if let Some(node) = tree.node(item.id) {
                for r in node.damage().content.rects() {
                    add(&mut frame, item.transform.map_rect_bbox(*r).intersect(item.rect));
                }
            }
        }

        self.history.retain(|_, entry| {
            if entry.seen == generation {
                true
            } else {
                add(&mut frame, entry.rect);
                false
            }
        });

        if !self.primed || self.force_full || tree.needs_full_damage() {
            add(&mut frame, list.content_rect);
        }
        self.primed = true;
        self.force_full = false;

        if let Some(rect) = frame {
            add(&mut self.accumulated, rect);
        }
        let damage = self.accumulated?;
        match clip {
            Some(clip) => {
                let clipped = damage.intersect(clip);
                (!clipped.is_zero_area()).then_some(clipped)
            }
            None => Some(damage),
        }
    }

    /// Forgets accumulated damage after a draw presented it.
    pub fn did_draw_damaged_area(&mut self) {
        self.accumulated = None;
    }

    /// Makes the next computation include the full content rect, on top of
    /// whatever per-node damage it finds.
    pub fn set_full_damage(&mut self) {
        self.force_full = true;
    }

    /// Drops all history, as after a context loss. The next computation
    /// damages the full content rect.
    pub fn reset(&mut self) {
        self.history.clear();
        self.accumulated = None;
        self.force_full = false;
        self.primed = false;
    }

    /// Damage computed but not yet presented.
    #[must_use]
    pub fn accumulated(&self) -> Option<Rect> {
        self.accumulated
    }

    /// Last known target rect of a node.
    #[must_use]
    pub fn history_rect(&self, id: NodeId) -> Option<Rect> {
        self.history.get(&id).map(|e| e.rect)
    }
}

/// Clip rect for damage given a viewport.
pub(crate) fn viewport_clip(tree: &ConsumerTree) -> Option<Rect> {
    tree.viewport().map(|v| Rect::from_origin_size(Point::ORIGIN, v))
}

fn add(acc: &mut Option<Rect>, rect: Rect) {
    if rect.is_zero_area() {
        return;
    }
    *acc = Some(acc.map_or(rect, |a| a.union(rect)));
}
