// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Invalidation regions.
//!
//! A [`Region`] is a coarse cover of invalidated area: a short list of
//! axis-aligned rectangles that are merged on insert. Inserting a rectangle
//! that overlaps an existing one replaces both with their union, and once the
//! list grows past its limit everything collapses into the bounding box. The
//! result is always a superset of what was inserted, never a subset.

use alloc::vec::Vec;

use kurbo::Rect;

/// Default number of disjoint rectangles kept before collapsing.
pub const DEFAULT_RECT_LIMIT: usize = 8;

/// A merge-on-insert union of rectangles.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    rects: Vec<Rect>,
    limit: usize,
}

impl Default for Region {
    fn default() -> Self {
        Self::new()
    }
}

impl Region {
    /// Creates an empty region with the default rectangle limit.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_limit(DEFAULT_RECT_LIMIT)
    }

    /// Creates an empty region that keeps at most `limit` rectangles.
    ///
    /// A limit of zero is treated as one.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            rects: Vec::new(),
            limit: if limit == 0 { 1 } else { limit },
        }
    }

    /// Creates a region covering a single rectangle.
    #[must_use]
    pub fn from_rect(rect: Rect) -> Self {
        let mut region = Self::new();
        region.insert(rect);
        region
    }

    /// Returns `true` if nothing is invalidated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Returns the rectangles making up the region.
    #[must_use]
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Returns the bounding box of the region, or `None` if empty.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        let mut it = self.rects.iter().copied();
        let first = it.next()?;
        Some(it.fold(first, |acc, r| acc.union(r)))
    }

    /// Adds `rect` to the region. Zero-area rectangles are ignored.
    pub fn insert(&mut self, rect: Rect) {
        let mut rect = rect.abs();
        if rect.is_zero_area() {
            return;
        }
        // Absorb every rect that touches the incoming one; repeat because the
        // grown rect may now touch rects it missed on the first sweep.
        loop {
            let before = self.rects.len();
            self.rects.retain(|r| {
                if touches(*r, rect) {
                    rect = rect.union(*r);
                    false
                } else {
                    true
                }
            });
            if self.rects.len() == before {
                break;
            }
        }
        self.rects.push(rect);
        if self.rects.len() > self.limit {
            if let Some(bounds) = self.bounds() {
                self.rects.clear();
                self.rects.push(bounds);
            }
        }
    }

    /// Adds every rectangle of `other` to the region.
    pub fn union_with(&mut self, other: &Self) {
        for r in &other.rects {
            self.insert(*r);
        }
    }

    /// Restricts the region to `clip`.
    pub fn intersect_rect(&mut self, clip: Rect) {
        self.rects = self
            .rects
            .iter()
            .map(|r| r.intersect(clip))
            .filter(|r| !r.is_zero_area())
            .collect();
    }

    /// Returns `true` if any part of the region overlaps `rect`.
    #[must_use]
    pub fn intersects(&self, rect: Rect) -> bool {
        self.rects.iter().any(|r| !r.intersect(rect).is_zero_area())
    }

    /// Empties the region, keeping its allocation.
    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Moves the contents out, leaving an empty region with the same limit.
    pub fn take(&mut self) -> Self {
        Self {
            rects: core::mem::take(&mut self.rects),
            limit: self.limit,
        }
    }
}

/// Overlap test that also merges rectangles sharing an edge.
fn touches(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_rects_merge() {
        let mut region = Region::new();
        region.insert(Rect::new(0.0, 0.0, 10.0, 10.0));
        region.insert(Rect::new(5.0, 5.0, 20.0, 20.0));
        assert_eq!(region.rects(), &[Rect::new(0.0, 0.0, 20.0, 20.0)]);
    }

    #[test]
    fn disjoint_rects_are_kept_apart() {
        let mut region = Region::new();
        region.insert(Rect::new(0.0, 0.0, 10.0, 10.0));
        region.insert(Rect::new(50.0, 50.0, 60.0, 60.0));
        assert_eq!(region.rects().len(), 2);
        assert_eq!(region.bounds(), Some(Rect::new(0.0, 0.0, 60.0, 60.0)));
    }

    #[test]
    fn bridging_rect_merges_transitively() {
        let mut region = Region::new();
        region.insert(Rect::new(0.0, 0.0, 10.0, 10.0));
        region.insert(Rect::new(20.0, 0.0, 30.0, 10.0));
        region.insert(Rect::new(5.0, 0.0, 25.0, 5.0));
        assert_eq!(region.rects(), &[Rect::new(0.0, 0.0, 30.0, 10.0)]);
    }

    #[test]
    fn limit_collapses_to_bounds() {
        let mut region = Region::with_limit(2);
        region.insert(Rect::new(0.0, 0.0, 1.0, 1.0));
        region.insert(Rect::new(10.0, 0.0, 11.0, 1.0));
        region.insert(Rect::new(20.0, 0.0, 21.0, 1.0));
        assert_eq!(region.rects(), &[Rect::new(0.0, 0.0, 21.0, 1.0)]);
    }

    #[test]
    fn zero_area_is_ignored() {
        let mut region = Region::new();
        region.insert(Rect::new(5.0, 5.0, 5.0, 10.0));
        assert!(region.is_empty());
        assert_eq!(region.bounds(), None);
    }

    #[test]
    fn intersect_rect_clips() {
        let mut region = Region::from_rect(Rect::new(0.0, 0.0, 100.0, 100.0));
        region.intersect_rect(Rect::new(50.0, 50.0, 200.0, 200.0));
        assert_eq!(region.rects(), &[Rect::new(50.0, 50.0, 100.0, 100.0)]);
        region.intersect_rect(Rect::new(500.0, 500.0, 600.0, 600.0));
        assert!(region.is_empty());
    }
}
