// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline configuration.

use crate::content::PaintMode;
use crate::region::DEFAULT_RECT_LIMIT;

/// How the producer and consumer halves are scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ThreadingMode {
    /// Both halves share a thread; every commit activates inline and no
    /// pending tree is retained.
    #[default]
    SingleThreaded,
    /// The consumer keeps a pending tree that activates once the raster
    /// scheduler is ready and activation is not held back.
    Pipelined,
}

/// Knobs shared by the producer and consumer hosts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineSettings {
    /// Scheduling mode.
    pub mode: ThreadingMode,
    /// Diagnostic paint mode forwarded to content clients.
    pub paint_mode: PaintMode,
    /// Upper bound on content update passes per frame. Extra passes pick up
    /// nodes invalidated by other nodes' content clients.
    pub max_update_passes: usize,
    /// Clip accumulated damage to the viewport when one is set.
    pub clip_damage_to_viewport: bool,
    /// Rectangles kept per invalidation region before collapsing.
    pub region_rect_limit: usize,
}

impl PipelineSettings {
    /// Inline activation on one thread.
    #[must_use]
    pub const fn single_threaded() -> Self {
        Self {
            mode: ThreadingMode::SingleThreaded,
            paint_mode: PaintMode::Normal,
            max_update_passes: 2,
            clip_damage_to_viewport: true,
            region_rect_limit: DEFAULT_RECT_LIMIT,
        }
    }

    /// Retained pending tree with gated activation.
    #[must_use]
    pub const fn pipelined() -> Self {
        Self {
            mode: ThreadingMode::Pipelined,
            ..Self::single_threaded()
        }
    }

    /// Returns a copy with `paint_mode` replaced.
    #[must_use]
    pub const fn with_paint_mode(mut self, paint_mode: PaintMode) -> Self {
        self.paint_mode = paint_mode;
        self
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::single_threaded()
    }
}
