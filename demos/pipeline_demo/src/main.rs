// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated compositor frame loop.
//!
//! Drives a small scene through a pipelined [`CommitOrchestrator`] for a
//! fixed number of frames. Along the way the output is hidden for a frame,
//! activation is held back so a newer commit supersedes a pending tree, and
//! the output context is lost once. Events go to both a
//! [`PrettyPrintSink`] on stdout and a [`RecorderSink`], which is exported
//! as Chrome trace JSON at the end.
//!
//! ```text
//! cargo run -p pipeline_demo -- [trace.json]
//! ```
//!
//! Set `RUST_LOG=debug` to see the pipeline's own logging.

use std::fs::File;
use std::io::{self, BufWriter};

use kurbo::{Point, Rect, Size};
use lamella_core::backend::{Animator, DrawFrame, DrawResult, OutputBackend};
use lamella_core::content::{ContentClient, ContentOutput, PaintOp, RefreshRequest, Rgba8};
use lamella_core::id::NodeId;
use lamella_core::orchestrator::CommitOrchestrator;
use lamella_core::producer::{NodeKind, ProducerTree};
use lamella_core::region::Region;
use lamella_core::settings::PipelineSettings;
use lamella_core::swap_promise::{DidNotSwapReason, SwapPromise};
use lamella_core::trace::{
    AbortEvent, ActivateEvent, BeginFrameEvent, CommitEvent, ContextEvent, DrawEvent,
    NodePushEvent, PromiseEvent, StageEvent, SupersedeEvent, SwapEvent, TraceSink, Tracer,
};
use lamella_debug::pretty::PrettyPrintSink;
use lamella_debug::recorder::RecorderSink;

const FRAME_COUNT: u64 = 16;
const HIDDEN_FRAME: u64 = 5;
const BLOCKED_FRAMES: [u64; 2] = [8, 9];
const CONTEXT_LOST_FRAME: u64 = 12;

// -- scene ------------------------------------------------------------------

/// Paints a counter strip, highlighting one cell per refresh.
struct Ticker {
    ticks: u32,
}

impl Ticker {
    const CELL: f64 = 20.0;

    fn cell(index: u32) -> Rect {
        let x = f64::from(index % 10) * Self::CELL;
        Rect::new(x, 0.0, x + Self::CELL, Self::CELL)
    }
}

impl ContentClient for Ticker {
    fn refresh_content(
        &mut self,
        request: &RefreshRequest,
        _tree: &mut ProducerTree,
    ) -> ContentOutput {
        self.ticks += 1;
        let cell = Self::cell(self.ticks);
        let color = if self.ticks % 2 == 0 {
            Rgba8::new(40, 160, 90, 255)
        } else {
            Rgba8::new(200, 60, 60, 255)
        };
        ContentOutput {
            ops: vec![
                PaintOp::FillRect {
                    rect: request.clip,
                    color: Rgba8::new(20, 20, 20, 255),
                },
                PaintOp::FillRect { rect: cell, color },
            ],
            invalidation: Region::from_rect(request.clip),
            memory_usage: 128,
        }
    }
}

/// Slides the badge right one step per frame and asks the ticker to repaint.
struct Slide {
    badge: NodeId,
    strip: NodeId,
}

impl Animator for Slide {
    fn animate(&mut self, frame_number: u64, tree: &mut ProducerTree) {
        let step = f64::from(u32::try_from(frame_number % 20).unwrap_or(0));
        tree.set_position(self.badge, Point::new(10.0 + 8.0 * step, 60.0));
        if frame_number % 3 == 0 {
            let cell = Ticker::cell(u32::try_from(frame_number / 3).unwrap_or(0));
            tree.set_needs_display_rect(self.strip, cell);
        }
    }
}

fn build_scene(tree: &mut ProducerTree) -> (NodeId, NodeId) {
    tree.set_viewport(Some(Size::new(320.0, 120.0)));
    tree.set_background_color(Rgba8::new(0, 0, 0, 255));

    let root = tree.create_node();
    tree.set_bounds(root, Size::new(320.0, 120.0));
    tree.set_root(Some(root));

    let strip = tree.create_node_with_kind(NodeKind::Content);
    tree.set_bounds(strip, Size::new(200.0, 20.0));
    tree.set_position(strip, Point::new(10.0, 10.0));
    tree.set_content_client(strip, Some(Box::new(Ticker { ticks: 0 })));
    tree.add_child(root, strip);

    let badge = tree.create_node_with_kind(NodeKind::SolidColor(Rgba8::new(90, 120, 240, 255)));
    tree.set_bounds(badge, Size::new(24.0, 24.0));
    tree.add_child(root, badge);

    (strip, badge)
}

// -- output -----------------------------------------------------------------

/// Pretends to present; loses its context once.
struct Screen {
    lose_context_at: Option<u64>,
}

impl OutputBackend for Screen {
    fn draw(&mut self, frame: &DrawFrame<'_>) -> DrawResult {
        if self.lose_context_at == Some(frame.source_frame_number) {
            self.lose_context_at = None;
            log::warn!("screen: context lost while drawing {}", frame.source_frame_number);
            return DrawResult::ContextLost;
        }
        log::info!(
            "screen: frame {} with {} items, damage {:?}",
            frame.source_frame_number,
            frame.items.len(),
            frame.damage
        );
        DrawResult::Swapped
    }
}

/// Logs how a frame's promise ended.
struct Latency {
    frame: u64,
}

impl SwapPromise for Latency {
    fn did_swap(&mut self) {
        log::info!("promise {}: presented", self.frame);
    }

    fn did_not_swap(&mut self, reason: DidNotSwapReason) {
        log::info!("promise {}: not presented ({reason:?})", self.frame);
    }
}

// -- sinks ------------------------------------------------------------------

/// Forwards every event to two sinks.
struct Tee<'a> {
    a: &'a mut dyn TraceSink,
    b: &'a mut dyn TraceSink,
}

impl TraceSink for Tee<'_> {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        self.a.on_begin_frame(e);
        self.b.on_begin_frame(e);
    }

    fn on_stage(&mut self, e: &StageEvent) {
        self.a.on_stage(e);
        self.b.on_stage(e);
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.a.on_commit(e);
        self.b.on_commit(e);
    }

    fn on_abort(&mut self, e: &AbortEvent) {
        self.a.on_abort(e);
        self.b.on_abort(e);
    }

    fn on_supersede(&mut self, e: &SupersedeEvent) {
        self.a.on_supersede(e);
        self.b.on_supersede(e);
    }

    fn on_activate(&mut self, e: &ActivateEvent) {
        self.a.on_activate(e);
        self.b.on_activate(e);
    }

    fn on_draw(&mut self, e: &DrawEvent) {
        self.a.on_draw(e);
        self.b.on_draw(e);
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        self.a.on_swap(e);
        self.b.on_swap(e);
    }

    fn on_promise(&mut self, e: &PromiseEvent) {
        self.a.on_promise(e);
        self.b.on_promise(e);
    }

    fn on_context(&mut self, e: &ContextEvent) {
        self.a.on_context(e);
        self.b.on_context(e);
    }

    fn on_node_push(&mut self, e: &NodePushEvent) {
        self.a.on_node_push(e);
        self.b.on_node_push(e);
    }
}

// -- main -------------------------------------------------------------------

fn main() -> io::Result<()> {
    env_logger::init();
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "lamella-trace.json".to_owned());

    let mut pretty = PrettyPrintSink::with_writer(io::stdout());
    let mut recorder = RecorderSink::new();

    let mut pipeline = CommitOrchestrator::new(PipelineSettings::pipelined());
    let (strip, badge) = build_scene(pipeline.producer_mut().tree_mut());
    pipeline
        .producer_mut()
        .set_animator(Some(Box::new(Slide { badge, strip })));
    let mut screen = Screen {
        lose_context_at: Some(CONTEXT_LOST_FRAME),
    };

    for frame in 1..=FRAME_COUNT {
        pipeline.producer_mut().set_visible(frame != HIDDEN_FRAME);
        pipeline
            .consumer_mut()
            .set_activation_blocked(BLOCKED_FRAMES.contains(&frame));
        pipeline
            .producer_mut()
            .queue_swap_promise(Box::new(Latency { frame }));

        let mut tee = Tee {
            a: &mut pretty,
            b: &mut recorder,
        };
        let outcome = pipeline.run_frame(&mut screen, &mut Tracer::new(&mut tee));
        log::debug!("frame {frame}: {outcome:?}");
    }

    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    lamella_debug::chrome::export(recorder.as_bytes(), &mut writer)?;
    println!("Wrote {path} ({FRAME_COUNT} frames)");
    Ok(())
}
