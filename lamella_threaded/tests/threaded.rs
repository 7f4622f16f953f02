// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The consumer host on its own thread.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use kurbo::{Point, Rect, Size};
use lamella_core::backend::{Animator, DrawFrame, DrawResult, ImmediateRaster, OutputBackend};
use lamella_core::content::Rgba8;
use lamella_core::id::NodeId;
use lamella_core::orchestrator::{CommitOutcome, DrawOutcome};
use lamella_core::producer::{NodeKind, ProducerTree};
use lamella_core::settings::PipelineSettings;
use lamella_core::swap_promise::{DidNotSwapReason, PromiseProbe};
use lamella_core::trace::{CommitAbortReason, DrawEvent, TraceSink, Tracer};
use lamella_threaded::{ConsumerEvent, ThreadedPipeline};

/// Plays back scripted results, then presents. The first draw waits on the
/// gate, if there is one.
#[derive(Default)]
struct Screen {
    script: Vec<DrawResult>,
    gate: Option<Receiver<()>>,
    damage: Arc<Mutex<Vec<Rect>>>,
}

impl OutputBackend for Screen {
    fn draw(&mut self, frame: &DrawFrame<'_>) -> DrawResult {
        if let Some(gate) = self.gate.take() {
            let _ = gate.recv();
        }
        self.damage.lock().unwrap().push(frame.damage);
        if self.script.is_empty() {
            DrawResult::Swapped
        } else {
            self.script.remove(0)
        }
    }
}

fn scene(tree: &mut ProducerTree) -> NodeId {
    let node = tree.create_node_with_kind(NodeKind::SolidColor(Rgba8::WHITE));
    tree.set_bounds(node, Size::new(50.0, 50.0));
    tree.set_root(Some(node));
    node
}

fn drawn(events: &[ConsumerEvent]) -> Vec<(u64, DrawOutcome)> {
    events
        .iter()
        .filter_map(|e| match *e {
            ConsumerEvent::Drawn {
                source_frame_number,
                outcome,
            } => Some((source_frame_number, outcome)),
            _ => None,
        })
        .collect()
}

#[test]
fn commit_activates_and_draws_on_the_consumer_thread() {
    let mut p = ThreadedPipeline::spawn(PipelineSettings::pipelined(), Box::new(Screen::default()))
        .unwrap();
    let _ = scene(p.producer_mut().tree_mut());
    let probe = PromiseProbe::new();
    p.producer_mut().queue_swap_promise(probe.promise());

    let frame = p.run_frame(&mut Tracer::none()).unwrap();
    assert_eq!(frame.frame_number, 1);
    assert!(matches!(frame.commit, CommitOutcome::Committed { pushed: 1, .. }));
    p.flush().unwrap();

    let events = p.poll_events();
    assert!(events.contains(&ConsumerEvent::Activated {
        source_frame_number: 1
    }));
    assert_eq!(
        drawn(&events),
        vec![(
            1,
            DrawOutcome::Swapped {
                damage: Rect::new(0.0, 0.0, 50.0, 50.0)
            }
        )]
    );
    assert_eq!(probe.activations(), 1);
    assert_eq!(probe.swaps(), 1);
}

#[test]
fn newer_commit_supersedes_a_held_pending_tree() {
    let mut p = ThreadedPipeline::spawn(PipelineSettings::pipelined(), Box::new(Screen::default()))
        .unwrap();
    let node = scene(p.producer_mut().tree_mut());
    p.set_activation_blocked(true).unwrap();

    let stale = PromiseProbe::new();
    p.producer_mut().queue_swap_promise(stale.promise());
    let _ = p.run_frame(&mut Tracer::none()).unwrap();

    let fresh = PromiseProbe::new();
    p.producer_mut().queue_swap_promise(fresh.promise());
    p.producer_mut()
        .tree_mut()
        .set_position(node, Point::new(10.0, 10.0));
    let second = p.run_frame(&mut Tracer::none()).unwrap();
    assert!(matches!(second.commit, CommitOutcome::Committed { .. }));
    p.flush().unwrap();

    assert_eq!(stale.activations(), 0);
    assert_eq!(stale.swaps(), 0);
    assert_eq!(stale.last_reason(), Some(DidNotSwapReason::SwapFails));
    assert_eq!(fresh.resolutions(), 0);
    assert!(drawn(&p.poll_events()).is_empty());

    p.set_activation_blocked(false).unwrap();
    p.flush().unwrap();
    assert_eq!(fresh.activations(), 1);
    assert_eq!(fresh.swaps(), 1);
    assert_eq!(stale.resolutions(), 1);
}

/// Tells the test the second frame attempt is in flight.
struct SignalSecondFrame {
    in_flight: Option<Sender<()>>,
}

impl Animator for SignalSecondFrame {
    fn animate(&mut self, frame_number: u64, _tree: &mut ProducerTree) {
        if frame_number == 2 {
            if let Some(tx) = self.in_flight.take() {
                let _ = tx.send(());
            }
        }
    }
}

#[test]
fn hiding_mid_flight_fails_that_commit_only() {
    let (gate_tx, gate_rx) = mpsc::channel();
    let screen = Screen {
        gate: Some(gate_rx),
        ..Screen::default()
    };
    let mut p = ThreadedPipeline::spawn(PipelineSettings::pipelined(), Box::new(screen)).unwrap();
    let node = scene(p.producer_mut().tree_mut());
    let (signal_tx, signal_rx) = mpsc::channel();
    p.producer_mut().set_animator(Some(Box::new(SignalSecondFrame {
        in_flight: Some(signal_tx),
    })));
    let _ = p.run_frame(&mut Tracer::none()).unwrap();

    // The consumer is parked in its first draw (or skips it once hidden), so
    // the toggle always lands before it can take the second commit.
    let control = p.control();
    let toggler = thread::spawn(move || {
        signal_rx.recv().unwrap();
        control.set_visible(false);
        control.set_visible(true);
        gate_tx.send(()).unwrap();
    });

    let probe = PromiseProbe::new();
    p.producer_mut().queue_swap_promise(probe.promise());
    p.producer_mut()
        .tree_mut()
        .set_position(node, Point::new(20.0, 0.0));
    let second = p.run_frame(&mut Tracer::none()).unwrap();
    toggler.join().unwrap();

    assert!(
        matches!(
            second.commit,
            CommitOutcome::Aborted(CommitAbortReason::NotVisible | CommitAbortReason::Cancelled)
        ),
        "got {second:?}"
    );
    assert_eq!(probe.resolutions(), 1);
    assert_eq!(probe.activations(), 0);
    assert_eq!(probe.last_reason(), Some(DidNotSwapReason::CommitFails));

    let third = p.run_frame(&mut Tracer::none()).unwrap();
    assert!(matches!(third.commit, CommitOutcome::Committed { .. }));
    p.flush().unwrap();
    let last = drawn(&p.poll_events()).pop();
    assert!(
        matches!(last, Some((3, DrawOutcome::Swapped { .. }))),
        "got {last:?}"
    );
}

#[test]
fn lost_context_recovers_with_a_full_repush() {
    let screen = Screen {
        script: vec![DrawResult::ContextLost],
        ..Screen::default()
    };
    let damage = Arc::clone(&screen.damage);
    let mut p = ThreadedPipeline::spawn(PipelineSettings::pipelined(), Box::new(screen)).unwrap();
    let node = scene(p.producer_mut().tree_mut());
    let lost = PromiseProbe::new();
    p.producer_mut().queue_swap_promise(lost.promise());

    let _ = p.run_frame(&mut Tracer::none()).unwrap();
    p.flush().unwrap();
    assert_eq!(lost.last_reason(), Some(DidNotSwapReason::SwapFails));

    p.producer_mut()
        .tree_mut()
        .set_position(node, Point::new(5.0, 5.0));
    let aborted = p.run_frame(&mut Tracer::none()).unwrap();
    assert_eq!(
        aborted.commit,
        CommitOutcome::Aborted(CommitAbortReason::ContextLost)
    );
    assert!(p.producer().context_lost());

    // Any command gives the consumer a chance to recreate the context.
    p.flush().unwrap();
    let recovered = p.run_frame(&mut Tracer::none()).unwrap();
    assert!(!p.producer().context_lost());
    assert!(matches!(
        recovered.commit,
        CommitOutcome::Committed { pushed: 1, .. }
    ));
    p.flush().unwrap();

    let events = p.poll_events();
    assert!(events.contains(&ConsumerEvent::ContextLost));
    assert!(events.contains(&ConsumerEvent::ContextRecovered));
    assert!(matches!(
        drawn(&events).pop(),
        Some((3, DrawOutcome::Swapped { .. }))
    ));
    assert_eq!(
        damage.lock().unwrap().last(),
        Some(&Rect::new(0.0, 0.0, 55.0, 55.0))
    );
}

#[derive(Default)]
struct CountDraws {
    draws: usize,
}

impl TraceSink for CountDraws {
    fn on_draw(&mut self, _e: &DrawEvent) {
        self.draws += 1;
    }
}

#[test]
fn shutdown_returns_the_consumer_sink() {
    let mut p = ThreadedPipeline::spawn_with(
        PipelineSettings::single_threaded(),
        Box::new(Screen::default()),
        Box::new(ImmediateRaster),
        CountDraws::default(),
    )
    .unwrap();
    let node = scene(p.producer_mut().tree_mut());
    for x in 1..=3 {
        p.producer_mut()
            .tree_mut()
            .set_position(node, Point::new(f64::from(x), 0.0));
        let _ = p.run_frame(&mut Tracer::none()).unwrap();
    }
    p.flush().unwrap();
    let sink = p.shutdown().unwrap();
    assert_eq!(sink.draws, 3);
}

#[test]
fn dropping_the_pipeline_resolves_held_promises() {
    let pending = PromiseProbe::new();
    let held = PromiseProbe::new();
    {
        let mut p =
            ThreadedPipeline::spawn(PipelineSettings::pipelined(), Box::new(Screen::default()))
                .unwrap();
        let _ = scene(p.producer_mut().tree_mut());
        p.set_activation_blocked(true).unwrap();
        p.control().set_visible(false);
        p.producer_mut().queue_swap_promise(pending.promise());
        let hidden = p.run_frame(&mut Tracer::none()).unwrap();
        assert_eq!(
            hidden.commit,
            CommitOutcome::Aborted(CommitAbortReason::NotVisible)
        );
        assert_eq!(pending.last_reason(), Some(DidNotSwapReason::CommitFails));

        p.control().set_visible(true);
        p.producer_mut().queue_swap_promise(held.promise());
        let _ = p.run_frame(&mut Tracer::none()).unwrap();
        p.flush().unwrap();
        assert_eq!(held.resolutions(), 0);
    }
    assert_eq!(held.resolutions(), 1);
    assert_eq!(held.last_reason(), Some(DidNotSwapReason::SwapFails));
}

#[test]
fn pinned_promise_rides_the_next_draw() {
    let mut p = ThreadedPipeline::spawn(PipelineSettings::pipelined(), Box::new(Screen::default()))
        .unwrap();
    let _ = scene(p.producer_mut().tree_mut());
    let _ = p.run_frame(&mut Tracer::none()).unwrap();
    p.flush().unwrap();
    let _ = p.poll_events();

    let pinned = PromiseProbe::new();
    p.queue_pinned_promise(pinned.promise()).unwrap();
    p.flush().unwrap();
    assert_eq!(pinned.activations(), 0);
    assert_eq!(pinned.resolutions(), 1);
    assert_eq!(
        drawn(&p.poll_events()),
        vec![(1, DrawOutcome::NoDamage)],
        "nothing changed, so the output is not invoked"
    );
    assert_eq!(pinned.last_reason(), Some(DidNotSwapReason::SwapFails));
}
