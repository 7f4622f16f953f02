// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Randomized checks of the pipeline's standing guarantees.
//!
//! Every test is seeded, so failures reproduce.

use std::collections::BTreeSet;

use kurbo::{Point, Rect, Size};
use lamella_core::backend::{DrawFrame, DrawResult, OutputBackend};
use lamella_core::consumer::ConsumerTree;
use lamella_core::content::Rgba8;
use lamella_core::damage::DamageTracker;
use lamella_core::id::NodeId;
use lamella_core::orchestrator::{CommitOrchestrator, CommitOutcome, DrawOutcome};
use lamella_core::producer::{NodeKind, ProducerTree};
use lamella_core::settings::PipelineSettings;
use lamella_core::swap_promise::PromiseProbe;
use lamella_core::trace::{CommitAbortReason, Tracer};

/// Small deterministic generator (PCG-style LCG step, xorshift output).
struct Lcg(u64);

impl Lcg {
    #[expect(clippy::cast_possible_truncation, reason = "keeps the mixed high bits")]
    fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let x = self.0 ^ (self.0 >> 33);
        (x >> 16) as u32
    }

    fn below(&mut self, n: usize) -> usize {
        self.next_u32() as usize % n
    }

    fn chance(&mut self, percent: u32) -> bool {
        self.next_u32() % 100 < percent
    }

    fn coord(&mut self, max: f64) -> f64 {
        f64::from(self.next_u32() % 1000) / 1000.0 * max
    }
}

fn contains(outer: Rect, inner: Rect) -> bool {
    outer.x0 <= inner.x0 && outer.y0 <= inner.y0 && outer.x1 >= inner.x1 && outer.y1 >= inner.y1
}

/// A random tree: node `0` is the root, every other node hangs off an
/// earlier one. Returns the ids and each node's parent index.
fn random_tree(tree: &mut ProducerTree, rng: &mut Lcg, len: usize) -> (Vec<NodeId>, Vec<usize>) {
    let mut ids = Vec::with_capacity(len);
    let mut parents = Vec::with_capacity(len);
    for i in 0..len {
        let id = tree.create_node();
        tree.set_bounds(id, Size::new(10.0, 10.0));
        if i == 0 {
            tree.set_root(Some(id));
            parents.push(0);
        } else {
            let parent = rng.below(i);
            tree.add_child(ids[parent], id);
            parents.push(parent);
        }
        ids.push(id);
    }
    (ids, parents)
}

fn with_ancestors(set: &mut BTreeSet<NodeId>, ids: &[NodeId], parents: &[usize], mut i: usize) {
    loop {
        set.insert(ids[i]);
        if i == 0 {
            return;
        }
        i = parents[i];
    }
}

#[test]
fn sync_visits_only_dirty_paths() {
    for seed in 1..=20 {
        let mut rng = Lcg(seed);
        let mut tree = ProducerTree::new();
        let (ids, parents) = random_tree(&mut tree, &mut rng, 40);
        let persisted = (seed % 3 == 0).then(|| 1 + rng.below(ids.len() - 1));
        if let Some(p) = persisted {
            tree.set_persist(ids[p], true);
        }
        let _ = tree.synchronize(1, &mut Tracer::none());

        for frame in 2_u32..12 {
            let mut expected = BTreeSet::new();
            let mut step = 0_u32;
            for _ in 0..=rng.below(4) {
                let i = rng.below(ids.len());
                tree.set_position(ids[i], Point::new(f64::from(frame), f64::from(step)));
                step += 1;
                with_ancestors(&mut expected, &ids, &parents, i);
            }
            if let Some(p) = persisted {
                with_ancestors(&mut expected, &ids, &parents, p);
            }

            let batch = tree.synchronize(u64::from(frame), &mut Tracer::none());
            let visited: BTreeSet<NodeId> = batch.visited.iter().copied().collect();
            assert_eq!(visited.len(), batch.visited.len(), "seed {seed}: node visited twice");
            assert_eq!(visited, expected, "seed {seed}, frame {frame}");
        }
    }
}

#[test]
fn clean_tree_visits_only_the_root() {
    let mut rng = Lcg(7);
    let mut tree = ProducerTree::new();
    let (ids, _) = random_tree(&mut tree, &mut rng, 25);
    let _ = tree.synchronize(1, &mut Tracer::none());
    tree.set_needs_commit();
    let batch = tree.synchronize(2, &mut Tracer::none());
    assert_eq!(batch.visited, vec![ids[0]]);
    assert!(batch.updates.is_empty());
}

#[derive(Default)]
struct Screen {
    last_damage: Option<Rect>,
}

impl OutputBackend for Screen {
    fn draw(&mut self, frame: &DrawFrame<'_>) -> DrawResult {
        self.last_damage = Some(frame.damage);
        DrawResult::Swapped
    }

    fn recreate_context(&mut self) -> bool {
        true
    }
}

#[test]
fn damage_covers_every_changed_node() {
    for seed in 1..=10 {
        let mut rng = Lcg(seed);
        let mut p = CommitOrchestrator::new(PipelineSettings::single_threaded());
        let tree = p.producer_mut().tree_mut();
        let root = tree.create_node();
        tree.set_bounds(root, Size::new(400.0, 400.0));
        tree.set_root(Some(root));
        let mut nodes = Vec::new();
        for _ in 0..12 {
            let id = tree.create_node_with_kind(NodeKind::SolidColor(Rgba8::WHITE));
            tree.set_position(id, Point::new(rng.coord(360.0), rng.coord(360.0)));
            tree.set_bounds(id, Size::new(5.0 + rng.coord(35.0), 5.0 + rng.coord(35.0)));
            tree.add_child(root, id);
            nodes.push(id);
        }
        let mut screen = Screen::default();
        let _ = p.run_frame(&mut screen, &mut Tracer::none());

        for round in 0..30 {
            let tree = p.producer_mut().tree_mut();
            for _ in 0..=rng.below(3) {
                let id = nodes[rng.below(nodes.len())];
                match rng.below(3) {
                    0 => tree.set_position(id, Point::new(rng.coord(360.0), rng.coord(360.0))),
                    1 => tree.set_bounds(id, Size::new(5.0 + rng.coord(35.0), 5.0 + rng.coord(35.0))),
                    _ => {
                        let hidden = tree.hidden(id);
                        tree.set_hidden(id, !hidden);
                    }
                }
            }

            let before: Vec<Option<Rect>> = nodes
                .iter()
                .map(|id| p.consumer().tracker().history_rect(*id))
                .collect();
            screen.last_damage = None;
            let outcome = p.run_frame(&mut screen, &mut Tracer::none());
            let after: Vec<Option<Rect>> = nodes
                .iter()
                .map(|id| p.consumer().tracker().history_rect(*id))
                .collect();

            for (old, new) in before.iter().zip(&after) {
                if old == new {
                    continue;
                }
                let Some(damage) = screen.last_damage else {
                    panic!("seed {seed}, round {round}: node changed but nothing drawn ({outcome:?})");
                };
                for rect in old.iter().chain(new) {
                    assert!(
                        contains(damage, *rect),
                        "seed {seed}, round {round}: {damage:?} misses {rect:?}"
                    );
                }
            }
        }
    }
}

#[test]
fn fresh_history_damages_the_content_rect() {
    for seed in 1..=10 {
        let mut rng = Lcg(seed);
        let mut producer = ProducerTree::new();
        let root = producer.create_node();
        let width = 50.0 + rng.coord(500.0);
        let height = 50.0 + rng.coord(500.0);
        producer.set_bounds(root, Size::new(width, height));
        producer.set_root(Some(root));
        for _ in 0..rng.below(10) {
            let id = producer.create_node_with_kind(NodeKind::SolidColor(Rgba8::WHITE));
            producer.set_position(id, Point::new(rng.coord(width - 20.0), rng.coord(height - 20.0)));
            producer.set_bounds(id, Size::new(20.0, 20.0));
            producer.add_child(root, id);
        }
        if seed % 2 == 0 {
            producer.set_viewport(Some(Size::new(width, height)));
        }

        let mut consumer = ConsumerTree::new();
        consumer.apply(&producer.synchronize(1, &mut Tracer::none()));
        let list = consumer.draw_list();
        let surface = Rect::new(0.0, 0.0, width, height);
        assert_eq!(list.content_rect, surface);
        let damage = DamageTracker::new().compute_damage(&consumer, &list, None);
        assert_eq!(damage, Some(surface), "seed {seed}");
    }
}

/// Presents, fails, or loses the context according to the generator.
struct FlakyScreen {
    rng: Lcg,
}

impl OutputBackend for FlakyScreen {
    fn draw(&mut self, _frame: &DrawFrame<'_>) -> DrawResult {
        match self.rng.below(10) {
            0 => DrawResult::Failed,
            1 => DrawResult::DrawnNoSwap,
            2 => DrawResult::ContextLost,
            _ => DrawResult::Swapped,
        }
    }

    fn recreate_context(&mut self) -> bool {
        self.rng.chance(50)
    }
}

#[test]
fn every_promise_resolves_exactly_once() {
    for seed in 1..=12 {
        let mut rng = Lcg(seed);
        let settings = if seed % 2 == 0 {
            PipelineSettings::pipelined()
        } else {
            PipelineSettings::single_threaded()
        };
        let mut p = CommitOrchestrator::new(settings);
        let tree = p.producer_mut().tree_mut();
        let root = tree.create_node();
        tree.set_bounds(root, Size::new(100.0, 100.0));
        tree.set_root(Some(root));
        let node = tree.create_node_with_kind(NodeKind::SolidColor(Rgba8::WHITE));
        tree.set_bounds(node, Size::new(10.0, 10.0));
        tree.add_child(root, node);

        let mut screen = FlakyScreen { rng: Lcg(seed * 31) };
        let mut probes = Vec::new();
        for step in 0_u32..80 {
            match rng.below(8) {
                0 | 1 => {
                    let probe = PromiseProbe::new();
                    p.producer_mut().queue_swap_promise(probe.promise());
                    probes.push(probe);
                }
                2 => {
                    let probe = PromiseProbe::new();
                    p.consumer_mut().queue_pinned_promise(probe.promise());
                    probes.push(probe);
                }
                3 => p
                    .producer_mut()
                    .tree_mut()
                    .set_position(node, Point::new(f64::from(step), 0.0)),
                4 => {
                    let visible = rng.chance(70);
                    p.producer_mut().set_visible(visible);
                }
                5 => {
                    let blocked = rng.chance(40);
                    p.consumer_mut().set_activation_blocked(blocked);
                }
                _ => {
                    let _ = p.run_frame(&mut screen, &mut Tracer::none());
                }
            }
            for probe in &probes {
                assert!(probe.resolutions() <= 1, "seed {seed}: resolved twice");
                assert!(probe.activations() <= 1, "seed {seed}: activated twice");
            }
        }
        drop(p);

        for (i, probe) in probes.iter().enumerate() {
            assert_eq!(probe.resolutions(), 1, "seed {seed}: promise {i}");
            if probe.activations() == 1 {
                assert!(
                    probe
                        .last_reason()
                        .is_none_or(|reason| !reason.is_pre_activation()),
                    "seed {seed}: promise {i} failed with {:?} after activating",
                    probe.last_reason()
                );
            }
        }
    }
}

#[test]
fn aborted_attempts_still_advance_the_frame_number() {
    for (n, reason) in [
        (1_u64, CommitAbortReason::NotVisible),
        (5, CommitAbortReason::NotVisible),
        (3, CommitAbortReason::Deferred),
        (7, CommitAbortReason::NoUpdate),
    ] {
        let mut p = CommitOrchestrator::new(PipelineSettings::pipelined());
        let root = p.producer_mut().tree_mut().create_node();
        p.producer_mut().tree_mut().set_root(Some(root));
        match reason {
            CommitAbortReason::NotVisible => p.producer_mut().set_visible(false),
            CommitAbortReason::Deferred => p.producer_mut().set_defer_commits(true),
            _ => {
                let _ = p.run_frame(&mut Screen::default(), &mut Tracer::none());
            }
        }
        let start = p.producer().frame_number();
        let synced = p.consumer().active_tree().source_frame_number();

        for _ in 0..n {
            let outcome = p.run_frame(&mut Screen::default(), &mut Tracer::none());
            assert_eq!(outcome.commit, CommitOutcome::Aborted(reason));
            assert!(!matches!(outcome.draw, Some(DrawOutcome::Swapped { .. })));
        }
        assert_eq!(p.producer().frame_number(), start + n);
        assert_eq!(p.consumer().active_tree().source_frame_number(), synced);
    }
}
