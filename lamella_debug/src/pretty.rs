// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Stage
//! transitions are noisy, so they are only printed when enabled with
//! [`with_stages`](PrettyPrintSink::with_stages).

use std::io::Write;

use kurbo::Rect;
use lamella_core::trace::{
    AbortEvent, ActivateEvent, BeginFrameEvent, CommitEvent, ContextEvent, DrawEvent,
    NodePushEvent, PromiseEvent, StageEvent, SupersedeEvent, SwapEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    stages: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("stages", &self.stages)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            stages: false,
        }
    }

    /// Also prints every stage transition.
    #[must_use]
    pub fn with_stages(mut self) -> Self {
        self.stages = true;
        self
    }

    /// Consumes the sink and returns its writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn rect(r: Rect) -> String {
    format!("({}, {})-({}, {})", r.x0, r.y0, r.x1, r.y1)
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        let _ = writeln!(self.writer, "[frame] {} begin", e.frame_number);
    }

    fn on_stage(&mut self, e: &StageEvent) {
        if self.stages {
            let _ = writeln!(self.writer, "[stage] frame={} {:?}", e.frame_number, e.stage);
        }
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        let _ = writeln!(
            self.writer,
            "[commit] frame={} visited={} pushed={} removed={} rasters={}",
            e.frame_number, e.visited, e.pushed, e.removed, e.rasters,
        );
    }

    fn on_abort(&mut self, e: &AbortEvent) {
        let _ = writeln!(
            self.writer,
            "[abort] frame={} reason={:?}",
            e.frame_number, e.reason,
        );
    }

    fn on_supersede(&mut self, e: &SupersedeEvent) {
        let _ = writeln!(
            self.writer,
            "[supersede] pending={} by={}",
            e.superseded_frame, e.by_frame,
        );
    }

    fn on_activate(&mut self, e: &ActivateEvent) {
        let _ = writeln!(self.writer, "[activate] frame={}", e.source_frame_number);
    }

    fn on_draw(&mut self, e: &DrawEvent) {
        let damage = e.damage.map_or_else(|| "none".to_owned(), rect);
        let result = e
            .result
            .map_or_else(|| "skipped".to_owned(), |r| format!("{r:?}"));
        let _ = writeln!(
            self.writer,
            "[draw] frame={} damage={damage} items={} result={result}",
            e.source_frame_number, e.item_count,
        );
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        let outcome = if e.swapped { "swapped" } else { "NO SWAP" };
        let _ = writeln!(
            self.writer,
            "[swap] frame={} {outcome}",
            e.source_frame_number,
        );
    }

    fn on_promise(&mut self, e: &PromiseEvent) {
        let _ = writeln!(
            self.writer,
            "[promise] frame={} {:?}",
            e.frame_number, e.resolution,
        );
    }

    fn on_context(&mut self, e: &ContextEvent) {
        let state = if e.recovered { "recovered" } else { "LOST" };
        let _ = writeln!(
            self.writer,
            "[context] frame={} {state}",
            e.frame_number,
        );
    }

    fn on_node_push(&mut self, e: &NodePushEvent) {
        let _ = writeln!(
            self.writer,
            "[push] frame={} node={:?} raster={}",
            e.frame_number, e.node, e.raster,
        );
    }
}

#[cfg(test)]
mod tests {
    use lamella_core::trace::{CommitAbortReason, PipelineStage};

    use super::*;

    fn output(sink: PrettyPrintSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_writer()).unwrap()
    }

    #[test]
    fn pretty_print_draw() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_draw(&DrawEvent {
            source_frame_number: 3,
            damage: Some(Rect::new(0.0, 0.0, 60.0, 60.0)),
            item_count: 1,
            result: None,
        });
        let output = output(sink);
        assert!(output.contains("[draw] frame=3"), "got: {output}");
        assert!(output.contains("(0, 0)-(60, 60)"), "got: {output}");
        assert!(output.contains("result=skipped"), "got: {output}");
    }

    #[test]
    fn stages_are_opt_in() {
        let stage = StageEvent {
            frame_number: 1,
            stage: PipelineStage::Commit,
        };
        let mut quiet = PrettyPrintSink::with_writer(Vec::<u8>::new());
        quiet.on_stage(&stage);
        quiet.on_abort(&AbortEvent {
            frame_number: 1,
            reason: CommitAbortReason::Deferred,
        });
        let quiet = output(quiet);
        assert!(!quiet.contains("[stage]"), "got: {quiet}");
        assert!(quiet.contains("reason=Deferred"), "got: {quiet}");

        let mut loud = PrettyPrintSink::with_writer(Vec::<u8>::new()).with_stages();
        loud.on_stage(&stage);
        let loud = output(loud);
        assert!(loud.contains("[stage] frame=1 Commit"), "got: {loud}");
    }
}
