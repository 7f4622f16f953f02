// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records. Every record starts with a tag byte
//! and the nanoseconds elapsed since the recorder was created. [`decode`]
//! reads them back as an iterator of [`Record`].

use std::time::Instant;

use kurbo::Rect;
use lamella_core::backend::DrawResult;
use lamella_core::id::NodeId;
use lamella_core::swap_promise::DidNotSwapReason;
use lamella_core::trace::{
    AbortEvent, ActivateEvent, BeginFrameEvent, CommitAbortReason, CommitEvent, ContextEvent,
    DrawEvent, NodePushEvent, PipelineStage, PromiseEvent, PromiseResolution, StageEvent,
    SupersedeEvent, SwapEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_BEGIN_FRAME: u8 = 1;
const TAG_STAGE: u8 = 2;
const TAG_COMMIT: u8 = 3;
const TAG_ABORT: u8 = 4;
const TAG_SUPERSEDE: u8 = 5;
const TAG_ACTIVATE: u8 = 6;
const TAG_DRAW: u8 = 7;
const TAG_SWAP: u8 = 8;
const TAG_PROMISE: u8 = 9;
const TAG_CONTEXT: u8 = 10;
const TAG_NODE_PUSH: u8 = 11;

const STAGES: [PipelineStage; 11] = [
    PipelineStage::Start,
    PipelineStage::Animate,
    PipelineStage::UpdateContent,
    PipelineStage::Commit,
    PipelineStage::Synchronize,
    PipelineStage::Activate,
    PipelineStage::Draw,
    PipelineStage::Swap,
    PipelineStage::End,
    PipelineStage::Aborted,
    PipelineStage::NoSwap,
];

const ABORT_REASONS: [CommitAbortReason; 5] = [
    CommitAbortReason::NotVisible,
    CommitAbortReason::Deferred,
    CommitAbortReason::ContextLost,
    CommitAbortReason::NoUpdate,
    CommitAbortReason::Cancelled,
];

const DRAW_RESULTS: [DrawResult; 4] = [
    DrawResult::Swapped,
    DrawResult::DrawnNoSwap,
    DrawResult::Failed,
    DrawResult::ContextLost,
];

fn index_of<T: PartialEq>(table: &[T], value: &T) -> u8 {
    let i = table.iter().position(|v| v == value).unwrap_or(0);
    u8::try_from(i).unwrap_or(0)
}

fn promise_code(r: PromiseResolution) -> u8 {
    match r {
        PromiseResolution::Activated => 0,
        PromiseResolution::Swapped => 1,
        PromiseResolution::NotSwapped(DidNotSwapReason::CommitFails) => 2,
        PromiseResolution::NotSwapped(DidNotSwapReason::CommitNoUpdate) => 3,
        PromiseResolution::NotSwapped(DidNotSwapReason::SwapFails) => 4,
    }
}

fn promise_from_code(code: u8) -> Option<PromiseResolution> {
    Some(match code {
        0 => PromiseResolution::Activated,
        1 => PromiseResolution::Swapped,
        2 => PromiseResolution::NotSwapped(DidNotSwapReason::CommitFails),
        3 => PromiseResolution::NotSwapped(DidNotSwapReason::CommitNoUpdate),
        4 => PromiseResolution::NotSwapped(DidNotSwapReason::SwapFails),
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug)]
pub struct RecorderSink {
    buf: Vec<u8>,
    origin: Instant,
}

impl Default for RecorderSink {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderSink {
    /// Creates an empty recorder. Timestamps count from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            origin: Instant::now(),
        }
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn header(&mut self, tag: u8) {
        let nanos = u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.write_u8(tag);
        self.write_u64(nanos);
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_option_rect(&mut self, r: Option<Rect>) {
        match r {
            Some(r) => {
                self.write_u8(1);
                self.write_f64(r.x0);
                self.write_f64(r.y0);
                self.write_f64(r.x1);
                self.write_f64(r.y1);
            }
            None => self.write_u8(0),
        }
    }
}

impl TraceSink for RecorderSink {
    fn on_begin_frame(&mut self, e: &BeginFrameEvent) {
        self.header(TAG_BEGIN_FRAME);
        self.write_u64(e.frame_number);
    }

    fn on_stage(&mut self, e: &StageEvent) {
        self.header(TAG_STAGE);
        self.write_u64(e.frame_number);
        self.write_u8(index_of(&STAGES, &e.stage));
    }

    fn on_commit(&mut self, e: &CommitEvent) {
        self.header(TAG_COMMIT);
        self.write_u64(e.frame_number);
        self.write_u32(e.visited);
        self.write_u32(e.pushed);
        self.write_u32(e.removed);
        self.write_u32(e.rasters);
    }

    fn on_abort(&mut self, e: &AbortEvent) {
        self.header(TAG_ABORT);
        self.write_u64(e.frame_number);
        self.write_u8(index_of(&ABORT_REASONS, &e.reason));
    }

    fn on_supersede(&mut self, e: &SupersedeEvent) {
        self.header(TAG_SUPERSEDE);
        self.write_u64(e.superseded_frame);
        self.write_u64(e.by_frame);
    }

    fn on_activate(&mut self, e: &ActivateEvent) {
        self.header(TAG_ACTIVATE);
        self.write_u64(e.source_frame_number);
    }

    fn on_draw(&mut self, e: &DrawEvent) {
        self.header(TAG_DRAW);
        self.write_u64(e.source_frame_number);
        self.write_option_rect(e.damage);
        self.write_u32(e.item_count);
        match e.result {
            Some(result) => self.write_u8(1 + index_of(&DRAW_RESULTS, &result)),
            None => self.write_u8(0),
        }
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        self.header(TAG_SWAP);
        self.write_u64(e.source_frame_number);
        self.write_u8(u8::from(e.swapped));
    }

    fn on_promise(&mut self, e: &PromiseEvent) {
        self.header(TAG_PROMISE);
        self.write_u64(e.frame_number);
        self.write_u8(promise_code(e.resolution));
    }

    fn on_context(&mut self, e: &ContextEvent) {
        self.header(TAG_CONTEXT);
        self.write_u64(e.frame_number);
        self.write_u8(u8::from(e.recovered));
    }

    fn on_node_push(&mut self, e: &NodePushEvent) {
        self.header(TAG_NODE_PUSH);
        self.write_u64(e.frame_number);
        self.write_u64(e.node.to_bits());
        self.write_u8(u8::from(e.raster));
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`BeginFrameEvent`].
    BeginFrame(BeginFrameEvent),
    /// A [`StageEvent`].
    Stage(StageEvent),
    /// A [`CommitEvent`].
    Commit(CommitEvent),
    /// An [`AbortEvent`].
    Abort(AbortEvent),
    /// A [`SupersedeEvent`].
    Supersede(SupersedeEvent),
    /// An [`ActivateEvent`].
    Activate(ActivateEvent),
    /// A [`DrawEvent`].
    Draw(DrawEvent),
    /// A [`SwapEvent`].
    Swap(SwapEvent),
    /// A [`PromiseEvent`].
    Promise(PromiseEvent),
    /// A [`ContextEvent`].
    Context(ContextEvent),
    /// A [`NodePushEvent`].
    NodePush(NodePushEvent),
}

/// A decoded event and when it was recorded.
#[derive(Clone, Debug)]
pub struct Record {
    /// Nanoseconds since the recorder was created.
    pub at_nanos: u64,
    /// The event.
    pub event: RecordedEvent,
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`Record`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        if self.remaining() < 1 {
            return None;
        }
        let v = self.data[self.pos];
        self.pos += 1;
        Some(v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let v = u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().ok()?);
        self.pos += 4;
        Some(v)
    }

    fn read_u64(&mut self) -> Option<u64> {
        if self.remaining() < 8 {
            return None;
        }
        let v = u64::from_le_bytes(self.data[self.pos..self.pos + 8].try_into().ok()?);
        self.pos += 8;
        Some(v)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.read_u64().map(f64::from_bits)
    }

    fn read_bool(&mut self) -> Option<bool> {
        self.read_u8().map(|v| v != 0)
    }

    fn read_option_rect(&mut self) -> Option<Option<Rect>> {
        if self.read_u8()? == 0 {
            return Some(None);
        }
        Some(Some(Rect::new(
            self.read_f64()?,
            self.read_f64()?,
            self.read_f64()?,
            self.read_f64()?,
        )))
    }

    fn read_indexed<T: Copy>(&mut self, table: &[T]) -> Option<T> {
        table.get(usize::from(self.read_u8()?)).copied()
    }

    fn decode_event(&mut self, tag: u8) -> Option<RecordedEvent> {
        Some(match tag {
            TAG_BEGIN_FRAME => RecordedEvent::BeginFrame(BeginFrameEvent {
                frame_number: self.read_u64()?,
            }),
            TAG_STAGE => RecordedEvent::Stage(StageEvent {
                frame_number: self.read_u64()?,
                stage: self.read_indexed(&STAGES)?,
            }),
            TAG_COMMIT => RecordedEvent::Commit(CommitEvent {
                frame_number: self.read_u64()?,
                visited: self.read_u32()?,
                pushed: self.read_u32()?,
                removed: self.read_u32()?,
                rasters: self.read_u32()?,
            }),
            TAG_ABORT => RecordedEvent::Abort(AbortEvent {
                frame_number: self.read_u64()?,
                reason: self.read_indexed(&ABORT_REASONS)?,
            }),
            TAG_SUPERSEDE => RecordedEvent::Supersede(SupersedeEvent {
                superseded_frame: self.read_u64()?,
                by_frame: self.read_u64()?,
            }),
            TAG_ACTIVATE => RecordedEvent::Activate(ActivateEvent {
                source_frame_number: self.read_u64()?,
            }),
            TAG_DRAW => {
                let source_frame_number = self.read_u64()?;
                let damage = self.read_option_rect()?;
                let item_count = self.read_u32()?;
                let result = match self.read_u8()? {
                    0 => None,
                    code => Some(*DRAW_RESULTS.get(usize::from(code - 1))?),
                };
                RecordedEvent::Draw(DrawEvent {
                    source_frame_number,
                    damage,
                    item_count,
                    result,
                })
            }
            TAG_SWAP => RecordedEvent::Swap(SwapEvent {
                source_frame_number: self.read_u64()?,
                swapped: self.read_bool()?,
            }),
            TAG_PROMISE => RecordedEvent::Promise(PromiseEvent {
                frame_number: self.read_u64()?,
                resolution: promise_from_code(self.read_u8()?)?,
            }),
            TAG_CONTEXT => RecordedEvent::Context(ContextEvent {
                frame_number: self.read_u64()?,
                recovered: self.read_bool()?,
            }),
            TAG_NODE_PUSH => RecordedEvent::NodePush(NodePushEvent {
                frame_number: self.read_u64()?,
                node: NodeId::from_bits(self.read_u64()?),
                raster: self.read_bool()?,
            }),
            _ => return None, // unknown tag → stop iteration
        })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        let at_nanos = self.read_u64()?;
        let event = self.decode_event(tag)?;
        Some(Record { at_nanos, event })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
