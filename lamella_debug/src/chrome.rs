// Copyright 2026 the Lamella Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Producer-side stages of a frame attempt (`Start` through `End`) become an
//! async span keyed by frame number on the "Producer" track, since attempts
//! overlap in pipelined mode. Everything the consumer does is an instant
//! event on the "Consumer" track.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use lamella_core::trace::PipelineStage;
use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

const PRODUCER_TID: u32 = 0;
const CONSUMER_TID: u32 = 1;

fn is_producer_stage(stage: PipelineStage) -> bool {
    matches!(
        stage,
        PipelineStage::Start
            | PipelineStage::Animate
            | PipelineStage::UpdateContent
            | PipelineStage::Commit
            | PipelineStage::Aborted
            | PipelineStage::End
    )
}

fn instant(name: &str, cat: &str, ts: f64, tid: u32, args: Value) -> Value {
    json!({
        "ph": "i",
        "name": name,
        "cat": cat,
        "ts": ts,
        "pid": 0,
        "tid": tid,
        "s": "t",
        "args": args,
    })
}

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
/// Timestamps are the recorder's elapsed time in microseconds.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = vec![
        json!({"ph": "M", "name": "thread_name", "pid": 0, "tid": PRODUCER_TID,
               "args": {"name": "Producer"}}),
        json!({"ph": "M", "name": "thread_name", "pid": 0, "tid": CONSUMER_TID,
               "args": {"name": "Consumer"}}),
    ];

    for record in decode(bytes) {
        let ts = nanos_to_us(record.at_nanos);
        match record.event {
            RecordedEvent::BeginFrame(_) => {
                // The Start stage that follows opens the span.
            }
            RecordedEvent::Stage(e) if is_producer_stage(e.stage) => {
                let (ph, name) = match e.stage {
                    PipelineStage::Start => ("b", "Frame".to_owned()),
                    PipelineStage::End => ("e", "Frame".to_owned()),
                    stage => ("n", format!("{stage:?}")),
                };
                events.push(json!({
                    "ph": ph,
                    "name": name,
                    "cat": "Producer",
                    "id": e.frame_number,
                    "ts": ts,
                    "pid": 0,
                    "tid": PRODUCER_TID,
                    "args": { "frame_number": e.frame_number },
                }));
            }
            RecordedEvent::Stage(e) => {
                events.push(instant(
                    &format!("{:?}", e.stage),
                    "Stage",
                    ts,
                    CONSUMER_TID,
                    json!({ "frame_number": e.frame_number }),
                ));
            }
            RecordedEvent::Commit(e) => {
                events.push(instant(
                    "Commit",
                    "Producer",
                    ts,
                    PRODUCER_TID,
                    json!({
                        "frame_number": e.frame_number,
                        "visited": e.visited,
                        "pushed": e.pushed,
                        "removed": e.removed,
                        "rasters": e.rasters,
                    }),
                ));
            }
            RecordedEvent::Abort(e) => {
                events.push(instant(
                    "Abort",
                    "Producer",
                    ts,
                    PRODUCER_TID,
                    json!({
                        "frame_number": e.frame_number,
                        "reason": format!("{:?}", e.reason),
                    }),
                ));
            }
            RecordedEvent::Supersede(e) => {
                events.push(instant(
                    "Supersede",
                    "Consumer",
                    ts,
                    CONSUMER_TID,
                    json!({
                        "superseded_frame": e.superseded_frame,
                        "by_frame": e.by_frame,
                    }),
                ));
            }
            RecordedEvent::Activate(e) => {
                events.push(instant(
                    "Activate",
                    "Consumer",
                    ts,
                    CONSUMER_TID,
                    json!({ "source_frame_number": e.source_frame_number }),
                ));
            }
            RecordedEvent::Draw(e) => {
                let damage = e
                    .damage
                    .map(|r| json!([r.x0, r.y0, r.x1, r.y1]))
                    .unwrap_or(Value::Null);
                events.push(instant(
                    "Draw",
                    "Consumer",
                    ts,
                    CONSUMER_TID,
                    json!({
                        "source_frame_number": e.source_frame_number,
                        "damage": damage,
                        "items": e.item_count,
                        "result": e.result.map(|r| format!("{r:?}")),
                    }),
                ));
            }
            RecordedEvent::Swap(e) => {
                events.push(instant(
                    if e.swapped { "Swap" } else { "NoSwap" },
                    "Consumer",
                    ts,
                    CONSUMER_TID,
                    json!({ "source_frame_number": e.source_frame_number }),
                ));
            }
            RecordedEvent::Promise(e) => {
                events.push(instant(
                    "Promise",
                    "Promise",
                    ts,
                    CONSUMER_TID,
                    json!({
                        "frame_number": e.frame_number,
                        "resolution": format!("{:?}", e.resolution),
                    }),
                ));
            }
            RecordedEvent::Context(e) => {
                events.push(instant(
                    if e.recovered { "ContextRecovered" } else { "ContextLost" },
                    "Consumer",
                    ts,
                    CONSUMER_TID,
                    json!({ "frame_number": e.frame_number }),
                ));
            }
            RecordedEvent::NodePush(e) => {
                events.push(instant(
                    "NodePush",
                    "Rich",
                    ts,
                    PRODUCER_TID,
                    json!({
                        "frame_number": e.frame_number,
                        "node": e.node.index(),
                        "generation": e.node.generation(),
                        "raster": e.raster,
                    }),
                ));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use lamella_core::trace::{AbortEvent, CommitAbortReason, StageEvent, TraceSink};

    use super::*;
    use crate::recorder::RecorderSink;

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_stage(&StageEvent {
            frame_number: 1,
            stage: PipelineStage::Start,
        });
        rec.on_stage(&StageEvent {
            frame_number: 1,
            stage: PipelineStage::Commit,
        });
        rec.on_abort(&AbortEvent {
            frame_number: 1,
            reason: CommitAbortReason::NoUpdate,
        });
        rec.on_stage(&StageEvent {
            frame_number: 1,
            stage: PipelineStage::Draw,
        });
        rec.on_stage(&StageEvent {
            frame_number: 1,
            stage: PipelineStage::End,
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        // Two metadata records, then one per event.
        assert_eq!(parsed.len(), 7);

        assert_eq!(parsed[2]["ph"], "b");
        assert_eq!(parsed[2]["id"], 1);
        assert_eq!(parsed[3]["ph"], "n");
        assert_eq!(parsed[3]["name"], "Commit");
        assert_eq!(parsed[4]["name"], "Abort");
        assert_eq!(parsed[4]["args"]["reason"], "NoUpdate");
        assert_eq!(parsed[5]["tid"], CONSUMER_TID);
        assert_eq!(parsed[6]["ph"], "e");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        assert!(parsed.iter().all(|e| e["ph"] == "M"));
    }
}
