// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Engine calls become duration slices on one track per render path, so a
//! windowed frame overlapping an immersive frame is visible at a glance.
//! Touches land on their own track.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use parallax_core::engine::RenderPath;
use parallax_core::time::Timebase;

use crate::recorder::{RecordedEvent, decode};

const TID_LIFECYCLE: u32 = 0;
const TID_WINDOWED: u32 = 1;
const TID_IMMERSIVE: u32 = 2;
const TID_INPUT: u32 = 3;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = [
        (TID_LIFECYCLE, "lifecycle"),
        (TID_WINDOWED, "windowed"),
        (TID_IMMERSIVE, "immersive"),
        (TID_INPUT, "input"),
    ]
    .into_iter()
    .map(|(tid, name)| {
        json!({
            "ph": "M",
            "name": "thread_name",
            "pid": 0,
            "tid": tid,
            "args": { "name": name }
        })
    })
    .collect();

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::StateChange(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": format!("{:?}", e.to),
                    "cat": "State",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": TID_LIFECYCLE,
                    "s": "g",
                    "args": {
                        "from": format!("{:?}", e.from),
                    }
                }));
            }
            RecordedEvent::EngineCallBegin(e) => {
                events.push(json!({
                    "ph": "B",
                    "name": e.call.as_str(),
                    "cat": "Engine",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": path_tid(e.path),
                    "args": {
                        "frame_index": e.frame_index,
                    }
                }));
            }
            RecordedEvent::EngineCallEnd(e) => {
                events.push(json!({
                    "ph": "E",
                    "name": e.call.as_str(),
                    "cat": "Engine",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": path_tid(e.path),
                    "args": {
                        "frame_index": e.frame_index,
                        "ok": e.ok,
                    }
                }));
            }
            RecordedEvent::LayerState(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": format!("{:?}", e.state),
                    "cat": "Layer",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": TID_IMMERSIVE,
                    "s": "t",
                }));
            }
            RecordedEvent::TouchForward(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": format!("touch {:?}", e.phase),
                    "cat": "Input",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": TID_INPUT,
                    "s": "t",
                    "args": {
                        "slot": e.slot.0,
                        "x": e.x,
                        "y": e.y,
                    }
                }));
            }
            RecordedEvent::TouchDrop(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "touch dropped",
                    "cat": "Input",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": TID_INPUT,
                    "s": "t",
                    "args": {
                        "phase": format!("{:?}", e.phase),
                        "id": e.id.0,
                        "reason": format!("{:?}", e.reason),
                    }
                }));
            }
            RecordedEvent::EngineError(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": format!("{} failed", e.call.as_str()),
                    "cat": "Error",
                    "ts": ticks_to_us(e.timestamp.ticks(), timebase),
                    "pid": 0,
                    "tid": path_tid(e.path),
                    "s": "g",
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn path_tid(path: RenderPath) -> u32 {
    match path {
        RenderPath::Windowed => TID_WINDOWED,
        RenderPath::Immersive => TID_IMMERSIVE,
        RenderPath::Lifecycle => TID_LIFECYCLE,
    }
}

fn ticks_to_us(ticks: u64, timebase: Timebase) -> f64 {
    timebase.ticks_to_nanos(ticks) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use parallax_core::compositor::LayerState;
    use parallax_core::engine::EngineCall;
    use parallax_core::time::HostTime;
    use parallax_core::trace::{
        EngineCallBeginEvent, EngineCallEndEvent, LayerStateEvent, TraceSink,
    };

    fn exported(rec: &RecorderSink) -> Vec<Value> {
        let mut out = Vec::new();
        export(rec.as_bytes(), Timebase::NANOS, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        serde_json::from_str(&json_str).unwrap()
    }

    #[test]
    fn export_puts_paths_on_separate_tracks() {
        let mut rec = RecorderSink::new();
        rec.on_engine_call_begin(&EngineCallBeginEvent {
            call: EngineCall::Render,
            path: RenderPath::Windowed,
            frame_index: 0,
            timestamp: HostTime(1_000_000),
        });
        rec.on_engine_call_end(&EngineCallEndEvent {
            call: EngineCall::Render,
            path: RenderPath::Windowed,
            frame_index: 0,
            timestamp: HostTime(1_000_100),
            ok: true,
        });
        rec.on_layer_state(&LayerStateEvent {
            state: LayerState::Running,
            timestamp: HostTime(2_000_000),
        });

        let parsed = exported(&rec);
        // Four track-name metadata records, then the events.
        assert_eq!(parsed.len(), 7);
        assert_eq!(parsed[0]["ph"], "M");

        assert_eq!(parsed[4]["ph"], "B");
        assert_eq!(parsed[4]["name"], "render");
        assert_eq!(parsed[4]["tid"], TID_WINDOWED);
        assert_eq!(parsed[4]["ts"], 1000.0);

        assert_eq!(parsed[5]["ph"], "E");
        assert_eq!(parsed[5]["args"]["ok"], true);

        assert_eq!(parsed[6]["name"], "Running");
        assert_eq!(parsed[6]["tid"], TID_IMMERSIVE);
    }

    #[test]
    fn export_empty_recording() {
        let parsed = exported(&RecorderSink::new());
        assert!(parsed.iter().all(|event| event["ph"] == "M"));
    }
}
