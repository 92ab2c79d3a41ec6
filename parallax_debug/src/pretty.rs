// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use parallax_core::time::{HostTime, Timebase};
use parallax_core::trace::{
    EngineCallBeginEvent, EngineCallEndEvent, EngineErrorEvent, LayerStateEvent,
    StateChangeEvent, TouchDropEvent, TouchForwardEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }

    /// Creates a sink that writes to stdout.
    #[must_use]
    pub fn stdout(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
            timebase,
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its writer.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.timebase.ticks_to_nanos(t.ticks()) as f64 / 1000.0
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_state_change(&mut self, e: &StateChangeEvent) {
        let _ = writeln!(
            self.writer,
            "[state] {:?} -> {:?} at {:.1}µs",
            e.from,
            e.to,
            self.host_us(e.timestamp),
        );
    }

    fn on_engine_call_begin(&mut self, e: &EngineCallBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[call:begin] {} path={} frame={} at {:.1}µs",
            e.call.as_str(),
            e.path.as_str(),
            e.frame_index,
            self.host_us(e.timestamp),
        );
    }

    fn on_engine_call_end(&mut self, e: &EngineCallEndEvent) {
        let outcome = if e.ok { "ok" } else { "FAILED" };
        let _ = writeln!(
            self.writer,
            "[call:end] {} path={} frame={} {outcome} at {:.1}µs",
            e.call.as_str(),
            e.path.as_str(),
            e.frame_index,
            self.host_us(e.timestamp),
        );
    }

    fn on_layer_state(&mut self, e: &LayerStateEvent) {
        let _ = writeln!(
            self.writer,
            "[layer] {:?} at {:.1}µs",
            e.state,
            self.host_us(e.timestamp),
        );
    }

    fn on_touch_forward(&mut self, e: &TouchForwardEvent) {
        let _ = writeln!(
            self.writer,
            "[touch] {:?} slot={} ({}, {})",
            e.phase, e.slot.0, e.x, e.y,
        );
    }

    fn on_touch_drop(&mut self, e: &TouchDropEvent) {
        let _ = writeln!(
            self.writer,
            "[touch:drop] {:?} {:?} reason={:?}",
            e.phase, e.id, e.reason,
        );
    }

    fn on_engine_error(&mut self, e: &EngineErrorEvent) {
        let _ = writeln!(
            self.writer,
            "[error] {} failed on {} path at {:.1}µs",
            e.call.as_str(),
            e.path.as_str(),
            self.host_us(e.timestamp),
        );
    }
}
