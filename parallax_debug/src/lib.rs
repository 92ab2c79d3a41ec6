// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording, pretty-printing, and Chrome trace export for parallax
//! render-loop diagnostics.
//!
//! This crate provides [`TraceSink`](parallax_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`] — human-readable one-line-per-event output.
//! - [`recorder::RecorderSink`] — compact binary recording with
//!   [`recorder::decode`] for playback.
//! - [`chrome::export`] — writes Chrome Trace Event Format JSON from recorded
//!   bytes, one track per render path.
//!
//! Sinks are plain values; wrap one in `Arc<Mutex<_>>` to hand it to a
//! [`Tracer`](parallax_core::trace::Tracer).

pub mod chrome;
pub mod pretty;
pub mod recorder;
