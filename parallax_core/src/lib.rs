// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-loop orchestration for windowed and immersive spatial rendering.
//!
//! `parallax_core` decides *when* and *on which thread* a native rendering
//! engine produces frames. It decouples two timing sources, a
//! display-synchronized callback (windowed) and a compositor layer's
//! lifecycle (immersive), from the threads that call into the engine.
//!
//! # Architecture
//!
//! ```text
//!   display callback          compositor layer             touch input
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//!   on_display_sync()        begin_immersive(layer)       handle_touch()
//!         │                          │                          │
//!         ▼                          ▼                          ▼
//!   WorkerThread ─────┐      immersive loop thread       TouchSlotTable
//!   (queued frames)   │      (Running/Paused/Invalid)           │
//!                     ▼              │                          │
//!                RenderEngine ◄──────┘◄─────────────────────────┘
//! ```
//!
//! **[`work`]** — Single-consumer FIFO drained by one named worker thread,
//! with a `barrier` fence.
//!
//! **[`coordinator`]** — [`RenderCoordinator`](coordinator::RenderCoordinator):
//! the state machine that owns the worker, the immersive loop, and the touch
//! table. At most one engine frame call is in flight at any time.
//!
//! **[`immersive`]** — The compositor-driven loop body, its
//! [`CancelToken`](immersive::CancelToken) and
//! [`LoopExit`](immersive::LoopExit).
//!
//! **[`state`]** — Coordinator states and render modes.
//!
//! **[`touch`]** — Platform touch identities multiplexed onto a fixed set of
//! engine pointer slots.
//!
//! **[`engine`]** / **[`compositor`]** — Contracts for the external
//! collaborators.
//!
//! **[`time`]** — Monotonic host timestamps for trace events.
//!
//! **[`trace`]** — [`TraceSink`](trace::TraceSink) trait and event types for
//! render-loop instrumentation, with zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod compositor;
pub mod coordinator;
pub mod engine;
pub mod immersive;
pub mod state;
pub mod time;
pub mod touch;
pub mod trace;
pub mod work;
