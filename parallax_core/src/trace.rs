// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the render loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! coordinator calls at each lifecycle step. All method bodies default to
//! no-ops, so implementing only the events you care about is fine.
//!
//! Events originate on three threads (display/input, worker, immersive loop),
//! so sinks are shared as a [`SharedSink`]: an `Arc<Mutex<_>>` the
//! [`Tracer`] locks once per event.
//!
//! [`Tracer`] wraps an optional [`SharedSink`]. When the `trace` feature is
//! **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before locking and
//! dispatching.
//!
//! # Crate features
//!
//! - `trace` — enables the `Tracer` method bodies.

use std::sync::{Arc, Mutex};

use crate::compositor::LayerState;
use crate::engine::{EngineCall, RenderPath};
use crate::state::CoordinatorState;
use crate::time::HostTime;
use crate::touch::{TouchId, TouchPhase, TouchSlot};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Why a touch event was not forwarded to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TouchDropReason {
    /// A touch-down found every slot occupied.
    NoFreeSlot,
    /// A move, up, or cancel arrived for a touch with no slot.
    Untracked,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when the coordinator changes state.
#[derive(Clone, Copy, Debug)]
pub struct StateChangeEvent {
    /// State before the transition.
    pub from: CoordinatorState,
    /// State after the transition.
    pub to: CoordinatorState,
    /// Host time of the transition.
    pub timestamp: HostTime,
}

/// Emitted immediately before an engine frame method runs.
#[derive(Clone, Copy, Debug)]
pub struct EngineCallBeginEvent {
    /// Which engine method.
    pub call: EngineCall,
    /// Which path issued it.
    pub path: RenderPath,
    /// Frames rendered so far by this coordinator.
    pub frame_index: u64,
    /// Host time at the start of the call.
    pub timestamp: HostTime,
}

/// Emitted immediately after an engine frame method returns.
#[derive(Clone, Copy, Debug)]
pub struct EngineCallEndEvent {
    /// Which engine method.
    pub call: EngineCall,
    /// Which path issued it.
    pub path: RenderPath,
    /// Frame counter carried from the matching begin event.
    pub frame_index: u64,
    /// Host time at the end of the call.
    pub timestamp: HostTime,
    /// Whether the call returned `Ok`.
    pub ok: bool,
}

/// Emitted when the immersive loop observes a new compositor layer state.
///
/// Repeated observations of the same state are not reported.
#[derive(Clone, Copy, Debug)]
pub struct LayerStateEvent {
    /// Observed state.
    pub state: LayerState,
    /// Host time of the observation.
    pub timestamp: HostTime,
}

/// Emitted when a touch is forwarded to the engine.
#[derive(Clone, Copy, Debug)]
pub struct TouchForwardEvent {
    /// Phase of the source event.
    pub phase: TouchPhase,
    /// Slot the engine saw.
    pub slot: TouchSlot,
    /// Engine x coordinate.
    pub x: i32,
    /// Engine y coordinate.
    pub y: i32,
    /// Host time of forwarding.
    pub timestamp: HostTime,
}

/// Emitted when a touch event is dropped.
#[derive(Clone, Copy, Debug)]
pub struct TouchDropEvent {
    /// Phase of the dropped event.
    pub phase: TouchPhase,
    /// Platform identity of the touch.
    pub id: TouchId,
    /// Why it was dropped.
    pub reason: TouchDropReason,
    /// Host time of the drop.
    pub timestamp: HostTime,
}

/// Emitted when an engine frame method fails.
#[derive(Clone, Copy, Debug)]
pub struct EngineErrorEvent {
    /// Which engine method failed.
    pub call: EngineCall,
    /// Which path issued it.
    pub path: RenderPath,
    /// Host time of the failure.
    pub timestamp: HostTime,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the render loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called after a coordinator state transition.
    fn on_state_change(&mut self, e: &StateChangeEvent) {
        _ = e;
    }

    /// Called before an engine frame method runs.
    fn on_engine_call_begin(&mut self, e: &EngineCallBeginEvent) {
        _ = e;
    }

    /// Called after an engine frame method returns.
    fn on_engine_call_end(&mut self, e: &EngineCallEndEvent) {
        _ = e;
    }

    /// Called when the immersive loop sees a new layer state.
    fn on_layer_state(&mut self, e: &LayerStateEvent) {
        _ = e;
    }

    /// Called when a touch is forwarded to the engine.
    fn on_touch_forward(&mut self, e: &TouchForwardEvent) {
        _ = e;
    }

    /// Called when a touch is dropped.
    fn on_touch_drop(&mut self, e: &TouchDropEvent) {
        _ = e;
    }

    /// Called when an engine frame method fails.
    fn on_engine_error(&mut self, e: &EngineErrorEvent) {
        _ = e;
    }
}

/// A trace sink shared between the threads of one coordinator.
pub type SharedSink = Arc<Mutex<dyn TraceSink + Send>>;

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`SharedSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
/// When **on**, each method checks the inner `Option` (one branch) before
/// locking the sink and dispatching.
#[derive(Clone, Default)]
pub struct Tracer {
    #[cfg(feature = "trace")]
    sink: Option<SharedSink>,
}

impl core::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $event:ident) => {{
        #[cfg(feature = "trace")]
        if let Some(sink) = &$self.sink {
            sink.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .$method($event);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = $event;
        }
    }};
}

impl Tracer {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: SharedSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {}
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Emits a [`StateChangeEvent`].
    #[inline]
    pub fn state_change(&self, e: &StateChangeEvent) {
        dispatch!(self, on_state_change, e);
    }

    /// Emits an [`EngineCallBeginEvent`].
    #[inline]
    pub fn engine_call_begin(&self, e: &EngineCallBeginEvent) {
        dispatch!(self, on_engine_call_begin, e);
    }

    /// Emits an [`EngineCallEndEvent`].
    #[inline]
    pub fn engine_call_end(&self, e: &EngineCallEndEvent) {
        dispatch!(self, on_engine_call_end, e);
    }

    /// Emits a [`LayerStateEvent`].
    #[inline]
    pub fn layer_state(&self, e: &LayerStateEvent) {
        dispatch!(self, on_layer_state, e);
    }

    /// Emits a [`TouchForwardEvent`].
    #[inline]
    pub fn touch_forward(&self, e: &TouchForwardEvent) {
        dispatch!(self, on_touch_forward, e);
    }

    /// Emits a [`TouchDropEvent`].
    #[inline]
    pub fn touch_drop(&self, e: &TouchDropEvent) {
        dispatch!(self, on_touch_drop, e);
    }

    /// Emits an [`EngineErrorEvent`].
    #[inline]
    pub fn engine_error(&self, e: &EngineErrorEvent) {
        dispatch!(self, on_engine_error, e);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_begin() -> EngineCallBeginEvent {
        EngineCallBeginEvent {
            call: EngineCall::Render,
            path: RenderPath::Windowed,
            frame_index: 3,
            timestamp: HostTime(1_000),
        }
    }

    #[test]
    fn noop_sink_compiles() {
        let mut sink = NoopSink;
        sink.on_engine_call_begin(&sample_begin());
        sink.on_state_change(&StateChangeEvent {
            from: CoordinatorState::Idle,
            to: CoordinatorState::WindowedActive,
            timestamp: HostTime(0),
        });
        sink.on_touch_drop(&TouchDropEvent {
            phase: TouchPhase::Down,
            id: TouchId(1),
            reason: TouchDropReason::NoFreeSlot,
            timestamp: HostTime(0),
        });
    }

    #[test]
    fn tracer_none_does_nothing() {
        let tracer = Tracer::none();
        tracer.engine_call_begin(&sample_begin());
        tracer.layer_state(&LayerStateEvent {
            state: LayerState::Paused,
            timestamp: HostTime(5),
        });
    }

    #[cfg(feature = "trace")]
    #[test]
    fn tracer_dispatches_to_shared_sink() {
        #[derive(Default)]
        struct RecordingSink {
            frames: Vec<u64>,
        }
        impl TraceSink for RecordingSink {
            fn on_engine_call_begin(&mut self, e: &EngineCallBeginEvent) {
                self.frames.push(e.frame_index);
            }
        }

        let sink = Arc::new(Mutex::new(RecordingSink::default()));
        let tracer = Tracer::new(sink.clone());
        let worker_tracer = tracer.clone();
        std::thread::spawn(move || worker_tracer.engine_call_begin(&sample_begin()))
            .join()
            .unwrap();
        tracer.engine_call_begin(&sample_begin());
        assert_eq!(sink.lock().unwrap().frames, [3, 3]);
    }
}
