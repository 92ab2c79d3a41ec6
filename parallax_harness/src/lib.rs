// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collaborator doubles for exercising render loops.
//!
//! - [`RecordingEngine`] logs every engine call with the calling thread's
//!   name, counts overlapping frame calls, and can inject failures and
//!   render latency.
//! - [`ScriptedLayer`] replays a fixed sequence of layer states, one per
//!   `state()` read.
//! - [`ManualLayer`] is driven from the test thread and blocks in
//!   `wait_until_running` like a real compositor.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use parallax_core::compositor::{CompositorLayer, LayerState};
use parallax_core::engine::{EngineError, RenderEngine};
use parallax_core::touch::TouchSlot;

// ---------------------------------------------------------------------------
// RecordingEngine
// ---------------------------------------------------------------------------

/// One engine call as seen by [`RecordingEngine`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Call {
    /// `initialize()`.
    Initialize,
    /// `render()`.
    Render,
    /// `shutdown()`.
    Shutdown,
    /// `touch_down(slot, x, y)`.
    TouchDown(TouchSlot, i32, i32),
    /// `touch_move(slot, x, y)`.
    TouchMove(TouchSlot, i32, i32),
    /// `touch_up(slot, x, y)`.
    TouchUp(TouchSlot, i32, i32),
}

impl Call {
    /// Returns `true` for `initialize`, `render`, and `shutdown`.
    #[must_use]
    pub const fn is_frame_call(self) -> bool {
        matches!(self, Self::Initialize | Self::Render | Self::Shutdown)
    }
}

/// A logged call and the name of the thread that made it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    /// The call.
    pub call: Call,
    /// Name of the calling thread, if it had one.
    pub thread: Option<String>,
}

/// A [`RenderEngine`] that records what the coordinator asks of it.
///
/// Calls are logged on entry. Frame calls that start while another frame
/// call is still running are counted in [`overlaps`](Self::overlaps).
#[derive(Debug, Default)]
pub struct RecordingEngine {
    log: Mutex<Vec<CallRecord>>,
    logged: Condvar,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
    renders: AtomicUsize,
    render_delay: Duration,
    fail_render_at: Option<usize>,
    panic_render_at: Option<usize>,
    fail_initialize: bool,
}

impl RecordingEngine {
    /// Creates an engine whose calls all succeed immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `render()` take at least `delay`.
    #[must_use]
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    /// Makes the `n`th `render()` (zero-based) and every later one fail.
    #[must_use]
    pub fn failing_render_at(mut self, n: usize) -> Self {
        self.fail_render_at = Some(n);
        self
    }

    /// Makes the `n`th `render()` (zero-based) panic.
    #[must_use]
    pub fn panicking_render_at(mut self, n: usize) -> Self {
        self.panic_render_at = Some(n);
        self
    }

    /// Makes every `initialize()` fail.
    #[must_use]
    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Returns every logged call in order.
    #[must_use]
    pub fn records(&self) -> Vec<CallRecord> {
        self.lock_log().clone()
    }

    /// Returns every logged call in order, without thread names.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock_log().iter().map(|record| record.call).collect()
    }

    /// Returns the logged `initialize`, `render`, and `shutdown` calls.
    #[must_use]
    pub fn frame_calls(&self) -> Vec<Call> {
        self.lock_log()
            .iter()
            .map(|record| record.call)
            .filter(|call| call.is_frame_call())
            .collect()
    }

    /// Returns how many times `call` was logged.
    #[must_use]
    pub fn count(&self, call: Call) -> usize {
        self.lock_log()
            .iter()
            .filter(|record| record.call == call)
            .count()
    }

    /// Returns how many frame calls started while another was running.
    #[must_use]
    pub fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    /// Blocks until `done` holds for the log, or `timeout` elapses.
    ///
    /// Returns whether `done` held.
    pub fn wait_until(&self, timeout: Duration, done: impl Fn(&[CallRecord]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut log = self.lock_log();
        loop {
            if done(&log) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            log = self
                .logged
                .wait_timeout(log, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Blocks until `call` was logged at least `n` times.
    pub fn wait_for(&self, call: Call, n: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, |log| {
            log.iter().filter(|record| record.call == call).count() >= n
        })
    }

    fn record(&self, call: Call) {
        let thread = thread::current().name().map(str::to_owned);
        self.lock_log().push(CallRecord { call, thread });
        self.logged.notify_all();
    }

    fn frame_call<T>(&self, call: Call, body: impl FnOnce() -> T) -> T {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.record(call);
        let result = body();
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    fn lock_log(&self) -> MutexGuard<'_, Vec<CallRecord>> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RenderEngine for RecordingEngine {
    fn initialize(&self) -> Result<(), EngineError> {
        self.frame_call(Call::Initialize, || {
            if self.fail_initialize {
                Err(EngineError::InitializeFailed("scripted failure".into()))
            } else {
                Ok(())
            }
        })
    }

    fn render(&self) -> Result<(), EngineError> {
        self.frame_call(Call::Render, || {
            let index = self.renders.fetch_add(1, Ordering::SeqCst);
            if !self.render_delay.is_zero() {
                thread::sleep(self.render_delay);
            }
            if self.panic_render_at == Some(index) {
                self.in_flight.store(false, Ordering::SeqCst);
                panic!("scripted panic at frame {index}");
            }
            match self.fail_render_at {
                Some(at) if index >= at => {
                    Err(EngineError::RenderFailed(format!("scripted failure at frame {index}")))
                }
                _ => Ok(()),
            }
        })
    }

    fn shutdown(&self) {
        self.frame_call(Call::Shutdown, || ());
    }

    fn touch_down(&self, slot: TouchSlot, x: i32, y: i32) {
        self.record(Call::TouchDown(slot, x, y));
    }

    fn touch_move(&self, slot: TouchSlot, x: i32, y: i32) {
        self.record(Call::TouchMove(slot, x, y));
    }

    fn touch_up(&self, slot: TouchSlot, x: i32, y: i32) {
        self.record(Call::TouchUp(slot, x, y));
    }
}

// ---------------------------------------------------------------------------
// ScriptedLayer
// ---------------------------------------------------------------------------

/// A [`CompositorLayer`] that replays a fixed sequence of states.
///
/// Each `state()` call consumes one entry; the final entry repeats forever.
/// An empty script reads as [`LayerState::Invalidated`].
/// `wait_until_running` returns immediately.
#[derive(Debug)]
pub struct ScriptedLayer {
    script: Mutex<VecDeque<LayerState>>,
    waits: AtomicUsize,
    interrupts: AtomicUsize,
}

impl ScriptedLayer {
    /// Creates a layer that replays `script`.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = LayerState>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            waits: AtomicUsize::new(0),
            interrupts: AtomicUsize::new(0),
        }
    }

    /// Returns how many times the loop waited for the layer to run.
    #[must_use]
    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    /// Returns how many times the layer was interrupted.
    #[must_use]
    pub fn interrupts(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }
}

impl CompositorLayer for ScriptedLayer {
    fn state(&self) -> LayerState {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        if script.len() > 1 {
            script.pop_front().unwrap_or(LayerState::Invalidated)
        } else {
            script.front().copied().unwrap_or(LayerState::Invalidated)
        }
    }

    fn wait_until_running(&self) {
        self.waits.fetch_add(1, Ordering::SeqCst);
    }

    fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// ManualLayer
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct ManualState {
    layer: LayerState,
    interrupted: bool,
    waiters: usize,
}

/// A [`CompositorLayer`] whose state is set by the test.
///
/// `wait_until_running` blocks while the layer is paused, until
/// [`set`](Self::set) moves it on or [`interrupt`](CompositorLayer::interrupt)
/// is called. An interrupt is sticky: later waits return immediately.
#[derive(Debug)]
pub struct ManualLayer {
    state: Mutex<ManualState>,
    changed: Condvar,
}

impl ManualLayer {
    /// Creates a layer in `initial` state.
    #[must_use]
    pub fn new(initial: LayerState) -> Self {
        Self {
            state: Mutex::new(ManualState {
                layer: initial,
                interrupted: false,
                waiters: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Moves the layer to `layer` and wakes any waiter.
    pub fn set(&self, layer: LayerState) {
        self.lock().layer = layer;
        self.changed.notify_all();
    }

    /// Blocks until a thread is parked in `wait_until_running`, or `timeout`
    /// elapses. Returns whether a waiter was seen.
    pub fn wait_for_waiter(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.waiters == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CompositorLayer for ManualLayer {
    fn state(&self) -> LayerState {
        self.lock().layer
    }

    fn wait_until_running(&self) {
        let mut state = self.lock();
        state.waiters += 1;
        self.changed.notify_all();
        while state.layer == LayerState::Paused && !state.interrupted {
            state = self
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.waiters -= 1;
    }

    fn interrupt(&self) {
        self.lock().interrupted = true;
        self.changed.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn scripted_layer_repeats_last_state() {
        let layer = ScriptedLayer::new([LayerState::Running, LayerState::Paused]);
        assert_eq!(layer.state(), LayerState::Running);
        assert_eq!(layer.state(), LayerState::Paused);
        assert_eq!(layer.state(), LayerState::Paused);

        let empty = ScriptedLayer::new([]);
        assert_eq!(empty.state(), LayerState::Invalidated);
    }

    #[test]
    fn recording_engine_fails_from_requested_frame() {
        let engine = RecordingEngine::new().failing_render_at(1);
        assert!(engine.render().is_ok());
        assert!(engine.render().is_err());
        assert!(engine.render().is_err());
        assert_eq!(engine.count(Call::Render), 3);
        assert_eq!(engine.overlaps(), 0);
    }

    #[test]
    fn recording_engine_detects_overlap() {
        let engine = Arc::new(RecordingEngine::new().with_render_delay(Duration::from_millis(50)));
        let other = Arc::clone(&engine);
        let handle = thread::spawn(move || other.render());
        assert!(engine.wait_for(Call::Render, 1, Duration::from_secs(5)));
        engine.initialize().unwrap();
        handle.join().unwrap().unwrap();
        assert_eq!(engine.overlaps(), 1);
    }

    #[test]
    fn touches_are_not_frame_calls() {
        let engine = RecordingEngine::new();
        engine.touch_down(TouchSlot(0), 1, 2);
        engine.shutdown();
        assert_eq!(engine.frame_calls(), [Call::Shutdown]);
        assert_eq!(engine.calls()[0], Call::TouchDown(TouchSlot(0), 1, 2));
    }

    #[test]
    fn manual_layer_wait_ends_on_interrupt() {
        let layer = Arc::new(ManualLayer::new(LayerState::Paused));
        let waiter = Arc::clone(&layer);
        let handle = thread::spawn(move || waiter.wait_until_running());
        assert!(layer.wait_for_waiter(Duration::from_secs(5)));
        layer.interrupt();
        handle.join().unwrap();
        // Sticky: does not block again.
        layer.wait_until_running();
    }

    #[test]
    fn manual_layer_wait_ends_on_resume() {
        let layer = Arc::new(ManualLayer::new(LayerState::Paused));
        let waiter = Arc::clone(&layer);
        let handle = thread::spawn(move || waiter.wait_until_running());
        assert!(layer.wait_for_waiter(Duration::from_secs(5)));
        layer.set(LayerState::Running);
        handle.join().unwrap();
        assert_eq!(layer.state(), LayerState::Running);
    }
}
