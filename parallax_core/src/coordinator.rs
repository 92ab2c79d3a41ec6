// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The render coordinator.
//!
//! [`RenderCoordinator`] owns the render worker, the immersive loop thread,
//! the touch slot table, and the render state. It decides on which thread
//! each engine call happens:
//!
//! - **Windowed**: display-sync callbacks submit `render()` closures to the
//!   worker. Each closure re-checks the state when it runs, so a frame queued
//!   before a mode switch is skipped rather than rendered.
//! - **Immersive**: a dedicated loop thread calls `initialize()` and
//!   `render()` directly while the compositor layer runs.
//!
//! Switching to immersive stores `ImmersiveActive` and then fences the worker
//! before the loop thread starts, so the two paths never issue frame calls at
//! the same time.
//!
//! Engine failures on either path are recorded (see
//! [`take_error`](RenderCoordinator::take_error)), logged, traced, and end
//! rendering: the engine is shut down and the coordinator moves to
//! `ShuttingDown`.

use core::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::compositor::CompositorLayer;
use crate::engine::{EngineCall, EngineError, RenderEngine, RenderPath};
use crate::immersive::{self, CancelToken, ExitPublisher, ExitSlot, LoopExit};
use crate::state::{AtomicState, CoordinatorState, RenderMode};
use crate::time::Clock;
use crate::touch::{TouchEvent, TouchPhase, TouchSlot, TouchSlotTable};
use crate::trace::{
    EngineCallBeginEvent, EngineCallEndEvent, EngineErrorEvent, StateChangeEvent,
    TouchDropEvent, TouchDropReason, TouchForwardEvent, Tracer,
};
use crate::work::{WorkerConfig, WorkerError, WorkerThread};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`RenderCoordinator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Render worker configuration.
    pub worker: WorkerConfig,
    /// Number of logical pointer slots.
    pub touch_slots: usize,
    /// Name given to the immersive loop thread.
    pub immersive_thread_name: &'static str,
}

impl CoordinatorConfig {
    /// Name of the immersive loop thread in both presets.
    pub const IMMERSIVE_THREAD_NAME: &'static str = "ImmersiveRenderLoop";

    /// Polling worker with ten touch slots.
    #[must_use]
    pub const fn reference() -> Self {
        Self {
            worker: WorkerConfig::polling(),
            touch_slots: TouchSlotTable::DEFAULT_CAPACITY,
            immersive_thread_name: Self::IMMERSIVE_THREAD_NAME,
        }
    }
}

impl Default for CoordinatorConfig {
    /// Parked worker with ten touch slots.
    fn default() -> Self {
        Self {
            worker: WorkerConfig::parked(),
            touch_slots: TouchSlotTable::DEFAULT_CAPACITY,
            immersive_thread_name: Self::IMMERSIVE_THREAD_NAME,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error returned by [`RenderCoordinator`] lifecycle operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The operation is not allowed in the current state.
    InvalidState {
        /// Name of the rejected operation.
        op: &'static str,
        /// State the coordinator was in.
        state: CoordinatorState,
    },
    /// The render worker refused the request.
    Worker(WorkerError),
    /// The operation would wait on the render worker from the worker itself.
    OnWorkerThread,
    /// The immersive loop thread could not be spawned.
    Spawn(io::ErrorKind),
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState { op, state } => write!(f, "cannot {op} while {state:?}"),
            Self::Worker(err) => write!(f, "render worker: {err}"),
            Self::OnWorkerThread => f.write_str("called from the render worker thread"),
            Self::Spawn(kind) => write!(f, "failed to spawn immersive loop thread: {kind}"),
        }
    }
}

impl core::error::Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Worker(err) => Some(err),
            _ => None,
        }
    }
}

impl From<WorkerError> for CoordinatorError {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::OnWorkerThread => Self::OnWorkerThread,
            other => Self::Worker(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared with the worker closures and the immersive loop thread.
pub(crate) struct Inner<E> {
    engine: E,
    state: AtomicState,
    /// Set once an `initialize()` call has started.
    engine_started: AtomicBool,
    /// Set once `shutdown()` has been issued.
    engine_down: AtomicBool,
    frames: AtomicU64,
    last_error: Mutex<Option<EngineError>>,
    pub(crate) tracer: Tracer,
    pub(crate) clock: Clock,
}

impl<E: RenderEngine> Inner<E> {
    fn new(engine: E, tracer: Tracer) -> Self {
        Self {
            engine,
            state: AtomicState::new(CoordinatorState::Idle),
            engine_started: AtomicBool::new(false),
            engine_down: AtomicBool::new(false),
            frames: AtomicU64::new(0),
            last_error: Mutex::new(None),
            tracer,
            clock: Clock::new(),
        }
    }

    /// Issues one engine frame call, tracing it and handling failure.
    ///
    /// On error the coordinator is already shutting down when this returns.
    pub(crate) fn run_call(&self, call: EngineCall, path: RenderPath) -> Result<(), EngineError> {
        let frame_index = self.frames.load(Ordering::Relaxed);
        self.tracer.engine_call_begin(&EngineCallBeginEvent {
            call,
            path,
            frame_index,
            timestamp: self.clock.now(),
        });

        let result = match call {
            EngineCall::Initialize => {
                self.engine_started.store(true, Ordering::SeqCst);
                self.engine.initialize()
            }
            EngineCall::Render => self.engine.render(),
            EngineCall::Shutdown => {
                self.engine.shutdown();
                Ok(())
            }
        };
        if call == EngineCall::Render && result.is_ok() {
            self.frames.fetch_add(1, Ordering::Relaxed);
        }

        self.tracer.engine_call_end(&EngineCallEndEvent {
            call,
            path,
            frame_index,
            timestamp: self.clock.now(),
            ok: result.is_ok(),
        });

        if let Err(err) = &result {
            self.fail(call, path, err.clone());
        }
        result
    }

    /// Runs a windowed call on the worker if the coordinator is still
    /// windowed.
    fn run_windowed(&self, call: EngineCall) {
        if self.state.load() != CoordinatorState::WindowedActive {
            return;
        }
        // Failure handling already ran inside `run_call`.
        let _ = self.run_call(call, RenderPath::Windowed);
    }

    /// Stores `to` and reports the transition if the state changed.
    fn transition(&self, to: CoordinatorState) -> CoordinatorState {
        let from = self.state.swap(to);
        if from != to {
            self.report_transition(from, to);
        }
        from
    }

    /// Moves from `from` to `to`, or returns the state actually found.
    fn advance(&self, from: CoordinatorState, to: CoordinatorState) -> Result<(), CoordinatorState> {
        self.state.advance(from, to)?;
        self.report_transition(from, to);
        Ok(())
    }

    fn report_transition(&self, from: CoordinatorState, to: CoordinatorState) {
        log::debug!("render state {from:?} -> {to:?}");
        self.tracer.state_change(&StateChangeEvent {
            from,
            to,
            timestamp: self.clock.now(),
        });
    }

    fn fail(&self, call: EngineCall, path: RenderPath, err: EngineError) {
        log::error!("engine {} failed on the {} path: {err}", call.as_str(), path.as_str());
        self.tracer.engine_error(&EngineErrorEvent {
            call,
            path,
            timestamp: self.clock.now(),
        });
        let mut last_error = self.lock_error();
        if last_error.is_none() {
            *last_error = Some(err);
        }
        drop(last_error);
        self.finish(path);
    }

    /// Ends rendering: state `ShuttingDown`, then engine shutdown.
    pub(crate) fn finish(&self, path: RenderPath) {
        self.transition(CoordinatorState::ShuttingDown);
        self.shutdown_engine(path);
    }

    /// Calls the engine's `shutdown()` at most once, and only after it was
    /// initialized.
    fn shutdown_engine(&self, path: RenderPath) {
        if !self.engine_started.load(Ordering::SeqCst) {
            return;
        }
        if self.engine_down.swap(true, Ordering::SeqCst) {
            return;
        }
        log::debug!("shutting down engine from the {} path", path.as_str());
        let _ = self.run_call(EngineCall::Shutdown, path);
    }

    fn lock_error(&self) -> MutexGuard<'_, Option<EngineError>> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct ImmersiveSession {
    layer: Arc<dyn CompositorLayer>,
    cancel: CancelToken,
    exit: Arc<ExitSlot>,
    handle: JoinHandle<LoopExit>,
}

// ---------------------------------------------------------------------------
// RenderCoordinator
// ---------------------------------------------------------------------------

/// Orchestrates windowed and immersive rendering for one engine.
///
/// All methods take `&self`; share the coordinator by reference or `Arc`
/// between the display, input, and lifecycle threads. Lifecycle operations
/// ([`attach_surface`](Self::attach_surface),
/// [`begin_immersive`](Self::begin_immersive),
/// [`cancel_immersive`](Self::cancel_immersive),
/// [`shutdown`](Self::shutdown)) are serialized against each other.
///
/// Dropping the coordinator performs [`shutdown`](Self::shutdown).
pub struct RenderCoordinator<E: RenderEngine> {
    inner: Arc<Inner<E>>,
    worker: WorkerThread,
    touches: Mutex<TouchSlotTable>,
    immersive: Mutex<Option<ImmersiveSession>>,
    lifecycle: Mutex<()>,
    config: CoordinatorConfig,
}

impl<E: RenderEngine> fmt::Debug for RenderCoordinator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCoordinator")
            .field("state", &self.state())
            .field("worker", &self.worker)
            .field("frames", &self.frames())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<E: RenderEngine> RenderCoordinator<E> {
    /// Creates an idle coordinator that does not trace.
    #[must_use]
    pub fn new(engine: E, config: CoordinatorConfig) -> Self {
        Self::with_tracer(engine, config, Tracer::none())
    }

    /// Creates an idle coordinator that reports to `tracer`.
    #[must_use]
    pub fn with_tracer(engine: E, config: CoordinatorConfig, tracer: Tracer) -> Self {
        Self {
            inner: Arc::new(Inner::new(engine, tracer)),
            worker: WorkerThread::new(config.worker),
            touches: Mutex::new(TouchSlotTable::new(config.touch_slots)),
            immersive: Mutex::new(None),
            lifecycle: Mutex::new(()),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> CoordinatorConfig {
        self.config
    }

    /// Returns the engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.inner.engine
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        self.inner.state.load()
    }

    /// Returns the rendering mode implied by the current state.
    #[must_use]
    pub fn mode(&self) -> RenderMode {
        self.state().mode()
    }

    /// Returns `true` while the immersive loop owns rendering.
    #[must_use]
    pub fn is_immersive(&self) -> bool {
        self.state() == CoordinatorState::ImmersiveActive
    }

    /// Returns the number of frames rendered successfully on either path.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.inner.frames.load(Ordering::Relaxed)
    }

    /// Takes the first engine error recorded since the last call.
    pub fn take_error(&self) -> Option<EngineError> {
        self.inner.lock_error().take()
    }

    // -- windowed path ------------------------------------------------------

    /// Starts the windowed path once a drawable surface exists.
    ///
    /// Starts the render worker and queues the engine's `initialize()` on it.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::InvalidState`] unless the coordinator is `Idle`.
    /// - [`CoordinatorError::Worker`] if the worker cannot start.
    pub fn attach_surface(&self) -> Result<(), CoordinatorError> {
        let _lifecycle = self.lock_lifecycle();
        let state = self.state();
        if state != CoordinatorState::Idle {
            return Err(CoordinatorError::InvalidState {
                op: "attach_surface",
                state,
            });
        }

        self.worker.start()?;
        // The state flips under the queue lock, so any frame queued by a
        // display sync that observes `WindowedActive` lands behind
        // `initialize()`, and `initialize()` itself sees `WindowedActive`.
        let inner = Arc::clone(&self.inner);
        self.worker
            .submit_then(
                move || inner.run_windowed(EngineCall::Initialize),
                || {
                    self.inner
                        .state
                        .advance(CoordinatorState::Idle, CoordinatorState::WindowedActive)
                },
            )?
            .map_err(|state| CoordinatorError::InvalidState {
                op: "attach_surface",
                state,
            })?;
        self.inner
            .report_transition(CoordinatorState::Idle, CoordinatorState::WindowedActive);
        Ok(())
    }

    /// Display-sync callback: queues one windowed frame.
    ///
    /// Returns `true` if a frame was queued. Outside `WindowedActive` this is
    /// a no-op returning `false`. Never blocks on rendering.
    pub fn on_display_sync(&self) -> bool {
        if self.state() != CoordinatorState::WindowedActive {
            return false;
        }
        let inner = Arc::clone(&self.inner);
        self.worker
            .submit(move || inner.run_windowed(EngineCall::Render))
            .is_ok()
    }

    // -- immersive path -----------------------------------------------------

    /// Hands rendering to a new immersive loop thread driven by `layer`.
    ///
    /// Blocks until any windowed frame already queued or running has
    /// finished; frames queued but not yet run are skipped.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::OnWorkerThread`] when called from the render
    ///   worker.
    /// - [`CoordinatorError::InvalidState`] unless the coordinator is `Idle`
    ///   or `WindowedActive`, or if a windowed failure ended rendering while
    ///   waiting for the worker.
    /// - [`CoordinatorError::Spawn`] if the loop thread cannot be created;
    ///   the coordinator is then `ShuttingDown`.
    pub fn begin_immersive(&self, layer: Arc<dyn CompositorLayer>) -> Result<(), CoordinatorError> {
        let _lifecycle = self.lock_lifecycle();
        if self.worker.is_worker_thread() {
            return Err(CoordinatorError::OnWorkerThread);
        }

        let from = self.state();
        if !matches!(
            from,
            CoordinatorState::Idle | CoordinatorState::WindowedActive
        ) {
            return Err(CoordinatorError::InvalidState {
                op: "begin_immersive",
                state: from,
            });
        }
        self.inner
            .advance(from, CoordinatorState::ImmersiveActive)
            .map_err(|state| CoordinatorError::InvalidState {
                op: "begin_immersive",
                state,
            })?;

        if self.worker.is_running() {
            match self.worker.barrier() {
                Ok(()) | Err(WorkerError::Stopped) => {}
                Err(err) => return Err(err.into()),
            }
        }
        let state = self.state();
        if state != CoordinatorState::ImmersiveActive {
            return Err(CoordinatorError::InvalidState {
                op: "begin_immersive",
                state,
            });
        }

        let cancel = CancelToken::new();
        let exit = Arc::new(ExitSlot::default());
        let publisher = ExitPublisher::new(Arc::clone(&exit));
        let inner = Arc::clone(&self.inner);
        let loop_layer = Arc::clone(&layer);
        let loop_cancel = cancel.clone();
        let spawned = thread::Builder::new()
            .name(self.config.immersive_thread_name.into())
            .spawn(move || {
                let outcome = immersive::run_immersive(&inner, &*loop_layer, &loop_cancel);
                publisher.publish(outcome.clone());
                outcome
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                log::error!("failed to spawn immersive loop thread: {err}");
                self.inner.finish(RenderPath::Lifecycle);
                return Err(CoordinatorError::Spawn(err.kind()));
            }
        };
        log::debug!(
            "immersive loop thread `{}` started",
            self.config.immersive_thread_name
        );

        *self.lock_immersive() = Some(ImmersiveSession {
            layer,
            cancel,
            exit,
            handle,
        });
        Ok(())
    }

    /// Returns a token that cancels the running immersive loop.
    ///
    /// Cancelling through the token does not wake a paused layer wait; use
    /// [`cancel_immersive`](Self::cancel_immersive) for that.
    #[must_use]
    pub fn cancel_token(&self) -> Option<CancelToken> {
        self.lock_immersive()
            .as_ref()
            .map(|session| session.cancel.clone())
    }

    /// Cancels the immersive loop, wakes it if paused, and waits for it to
    /// exit.
    ///
    /// Returns how the loop ended, or `None` if no loop was running or when
    /// called from the loop thread itself (the loop then exits on its next
    /// check).
    pub fn cancel_immersive(&self) -> Option<LoopExit> {
        let _lifecycle = self.lock_lifecycle();
        self.stop_immersive()
    }

    /// Waits up to `timeout` for the immersive loop to end on its own.
    ///
    /// Returns how the loop ended, or `None` on timeout or if no loop was
    /// running.
    pub fn wait_immersive(&self, timeout: Duration) -> Option<LoopExit> {
        let exit = {
            let session = self.lock_immersive();
            Arc::clone(&session.as_ref()?.exit)
        };
        exit.wait(timeout)?;

        let _lifecycle = self.lock_lifecycle();
        let session = self.lock_immersive().take()?;
        Some(self.join_session(session))
    }

    fn stop_immersive(&self) -> Option<LoopExit> {
        let session = self.lock_immersive().take()?;
        session.cancel.cancel();
        session.layer.interrupt();
        if session.handle.thread().id() == thread::current().id() {
            return None;
        }
        Some(self.join_session(session))
    }

    fn join_session(&self, session: ImmersiveSession) -> LoopExit {
        let exit = session.handle.join().unwrap_or_else(|_| {
            log::error!(
                "immersive loop thread `{}` panicked",
                self.config.immersive_thread_name
            );
            LoopExit::Panicked
        });
        if exit == LoopExit::Panicked {
            self.inner.finish(RenderPath::Lifecycle);
        }
        log::debug!("immersive loop ended: {exit:?}");
        exit
    }

    // -- teardown -----------------------------------------------------------

    /// Stops all rendering and shuts the engine down.
    ///
    /// Cancels and joins the immersive loop, stops the worker (discarding
    /// queued frames), moves to `ShuttingDown`, calls the engine's
    /// `shutdown()` if it was initialized and not yet shut down, and frees
    /// every touch slot. Idempotent.
    pub fn shutdown(&self) {
        let _lifecycle = self.lock_lifecycle();
        self.stop_immersive();
        self.inner.transition(CoordinatorState::ShuttingDown);
        self.worker.stop();
        self.inner.shutdown_engine(RenderPath::Lifecycle);
        self.lock_touches().release_all();
    }

    // -- input --------------------------------------------------------------

    /// Routes a touch through the slot table and forwards it to the engine.
    ///
    /// Returns the slot the engine saw, or `None` if the event was dropped
    /// (no free slot on down, untracked touch otherwise). Up and cancel free
    /// the slot after forwarding `touch_up`.
    pub fn handle_touch(&self, event: &TouchEvent) -> Option<TouchSlot> {
        let (x, y) = event.engine_coords();
        let mut touches = self.lock_touches();
        let slot = match event.phase {
            TouchPhase::Down => touches.assign(event.id),
            TouchPhase::Move | TouchPhase::Up | TouchPhase::Cancel => touches.lookup(event.id),
        };

        let Some(slot) = slot else {
            let reason = match event.phase {
                TouchPhase::Down => TouchDropReason::NoFreeSlot,
                _ => TouchDropReason::Untracked,
            };
            log::debug!("dropping {:?} for {:?}: {reason:?}", event.phase, event.id);
            self.inner.tracer.touch_drop(&TouchDropEvent {
                phase: event.phase,
                id: event.id,
                reason,
                timestamp: self.inner.clock.now(),
            });
            return None;
        };

        let engine = &self.inner.engine;
        match event.phase {
            TouchPhase::Down => engine.touch_down(slot, x, y),
            TouchPhase::Move => engine.touch_move(slot, x, y),
            TouchPhase::Up | TouchPhase::Cancel => {
                engine.touch_up(slot, x, y);
                touches.release(event.id);
            }
        }
        self.inner.tracer.touch_forward(&TouchForwardEvent {
            phase: event.phase,
            slot,
            x,
            y,
            timestamp: self.inner.clock.now(),
        });
        Some(slot)
    }

    fn lock_touches(&self) -> MutexGuard<'_, TouchSlotTable> {
        self.touches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_immersive(&self) -> MutexGuard<'_, Option<ImmersiveSession>> {
        self.immersive.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: RenderEngine> Drop for RenderCoordinator<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
