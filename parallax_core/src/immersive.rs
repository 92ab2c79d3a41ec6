// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The immersive render loop.
//!
//! Runs on its own thread while the coordinator is
//! [`ImmersiveActive`](crate::state::CoordinatorState::ImmersiveActive) and
//! follows the compositor layer's lifecycle:
//!
//! ```text
//!   ┌──► cancelled? ──yes──► finish ──► LoopExit::Cancelled
//!   │        │ no
//!   │        ▼
//!   │    layer.state()
//!   │        ├── Invalidated ──► finish ──► LoopExit::Invalidated
//!   │        ├── Paused ──► wait_until_running()
//!   │        └── Running ──► initialize() ──► render()
//!   └────────────┘
//! ```
//!
//! "finish" shuts the engine down (at most once per coordinator) and moves
//! the coordinator to `ShuttingDown`. An engine error ends the loop with
//! [`LoopExit::Failed`] after the coordinator's failure handling has run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::compositor::{CompositorLayer, LayerState};
use crate::coordinator::Inner;
use crate::engine::{EngineCall, EngineError, RenderEngine, RenderPath};
use crate::trace::LayerStateEvent;

/// Shared flag asking an immersive loop to stop.
///
/// Clones observe the same flag. Once set it stays set.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why an immersive loop ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoopExit {
    /// The compositor layer reported [`LayerState::Invalidated`].
    Invalidated,
    /// The loop observed its [`CancelToken`].
    Cancelled,
    /// An engine frame call failed.
    Failed(EngineError),
    /// The loop thread panicked.
    Panicked,
}

/// Body of the immersive loop thread.
pub(crate) fn run_immersive<E: RenderEngine>(
    inner: &Inner<E>,
    layer: &dyn CompositorLayer,
    cancel: &CancelToken,
) -> LoopExit {
    let mut observed = None;
    loop {
        if cancel.is_cancelled() {
            log::info!("immersive loop cancelled");
            inner.finish(RenderPath::Immersive);
            return LoopExit::Cancelled;
        }

        let state = layer.state();
        if observed != Some(state) {
            observed = Some(state);
            inner.tracer.layer_state(&LayerStateEvent {
                state,
                timestamp: inner.clock.now(),
            });
        }

        match state {
            LayerState::Invalidated => {
                log::info!("compositor layer invalidated, ending immersive loop");
                inner.finish(RenderPath::Immersive);
                return LoopExit::Invalidated;
            }
            LayerState::Paused => layer.wait_until_running(),
            LayerState::Running => {
                let frame = inner
                    .run_call(EngineCall::Initialize, RenderPath::Immersive)
                    .and_then(|()| inner.run_call(EngineCall::Render, RenderPath::Immersive));
                if let Err(err) = frame {
                    return LoopExit::Failed(err);
                }
            }
        }
    }
}

/// One-shot cell the loop thread publishes its [`LoopExit`] into.
///
/// Lets the coordinator wait for a natural exit with a timeout, which a
/// `JoinHandle` cannot do.
#[derive(Debug, Default)]
pub(crate) struct ExitSlot {
    exit: Mutex<Option<LoopExit>>,
    ready: Condvar,
}

impl ExitSlot {
    /// Stores `exit` unless one is already stored.
    pub(crate) fn publish(&self, exit: LoopExit) {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(exit);
            self.ready.notify_all();
        }
    }

    /// Returns the published exit, if any.
    #[cfg(test)]
    fn get(&self) -> Option<LoopExit> {
        self.lock().clone()
    }

    /// Waits up to `timeout` for an exit to be published.
    pub(crate) fn wait(&self, timeout: Duration) -> Option<LoopExit> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        while slot.is_none() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            slot = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        slot.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<LoopExit>> {
        self.exit.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publishes [`LoopExit::Panicked`] if dropped without publishing, which
/// only happens while the loop thread unwinds.
pub(crate) struct ExitPublisher {
    slot: Arc<ExitSlot>,
    published: bool,
}

impl ExitPublisher {
    pub(crate) fn new(slot: Arc<ExitSlot>) -> Self {
        Self {
            slot,
            published: false,
        }
    }

    pub(crate) fn publish(mut self, exit: LoopExit) {
        self.slot.publish(exit);
        self.published = true;
    }
}

impl Drop for ExitPublisher {
    fn drop(&mut self) {
        if !self.published {
            self.slot.publish(LoopExit::Panicked);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn cancel_token_is_shared_by_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn exit_slot_keeps_first_exit() {
        let slot = ExitSlot::default();
        slot.publish(LoopExit::Invalidated);
        slot.publish(LoopExit::Cancelled);
        assert_eq!(slot.get(), Some(LoopExit::Invalidated));
    }

    #[test]
    fn exit_slot_wait_times_out() {
        let slot = ExitSlot::default();
        assert_eq!(slot.wait(Duration::from_millis(10)), None);
    }

    #[test]
    fn exit_slot_wait_sees_publish_from_other_thread() {
        let slot = Arc::new(ExitSlot::default());
        let publisher = ExitPublisher::new(Arc::clone(&slot));
        let handle = thread::spawn(move || publisher.publish(LoopExit::Cancelled));
        assert_eq!(
            slot.wait(Duration::from_secs(5)),
            Some(LoopExit::Cancelled)
        );
        handle.join().unwrap();
    }

    #[test]
    fn unwinding_publisher_reports_panic() {
        let slot = Arc::new(ExitSlot::default());
        let publisher = ExitPublisher::new(Arc::clone(&slot));
        let result = thread::spawn(move || {
            let _publisher = publisher;
            panic!("engine exploded");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(slot.get(), Some(LoopExit::Panicked));
    }
}
