// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contract for the native rendering engine bridge.
//!
//! The engine is an external collaborator: it owns the graphics device, the
//! script runtime, and whatever else produces frames. Parallax only decides
//! *when* and *on which thread* its methods are called.
//!
//! Methods take `&self` and the trait requires `Send + Sync` because the
//! coordinator calls frame methods from the worker or immersive thread and
//! touch methods from the input thread. Frame calls never overlap (the
//! coordinator guarantees that); touch calls may run concurrently with a
//! frame call, so an implementation guards whatever state they share.

use core::fmt;

use crate::touch::TouchSlot;

/// Failure reported by a [`RenderEngine`] frame call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// The graphics device was lost or reset.
    DeviceLost,
    /// Setup could not complete.
    InitializeFailed(String),
    /// A frame could not be produced or presented.
    RenderFailed(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceLost => f.write_str("graphics device lost"),
            Self::InitializeFailed(reason) => write!(f, "engine initialization failed: {reason}"),
            Self::RenderFailed(reason) => write!(f, "engine render failed: {reason}"),
        }
    }
}

impl core::error::Error for EngineError {}

/// The native rendering engine driven by a
/// [`RenderCoordinator`](crate::coordinator::RenderCoordinator).
pub trait RenderEngine: Send + Sync + 'static {
    /// Prepares the engine for rendering.
    ///
    /// Must be idempotent: the immersive loop calls it before every frame,
    /// and again after resuming from a pause.
    fn initialize(&self) -> Result<(), EngineError>;

    /// Produces and presents one frame.
    ///
    /// May block until the compositor accepts the next frame; the immersive
    /// loop relies on this for pacing.
    fn render(&self) -> Result<(), EngineError>;

    /// Releases engine resources. Called at most once per coordinator.
    fn shutdown(&self);

    /// A pointer made contact at `(x, y)`.
    fn touch_down(&self, slot: TouchSlot, x: i32, y: i32);

    /// A tracked pointer moved to `(x, y)`.
    fn touch_move(&self, slot: TouchSlot, x: i32, y: i32);

    /// A tracked pointer lifted at `(x, y)`.
    fn touch_up(&self, slot: TouchSlot, x: i32, y: i32);
}

impl<E: RenderEngine> RenderEngine for std::sync::Arc<E> {
    fn initialize(&self) -> Result<(), EngineError> {
        (**self).initialize()
    }

    fn render(&self) -> Result<(), EngineError> {
        (**self).render()
    }

    fn shutdown(&self) {
        (**self).shutdown();
    }

    fn touch_down(&self, slot: TouchSlot, x: i32, y: i32) {
        (**self).touch_down(slot, x, y);
    }

    fn touch_move(&self, slot: TouchSlot, x: i32, y: i32) {
        (**self).touch_move(slot, x, y);
    }

    fn touch_up(&self, slot: TouchSlot, x: i32, y: i32) {
        (**self).touch_up(slot, x, y);
    }
}

/// Which engine frame method a trace event refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineCall {
    /// [`RenderEngine::initialize`].
    Initialize,
    /// [`RenderEngine::render`].
    Render,
    /// [`RenderEngine::shutdown`].
    Shutdown,
}

impl EngineCall {
    /// Returns a short lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Render => "render",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Which thread of control issued an engine call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderPath {
    /// The worker thread, on behalf of display-sync callbacks.
    Windowed,
    /// The immersive loop thread.
    Immersive,
    /// The lifecycle owner during coordinator teardown.
    Lifecycle,
}

impl RenderPath {
    /// Returns a short lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Windowed => "windowed",
            Self::Immersive => "immersive",
            Self::Lifecycle => "lifecycle",
        }
    }
}
