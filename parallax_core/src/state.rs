// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-loop state shared between the display, worker, and immersive
//! threads.

use core::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a [`RenderCoordinator`](crate::coordinator::RenderCoordinator).
///
/// ```text
///   Idle ──attach_surface──► WindowedActive
///     │                          │
///     └──────begin_immersive─────┴──► ImmersiveActive
///                                          │
///   (engine failure, invalidation, cancel, shutdown from any state)
///                                          ▼
///                                     ShuttingDown
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CoordinatorState {
    /// Constructed; nothing attached yet.
    Idle = 0,
    /// Display-sync callbacks submit frames to the worker thread.
    WindowedActive = 1,
    /// The immersive loop thread owns rendering.
    ImmersiveActive = 2,
    /// Terminal: no further frames are produced.
    ShuttingDown = 3,
}

impl CoordinatorState {
    /// Returns the rendering mode this state implies.
    #[must_use]
    pub const fn mode(self) -> RenderMode {
        match self {
            Self::WindowedActive => RenderMode::Windowed,
            Self::ImmersiveActive => RenderMode::Immersive,
            Self::Idle | Self::ShuttingDown => RenderMode::Stopped,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::WindowedActive,
            2 => Self::ImmersiveActive,
            _ => Self::ShuttingDown,
        }
    }
}

/// Which path, if any, currently produces frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Frames are driven by display-sync callbacks through the worker.
    Windowed,
    /// Frames are driven by the immersive loop thread.
    Immersive,
    /// No frames are produced.
    Stopped,
}

/// [`CoordinatorState`] stored with sequentially-consistent ordering.
///
/// The store of `ImmersiveActive` happens-before any later load on the worker
/// thread, which is what keeps a queued windowed frame from rendering once the
/// immersive loop may start.
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) const fn new(state: CoordinatorState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> CoordinatorState {
        CoordinatorState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Stores `state` and returns the previous value.
    pub(crate) fn swap(&self, state: CoordinatorState) -> CoordinatorState {
        CoordinatorState::from_u8(self.0.swap(state as u8, Ordering::SeqCst))
    }

    /// Moves from `from` to `to`, or returns the state actually found.
    pub(crate) fn advance(
        &self,
        from: CoordinatorState,
        to: CoordinatorState,
    ) -> Result<(), CoordinatorState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(CoordinatorState::from_u8)
    }
}
