// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contract for the immersive compositor layer.
//!
//! In immersive mode the platform compositor owns presentation and exposes
//! a layer whose lifecycle the render loop follows: frames are produced
//! while it is [`Running`](LayerState::Running), the loop blocks while it is
//! [`Paused`](LayerState::Paused), and rendering ends for good once it is
//! [`Invalidated`](LayerState::Invalidated).

/// Lifecycle state of a compositor layer, as observed by the render loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerState {
    /// Frames may be rendered.
    Running,
    /// Rendering is suspended until the layer runs again.
    Paused,
    /// The layer is gone; no frame may be rendered again.
    Invalidated,
}

/// A compositor layer driving the immersive render loop.
pub trait CompositorLayer: Send + Sync + 'static {
    /// Returns the current lifecycle state.
    fn state(&self) -> LayerState;

    /// Blocks the calling thread until the layer leaves
    /// [`LayerState::Paused`].
    ///
    /// Returning early is allowed; the loop re-reads [`state`](Self::state)
    /// after every wake.
    fn wait_until_running(&self);

    /// Wakes a thread blocked in [`wait_until_running`](Self::wait_until_running).
    ///
    /// Called when the immersive loop is cancelled from outside. Layers whose
    /// platform wait cannot be interrupted keep the default no-op, and
    /// cancellation then takes effect on the next wake.
    fn interrupt(&self) {}
}
