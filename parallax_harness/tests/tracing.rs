// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Trace events emitted by a coordinator, captured with the binary recorder.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use parallax_core::compositor::LayerState;
use parallax_core::coordinator::{CoordinatorConfig, RenderCoordinator};
use parallax_core::engine::{EngineCall, RenderPath};
use parallax_core::state::CoordinatorState;
use parallax_core::time::Timebase;
use parallax_core::touch::{TouchEvent, TouchId, TouchPhase};
use parallax_core::trace::{TouchDropReason, Tracer};
use parallax_debug::chrome;
use parallax_debug::recorder::{RecordedEvent, RecorderSink, decode};
use parallax_harness::{Call, RecordingEngine, ScriptedLayer};

const TIMEOUT: Duration = Duration::from_secs(10);

fn traced(engine: RecordingEngine) -> (RenderCoordinator<RecordingEngine>, Arc<Mutex<RecorderSink>>) {
    let sink = Arc::new(Mutex::new(RecorderSink::new()));
    let coordinator =
        RenderCoordinator::with_tracer(engine, CoordinatorConfig::default(), Tracer::new(sink.clone()));
    (coordinator, sink)
}

fn recorded(sink: &Mutex<RecorderSink>) -> Vec<RecordedEvent> {
    decode(sink.lock().unwrap().as_bytes()).collect()
}

#[test]
fn immersive_session_is_traced() {
    let (coordinator, sink) = traced(RecordingEngine::new());
    coordinator
        .begin_immersive(Arc::new(ScriptedLayer::new([
            LayerState::Running,
            LayerState::Paused,
            LayerState::Running,
            LayerState::Invalidated,
        ])))
        .unwrap();
    coordinator.wait_immersive(TIMEOUT).unwrap();

    let events = recorded(&sink);
    let states: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            RecordedEvent::StateChange(e) => Some((e.from, e.to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        [
            (CoordinatorState::Idle, CoordinatorState::ImmersiveActive),
            (CoordinatorState::ImmersiveActive, CoordinatorState::ShuttingDown),
        ]
    );

    let layers: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            RecordedEvent::LayerState(e) => Some(e.state),
            _ => None,
        })
        .collect();
    assert_eq!(
        layers,
        [
            LayerState::Running,
            LayerState::Paused,
            LayerState::Running,
            LayerState::Invalidated,
        ]
    );

    let calls: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            RecordedEvent::EngineCallEnd(e) => Some((e.call, e.path, e.frame_index, e.ok)),
            _ => None,
        })
        .collect();
    assert_eq!(
        calls,
        [
            (EngineCall::Initialize, RenderPath::Immersive, 0, true),
            (EngineCall::Render, RenderPath::Immersive, 0, true),
            (EngineCall::Initialize, RenderPath::Immersive, 1, true),
            (EngineCall::Render, RenderPath::Immersive, 1, true),
            (EngineCall::Shutdown, RenderPath::Immersive, 2, true),
        ]
    );
}

#[test]
fn engine_failure_is_traced() {
    let (coordinator, sink) = traced(RecordingEngine::new().failing_render_at(0));
    coordinator.attach_surface().unwrap();
    assert!(coordinator.on_display_sync());
    assert!(
        coordinator
            .engine()
            .wait_for(Call::Shutdown, 1, TIMEOUT)
    );

    let events = recorded(&sink);
    let error = events
        .iter()
        .find_map(|event| match event {
            RecordedEvent::EngineError(e) => Some(*e),
            _ => None,
        })
        .unwrap();
    assert_eq!(error.call, EngineCall::Render);
    assert_eq!(error.path, RenderPath::Windowed);
    assert!(events.iter().any(|event| matches!(
        event,
        RecordedEvent::EngineCallEnd(e) if e.call == EngineCall::Render && !e.ok
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        RecordedEvent::StateChange(e) if e.to == CoordinatorState::ShuttingDown
    )));
}

#[test]
fn dropped_touches_are_traced() {
    let (coordinator, sink) = traced(RecordingEngine::new());
    coordinator.handle_touch(&TouchEvent::new(TouchId(7), TouchPhase::Move, 0.0, 0.0));

    let events = recorded(&sink);
    assert_eq!(events.len(), 1);
    match &events[0] {
        RecordedEvent::TouchDrop(e) => {
            assert_eq!(e.id, TouchId(7));
            assert_eq!(e.reason, TouchDropReason::Untracked);
        }
        other => panic!("expected TouchDrop, got {other:?}"),
    }
}

#[test]
fn recording_exports_to_chrome_json() {
    let (coordinator, sink) = traced(RecordingEngine::new());
    coordinator
        .begin_immersive(Arc::new(ScriptedLayer::new([
            LayerState::Running,
            LayerState::Invalidated,
        ])))
        .unwrap();
    coordinator.wait_immersive(TIMEOUT).unwrap();

    let mut out = Vec::new();
    chrome::export(sink.lock().unwrap().as_bytes(), Timebase::NANOS, &mut out).unwrap();
    let parsed: Vec<serde_json::Value> = serde_json::from_slice(&out).unwrap();
    let slices = parsed.iter().filter(|event| event["ph"] == "B").count();
    assert_eq!(slices, 3);
}
