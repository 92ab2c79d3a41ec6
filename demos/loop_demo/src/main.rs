// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated render session that exercises both render paths and the
//! diagnostics pipeline.
//!
//! Drives a windowed phase from a fake display link, replays a short
//! multi-touch gesture, then hands rendering to an immersive loop whose
//! compositor layer runs, pauses, resumes, and is invalidated. Events go to
//! both a [`PrettyPrintSink`](parallax_debug::pretty::PrettyPrintSink) and a
//! [`RecorderSink`](parallax_debug::recorder::RecorderSink); the recording is
//! exported as a Chrome trace JSON file.
//!
//! Set `RUST_LOG` to adjust log output (default: `debug`).

use std::fs::File;
use std::io::BufWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use parallax_core::compositor::LayerState;
use parallax_core::coordinator::{CoordinatorConfig, RenderCoordinator};
use parallax_core::engine::{EngineError, RenderEngine};
use parallax_core::time::Timebase;
use parallax_core::touch::{TouchEvent, TouchId, TouchPhase, TouchSlot};
use parallax_core::trace::{
    EngineCallBeginEvent, EngineCallEndEvent, EngineErrorEvent, LayerStateEvent,
    StateChangeEvent, TouchDropEvent, TouchForwardEvent, TraceSink, Tracer,
};
use parallax_debug::pretty::PrettyPrintSink;
use parallax_debug::recorder::RecorderSink;
use parallax_harness::ManualLayer;

const WINDOWED_FRAMES: u32 = 30;
/// Display-link period (≈60 Hz).
const REFRESH_INTERVAL: Duration = Duration::from_micros(16_667);
/// Simulated GPU time per frame.
const RENDER_COST: Duration = Duration::from_millis(4);

// ---------------------------------------------------------------------------
// Simulated engine
// ---------------------------------------------------------------------------

/// Stands in for a native engine: sleeps per frame and tracks pointer slots.
#[derive(Debug, Default)]
struct SimulatedEngine {
    initialized: AtomicBool,
    pointers: Mutex<Vec<Option<(i32, i32)>>>,
}

impl SimulatedEngine {
    fn set_pointer(&self, slot: TouchSlot, position: Option<(i32, i32)>) {
        let mut pointers = self.pointers.lock().expect("pointer table poisoned");
        if pointers.len() <= slot.index() {
            pointers.resize(slot.index() + 1, None);
        }
        pointers[slot.index()] = position;
    }
}

impl RenderEngine for SimulatedEngine {
    fn initialize(&self) -> Result<(), EngineError> {
        if !self.initialized.swap(true, Ordering::SeqCst) {
            log::info!("engine initialized");
        }
        Ok(())
    }

    fn render(&self) -> Result<(), EngineError> {
        thread::sleep(RENDER_COST);
        Ok(())
    }

    fn shutdown(&self) {
        log::info!("engine shut down");
    }

    fn touch_down(&self, slot: TouchSlot, x: i32, y: i32) {
        self.set_pointer(slot, Some((x, y)));
    }

    fn touch_move(&self, slot: TouchSlot, x: i32, y: i32) {
        self.set_pointer(slot, Some((x, y)));
    }

    fn touch_up(&self, slot: TouchSlot, _x: i32, _y: i32) {
        self.set_pointer(slot, None);
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Forwards every event to a pretty printer and a recorder.
#[derive(Debug)]
struct TeeSink {
    pretty: PrettyPrintSink,
    recorder: RecorderSink,
}

macro_rules! tee {
    ($($method:ident($event:ty)),* $(,)?) => {
        impl TraceSink for TeeSink {
            $(
                fn $method(&mut self, e: &$event) {
                    self.pretty.$method(e);
                    self.recorder.$method(e);
                }
            )*
        }
    };
}

tee!(
    on_state_change(StateChangeEvent),
    on_engine_call_begin(EngineCallBeginEvent),
    on_engine_call_end(EngineCallEndEvent),
    on_layer_state(LayerStateEvent),
    on_touch_forward(TouchForwardEvent),
    on_touch_drop(TouchDropEvent),
    on_engine_error(EngineErrorEvent),
);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();

    let timebase = Timebase::NANOS;
    let sink = Arc::new(Mutex::new(TeeSink {
        pretty: PrettyPrintSink::stdout(timebase),
        recorder: RecorderSink::new(),
    }));
    let coordinator = Arc::new(RenderCoordinator::with_tracer(
        SimulatedEngine::default(),
        CoordinatorConfig::default(),
        Tracer::new(sink.clone()),
    ));

    // -- windowed phase ----------------------------------------------------
    coordinator
        .attach_surface()
        .expect("failed to attach surface");
    let display_link = {
        let coordinator = Arc::clone(&coordinator);
        thread::Builder::new()
            .name("DisplayLink".into())
            .spawn(move || {
                for _ in 0..WINDOWED_FRAMES {
                    coordinator.on_display_sync();
                    thread::sleep(REFRESH_INTERVAL);
                }
            })
            .expect("failed to spawn display link")
    };

    // -- touches -----------------------------------------------------------
    let gesture = [
        (1, TouchPhase::Down, 100.4, 200.8),
        (2, TouchPhase::Down, 300.0, 120.0),
        (1, TouchPhase::Move, 110.0, 210.0),
        (2, TouchPhase::Cancel, 305.0, 125.0),
        (1, TouchPhase::Up, 115.0, 215.0),
        (3, TouchPhase::Move, 0.0, 0.0),
    ];
    for (id, phase, x, y) in gesture {
        coordinator.handle_touch(&TouchEvent::new(TouchId(id), phase, x, y));
        thread::sleep(REFRESH_INTERVAL);
    }
    display_link.join().expect("display link panicked");

    // -- immersive phase ---------------------------------------------------
    let layer = Arc::new(ManualLayer::new(LayerState::Running));
    coordinator
        .begin_immersive(layer.clone())
        .expect("failed to begin immersive rendering");
    thread::sleep(Duration::from_millis(60));
    layer.set(LayerState::Paused);
    thread::sleep(Duration::from_millis(40));
    layer.set(LayerState::Running);
    thread::sleep(Duration::from_millis(60));
    layer.set(LayerState::Invalidated);
    let exit = coordinator.wait_immersive(Duration::from_secs(5));
    log::info!("immersive loop exit: {exit:?}");

    coordinator.shutdown();
    log::info!("rendered {} frames", coordinator.frames());

    // -- export Chrome trace -----------------------------------------------
    let path = "loop_trace.json";
    let file = File::create(path).expect("failed to create loop_trace.json");
    let mut writer = BufWriter::new(file);
    let sink = sink.lock().expect("trace sink poisoned");
    parallax_debug::chrome::export(sink.recorder.as_bytes(), timebase, &mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote {path}");
}
