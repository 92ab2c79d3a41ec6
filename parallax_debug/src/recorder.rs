// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records, each led by a one-byte tag.
//! [`decode`] reads them back as an iterator of [`RecordedEvent`].

use parallax_core::compositor::LayerState;
use parallax_core::engine::{EngineCall, RenderPath};
use parallax_core::state::CoordinatorState;
use parallax_core::time::HostTime;
use parallax_core::touch::{TouchId, TouchPhase, TouchSlot};
use parallax_core::trace::{
    EngineCallBeginEvent, EngineCallEndEvent, EngineErrorEvent, LayerStateEvent,
    StateChangeEvent, TouchDropEvent, TouchDropReason, TouchForwardEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_STATE_CHANGE: u8 = 1;
const TAG_CALL_BEGIN: u8 = 2;
const TAG_CALL_END: u8 = 3;
const TAG_LAYER_STATE: u8 = 4;
const TAG_TOUCH_FORWARD: u8 = 5;
const TAG_TOUCH_DROP: u8 = 6;
const TAG_ENGINE_ERROR: u8 = 7;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_state(&mut self, s: CoordinatorState) {
        self.write_u8(match s {
            CoordinatorState::Idle => 0,
            CoordinatorState::WindowedActive => 1,
            CoordinatorState::ImmersiveActive => 2,
            CoordinatorState::ShuttingDown => 3,
        });
    }

    fn write_call(&mut self, c: EngineCall) {
        self.write_u8(match c {
            EngineCall::Initialize => 0,
            EngineCall::Render => 1,
            EngineCall::Shutdown => 2,
        });
    }

    fn write_path(&mut self, p: RenderPath) {
        self.write_u8(match p {
            RenderPath::Windowed => 0,
            RenderPath::Immersive => 1,
            RenderPath::Lifecycle => 2,
        });
    }

    fn write_touch_phase(&mut self, p: TouchPhase) {
        self.write_u8(match p {
            TouchPhase::Down => 0,
            TouchPhase::Move => 1,
            TouchPhase::Up => 2,
            TouchPhase::Cancel => 3,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_state_change(&mut self, e: &StateChangeEvent) {
        self.write_u8(TAG_STATE_CHANGE);
        self.write_state(e.from);
        self.write_state(e.to);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_engine_call_begin(&mut self, e: &EngineCallBeginEvent) {
        self.write_u8(TAG_CALL_BEGIN);
        self.write_call(e.call);
        self.write_path(e.path);
        self.write_u64(e.frame_index);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_engine_call_end(&mut self, e: &EngineCallEndEvent) {
        self.write_u8(TAG_CALL_END);
        self.write_call(e.call);
        self.write_path(e.path);
        self.write_u64(e.frame_index);
        self.write_u64(e.timestamp.ticks());
        self.write_u8(u8::from(e.ok));
    }

    fn on_layer_state(&mut self, e: &LayerStateEvent) {
        self.write_u8(TAG_LAYER_STATE);
        self.write_u8(match e.state {
            LayerState::Running => 0,
            LayerState::Paused => 1,
            LayerState::Invalidated => 2,
        });
        self.write_u64(e.timestamp.ticks());
    }

    fn on_touch_forward(&mut self, e: &TouchForwardEvent) {
        self.write_u8(TAG_TOUCH_FORWARD);
        self.write_touch_phase(e.phase);
        self.write_u32(e.slot.0);
        self.write_i32(e.x);
        self.write_i32(e.y);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_touch_drop(&mut self, e: &TouchDropEvent) {
        self.write_u8(TAG_TOUCH_DROP);
        self.write_touch_phase(e.phase);
        self.write_u64(e.id.0);
        self.write_u8(match e.reason {
            TouchDropReason::NoFreeSlot => 0,
            TouchDropReason::Untracked => 1,
        });
        self.write_u64(e.timestamp.ticks());
    }

    fn on_engine_error(&mut self, e: &EngineErrorEvent) {
        self.write_u8(TAG_ENGINE_ERROR);
        self.write_call(e.call);
        self.write_path(e.path);
        self.write_u64(e.timestamp.ticks());
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`StateChangeEvent`].
    StateChange(StateChangeEvent),
    /// An [`EngineCallBeginEvent`].
    EngineCallBegin(EngineCallBeginEvent),
    /// An [`EngineCallEndEvent`].
    EngineCallEnd(EngineCallEndEvent),
    /// A [`LayerStateEvent`].
    LayerState(LayerStateEvent),
    /// A [`TouchForwardEvent`].
    TouchForward(TouchForwardEvent),
    /// A [`TouchDropEvent`].
    TouchDrop(TouchDropEvent),
    /// An [`EngineErrorEvent`].
    EngineError(EngineErrorEvent),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first unknown tag or truncated record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_i32(&mut self) -> Option<i32> {
        self.take().map(i32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_state(&mut self) -> Option<CoordinatorState> {
        Some(match self.read_u8()? {
            0 => CoordinatorState::Idle,
            1 => CoordinatorState::WindowedActive,
            2 => CoordinatorState::ImmersiveActive,
            _ => CoordinatorState::ShuttingDown,
        })
    }

    fn read_call(&mut self) -> Option<EngineCall> {
        Some(match self.read_u8()? {
            0 => EngineCall::Initialize,
            1 => EngineCall::Render,
            _ => EngineCall::Shutdown,
        })
    }

    fn read_path(&mut self) -> Option<RenderPath> {
        Some(match self.read_u8()? {
            0 => RenderPath::Windowed,
            1 => RenderPath::Immersive,
            _ => RenderPath::Lifecycle,
        })
    }

    fn read_layer_state(&mut self) -> Option<LayerState> {
        Some(match self.read_u8()? {
            0 => LayerState::Running,
            1 => LayerState::Paused,
            _ => LayerState::Invalidated,
        })
    }

    fn read_touch_phase(&mut self) -> Option<TouchPhase> {
        Some(match self.read_u8()? {
            0 => TouchPhase::Down,
            1 => TouchPhase::Move,
            2 => TouchPhase::Up,
            _ => TouchPhase::Cancel,
        })
    }

    fn decode_state_change(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::StateChange(StateChangeEvent {
            from: self.read_state()?,
            to: self.read_state()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_call_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::EngineCallBegin(EngineCallBeginEvent {
            call: self.read_call()?,
            path: self.read_path()?,
            frame_index: self.read_u64()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_call_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::EngineCallEnd(EngineCallEndEvent {
            call: self.read_call()?,
            path: self.read_path()?,
            frame_index: self.read_u64()?,
            timestamp: self.read_time()?,
            ok: self.read_u8()? != 0,
        }))
    }

    fn decode_layer_state(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::LayerState(LayerStateEvent {
            state: self.read_layer_state()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_touch_forward(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TouchForward(TouchForwardEvent {
            phase: self.read_touch_phase()?,
            slot: TouchSlot(self.read_u32()?),
            x: self.read_i32()?,
            y: self.read_i32()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_touch_drop(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TouchDrop(TouchDropEvent {
            phase: self.read_touch_phase()?,
            id: TouchId(self.read_u64()?),
            reason: match self.read_u8()? {
                0 => TouchDropReason::NoFreeSlot,
                _ => TouchDropReason::Untracked,
            },
            timestamp: self.read_time()?,
        }))
    }

    fn decode_engine_error(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::EngineError(EngineErrorEvent {
            call: self.read_call()?,
            path: self.read_path()?,
            timestamp: self.read_time()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_STATE_CHANGE => self.decode_state_change(),
            TAG_CALL_BEGIN => self.decode_call_begin(),
            TAG_CALL_END => self.decode_call_end(),
            TAG_LAYER_STATE => self.decode_layer_state(),
            TAG_TOUCH_FORWARD => self.decode_touch_forward(),
            TAG_TOUCH_DROP => self.decode_touch_drop(),
            TAG_ENGINE_ERROR => self.decode_engine_error(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record_frame(rec: &mut RecorderSink, path: RenderPath, frame_index: u64, at: u64) {
        rec.on_engine_call_begin(&EngineCallBeginEvent {
            call: EngineCall::Render,
            path,
            frame_index,
            timestamp: HostTime(at),
        });
        rec.on_engine_call_end(&EngineCallEndEvent {
            call: EngineCall::Render,
            path,
            frame_index,
            timestamp: HostTime(at + 500),
            ok: true,
        });
    }

    #[test]
    fn decodes_a_mode_switch() {
        let mut rec = RecorderSink::new();
        rec.on_state_change(&StateChangeEvent {
            from: CoordinatorState::Idle,
            to: CoordinatorState::WindowedActive,
            timestamp: HostTime(100),
        });
        record_frame(&mut rec, RenderPath::Windowed, 0, 1_000);
        rec.on_state_change(&StateChangeEvent {
            from: CoordinatorState::WindowedActive,
            to: CoordinatorState::ImmersiveActive,
            timestamp: HostTime(2_000),
        });
        rec.on_layer_state(&LayerStateEvent {
            state: LayerState::Paused,
            timestamp: HostTime(2_100),
        });
        record_frame(&mut rec, RenderPath::Immersive, 1, 3_000);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 7);
        match &events[2] {
            RecordedEvent::EngineCallEnd(e) => {
                assert_eq!(e.call, EngineCall::Render);
                assert_eq!(e.path, RenderPath::Windowed);
                assert_eq!(e.timestamp, HostTime(1_500));
                assert!(e.ok);
            }
            other => panic!("expected EngineCallEnd, got {other:?}"),
        }
        match &events[3] {
            RecordedEvent::StateChange(e) => {
                assert_eq!(e.from, CoordinatorState::WindowedActive);
                assert_eq!(e.to, CoordinatorState::ImmersiveActive);
            }
            other => panic!("expected StateChange, got {other:?}"),
        }
        match &events[4] {
            RecordedEvent::LayerState(e) => assert_eq!(e.state, LayerState::Paused),
            other => panic!("expected LayerState, got {other:?}"),
        }
        match &events[5] {
            RecordedEvent::EngineCallBegin(e) => {
                assert_eq!(e.path, RenderPath::Immersive);
                assert_eq!(e.frame_index, 1);
            }
            other => panic!("expected EngineCallBegin, got {other:?}"),
        }
    }

    #[test]
    fn touch_events_keep_negative_coordinates() {
        let mut rec = RecorderSink::new();
        rec.on_touch_forward(&TouchForwardEvent {
            phase: TouchPhase::Move,
            slot: TouchSlot(4),
            x: -12,
            y: 640,
            timestamp: HostTime(9),
        });
        rec.on_touch_drop(&TouchDropEvent {
            phase: TouchPhase::Down,
            id: TouchId(0xdead_beef),
            reason: TouchDropReason::NoFreeSlot,
            timestamp: HostTime(10),
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 2);
        match &events[0] {
            RecordedEvent::TouchForward(e) => {
                assert_eq!(e.phase, TouchPhase::Move);
                assert_eq!(e.slot, TouchSlot(4));
                assert_eq!((e.x, e.y), (-12, 640));
            }
            other => panic!("expected TouchForward, got {other:?}"),
        }
        match &events[1] {
            RecordedEvent::TouchDrop(e) => {
                assert_eq!(e.id, TouchId(0xdead_beef));
                assert_eq!(e.reason, TouchDropReason::NoFreeSlot);
            }
            other => panic!("expected TouchDrop, got {other:?}"),
        }
    }

    #[test]
    fn truncated_record_stops_iteration() {
        let mut rec = RecorderSink::new();
        rec.on_engine_error(&EngineErrorEvent {
            call: EngineCall::Render,
            path: RenderPath::Immersive,
            timestamp: HostTime(77),
        });
        rec.on_layer_state(&LayerStateEvent {
            state: LayerState::Invalidated,
            timestamp: HostTime(78),
        });
        let bytes = rec.into_bytes();

        let events: Vec<_> = decode(&bytes[..bytes.len() - 1]).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RecordedEvent::EngineError(_)));
    }

    #[test]
    fn empty_buffer_decodes_to_nothing() {
        let events: Vec<_> = decode(&[]).collect();
        assert!(events.is_empty());
    }

    #[test]
    fn unknown_tag_stops_iteration() {
        let events: Vec<_> = decode(&[0xff, 1, 2, 3]).collect();
        assert!(events.is_empty());
    }
}
