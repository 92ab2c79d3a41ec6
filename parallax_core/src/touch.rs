// Copyright 2026 the Parallax Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multi-touch to pointer-slot multiplexing.
//!
//! The engine understands a small, fixed number of pointers identified by
//! slot index. Platforms identify touches by an opaque value (usually a
//! pointer hash) that is stable only while the finger is down.
//! [`TouchSlotTable`] maps one onto the other.
//!
//! Slot assignment depends only on table occupancy: the lowest free index
//! wins, whatever the identity value. Replaying the same interleaving of
//! down/up events therefore always yields the same slots.

use core::fmt;

use kurbo::Point;

/// Opaque identity of an active touch, as reported by the platform.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TouchId(pub u64);

impl fmt::Debug for TouchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TouchId({:#x})", self.0)
    }
}

/// Index of a logical pointer slot, in `[0, capacity)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TouchSlot(pub u32);

impl TouchSlot {
    /// Returns the slot as a table index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stage of a touch's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TouchPhase {
    /// A finger made contact.
    Down,
    /// A tracked finger moved.
    Move,
    /// A tracked finger lifted.
    Up,
    /// The platform abandoned the touch (e.g. a system gesture took over).
    ///
    /// Forwarded to the engine as an up so the pointer is released.
    Cancel,
}

/// A single touch sample delivered by the input system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchEvent {
    /// Platform identity of the touch.
    pub id: TouchId,
    /// Stage of the touch.
    pub phase: TouchPhase,
    /// Location in view coordinates.
    pub location: Point,
}

impl TouchEvent {
    /// Creates an event from raw coordinates.
    #[must_use]
    pub fn new(id: TouchId, phase: TouchPhase, x: f64, y: f64) -> Self {
        Self {
            id,
            phase,
            location: Point::new(x, y),
        }
    }

    /// Returns the location as integer engine coordinates.
    ///
    /// Fractions are truncated toward zero; values outside the `i32` range
    /// saturate and NaN maps to zero.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "engine pointers are integral; float-to-int `as` saturates"
    )]
    pub fn engine_coords(&self) -> (i32, i32) {
        (self.location.x as i32, self.location.y as i32)
    }
}

/// Fixed-capacity mapping from [`TouchId`] to [`TouchSlot`].
///
/// Invariant: an identity occupies at most one slot, and an occupied slot is
/// never handed to another identity until released.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TouchSlotTable {
    slots: Vec<Option<TouchId>>,
}

impl Default for TouchSlotTable {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl TouchSlotTable {
    /// Slot count of the reference gesture recognizer.
    pub const DEFAULT_CAPACITY: usize = 10;

    /// Creates an empty table with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` does not fit in a [`TouchSlot`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(
            u32::try_from(capacity).is_ok(),
            "touch slot capacity must fit in u32"
        );
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of occupied slots.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Returns `true` if every slot is occupied.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Claims the lowest free slot for `id`.
    ///
    /// Returns `None` when every slot is taken; the caller drops the event.
    /// If `id` already holds a slot, that slot is returned unchanged.
    pub fn assign(&mut self, id: TouchId) -> Option<TouchSlot> {
        if let Some(existing) = self.lookup(id) {
            return Some(existing);
        }
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(id);
        Some(slot_at(index))
    }

    /// Returns the slot currently held by `id`.
    #[must_use]
    pub fn lookup(&self, id: TouchId) -> Option<TouchSlot> {
        self.slots
            .iter()
            .position(|slot| *slot == Some(id))
            .map(slot_at)
    }

    /// Frees the slot held by `id` and returns it.
    ///
    /// Releasing an unknown or already released identity does nothing.
    pub fn release(&mut self, id: TouchId) -> Option<TouchSlot> {
        let slot = self.lookup(id)?;
        self.slots[slot.index()] = None;
        Some(slot)
    }

    /// Frees every slot.
    pub fn release_all(&mut self) {
        self.slots.fill(None);
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "capacity is checked to fit in u32 at construction"
)]
fn slot_at(index: usize) -> TouchSlot {
    TouchSlot(index as u32)
}
