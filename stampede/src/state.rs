//! Slot lifecycle protocol shared by the bounded queues.
//!
//! A slot cycles free → prod_locked → ready → cons_locked → free. The
//! locked states grant exclusive payload access to exactly one producer
//! or one consumer; `ready` means the payload is owned by the queue. The
//! reverting transitions (prod_locked → free, cons_locked → ready) exist
//! only under [`Completion::Manual`], when a holder releases without
//! arming completion.

use core::sync::atomic::{AtomicU8, Ordering};

/// The four states of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// No live payload; a producer may claim the slot.
    Free = 0,
    /// Exactly one producer is writing; consumers must not read.
    ProdLocked = 1,
    /// The payload is published and owned by the queue.
    Ready = 2,
    /// Exactly one consumer is reading; producers must not write.
    ConsLocked = 3,
}

impl SlotState {
    #[inline]
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => SlotState::Free,
            1 => SlotState::ProdLocked,
            2 => SlotState::Ready,
            _ => SlotState::ConsLocked,
        }
    }
}

/// A slot state cell with atomic transitions.
#[derive(Debug)]
pub struct AtomicSlotState(AtomicU8);

impl AtomicSlotState {
    /// Creates a cell in the given state.
    pub const fn new(state: SlotState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Loads the current state.
    #[inline]
    pub fn load(&self, order: Ordering) -> SlotState {
        SlotState::from_raw(self.0.load(order))
    }

    /// Stores a state unconditionally.
    #[inline]
    pub fn store(&self, state: SlotState, order: Ordering) {
        self.0.store(state as u8, order);
    }

    /// Attempts the transition `current` → `new`.
    ///
    /// Returns the witnessed state on failure.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: SlotState,
        new: SlotState,
        success: Ordering,
        failure: Ordering,
    ) -> Result<SlotState, SlotState> {
        self.0
            .compare_exchange(current as u8, new as u8, success, failure)
            .map(SlotState::from_raw)
            .map_err(SlotState::from_raw)
    }
}

impl Default for AtomicSlotState {
    fn default() -> Self {
        Self::new(SlotState::Free)
    }
}

/// Completion mode of a bounded queue.
///
/// Governs what a slot holder's release publishes: under `Auto` every
/// release publishes (producer → ready, consumer → free); under `Manual`
/// the holder must call `complete()` first, otherwise the release reverts
/// the slot (producer → free, consumer → ready).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Publish on every release.
    #[default]
    Auto,
    /// Publish only after an explicit `complete()`.
    Manual,
}
