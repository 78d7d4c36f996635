//! Asymmetric two-color coordination barrier.
//!
//! Green is the color of ordinary users (enqueue/dequeue), red the color
//! of reclaimers (purge, destruction). Any number of holders of one color
//! may coexist; a red holder guarantees no green is live and vice versa.
//! Entry is wait-free against the holder's own color and spin-yields
//! against the opposite color.

use core::sync::atomic::{AtomicU64, Ordering};
use crossbeam_utils::Backoff;

/// Two mutually exclusive counting locks.
///
/// Entering a color waits for the opposite counter to drain, increments
/// its own counter, then re-checks the opposite counter and backs out if
/// both colors raced in together. The invariant after entry: the opposite
/// counter was observed zero while our own was already visible.
pub struct ColorBarrier {
    red: AtomicU64,
    green: AtomicU64,
}

impl ColorBarrier {
    /// Creates an open barrier with no holders of either color.
    pub const fn new() -> Self {
        Self {
            red: AtomicU64::new(0),
            green: AtomicU64::new(0),
        }
    }

    /// Enters the green (user) side.
    pub fn green(&self) -> GreenGuard<'_> {
        Self::enter(&self.green, &self.red);
        GreenGuard { barrier: self }
    }

    /// Enters the red (reclaimer) side.
    pub fn red(&self) -> RedGuard<'_> {
        Self::enter(&self.red, &self.green);
        RedGuard { barrier: self }
    }

    fn enter(own: &AtomicU64, opposite: &AtomicU64) {
        let backoff = Backoff::new();
        loop {
            while opposite.load(Ordering::Acquire) != 0 {
                backoff.snooze();
            }
            own.fetch_add(1, Ordering::AcqRel);
            if opposite.load(Ordering::Acquire) == 0 {
                return;
            }
            // Both colors slipped in together; back out and retry.
            own.fetch_sub(1, Ordering::AcqRel);
            backoff.snooze();
        }
    }
}

impl Default for ColorBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII holder of the green side of a [`ColorBarrier`].
pub struct GreenGuard<'a> {
    barrier: &'a ColorBarrier,
}

impl Drop for GreenGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.barrier.green.fetch_sub(1, Ordering::AcqRel);
    }
}

/// RAII holder of the red side of a [`ColorBarrier`].
pub struct RedGuard<'a> {
    barrier: &'a ColorBarrier,
}

impl Drop for RedGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.barrier.red.fetch_sub(1, Ordering::AcqRel);
    }
}
