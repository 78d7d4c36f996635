//! Bounded MPMC slot queue over a single fixed ring.
//!
//! The allocation-free sibling of [`BlockQueue`](crate::BlockQueue):
//! no block chain, no growth, cursors are plain counters folded modulo
//! the ring size. Trades the ability to grow for pure index arithmetic —
//! the variant to pick when peak capacity is known in advance.

use core::cell::UnsafeCell;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use stampede::{AtomicSlotState, CacheAligned, Completion, SlotState};

/// Default ring traversals per acquire call.
pub const DEFAULT_ATTEMPTS: u32 = 5;
/// Hard upper bound on the ring size.
pub const MAX_SIZE: usize = i32::MAX as usize;

/// Construction-time configuration of a [`RingQueue`].
#[derive(Debug, Clone, Copy)]
pub struct RingQueueConfig {
    /// Slot count; at least 4.
    pub size: usize,
    /// Completion mode copied into every accessor.
    pub completion: Completion,
    /// Default ring traversals per acquire call; at least 1.
    pub attempts: u32,
}

struct Slot<T> {
    state: AtomicSlotState,
    payload: UnsafeCell<T>,
}

/// Bounded MPMC queue over a fixed ring of slots.
pub struct RingQueue<T> {
    slots: Box<[Slot<T>]>,
    producer_cursor: CacheAligned<AtomicUsize>,
    consumer_cursor: CacheAligned<AtomicUsize>,
    free: CacheAligned<AtomicUsize>,
    producing: AtomicBool,
    consuming: AtomicBool,
    completion: Completion,
    attempts: u32,
}

unsafe impl<T: Send> Send for RingQueue<T> {}
unsafe impl<T: Send> Sync for RingQueue<T> {}

impl<T: Default> RingQueue<T> {
    /// Creates a ring of `size` slots with the remaining configuration at
    /// its defaults.
    pub fn new(size: usize) -> Self {
        Self::with_config(RingQueueConfig {
            size,
            completion: Completion::Auto,
            attempts: DEFAULT_ATTEMPTS,
        })
    }

    /// Creates a ring from a full configuration.
    pub fn with_config(config: RingQueueConfig) -> Self {
        assert!(config.size >= 4, "ring size must be at least 4");
        assert!(config.size <= MAX_SIZE, "ring size too large");
        assert!(config.attempts >= 1, "at least one acquire attempt");

        let slots: Box<[Slot<T>]> = (0..config.size)
            .map(|_| Slot {
                state: AtomicSlotState::new(SlotState::Free),
                payload: UnsafeCell::new(T::default()),
            })
            .collect();

        Self {
            slots,
            producer_cursor: CacheAligned::new(AtomicUsize::new(0)),
            consumer_cursor: CacheAligned::new(AtomicUsize::new(0)),
            free: CacheAligned::new(AtomicUsize::new(config.size)),
            producing: AtomicBool::new(true),
            consuming: AtomicBool::new(true),
            completion: config.completion,
            attempts: config.attempts,
        }
    }

    /// Ring size.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slots currently in the free state. Advisory.
    pub fn free_slots(&self) -> usize {
        self.free.load(Ordering::Relaxed)
    }

    /// Whether every slot is free.
    pub fn empty(&self) -> bool {
        self.free.load(Ordering::Acquire) == self.slots.len()
    }

    /// Whether producers are still admitted.
    pub fn producing(&self) -> bool {
        self.producing.load(Ordering::Relaxed)
    }

    /// Whether consumers are still admitted.
    pub fn consuming(&self) -> bool {
        self.consuming.load(Ordering::Relaxed)
    }

    /// Rejects further producer acquires; consumers keep draining.
    pub fn shutdown(&self) {
        self.producing.store(false, Ordering::Relaxed);
    }

    /// Shuts down both sides; in-flight acquires observe this and abandon.
    pub fn stop(&self) {
        self.producing.store(false, Ordering::Relaxed);
        self.consuming.store(false, Ordering::Relaxed);
    }

    /// Claims a free slot for writing, with the configured attempts.
    pub fn producer_slot(&self) -> Option<ProducerGuard<'_, T>> {
        self.producer_slot_with(self.attempts)
    }

    /// Claims a free slot for writing, traversing the ring at most
    /// `attempts` times.
    pub fn producer_slot_with(&self, attempts: u32) -> Option<ProducerGuard<'_, T>> {
        assert!(attempts >= 1, "at least one acquire attempt");

        if self.free.load(Ordering::Acquire) == 0 {
            return None;
        }

        let mut attempts = attempts - 1;
        let sentinel = self.iterate_cursor(&self.producer_cursor);
        let mut current = sentinel;

        while self.producing.load(Ordering::Relaxed) {
            if self.slots[current]
                .state
                .compare_exchange(
                    SlotState::Free,
                    SlotState::ProdLocked,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                self.free.fetch_sub(1, Ordering::AcqRel);
                return Some(ProducerGuard {
                    queue: self,
                    slot: &self.slots[current],
                    completed: false,
                });
            }
            current = self.iterate_cursor(&self.producer_cursor);

            if current == sentinel {
                if attempts < 1 {
                    break;
                }
                attempts -= 1;
            }
        }
        None
    }

    /// Claims a ready slot for reading, with the configured attempts.
    pub fn consumer_slot(&self) -> Option<ConsumerGuard<'_, T>> {
        self.consumer_slot_with(self.attempts)
    }

    /// Claims a ready slot for reading, traversing the ring at most
    /// `attempts` times.
    pub fn consumer_slot_with(&self, attempts: u32) -> Option<ConsumerGuard<'_, T>> {
        assert!(attempts >= 1, "at least one acquire attempt");

        let mut attempts = attempts - 1;
        let sentinel = self.iterate_cursor(&self.consumer_cursor);
        let mut current = sentinel;

        while self.consuming.load(Ordering::Relaxed)
            && self.free.load(Ordering::Acquire) != self.slots.len()
        {
            if self.slots[current]
                .state
                .compare_exchange(
                    SlotState::Ready,
                    SlotState::ConsLocked,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Some(ConsumerGuard {
                    queue: self,
                    slot: &self.slots[current],
                    completed: false,
                });
            }
            current = self.iterate_cursor(&self.consumer_cursor);

            if current == sentinel {
                if attempts < 1 {
                    break;
                }
                attempts -= 1;
            }
        }
        None
    }

    /// Post-increments a cursor, folding it back under the ring size with
    /// an occasional compare-exchange. The counter may transiently exceed
    /// the size; slot selection is always taken modulo.
    fn iterate_cursor(&self, cursor: &AtomicUsize) -> usize {
        let size = self.slots.len();
        let current = cursor.fetch_add(1, Ordering::Relaxed);
        let next = current + 1;
        if next >= size {
            let _ = cursor.compare_exchange_weak(
                next,
                next % size,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }
        current % size
    }
}

/// Scoped producer access to one slot of a [`RingQueue`].
pub struct ProducerGuard<'a, T> {
    queue: &'a RingQueue<T>,
    slot: &'a Slot<T>,
    completed: bool,
}

impl<T> ProducerGuard<'_, T> {
    /// Arms the success branch of the release. No-op under `Auto`.
    pub fn complete(&mut self) {
        self.completed = true;
    }
}

impl<T> Deref for ProducerGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.slot.payload.get() }
    }
}

impl<T> DerefMut for ProducerGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.slot.payload.get() }
    }
}

impl<T> Drop for ProducerGuard<'_, T> {
    fn drop(&mut self) {
        if self.queue.completion == Completion::Auto || self.completed {
            self.slot.state.store(SlotState::Ready, Ordering::Release);
        } else {
            self.queue.free.fetch_add(1, Ordering::AcqRel);
            self.slot.state.store(SlotState::Free, Ordering::Release);
        }
    }
}

/// Scoped consumer access to one slot of a [`RingQueue`].
pub struct ConsumerGuard<'a, T> {
    queue: &'a RingQueue<T>,
    slot: &'a Slot<T>,
    completed: bool,
}

impl<T> ConsumerGuard<'_, T> {
    /// Arms the success branch of the release. No-op under `Auto`.
    pub fn complete(&mut self) {
        self.completed = true;
    }
}

impl<T: Default> ConsumerGuard<'_, T> {
    /// Moves the payload out, leaving the default value in the slot.
    pub fn take(&mut self) -> T {
        mem::take(unsafe { &mut *self.slot.payload.get() })
    }
}

impl<T> Deref for ConsumerGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.slot.payload.get() }
    }
}

impl<T> Drop for ConsumerGuard<'_, T> {
    fn drop(&mut self) {
        if self.queue.completion == Completion::Auto || self.completed {
            self.queue.free.fetch_add(1, Ordering::AcqRel);
            self.slot.state.store(SlotState::Free, Ordering::Release);
        } else {
            self.slot.state.store(SlotState::Ready, Ordering::Release);
        }
    }
}
