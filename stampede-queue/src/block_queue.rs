//! Bounded MPMC slot queue over a growable ring of blocks.
//!
//! Capacity is a closed cycle of slots spread over one or more blocks;
//! growth splices another block into the cycle up to a configured limit.
//! Producers and consumers claim slots in place through the four-state
//! slot protocol, so the hot path never allocates. Acquisition is bounded
//! by a configured number of full ring traversals and never blocks.

use core::cell::UnsafeCell;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};

use stampede::{AtomicSlotState, CacheAligned, Completion, SlotState, Spinlock, Wait};

/// Default slots per block.
pub const DEFAULT_BLOCK_SIZE: usize = 0x10;
/// Default capacity limit.
pub const DEFAULT_CAPACITY_LIMIT: usize = DEFAULT_BLOCK_SIZE * 0x1_0000;
/// Default ring traversals per acquire call.
pub const DEFAULT_ATTEMPTS: u32 = 5;
/// Hard upper bound on the capacity limit.
pub const MAX_CAPACITY_LIMIT: usize = i32::MAX as usize;

/// When a full acquire call may test for growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GrowthPolicy {
    /// Only at call entry; after a fruitless traversal the call fails and
    /// the caller retries externally.
    Call,
    /// At entry and after every complete ring traversal.
    #[default]
    Round,
    /// At entry and after every failed slot claim.
    Step,
}

/// Construction-time configuration of a [`BlockQueue`].
#[derive(Debug, Clone, Copy)]
pub struct BlockQueueConfig {
    /// Slots per block; at least 4.
    pub block_size: usize,
    /// Total slot count the queue may grow to.
    pub capacity_limit: usize,
    /// Completion mode copied into every accessor.
    pub completion: Completion,
    /// Default ring traversals per acquire call; at least 1.
    pub attempts: u32,
    /// Growth policy.
    pub growth: GrowthPolicy,
}

impl Default for BlockQueueConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            capacity_limit: DEFAULT_CAPACITY_LIMIT,
            completion: Completion::Auto,
            attempts: DEFAULT_ATTEMPTS,
            growth: GrowthPolicy::Round,
        }
    }
}

struct Slot<T> {
    state: AtomicSlotState,
    next: AtomicPtr<Slot<T>>,
    payload: UnsafeCell<T>,
}

impl<T: Default> Slot<T> {
    fn new() -> Self {
        Self {
            state: AtomicSlotState::new(SlotState::Free),
            next: AtomicPtr::new(core::ptr::null_mut()),
            payload: UnsafeCell::new(T::default()),
        }
    }
}

/// A block owns its slots in stable heap storage; the queue links slot
/// successors across blocks into one cycle.
struct Block<T> {
    slots: Box<[Slot<T>]>,
}

impl<T: Default> Block<T> {
    /// Allocates a block with its interior linked linearly and the last
    /// slot closed back onto the first.
    fn new(block_size: usize) -> Self {
        let slots: Box<[Slot<T>]> = (0..block_size).map(|_| Slot::new()).collect();
        for i in 0..block_size - 1 {
            let next = &slots[i + 1] as *const Slot<T> as *mut Slot<T>;
            slots[i].next.store(next, Ordering::Relaxed);
        }
        let first = &slots[0] as *const Slot<T> as *mut Slot<T>;
        slots[block_size - 1].next.store(first, Ordering::Relaxed);
        Self { slots }
    }

    fn first_slot(&self) -> *mut Slot<T> {
        &self.slots[0] as *const Slot<T> as *mut Slot<T>
    }

    fn last_slot(&self) -> &Slot<T> {
        &self.slots[self.slots.len() - 1]
    }
}

/// Bounded MPMC queue over a growable ring of slot blocks.
///
/// `producer_slot` / `consumer_slot` hand out scoped accessors; a failed
/// acquire is `None`. See [`BlockQueueConfig`] for the knobs.
pub struct BlockQueue<T> {
    blocks: Spinlock<Vec<Block<T>>>,
    producer_cursor: CacheAligned<AtomicPtr<Slot<T>>>,
    consumer_cursor: CacheAligned<AtomicPtr<Slot<T>>>,
    capacity: AtomicUsize,
    free: AtomicUsize,
    producing: AtomicBool,
    consuming: AtomicBool,
    config: BlockQueueConfig,
}

unsafe impl<T: Send> Send for BlockQueue<T> {}
unsafe impl<T: Send> Sync for BlockQueue<T> {}

impl<T: Default> BlockQueue<T> {
    /// Creates a queue of one block with the remaining configuration at
    /// its defaults.
    pub fn new(block_size: usize, capacity_limit: usize) -> Self {
        Self::with_config(BlockQueueConfig {
            block_size,
            capacity_limit,
            ..BlockQueueConfig::default()
        })
    }

    /// Creates a queue from a full configuration.
    pub fn with_config(config: BlockQueueConfig) -> Self {
        assert!(config.block_size >= 4, "block size must be at least 4");
        assert!(
            config.block_size <= config.capacity_limit,
            "capacity limit below block size"
        );
        assert!(
            config.capacity_limit <= MAX_CAPACITY_LIMIT,
            "capacity limit too large"
        );
        assert!(config.attempts >= 1, "at least one acquire attempt");

        let first = Block::new(config.block_size);
        let first_slot = first.first_slot();
        Self {
            blocks: Spinlock::with_wait(Wait::Yield, vec![first]),
            producer_cursor: CacheAligned::new(AtomicPtr::new(first_slot)),
            consumer_cursor: CacheAligned::new(AtomicPtr::new(first_slot)),
            capacity: AtomicUsize::new(config.block_size),
            free: AtomicUsize::new(config.block_size),
            producing: AtomicBool::new(true),
            consuming: AtomicBool::new(true),
            config,
        }
    }

    /// Current total slot count.
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Slots currently in the free state. Advisory.
    pub fn free_slots(&self) -> usize {
        self.free.load(Ordering::Relaxed)
    }

    /// Whether every slot is free.
    pub fn empty(&self) -> bool {
        self.free.load(Ordering::Acquire) == self.capacity.load(Ordering::Acquire)
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
        self.producer_slot_with(self.config.attempts)
    }

    /// Claims a free slot for writing, traversing the ring at most
    /// `attempts` times.
    pub fn producer_slot_with(&self, attempts: u32) -> Option<ProducerGuard<'_, T>> {
        assert!(attempts >= 1, "at least one acquire attempt");

        if self.free.load(Ordering::Acquire) == 0 && !self.grow() {
            return None;
        }

        let mut attempts = attempts - 1;
        let sentinel = self.advance(&self.producer_cursor);
        let mut current = sentinel;

        while self.producing.load(Ordering::Relaxed) {
            let slot = unsafe { &*current };
            if slot
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
                    slot,
                    completed: false,
                });
            }
            current = self.advance(&self.producer_cursor);

            if current == sentinel {
                if attempts < 1 {
                    break;
                }
                attempts -= 1;
                if self.config.growth == GrowthPolicy::Round
                    && self.free.load(Ordering::Acquire) == 0
                    && !self.grow()
                {
                    return None;
                }
            }
            if self.config.growth == GrowthPolicy::Step
                && self.free.load(Ordering::Acquire) == 0
                && !self.grow()
            {
                return None;
            }
        }
        None
    }

    /// Claims a ready slot for reading, with the configured attempts.
    pub fn consumer_slot(&self) -> Option<ConsumerGuard<'_, T>> {
        self.consumer_slot_with(self.config.attempts)
    }

    /// Claims a ready slot for reading, traversing the ring at most
    /// `attempts` times.
    pub fn consumer_slot_with(&self, attempts: u32) -> Option<ConsumerGuard<'_, T>> {
        assert!(attempts >= 1, "at least one acquire attempt");

        let mut attempts = attempts - 1;
        let sentinel = self.advance(&self.consumer_cursor);
        let mut current = sentinel;

        while self.consuming.load(Ordering::Relaxed)
            && self.free.load(Ordering::Acquire) != self.capacity.load(Ordering::Acquire)
        {
            let slot = unsafe { &*current };
            if slot
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
                    slot,
                    completed: false,
                });
            }
            current = self.advance(&self.consumer_cursor);

            if current == sentinel {
                if attempts < 1 {
                    break;
                }
                attempts -= 1;
            }
        }
        None
    }

    /// Swings a cursor to its successor and returns the slot it left.
    fn advance(&self, cursor: &AtomicPtr<Slot<T>>) -> *mut Slot<T> {
        // Cursors only ever hold slots owned by this queue; slots live as
        // long as the queue does.
        let next = unsafe { (*cursor.load(Ordering::Acquire)).next.load(Ordering::Acquire) };
        cursor.swap(next, Ordering::AcqRel)
    }

    /// Splices one more block into the ring.
    ///
    /// Returns false when the capacity limit is reached; the triggering
    /// acquire then fails and the queue stays usable.
    fn grow(&self) -> bool {
        let mut blocks = self.blocks.lock();

        if self.free.load(Ordering::Acquire) > 0 {
            return true;
        }
        if self.capacity.load(Ordering::Acquire) + self.config.block_size
            > self.config.capacity_limit
        {
            return false;
        }

        let block = Block::new(self.config.block_size);
        {
            // Close the new block onto the old tail's successor before
            // exposing it, so the cycle is never broken for a traverser.
            let tail_slot = blocks[blocks.len() - 1].last_slot();
            block
                .last_slot()
                .next
                .store(tail_slot.next.load(Ordering::Relaxed), Ordering::Relaxed);
            tail_slot.next.store(block.first_slot(), Ordering::Release);
        }
        blocks.push(block);

        self.capacity.fetch_add(self.config.block_size, Ordering::Release);
        self.free.fetch_add(self.config.block_size, Ordering::AcqRel);

        true
    }
}

/// Scoped producer access to one slot.
///
/// Dereferences to the payload. Dropping the guard publishes the slot
/// (`Auto` completion, or after [`complete`](Self::complete)); otherwise
/// the slot reverts to free and nothing becomes visible to consumers.
pub struct ProducerGuard<'a, T> {
    queue: &'a BlockQueue<T>,
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
        if self.queue.config.completion == Completion::Auto || self.completed {
            self.slot.state.store(SlotState::Ready, Ordering::Release);
        } else {
            self.queue.free.fetch_add(1, Ordering::AcqRel);
            self.slot.state.store(SlotState::Free, Ordering::Release);
        }
    }
}

/// Scoped consumer access to one slot.
///
/// Dereferences to the payload; [`take`](Self::take) moves it out.
/// Dropping the guard retires the slot (`Auto` completion, or after
/// [`complete`](Self::complete)); otherwise the slot stays ready and
/// remains visible to other consumers.
pub struct ConsumerGuard<'a, T> {
    queue: &'a BlockQueue<T>,
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
        if self.queue.config.completion == Completion::Auto || self.completed {
            self.queue.free.fetch_add(1, Ordering::AcqRel);
            self.slot.state.store(SlotState::Free, Ordering::Release);
        } else {
            self.slot.state.store(SlotState::Ready, Ordering::Release);
        }
    }
}
