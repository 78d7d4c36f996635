//! Michael–Scott MPMC queue with epoch-based reclamation.
//!
//! Workers publish a monotonically increasing epoch into a per-queue
//! registry on every operation; dequeued nodes are tagged with the epoch
//! of their retirement and pushed onto a LIFO chain. A purge pass frees
//! every chained node whose retirement epoch precedes the minimum epoch
//! any live worker has published — no such worker's ongoing operation can
//! still hold a reference to it.
//!
//! Workers may register up front with [`touch`](EpochQueue::touch) and
//! must [`escape`](EpochQueue::escape) before going away permanently;
//! enqueue and dequeue self-register on first use.
//!
//! The epoch counter is finite: the queue supports at most `u64::MAX - 1`
//! critical-section entries over its lifetime. This is an operational
//! limit, not a recoverable error.

use core::cell::{RefCell, UnsafeCell};
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicI64, AtomicPtr, AtomicU64, Ordering};
use crossbeam_utils::Backoff;
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use stampede::{CacheAligned, Spinlock, Wait};

/// Epoch value meaning "not in a critical section".
const EPOCH_IDLE: u64 = u64::MAX;
/// `deleted_at` value meaning "still in the live list".
const NODE_LIVE: u64 = u64::MAX;
/// Pause between passes of the dedicated purge thread.
const PURGE_INTERVAL: Duration = Duration::from_micros(200);

/// Construction-time configuration of an [`EpochQueue`].
#[derive(Debug, Clone, Copy)]
pub struct EpochConfig {
    /// Dequeues between inline purge passes; at least 1.
    pub purge_trigger: i64,
    /// Retired nodes always left untouched at the head of the chain; at
    /// least 1. The newest retirements may still be racing with a push.
    pub purge_skip: usize,
    /// Run purge on a dedicated thread instead of inline.
    pub purge_thread: bool,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            purge_trigger: 1024,
            purge_skip: 8,
            purge_thread: false,
        }
    }
}

struct Node<T> {
    payload: UnsafeCell<Option<T>>,
    next: AtomicPtr<Node<T>>,
    next_deleted: AtomicPtr<Node<T>>,
    deleted_at: AtomicU64,
}

impl<T> Node<T> {
    fn new(payload: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            payload: UnsafeCell::new(payload),
            next: AtomicPtr::new(ptr::null_mut()),
            next_deleted: AtomicPtr::new(ptr::null_mut()),
            deleted_at: AtomicU64::new(NODE_LIVE),
        }))
    }
}

/// One registered worker's published epoch.
struct EpochSlot {
    thread: ThreadId,
    epoch: AtomicU64,
}

std::thread_local! {
    /// Registered entries of this thread, keyed by queue id, so a worker
    /// publishes into its own entry with a plain store and no lock.
    static WORKER_CACHE: RefCell<Vec<(u64, Arc<EpochSlot>)>> =
        const { RefCell::new(Vec::new()) };
}

/// Source of per-queue ids for the worker cache.
static QUEUE_ID: AtomicU64 = AtomicU64::new(0);

struct Inner<T> {
    head: CacheAligned<AtomicPtr<Node<T>>>,
    tail: CacheAligned<AtomicPtr<Node<T>>>,
    retired: AtomicPtr<Node<T>>,
    epoch: AtomicU64,
    workers: Spinlock<Vec<Arc<EpochSlot>>>,
    purge_lock: Spinlock<()>,
    purge_budget: AtomicI64,
    producing: AtomicBool,
    consuming: AtomicBool,
    purging: AtomicBool,
    id: u64,
    config: EpochConfig,
}

unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/// Publishes the worker's epoch for the duration of one operation.
struct EpochPin<'a> {
    cell: &'a AtomicU64,
}

impl<'a> EpochPin<'a> {
    fn enter(counter: &AtomicU64, slot: &'a EpochSlot) -> Self {
        // Only monotonicity matters for the counter itself.
        let stamp = counter.fetch_add(1, Ordering::Relaxed);
        debug_assert!(stamp != EPOCH_IDLE, "epoch counter exhausted");
        slot.epoch.store(stamp, Ordering::SeqCst);
        Self { cell: &slot.epoch }
    }
}

impl Drop for EpochPin<'_> {
    fn drop(&mut self) {
        self.cell.store(EPOCH_IDLE, Ordering::Release);
    }
}

impl<T> Inner<T> {
    fn new(config: EpochConfig) -> Self {
        let sentinel = Node::new(None);
        Self {
            head: CacheAligned::new(AtomicPtr::new(sentinel)),
            tail: CacheAligned::new(AtomicPtr::new(sentinel)),
            retired: AtomicPtr::new(ptr::null_mut()),
            epoch: AtomicU64::new(0),
            workers: Spinlock::with_wait(Wait::Spin, Vec::new()),
            purge_lock: Spinlock::with_wait(Wait::Yield, ()),
            purge_budget: AtomicI64::new(config.purge_trigger),
            producing: AtomicBool::new(true),
            consuming: AtomicBool::new(true),
            purging: AtomicBool::new(config.purge_thread),
            id: QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            config,
        }
    }

    /// This thread's registry entry; registers on first use.
    fn worker(&self) -> Arc<EpochSlot> {
        WORKER_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            if let Some(index) = cache.iter().position(|(id, _)| *id == self.id) {
                return cache[index].1.clone();
            }
            let slot = Arc::new(EpochSlot {
                thread: thread::current().id(),
                epoch: AtomicU64::new(EPOCH_IDLE),
            });
            self.workers.lock().push(slot.clone());
            cache.push((self.id, slot.clone()));
            slot
        })
    }

    fn escape(&self) {
        let removed = WORKER_CACHE.with(|cache| {
            let mut cache = cache.borrow_mut();
            cache
                .iter()
                .position(|(id, _)| *id == self.id)
                .map(|index| cache.swap_remove(index).1)
        });
        if let Some(slot) = removed {
            self.workers.lock().retain(|entry| !Arc::ptr_eq(entry, &slot));
        } else {
            // Registered without a cache entry cannot happen through the
            // public API; fall back to identity by thread id.
            let me = thread::current().id();
            self.workers.lock().retain(|entry| entry.thread != me);
        }
    }

    fn enqueue(&self, value: T) -> bool {
        if !self.producing.load(Ordering::Relaxed) {
            return false;
        }

        let worker = self.worker();
        let _pin = EpochPin::enter(&self.epoch, &worker);

        let node = Node::new(Some(value));
        let backoff = Backoff::new();

        while self.producing.load(Ordering::Relaxed) {
            let tail = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*tail).next.load(Ordering::Acquire) };

            if !next.is_null() {
                // Help a lagging tail along.
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }
            if unsafe {
                (*tail)
                    .next
                    .compare_exchange(ptr::null_mut(), node, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            } {
                let _ = self
                    .tail
                    .compare_exchange(tail, node, Ordering::Release, Ordering::Relaxed);
                return true;
            }
            backoff.spin();
        }

        // Production stopped before the node was linked.
        unsafe { drop(Box::from_raw(node)) };
        false
    }

    fn dequeue(&self) -> Option<T> {
        let worker = self.worker();
        let _pin = EpochPin::enter(&self.epoch, &worker);
        let backoff = Backoff::new();

        while self.consuming.load(Ordering::Relaxed) {
            let head = self.head.load(Ordering::Acquire);
            let next = unsafe { (*head).next.load(Ordering::Acquire) };
            if next.is_null() {
                return None;
            }
            let tail = self.tail.load(Ordering::Acquire);
            if head == tail {
                let _ = self
                    .tail
                    .compare_exchange(tail, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }
            if unsafe { (*next).deleted_at.load(Ordering::Acquire) } != NODE_LIVE {
                // Stale head: another consumer already retired past here.
                backoff.spin();
                continue;
            }
            if self
                .head
                .compare_exchange(head, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Sole claimant: the payload of the new sentinel is ours,
                // the old sentinel goes onto the retired chain.
                let value = unsafe { (*(*next).payload.get()).take() };
                unsafe {
                    (*head).deleted_at.store(self.epoch.load(Ordering::Relaxed), Ordering::Release);
                    (*head)
                        .next_deleted
                        .store(self.retired.swap(head, Ordering::AcqRel), Ordering::Release);
                }
                self.after_dequeue();
                return value;
            }
            backoff.spin();
        }

        None
    }

    fn after_dequeue(&self) {
        if self.config.purge_thread {
            return;
        }
        if self.purge_budget.fetch_sub(1, Ordering::AcqRel) <= 1 {
            self.purge();
            self.purge_budget.store(self.config.purge_trigger, Ordering::Release);
        }
    }

    /// Smallest epoch any registered worker has published.
    fn min_epoch(&self) -> u64 {
        let workers = self.workers.lock();
        let mut min = self.epoch.load(Ordering::Relaxed);
        for worker in workers.iter() {
            min = min.min(worker.epoch.load(Ordering::Acquire));
        }
        min
    }

    fn purge(&self) {
        let _serial = self.purge_lock.lock();

        let min = self.min_epoch();

        // The chain prefix stays untouched: the newest retirements may
        // still be racing with the exchange-then-link push.
        let mut prev = self.retired.load(Ordering::Acquire);
        if prev.is_null() {
            return;
        }
        let mut skipped = 1;
        let mut current = unsafe { (*prev).next_deleted.load(Ordering::Acquire) };
        while !current.is_null() && skipped < self.config.purge_skip {
            prev = current;
            current = unsafe { (*current).next_deleted.load(Ordering::Acquire) };
            skipped += 1;
        }

        // Traversal beyond the prefix is exclusive under the purge lock;
        // pushes only ever touch the chain head.
        while !current.is_null() {
            let next = unsafe { (*current).next_deleted.load(Ordering::Acquire) };
            if unsafe { (*current).deleted_at.load(Ordering::Acquire) } < min {
                unsafe {
                    (*prev).next_deleted.store(next, Ordering::Release);
                    drop(Box::from_raw(current));
                }
            } else {
                prev = current;
            }
            current = next;
        }
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        let mut current = self.head.load(Ordering::Relaxed);
        while !current.is_null() {
            let next = unsafe { (*current).next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(current)) };
            current = next;
        }

        let mut current = self.retired.load(Ordering::Relaxed);
        while !current.is_null() {
            let next = unsafe { (*current).next_deleted.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(current)) };
            current = next;
        }
    }
}

/// MPMC queue with epoch-based reclamation of its nodes.
pub struct EpochQueue<T: Send + 'static> {
    inner: Arc<Inner<T>>,
    purge_thread: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> EpochQueue<T> {
    /// Creates a queue with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EpochConfig::default())
    }

    /// Creates a queue from a full configuration.
    pub fn with_config(config: EpochConfig) -> Self {
        assert!(config.purge_trigger >= 1, "purge trigger must be positive");
        assert!(config.purge_skip >= 1, "purge skip must be at least 1");

        let inner = Arc::new(Inner::new(config));
        let purge_thread = config.purge_thread.then(|| {
            let inner = inner.clone();
            thread::spawn(move || {
                while inner.purging.load(Ordering::Relaxed) {
                    thread::park_timeout(PURGE_INTERVAL);
                    inner.purge();
                }
            })
        });

        Self {
            inner,
            purge_thread,
        }
    }

    /// Whether the first user value is absent.
    pub fn empty(&self) -> bool {
        let head = self.inner.head.load(Ordering::Acquire);
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }

    /// Whether producers are still admitted.
    pub fn producing(&self) -> bool {
        self.inner.producing.load(Ordering::Relaxed)
    }

    /// Whether consumers are still admitted.
    pub fn consuming(&self) -> bool {
        self.inner.consuming.load(Ordering::Relaxed)
    }

    /// Rejects further enqueues; dequeues keep draining.
    pub fn shutdown(&self) {
        self.inner.producing.store(false, Ordering::Relaxed);
    }

    /// Shuts down both sides; in-flight operations observe this and
    /// abandon.
    pub fn stop(&self) {
        self.inner.producing.store(false, Ordering::Relaxed);
        self.inner.consuming.store(false, Ordering::Relaxed);
    }

    /// Registers the calling worker in the epoch registry. Idempotent.
    pub fn touch(&self) {
        let _ = self.inner.worker();
    }

    /// Deregisters the calling worker. Workers must escape before going
    /// away permanently, or their stale entry lingers in the registry.
    pub fn escape(&self) {
        self.inner.escape();
    }

    /// Links a value behind the tail. Returns false if the queue has
    /// stopped producing.
    pub fn enqueue(&self, value: T) -> bool {
        self.inner.enqueue(value)
    }

    /// Unlinks the oldest value. `None` when empty or stopped.
    pub fn dequeue(&self) -> Option<T> {
        self.inner.dequeue()
    }

    /// Runs a reclamation pass synchronously.
    pub fn purge(&self) {
        self.inner.purge();
    }
}

impl<T: Send + 'static> Default for EpochQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for EpochQueue<T> {
    fn drop(&mut self) {
        self.stop();
        self.inner.purging.store(false, Ordering::Release);
        if let Some(handle) = self.purge_thread.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
        // The last Arc drop drains the live list and the retired chain.
    }
}
