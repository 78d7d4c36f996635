//! Michael–Scott MPMC queue with color-barrier deferred deletion.
//!
//! Enqueue and dequeue run under the green side of a
//! [`ColorBarrier`](stampede::ColorBarrier); unlinked nodes go onto a
//! retired chain instead of being freed. [`purge`](DeferredQueue::purge)
//! (and destruction) take the red side: with no green thread live, the
//! retired chain cannot be referenced and is drained unconditionally.

use core::cell::UnsafeCell;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use crossbeam_utils::Backoff;

use stampede::{CacheAligned, ColorBarrier};

struct Node<T> {
    payload: UnsafeCell<Option<T>>,
    next: AtomicPtr<Node<T>>,
    next_deleted: AtomicPtr<Node<T>>,
    deleted: AtomicBool,
}

impl<T> Node<T> {
    fn new(payload: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            payload: UnsafeCell::new(payload),
            next: AtomicPtr::new(ptr::null_mut()),
            next_deleted: AtomicPtr::new(ptr::null_mut()),
            deleted: AtomicBool::new(false),
        }))
    }
}

/// MPMC queue whose nodes are reclaimed in bulk under the red color.
pub struct DeferredQueue<T> {
    head: CacheAligned<AtomicPtr<Node<T>>>,
    tail: CacheAligned<AtomicPtr<Node<T>>>,
    retired: AtomicPtr<Node<T>>,
    barrier: ColorBarrier,
    producing: AtomicBool,
    consuming: AtomicBool,
}

unsafe impl<T: Send> Send for DeferredQueue<T> {}
unsafe impl<T: Send> Sync for DeferredQueue<T> {}

impl<T> DeferredQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let sentinel = Node::new(None);
        Self {
            head: CacheAligned::new(AtomicPtr::new(sentinel)),
            tail: CacheAligned::new(AtomicPtr::new(sentinel)),
            retired: AtomicPtr::new(ptr::null_mut()),
            barrier: ColorBarrier::new(),
            producing: AtomicBool::new(true),
            consuming: AtomicBool::new(true),
        }
    }

    /// Whether the first user value is absent.
    pub fn empty(&self) -> bool {
        let _green = self.barrier.green();
        let head = self.head.load(Ordering::Acquire);
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }

    /// Whether producers are still admitted.
    pub fn producing(&self) -> bool {
        self.producing.load(Ordering::Relaxed)
    }

    /// Whether consumers are still admitted.
    pub fn consuming(&self) -> bool {
        self.consuming.load(Ordering::Relaxed)
    }

    /// Rejects further enqueues; dequeues keep draining.
    pub fn shutdown(&self) {
        self.producing.store(false, Ordering::Relaxed);
    }

    /// Shuts down both sides; in-flight operations observe this and
    /// abandon.
    pub fn stop(&self) {
        self.producing.store(false, Ordering::Relaxed);
        self.consuming.store(false, Ordering::Relaxed);
    }

    /// Links a value behind the tail. Returns false if the queue has
    /// stopped producing.
    pub fn enqueue(&self, value: T) -> bool {
        if !self.producing.load(Ordering::Relaxed) {
            return false;
        }

        let _green = self.barrier.green();

        let node = Node::new(Some(value));
        let backoff = Backoff::new();

        while self.producing.load(Ordering::Relaxed) {
            let tail = self.tail.load(Ordering::Acquire);
            let next = unsafe { (*tail).next.load(Ordering::Acquire) };

            if self.tail.load(Ordering::Relaxed) != tail {
                continue;
            }
            if !next.is_null() {
                // Help a lagging tail along.
                self.tail.store(next, Ordering::Release);
                continue;
            }
            if unsafe {
                (*tail)
                    .next
                    .compare_exchange(next, node, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            } {
                return true;
            }
            backoff.spin();
        }

        // Production stopped before the node was linked.
        unsafe { drop(Box::from_raw(node)) };
        false
    }

    /// Unlinks the oldest value. `None` when empty or stopped.
    pub fn dequeue(&self) -> Option<T> {
        let _green = self.barrier.green();
        let backoff = Backoff::new();

        while self.consuming.load(Ordering::Relaxed) {
            let head = self.head.load(Ordering::Acquire);
            let first = unsafe { (*head).next.load(Ordering::Acquire) };

            if self.head.load(Ordering::Relaxed) != head {
                continue;
            }
            if first.is_null() {
                return None;
            }
            if self.tail.load(Ordering::Relaxed) == head {
                let _ = self
                    .tail
                    .compare_exchange(head, first, Ordering::AcqRel, Ordering::Acquire);
                continue;
            }
            if unsafe { (*first).deleted.swap(true, Ordering::AcqRel) } {
                // Another consumer already claimed this node.
                backoff.spin();
                continue;
            }
            if self
                .head
                .compare_exchange(head, first, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                // Sole claimant of `first`: the payload is ours.
                let value = unsafe { (*(*first).payload.get()).take() };
                unsafe {
                    (*head)
                        .next_deleted
                        .store(self.retired.swap(head, Ordering::AcqRel), Ordering::Release);
                }
                return value;
            }
        }

        None
    }

    /// Drains the retired chain.
    ///
    /// Holds the red color for the duration: no enqueue or dequeue can be
    /// live, so every retired node is unreferenced and freed on the spot.
    pub fn purge(&self) {
        let _red = self.barrier.red();

        let mut current = self.retired.swap(ptr::null_mut(), Ordering::AcqRel);
        while !current.is_null() {
            let next = unsafe { (*current).next_deleted.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(current)) };
            current = next;
        }
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for DeferredQueue<T> {
    fn drop(&mut self) {
        self.stop();

        let _red = self.barrier.red();

        // Undelivered nodes. Nodes with the deleted mark are reachable
        // through the retired chain and freed there.
        let head = self.head.load(Ordering::Relaxed);
        let mut current = unsafe { (*head).next.load(Ordering::Relaxed) };
        while !current.is_null() {
            let next = unsafe { (*current).next.load(Ordering::Relaxed) };
            if !unsafe { (*current).deleted.load(Ordering::Relaxed) } {
                unsafe { drop(Box::from_raw(current)) };
            }
            current = next;
        }

        unsafe { drop(Box::from_raw(head)) };

        let mut current = self.retired.load(Ordering::Relaxed);
        while !current.is_null() {
            let next = unsafe { (*current).next_deleted.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(current)) };
            current = next;
        }
    }
}
