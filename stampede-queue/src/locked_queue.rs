//! Linked MPMC queue serialized on a spinlock.
//!
//! The same sentinel list as [`mpsc`](crate::mpsc), with both ends
//! guarded by an active-spin lock. Strictly serialized, yet often
//! competitive: the critical sections are a handful of instructions and
//! there is no reclamation overhead. This is the reference baseline the
//! lock-free variants are measured against.

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use stampede::{CacheAligned, Spinlock, Wait};

struct Node<T> {
    data: Option<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn new(data: Option<T>) -> *mut Self {
        Box::into_raw(Box::new(Self {
            data,
            next: AtomicPtr::new(ptr::null_mut()),
        }))
    }
}

/// Linked MPMC queue with a spinlock around both ends.
pub struct LockedQueue<T> {
    head: CacheAligned<AtomicPtr<Node<T>>>,
    tail: CacheAligned<AtomicPtr<Node<T>>>,
    lock: Spinlock<()>,
    producing: AtomicBool,
    consuming: AtomicBool,
}

unsafe impl<T: Send> Send for LockedQueue<T> {}
unsafe impl<T: Send> Sync for LockedQueue<T> {}

impl<T> LockedQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let sentinel = Node::new(None);
        Self {
            head: CacheAligned::new(AtomicPtr::new(sentinel)),
            tail: CacheAligned::new(AtomicPtr::new(sentinel)),
            lock: Spinlock::with_wait(Wait::Spin, ()),
            producing: AtomicBool::new(true),
            consuming: AtomicBool::new(true),
        }
    }

    /// Whether the first user value is absent.
    pub fn empty(&self) -> bool {
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

    /// Shuts down both sides.
    pub fn stop(&self) {
        self.producing.store(false, Ordering::Relaxed);
        self.consuming.store(false, Ordering::Relaxed);
    }

    /// Links a value behind the tail. Returns false after shutdown.
    pub fn enqueue(&self, value: T) -> bool {
        if !self.producing.load(Ordering::Relaxed) {
            return false;
        }

        let _serial = self.lock.lock();

        let node = Node::new(Some(value));
        let prev = self.tail.swap(node, Ordering::AcqRel);
        unsafe { (*prev).next.store(node, Ordering::Release) };

        true
    }

    /// Unlinks the oldest value. `None` when empty or stopped.
    pub fn dequeue(&self) -> Option<T> {
        if !self.consuming.load(Ordering::Relaxed) {
            return None;
        }

        let _serial = self.lock.lock();

        let head = self.head.load(Ordering::Acquire);
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }

        let prev = self.head.swap(next, Ordering::AcqRel);
        let data = unsafe { (*next).data.take() };
        unsafe { drop(Box::from_raw(prev)) };
        data
    }
}

impl<T> Default for LockedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockedQueue<T> {
    fn drop(&mut self) {
        self.stop();

        let _serial = self.lock.lock();

        let mut current = self.head.load(Ordering::Relaxed);
        while !current.is_null() {
            let next = unsafe { (*current).next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(current)) };
            current = next;
        }
    }
}
