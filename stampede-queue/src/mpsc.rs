//! Linked multi-producer single-consumer queue.
//!
//! A sentinel-headed singly-linked list. Producers link nodes behind an
//! atomic tail exchange and never block; the sole consumer unlinks from
//! the head and is the sole deallocator, so no reclamation scheme is
//! needed. The single-consumer contract is carried by the type system:
//! [`Consumer`] is not clonable and `dequeue` takes `&mut self`.

use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::sync::Arc;

use stampede::CacheAligned;

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

struct Shared<T> {
    head: CacheAligned<AtomicPtr<Node<T>>>,
    tail: CacheAligned<AtomicPtr<Node<T>>>,
    producing: AtomicBool,
    consuming: AtomicBool,
}

unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    fn new() -> Self {
        let sentinel = Node::new(None);
        Self {
            head: CacheAligned::new(AtomicPtr::new(sentinel)),
            tail: CacheAligned::new(AtomicPtr::new(sentinel)),
            producing: AtomicBool::new(true),
            consuming: AtomicBool::new(true),
        }
    }

    fn empty(&self) -> bool {
        let head = self.head.load(Ordering::Acquire);
        unsafe { (*head).next.load(Ordering::Acquire).is_null() }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let mut current = self.head.load(Ordering::Relaxed);
        while !current.is_null() {
            let next = unsafe { (*current).next.load(Ordering::Relaxed) };
            unsafe { drop(Box::from_raw(current)) };
            current = next;
        }
    }
}

/// Creates a linked MPSC queue, returning its two halves.
pub fn queue<T>() -> (Producer<T>, Consumer<T>) {
    let shared = Arc::new(Shared::new());
    (
        Producer {
            shared: shared.clone(),
        },
        Consumer { shared },
    )
}

/// The producing half. Clonable; any number of threads may enqueue.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Producer<T> {
    /// Links a value behind the tail. Returns false after shutdown.
    pub fn enqueue(&self, value: T) -> bool {
        if !self.shared.producing.load(Ordering::Relaxed) {
            return false;
        }

        let node = Node::new(Some(value));
        let prev = self.shared.tail.swap(node, Ordering::AcqRel);
        unsafe { (*prev).next.store(node, Ordering::Release) };
        true
    }

    /// Whether the first user value is absent.
    pub fn empty(&self) -> bool {
        self.shared.empty()
    }

    /// Whether producers are still admitted.
    pub fn producing(&self) -> bool {
        self.shared.producing.load(Ordering::Relaxed)
    }

    /// Whether the consumer is still admitted.
    pub fn consuming(&self) -> bool {
        self.shared.consuming.load(Ordering::Relaxed)
    }

    /// Rejects further enqueues; the consumer keeps draining.
    pub fn shutdown(&self) {
        self.shared.producing.store(false, Ordering::Relaxed);
    }

    /// Shuts down both sides.
    pub fn stop(&self) {
        self.shared.producing.store(false, Ordering::Relaxed);
        self.shared.consuming.store(false, Ordering::Relaxed);
    }
}

/// The consuming half: the sole reader and the sole deallocator.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Consumer<T> {
    /// Unlinks the oldest value. `None` when the queue is empty or
    /// consumption has stopped.
    pub fn dequeue(&mut self) -> Option<T> {
        if !self.shared.consuming.load(Ordering::Relaxed) {
            return None;
        }

        let head = self.shared.head.load(Ordering::Acquire);
        let next = unsafe { (*head).next.load(Ordering::Acquire) };
        if next.is_null() {
            return None;
        }

        let prev = self.shared.head.swap(next, Ordering::AcqRel);
        // `&mut self` on the unique consumer half makes this the only
        // thread ever touching payloads or freeing nodes.
        let data = unsafe { (*next).data.take() };
        unsafe { drop(Box::from_raw(prev)) };
        data
    }

    /// Whether the first user value is absent.
    pub fn empty(&self) -> bool {
        self.shared.empty()
    }

    /// Whether producers are still admitted.
    pub fn producing(&self) -> bool {
        self.shared.producing.load(Ordering::Relaxed)
    }

    /// Whether the consumer is still admitted.
    pub fn consuming(&self) -> bool {
        self.shared.consuming.load(Ordering::Relaxed)
    }

    /// Rejects further enqueues; the consumer keeps draining.
    pub fn shutdown(&self) {
        self.shared.producing.store(false, Ordering::Relaxed);
    }

    /// Shuts down both sides.
    pub fn stop(&self) {
        self.shared.producing.store(false, Ordering::Relaxed);
        self.shared.consuming.store(false, Ordering::Relaxed);
    }
}
