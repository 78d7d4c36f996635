//! Test-and-set spinlock with selectable waiting discipline.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// How long a parked waiter sleeps between polls of the flag.
const PARK_INTERVAL: Duration = Duration::from_micros(50);

/// Waiting discipline applied while the lock is contended.
///
/// Different subsystems have different contention profiles: `Spin` suits
/// very short critical sections (an epoch-registry update), `Yield` suits
/// sections that may run long (growth, purge), `Park` puts the waiter to
/// sleep between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wait {
    /// Busy-spin with a CPU relax hint.
    #[default]
    Spin,
    /// Yield the OS thread to the scheduler on contention.
    Yield,
    /// Park the OS thread between polls of the flag. Release needs no
    /// notification; parked waiters re-poll on a short timeout.
    Park,
}

/// A test-and-set lock owning the data it guards.
///
/// The test phase spins on a relaxed load so the flag stays in cache;
/// acquisition is a single `swap` with acquire semantics. Non-reentrant.
pub struct Spinlock<T: ?Sized> {
    locked: AtomicBool,
    wait: Wait,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for Spinlock<T> {}
unsafe impl<T: ?Sized + Send> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    /// Creates a lock around `data` with the default (`Spin`) discipline.
    pub const fn new(data: T) -> Self {
        Self::with_wait(Wait::Spin, data)
    }

    /// Creates a lock around `data` with the given waiting discipline.
    pub const fn with_wait(wait: Wait, data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            wait,
            data: UnsafeCell::new(data),
        }
    }

    /// Acquires the lock, waiting per the configured discipline.
    #[inline]
    pub fn lock(&self) -> SpinGuard<'_, T> {
        loop {
            while self.locked.load(Ordering::Relaxed) {
                match self.wait {
                    Wait::Spin => spin_loop(),
                    Wait::Yield => thread::yield_now(),
                    Wait::Park => thread::park_timeout(PARK_INTERVAL),
                }
            }
            if !self.locked.swap(true, Ordering::Acquire) {
                return SpinGuard { lock: self };
            }
        }
    }
}

/// RAII holder for a [`Spinlock`]. Releases the lock on drop.
pub struct SpinGuard<'a, T: ?Sized> {
    lock: &'a Spinlock<T>,
}

impl<T: ?Sized> Deref for SpinGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
