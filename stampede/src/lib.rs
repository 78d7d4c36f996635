//! Stampede: shared primitives for high-contention MPMC queues.
//!
//! This crate carries the building blocks the queue variants in
//! `stampede-queue` are assembled from:
//!
//! - [`Spinlock`]: a test-and-set lock with three waiting disciplines,
//!   used only on slow paths (growth, registry mutation, bulk
//!   reclamation).
//! - [`ColorBarrier`]: an asymmetric reader/writer coordinator for
//!   deferred deletion — many holders of one color coexist, the two
//!   colors never do.
//! - [`SlotState`] / [`AtomicSlotState`]: the four-state slot lifecycle
//!   protocol of the bounded queues.
//! - [`CacheAligned`]: a cache-line alignment shim.
//!
//! None of these primitives allocate; all of them release their side
//! effects through RAII guards on every exit path.

#![warn(missing_docs)]

pub mod align;
pub mod barrier;
pub mod spin;
pub mod state;

pub use align::CacheAligned;
pub use barrier::{ColorBarrier, GreenGuard, RedGuard};
pub use spin::{SpinGuard, Spinlock, Wait};
pub use state::{AtomicSlotState, Completion, SlotState};
