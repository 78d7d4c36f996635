//! A family of in-process MPMC queues for high-contention workloads.
//!
//! Six variants trade latency, throughput, and memory footprint against
//! each other by differing in allocation behavior and memory-reclamation
//! strategy:
//!
//! - [`BlockQueue`]: bounded ring of slot blocks; grows by appending
//!   blocks up to a limit, no per-item allocation.
//! - [`RingQueue`]: a single fixed ring of slots with indexed cursors;
//!   allocation-free, the tightest inner loop.
//! - [`mpsc`]: a linked multi-producer single-consumer queue; the sole
//!   consumer is the sole deallocator, so no reclamation scheme is needed.
//! - [`LockedQueue`]: a linked MPMC serialized on a spinlock; the
//!   reference baseline.
//! - [`EpochQueue`]: a Michael–Scott MPMC with epoch-based reclamation.
//! - [`DeferredQueue`]: a Michael–Scott MPMC with color-barrier deferred
//!   deletion.
//!
//! Every variant delivers each value to exactly one consumer. No variant
//! promises FIFO across concurrent producers: producers race for
//! slots/nodes and the observed global order is an interleaving. All
//! failures are in-band (`Option` / `bool`); no operation blocks.

pub mod block_queue;
pub mod deferred_queue;
pub mod epoch_queue;
pub mod harness;
pub mod locked_queue;
pub mod mpsc;
pub mod ring_queue;

pub use block_queue::{BlockQueue, BlockQueueConfig, GrowthPolicy};
pub use deferred_queue::DeferredQueue;
pub use epoch_queue::{EpochConfig, EpochQueue};
pub use locked_queue::LockedQueue;
pub use ring_queue::{RingQueue, RingQueueConfig};
pub use stampede::Completion;
