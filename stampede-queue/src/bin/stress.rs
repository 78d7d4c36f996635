//! Conservation stress driver.
//!
//! Floods a block queue and an epoch queue with a decrementing-counter
//! workload from `4 x cores` producers against as many consumers, then
//! verifies the control sum `N(N+1)/2`. Exits with a failure status if
//! any phase loses or duplicates an item.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use stampede_queue::harness::{
    summary_capacity, summary_items, summary_result, summary_workers, Item, SideStats, WorkerSet,
    WorkerSets, THICK_SEPARATOR,
};
use stampede_queue::{
    BlockQueue, BlockQueueConfig, Completion, EpochConfig, EpochQueue, GrowthPolicy,
};

#[cfg(debug_assertions)]
const ITEMS: Item = 100_000;
#[cfg(not(debug_assertions))]
const ITEMS: Item = 10_000_000;

const BLOCK_SIZE: usize = 100;
const CAPACITY_LIMIT: usize = 400;

#[derive(Default)]
struct Tally {
    time_us: AtomicU64,
    successes: AtomicI64,
    fails: AtomicI64,
}

impl Tally {
    fn stats(&self, workers: usize) -> SideStats {
        SideStats {
            workers,
            time: Duration::from_micros(self.time_us.load(Ordering::Relaxed)),
            successes: self.successes.load(Ordering::Relaxed),
            fails: self.fails.load(Ordering::Relaxed),
        }
    }
}

fn control_sum(items: Item) -> i64 {
    items * (items + 1) / 2
}

fn block_phase(items: Item, workers: WorkerSet) -> (bool, String) {
    let queue: BlockQueue<Item> = BlockQueue::with_config(BlockQueueConfig {
        block_size: BLOCK_SIZE,
        capacity_limit: CAPACITY_LIMIT,
        completion: Completion::Auto,
        attempts: 1,
        growth: GrowthPolicy::Call,
    });
    let counter = AtomicI64::new(items);
    let consumed = AtomicI64::new(0);
    let result = AtomicI64::new(0);
    let producers = Tally::default();
    let consumers = Tally::default();

    let started = Instant::now();

    thread::scope(|scope| {
        for _ in 0..workers.consumers {
            scope.spawn(|| {
                while queue.consuming() {
                    let begun = Instant::now();
                    let slot = queue.consumer_slot();
                    consumers
                        .time_us
                        .fetch_add(begun.elapsed().as_micros() as u64, Ordering::Relaxed);
                    if let Some(slot) = slot {
                        result.fetch_add(*slot, Ordering::AcqRel);
                        consumed.fetch_add(1, Ordering::AcqRel);
                        consumers.successes.fetch_add(1, Ordering::Relaxed);
                    } else {
                        consumers.fails.fetch_add(1, Ordering::Relaxed);
                        thread::yield_now();
                    }
                }
            });
        }

        for _ in 0..workers.producers {
            scope.spawn(|| {
                let mut value = counter.fetch_sub(1, Ordering::AcqRel);
                while value > 0 {
                    let begun = Instant::now();
                    let slot = queue.producer_slot();
                    producers
                        .time_us
                        .fetch_add(begun.elapsed().as_micros() as u64, Ordering::Relaxed);
                    if let Some(mut slot) = slot {
                        *slot = value;
                        value = counter.fetch_sub(1, Ordering::AcqRel);
                        producers.successes.fetch_add(1, Ordering::Relaxed);
                    } else {
                        producers.fails.fetch_add(1, Ordering::Relaxed);
                        thread::yield_now();
                    }
                }
            });
        }

        while counter.load(Ordering::Acquire) > 0 || consumed.load(Ordering::Acquire) < items {
            thread::yield_now();
        }
        queue.stop();
    });

    let total = started.elapsed();
    let ok = result.load(Ordering::Acquire) == control_sum(items);

    let mut out = String::new();
    summary_items(&mut out, items);
    summary_workers(
        &mut out,
        producers.stats(workers.producers),
        consumers.stats(workers.consumers),
    );
    summary_capacity(&mut out, queue.capacity(), BLOCK_SIZE, CAPACITY_LIMIT);
    summary_result(&mut out, ok, total);

    (ok, out)
}

fn epoch_phase(items: Item, workers: WorkerSet) -> (bool, String) {
    let queue: EpochQueue<Item> = EpochQueue::with_config(EpochConfig {
        purge_trigger: 1_000,
        purge_skip: 8,
        purge_thread: false,
    });
    let counter = AtomicI64::new(items);
    let consumed = AtomicI64::new(0);
    let result = AtomicI64::new(0);
    let producers = Tally::default();
    let consumers = Tally::default();

    let started = Instant::now();

    thread::scope(|scope| {
        for _ in 0..workers.consumers {
            scope.spawn(|| {
                while queue.consuming() {
                    let begun = Instant::now();
                    let item = queue.dequeue();
                    consumers
                        .time_us
                        .fetch_add(begun.elapsed().as_micros() as u64, Ordering::Relaxed);
                    if let Some(item) = item {
                        result.fetch_add(item, Ordering::AcqRel);
                        consumed.fetch_add(1, Ordering::AcqRel);
                        consumers.successes.fetch_add(1, Ordering::Relaxed);
                    } else {
                        consumers.fails.fetch_add(1, Ordering::Relaxed);
                        thread::yield_now();
                    }
                }
                queue.escape();
            });
        }

        for _ in 0..workers.producers {
            scope.spawn(|| {
                let mut value = counter.fetch_sub(1, Ordering::AcqRel);
                while value > 0 {
                    let begun = Instant::now();
                    let accepted = queue.enqueue(value);
                    producers
                        .time_us
                        .fetch_add(begun.elapsed().as_micros() as u64, Ordering::Relaxed);
                    if accepted {
                        value = counter.fetch_sub(1, Ordering::AcqRel);
                        producers.successes.fetch_add(1, Ordering::Relaxed);
                    } else {
                        producers.fails.fetch_add(1, Ordering::Relaxed);
                        thread::yield_now();
                    }
                }
                queue.escape();
            });
        }

        while counter.load(Ordering::Acquire) > 0 || consumed.load(Ordering::Acquire) < items {
            thread::yield_now();
        }
        queue.stop();
    });

    let total = started.elapsed();
    let ok = result.load(Ordering::Acquire) == control_sum(items);

    let mut out = String::new();
    summary_items(&mut out, items);
    summary_workers(
        &mut out,
        producers.stats(workers.producers),
        consumers.stats(workers.consumers),
    );
    summary_result(&mut out, ok, total);

    (ok, out)
}

fn main() {
    let sets = WorkerSets::detect();
    let workers = WorkerSet::same(sets.cores * 4);

    print!("{THICK_SEPARATOR}   BLOCK QUEUE\n");
    let (ok, report) = block_phase(ITEMS, workers);
    print!("{report}{THICK_SEPARATOR}");
    if !ok {
        std::process::exit(1);
    }

    print!("\n   EPOCH QUEUE\n");
    let (ok, report) = epoch_phase(ITEMS, workers);
    print!("{report}{THICK_SEPARATOR}");
    if !ok {
        std::process::exit(1);
    }
}
