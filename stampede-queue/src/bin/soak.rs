//! Multi-configuration soak driver.
//!
//! Runs a battery of workloads over the block queue (item-count ladder,
//! block-size/attempts matrix, worker-count/growth-policy matrix) and
//! over each linked MPMC variant (item-count ladder, worker-count
//! ladder). Every run checks the `N(N+1)/2` control sum; the first
//! failing run prints its summary and exits with a failure status.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use stampede_queue::harness::{
    summary_capacity, summary_items, summary_policy, summary_result, summary_workers, Item,
    SideStats, WorkerSet, WorkerSets, ALL_TESTS_PASSED, HAS_FAILED, IS_COMPLETE, PRELIM_TEST,
    THICK_SEPARATOR, THIN_SEPARATOR,
};
use stampede_queue::{
    BlockQueue, BlockQueueConfig, Completion, DeferredQueue, EpochConfig, EpochQueue,
    GrowthPolicy, LockedQueue,
};

#[cfg(debug_assertions)]
const PRELIM_ITERS: usize = 100;
#[cfg(not(debug_assertions))]
const PRELIM_ITERS: usize = 1_000;
const PRELIM_ITEMS: Item = 100;

#[derive(Default)]
struct Tally {
    time_us: AtomicU64,
    successes: AtomicI64,
    fails: AtomicI64,
}

impl Tally {
    fn note(&self, begun: Instant, success: bool) {
        self.time_us
            .fetch_add(begun.elapsed().as_micros() as u64, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fails.fetch_add(1, Ordering::Relaxed);
        }
    }

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

fn policy_label(policy: GrowthPolicy) -> &'static str {
    match policy {
        GrowthPolicy::Call => "call",
        GrowthPolicy::Round => "round",
        GrowthPolicy::Step => "step",
    }
}

fn slot_run(config: BlockQueueConfig, items: Item, workers: WorkerSet) -> (bool, String) {
    let queue: BlockQueue<Item> = BlockQueue::with_config(config);
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
                    consumers.note(begun, slot.is_some());
                    if let Some(slot) = slot {
                        result.fetch_add(*slot, Ordering::AcqRel);
                        consumed.fetch_add(1, Ordering::AcqRel);
                    } else {
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
                    producers.note(begun, slot.is_some());
                    if let Some(mut slot) = slot {
                        *slot = value;
                        value = counter.fetch_sub(1, Ordering::AcqRel);
                    } else {
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
    summary_policy(&mut out, policy_label(config.growth), config.attempts);
    summary_workers(
        &mut out,
        producers.stats(workers.producers),
        consumers.stats(workers.consumers),
    );
    summary_capacity(&mut out, queue.capacity(), config.block_size, config.capacity_limit);
    summary_result(&mut out, ok, total);

    (ok, out)
}

/// The operation surface the linked variants share.
trait SoakQueue: Sync {
    fn enqueue(&self, value: Item) -> bool;
    fn dequeue(&self) -> Option<Item>;
    fn consuming(&self) -> bool;
    fn stop(&self);
    /// Called once per worker thread before it goes away.
    fn detach(&self) {}
}

impl SoakQueue for LockedQueue<Item> {
    fn enqueue(&self, value: Item) -> bool {
        LockedQueue::enqueue(self, value)
    }
    fn dequeue(&self) -> Option<Item> {
        LockedQueue::dequeue(self)
    }
    fn consuming(&self) -> bool {
        LockedQueue::consuming(self)
    }
    fn stop(&self) {
        LockedQueue::stop(self)
    }
}

impl SoakQueue for EpochQueue<Item> {
    fn enqueue(&self, value: Item) -> bool {
        EpochQueue::enqueue(self, value)
    }
    fn dequeue(&self) -> Option<Item> {
        EpochQueue::dequeue(self)
    }
    fn consuming(&self) -> bool {
        EpochQueue::consuming(self)
    }
    fn stop(&self) {
        EpochQueue::stop(self)
    }
    fn detach(&self) {
        self.escape();
    }
}

impl SoakQueue for DeferredQueue<Item> {
    fn enqueue(&self, value: Item) -> bool {
        DeferredQueue::enqueue(self, value)
    }
    fn dequeue(&self) -> Option<Item> {
        DeferredQueue::dequeue(self)
    }
    fn consuming(&self) -> bool {
        DeferredQueue::consuming(self)
    }
    fn stop(&self) {
        DeferredQueue::stop(self)
    }
}

fn linked_run(queue: &dyn SoakQueue, items: Item, workers: WorkerSet) -> (bool, String) {
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
                    consumers.note(begun, item.is_some());
                    if let Some(item) = item {
                        result.fetch_add(item, Ordering::AcqRel);
                        consumed.fetch_add(1, Ordering::AcqRel);
                    } else {
                        thread::yield_now();
                    }
                }
                queue.detach();
            });
        }
        for _ in 0..workers.producers {
            scope.spawn(|| {
                let mut value = counter.fetch_sub(1, Ordering::AcqRel);
                while value > 0 {
                    let begun = Instant::now();
                    let accepted = queue.enqueue(value);
                    producers.note(begun, accepted);
                    if accepted {
                        value = counter.fetch_sub(1, Ordering::AcqRel);
                    } else {
                        thread::yield_now();
                    }
                }
                queue.detach();
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

fn check((ok, report): (bool, String), separator: &str) {
    print!("{report}{separator}");
    if !ok {
        std::process::exit(1);
    }
}

fn prelim(run: impl Fn() -> (bool, String)) {
    print!("{PRELIM_TEST}");
    for _ in 0..PRELIM_ITERS {
        let (ok, report) = run();
        if !ok {
            print!("{HAS_FAILED}{THIN_SEPARATOR}{report}{THICK_SEPARATOR}");
            std::process::exit(1);
        }
    }
    print!("{IS_COMPLETE}");
}

fn block_config(
    block_size: usize,
    capacity_limit: usize,
    attempts: u32,
    growth: GrowthPolicy,
) -> BlockQueueConfig {
    BlockQueueConfig {
        block_size,
        capacity_limit,
        completion: Completion::Auto,
        attempts,
        growth,
    }
}

fn block_battery(sets: &WorkerSets) {
    print!("{THICK_SEPARATOR}   BLOCK QUEUE\n");

    prelim(|| {
        slot_run(
            block_config(50, 5_000, 10, GrowthPolicy::Round),
            PRELIM_ITEMS,
            sets.set_d,
        )
    });

    let ladder_config = block_config(1_000, 10_000, 10, GrowthPolicy::Round);
    check(slot_run(ladder_config, 100, sets.set_d), THIN_SEPARATOR);
    check(slot_run(ladder_config, 1_000, sets.set_d), THIN_SEPARATOR);
    check(slot_run(ladder_config, 10_000, sets.set_d), THIN_SEPARATOR);
    check(slot_run(ladder_config, 100_000, sets.set_d), THICK_SEPARATOR);

    #[cfg(not(debug_assertions))]
    {
        use stampede_queue::harness::{DIFF_SIZE_AND_ATTEMPTS, DIFF_WORKERS_AND_POLICIES};

        const ITEMS: Item = 1_000_000;

        print!("{DIFF_SIZE_AND_ATTEMPTS}");
        for block_size in [10, 100, 1_000] {
            for attempts in [1, 100] {
                let separator = if block_size == 1_000 && attempts == 100 {
                    THICK_SEPARATOR
                } else {
                    THIN_SEPARATOR
                };
                check(
                    slot_run(
                        block_config(block_size, 10_000, attempts, GrowthPolicy::Round),
                        ITEMS,
                        sets.set_a,
                    ),
                    separator,
                );
            }
        }

        print!("{DIFF_WORKERS_AND_POLICIES}");
        for (index, set) in [sets.set_a, sets.set_b, sets.set_c, sets.set_d]
            .into_iter()
            .enumerate()
        {
            for policy in [GrowthPolicy::Call, GrowthPolicy::Round, GrowthPolicy::Step] {
                let last = index == 3 && policy == GrowthPolicy::Step;
                let separator = if last { THICK_SEPARATOR } else { THIN_SEPARATOR };
                check(
                    slot_run(block_config(100, 10_000, 10, policy), ITEMS, set),
                    separator,
                );
            }
        }
    }
}

fn linked_battery(name: &str, sets: &WorkerSets, make: &dyn Fn() -> Box<dyn SoakQueue>) {
    print!("{THICK_SEPARATOR}   {name}\n");

    prelim(|| linked_run(make().as_ref(), PRELIM_ITEMS, sets.set_d));

    check(linked_run(make().as_ref(), 100, sets.set_d), THIN_SEPARATOR);
    check(linked_run(make().as_ref(), 1_000, sets.set_d), THIN_SEPARATOR);
    check(linked_run(make().as_ref(), 10_000, sets.set_d), THIN_SEPARATOR);
    check(
        linked_run(make().as_ref(), 100_000, sets.set_d),
        THICK_SEPARATOR,
    );

    #[cfg(not(debug_assertions))]
    {
        use stampede_queue::harness::DIFF_WORKERS;

        const ITEMS: Item = 1_000_000;

        print!("{DIFF_WORKERS}");
        check(linked_run(make().as_ref(), ITEMS, sets.set_a), THIN_SEPARATOR);
        check(linked_run(make().as_ref(), ITEMS, sets.set_b), THIN_SEPARATOR);
        check(linked_run(make().as_ref(), ITEMS, sets.set_c), THIN_SEPARATOR);
        check(
            linked_run(make().as_ref(), ITEMS, sets.set_d),
            THICK_SEPARATOR,
        );
    }
}

fn main() {
    let sets = WorkerSets::detect();

    block_battery(&sets);

    linked_battery("SPINLOCKED QUEUE", &sets, &|| {
        Box::new(LockedQueue::<Item>::new())
    });
    linked_battery("EPOCH QUEUE", &sets, &|| {
        Box::new(EpochQueue::<Item>::with_config(EpochConfig {
            purge_trigger: 1_000,
            purge_skip: 8,
            purge_thread: false,
        }))
    });
    linked_battery("DEFERRED DELETION QUEUE", &sets, &|| {
        Box::new(DeferredQueue::<Item>::new())
    });

    print!("{ALL_TESTS_PASSED}");
}
