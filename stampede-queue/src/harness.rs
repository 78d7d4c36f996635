//! Workload configuration and summary reporting for the stress drivers.
//!
//! The queues themselves stay silent; everything observable about a run
//! is collected by the driver and rendered here into a plain-text report.

use std::fmt::Write;
use std::thread;
use std::time::Duration;

/// Payload type carried by the stress workloads.
pub type Item = i64;

/// A producer/consumer thread-count pair.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSet {
    /// Producer thread count.
    pub producers: usize,
    /// Consumer thread count.
    pub consumers: usize,
}

impl WorkerSet {
    /// Equal counts on both sides, at least one each.
    pub fn same(workers: usize) -> Self {
        Self {
            producers: workers.max(1),
            consumers: workers.max(1),
        }
    }

    /// Splits `total` threads, `producers` of them producing.
    pub fn proportion(total: usize, producers: usize) -> Self {
        let producers = producers.max(1);
        Self {
            producers,
            consumers: total.saturating_sub(producers).max(1),
        }
    }
}

/// The four standard worker configurations of the stress drivers.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSets {
    /// Detected core count.
    pub cores: usize,
    /// Half producers, half consumers.
    pub set_a: WorkerSet,
    /// Two thirds producers, one third consumers.
    pub set_b: WorkerSet,
    /// One producer and one consumer per core.
    pub set_c: WorkerSet,
    /// Two producers and two consumers per core.
    pub set_d: WorkerSet,
}

impl WorkerSets {
    /// Derives the standard sets from the machine's parallelism.
    pub fn detect() -> Self {
        let cores = thread::available_parallelism().map(usize::from).unwrap_or(1);
        Self {
            cores,
            set_a: WorkerSet::proportion(cores, cores / 2),
            set_b: WorkerSet::proportion(cores, (cores as f64 / 3.0 * 2.0) as usize),
            set_c: WorkerSet::same(cores),
            set_d: WorkerSet::same(cores * 2),
        }
    }
}

/// Per-side counters a driver collects for the report table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SideStats {
    /// Thread count on this side.
    pub workers: usize,
    /// Time spent inside acquire calls, summed over threads.
    pub time: Duration,
    /// Successful acquires.
    pub successes: i64,
    /// Failed acquires.
    pub fails: i64,
}

/// Separator between iterations of one test.
pub const THIN_SEPARATOR: &str =
    "  -------------------------------------------------------------\n";

/// Separator between tests.
pub const THICK_SEPARATOR: &str =
    "=================================================================\n";

/// Banner opening the preliminary soak iterations.
pub const PRELIM_TEST: &str =
    "=================================================================\n   The preliminary test";

/// Tail of the preliminary banner on failure.
pub const HAS_FAILED: &str = " has failed\n";

/// Tail of the preliminary banner on success, opening the size ladder.
pub const IS_COMPLETE: &str = " is complete\n=================================================================\n   The test with different numbers of items\n  -------------------------------------------------------------\n";

/// Banner for the block-size/attempts matrix.
pub const DIFF_SIZE_AND_ATTEMPTS: &str = "   Test with different block sizes and number of attempts\n   to acquire a slot\n  -------------------------------------------------------------\n";

/// Banner for the worker-count ladder.
pub const DIFF_WORKERS: &str = "   Test with different number of workers\n  -------------------------------------------------------------\n";

/// Banner for the worker-count and growth-policy matrix.
pub const DIFF_WORKERS_AND_POLICIES: &str = "   Test with different number of workers and growth policies\n  -------------------------------------------------------------\n";

/// Closing banner.
pub const ALL_TESTS_PASSED: &str =
    "   ALL TESTS PASSED\n=================================================================\n";

fn millis(time: Duration) -> f64 {
    time.as_secs_f64() * 1_000.0
}

/// Item-count line.
pub fn summary_items(out: &mut String, items: Item) {
    let _ = writeln!(out, "\n   Number of processed items: {items}");
}

/// Growth policy and attempts lines.
pub fn summary_policy(out: &mut String, policy: &str, attempts: u32) {
    let _ = writeln!(out, "   Queue growth policy: allow at each {policy}");
    let _ = writeln!(out, "   Slot acquire attempts: {attempts}");
}

/// The per-side worker table.
pub fn summary_workers(out: &mut String, producers: SideStats, consumers: SideStats) {
    let rule = "  -----------+------+--------------+-------------+-------------\n";
    out.push_str(rule);
    out.push_str("   WRK. TYPE | NUM. |  ACQU. TIME  | ACQU. SUCC. | ACQU. FAILS\n");
    out.push_str(rule);
    for (label, side) in [("Producers", producers), ("Consumers", consumers)] {
        let _ = writeln!(
            out,
            "   {label} | {:4} | {:9.2} ms | {:11} | {:11}",
            side.workers,
            millis(side.time),
            side.successes,
            side.fails,
        );
    }
    out.push_str(rule);
}

/// Capacity line of the bounded variants.
pub fn summary_capacity(out: &mut String, capacity: usize, block_size: usize, limit: usize) {
    let _ = writeln!(
        out,
        "   Actual queue capacity: {capacity} slot (min: {block_size}, max: {limit})"
    );
}

/// Control-sum verdict and wall-clock line.
pub fn summary_result(out: &mut String, ok: bool, total: Duration) {
    let _ = writeln!(out, "   Control sum: {}", if ok { "OK" } else { "Invalid" });
    let _ = writeln!(out, "   Real total time: {:.2} ms\n", millis(total));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_sets_never_empty() {
        for total in [1, 2, 3, 7, 64] {
            let set = WorkerSet::proportion(total, total / 2);
            assert!(set.producers >= 1);
            assert!(set.consumers >= 1);
        }
        let sets = WorkerSets::detect();
        assert!(sets.set_d.producers >= sets.set_c.producers);
    }

    #[test]
    fn report_renders_every_block() {
        let mut out = String::new();
        summary_items(&mut out, 10_000);
        summary_policy(&mut out, "round", 5);
        summary_workers(
            &mut out,
            SideStats {
                workers: 4,
                time: Duration::from_millis(12),
                successes: 10_000,
                fails: 3,
            },
            SideStats {
                workers: 4,
                time: Duration::from_millis(15),
                successes: 10_000,
                fails: 41,
            },
        );
        summary_capacity(&mut out, 200, 50, 5_000);
        summary_result(&mut out, true, Duration::from_millis(30));

        assert!(out.contains("Number of processed items: 10000"));
        assert!(out.contains("allow at each round"));
        assert!(out.contains("Producers"));
        assert!(out.contains("Control sum: OK"));
    }
}
