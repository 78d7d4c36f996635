//! Single-thread round-trip throughput across the queue family.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use stampede_queue::{
    mpsc, BlockQueue, DeferredQueue, EpochConfig, EpochQueue, LockedQueue, RingQueue,
};

const BATCH: usize = 1_000;

fn bench_slot_queues(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_queues");
    group.throughput(Throughput::Elements(BATCH as u64));

    let block: BlockQueue<usize> = BlockQueue::new(64, 4_096);
    group.bench_function("block_queue", |b| {
        b.iter(|| {
            for i in 0..BATCH {
                let mut slot = block.producer_slot().unwrap();
                *slot = i;
            }
            for _ in 0..BATCH {
                let slot = block.consumer_slot().unwrap();
                black_box(*slot);
            }
        });
    });

    let ring: RingQueue<usize> = RingQueue::new(4_096);
    group.bench_function("ring_queue", |b| {
        b.iter(|| {
            for i in 0..BATCH {
                let mut slot = ring.producer_slot().unwrap();
                *slot = i;
            }
            for _ in 0..BATCH {
                let slot = ring.consumer_slot().unwrap();
                black_box(*slot);
            }
        });
    });

    group.finish();
}

fn bench_linked_queues(c: &mut Criterion) {
    let mut group = c.benchmark_group("linked_queues");
    group.throughput(Throughput::Elements(BATCH as u64));

    let (producer, mut consumer) = mpsc::queue::<usize>();
    group.bench_function("mpsc", |b| {
        b.iter(|| {
            for i in 0..BATCH {
                producer.enqueue(i);
            }
            for _ in 0..BATCH {
                black_box(consumer.dequeue().unwrap());
            }
        });
    });

    let locked: LockedQueue<usize> = LockedQueue::new();
    group.bench_function("locked", |b| {
        b.iter(|| {
            for i in 0..BATCH {
                locked.enqueue(i);
            }
            for _ in 0..BATCH {
                black_box(locked.dequeue().unwrap());
            }
        });
    });

    let epoch: EpochQueue<usize> = EpochQueue::with_config(EpochConfig {
        purge_trigger: 256,
        purge_skip: 8,
        purge_thread: false,
    });
    group.bench_function("epoch", |b| {
        b.iter(|| {
            for i in 0..BATCH {
                epoch.enqueue(i);
            }
            for _ in 0..BATCH {
                black_box(epoch.dequeue().unwrap());
            }
        });
    });
    epoch.escape();

    let deferred: DeferredQueue<usize> = DeferredQueue::new();
    group.bench_function("deferred", |b| {
        b.iter(|| {
            for i in 0..BATCH {
                deferred.enqueue(i);
            }
            for _ in 0..BATCH {
                black_box(deferred.dequeue().unwrap());
            }
            deferred.purge();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_slot_queues, bench_linked_queues);
criterion_main!(benches);
