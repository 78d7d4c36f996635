use stampede_queue::{BlockQueue, BlockQueueConfig, Completion, GrowthPolicy};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn sequential_fill_grow_drain_preserves_order() {
    let queue: BlockQueue<i32> = BlockQueue::new(10, 20);

    // One block up front; the first refill doubles capacity, then the
    // limit holds.
    let mut value = 30;
    for round in 0..30 {
        match queue.producer_slot() {
            Some(mut slot) => {
                assert!(round < 20);
                *slot = value;
                value -= 1;
            }
            None => assert!(round >= 20),
        }
    }
    assert_eq!(queue.capacity(), 20);
    assert_eq!(queue.free_slots(), 0);

    for expected in (21..=30).rev() {
        let slot = queue.consumer_slot().unwrap();
        assert_eq!(*slot, expected);
    }

    let mut value = 10;
    for round in 0..30 {
        match queue.producer_slot() {
            Some(mut slot) => {
                assert!(round < 10);
                *slot = value;
                value -= 1;
            }
            None => assert!(round >= 10),
        }
    }

    for expected in (11..=20).rev() {
        let slot = queue.consumer_slot().unwrap();
        assert_eq!(*slot, expected);
    }

    assert!(!queue.empty());

    for round in 0..30 {
        match queue.consumer_slot() {
            Some(slot) => {
                assert!(round < 10);
                assert_eq!(*slot, 10 - round);
            }
            None => assert!(round >= 10),
        }
    }

    assert!(queue.empty());
    assert_eq!(queue.capacity(), 20);
}

#[derive(Default, Debug, PartialEq, Eq)]
struct Labelled {
    text: String,
    num: i32,
}

#[test]
fn struct_payloads_round_trip_in_order() {
    let queue: BlockQueue<Labelled> = BlockQueue::new(10, 40);

    for i in (1..=50).rev() {
        match queue.producer_slot() {
            Some(mut slot) => {
                assert!(i > 10);
                slot.text = format!("item{i}");
                slot.num = i;
            }
            None => assert!(i <= 10),
        }
    }
    assert_eq!(queue.capacity(), 40);

    for i in (1..=50).rev() {
        match queue.consumer_slot() {
            Some(mut slot) => {
                assert!(i > 10);
                assert_eq!(slot.text, format!("item{i}"));
                assert_eq!(slot.num, i);
                let owned = slot.take();
                assert_eq!(owned.num, i);
            }
            None => assert!(i <= 10),
        }
    }
    assert!(queue.empty());
}

#[test]
fn capacity_accounting_holds_while_slots_are_held() {
    let queue: BlockQueue<u64> = BlockQueue::new(4, 8);
    assert_eq!(queue.capacity(), 4);
    assert_eq!(queue.free_slots(), 4);

    let mut first = queue.producer_slot().unwrap();
    *first = 7;
    let second = queue.producer_slot().unwrap();
    assert_eq!(queue.free_slots(), 2);

    // Publishing one leaves the other in flight.
    drop(first);
    assert_eq!(queue.free_slots(), 2);

    drop(second);
    let held = queue.consumer_slot().unwrap();
    assert_eq!(*held, 7);
    assert_eq!(queue.free_slots(), 2);
    drop(held);
    assert_eq!(queue.free_slots(), 3);

    // Growth adds a whole block and never decreases anything.
    for _ in 0..5 {
        let mut slot = queue.producer_slot().unwrap();
        *slot = 1;
    }
    assert_eq!(queue.capacity(), 8);
    assert!(queue.free_slots() <= queue.capacity());
}

#[test]
fn manual_completion_reverts_unarmed_releases() {
    let queue: BlockQueue<i32> = BlockQueue::with_config(BlockQueueConfig {
        block_size: 4,
        capacity_limit: 4,
        completion: Completion::Manual,
        ..BlockQueueConfig::default()
    });

    // Released without complete(): nothing becomes visible.
    {
        let mut slot = queue.producer_slot().unwrap();
        *slot = 42;
    }
    assert_eq!(queue.free_slots(), 4);
    assert!(queue.consumer_slot().is_none());

    // Armed release publishes.
    {
        let mut slot = queue.producer_slot().unwrap();
        *slot = 42;
        slot.complete();
    }
    assert_eq!(queue.free_slots(), 3);

    // An unarmed consumer release abandons the slot; the value stays.
    {
        let slot = queue.consumer_slot().unwrap();
        assert_eq!(*slot, 42);
    }
    assert!(!queue.empty());

    {
        let mut slot = queue.consumer_slot().unwrap();
        assert_eq!(*slot, 42);
        slot.complete();
    }
    assert!(queue.empty());
}

#[test]
fn stopped_queue_rejects_both_sides() {
    let queue: BlockQueue<i32> = BlockQueue::new(4, 8);
    {
        let mut slot = queue.producer_slot().unwrap();
        *slot = 5;
    }

    queue.shutdown();
    assert!(!queue.producing());
    assert!(queue.consuming());
    assert!(queue.producer_slot().is_none());

    // Draining continues after shutdown.
    assert_eq!(*queue.consumer_slot().unwrap(), 5);

    queue.stop();
    assert!(queue.consumer_slot().is_none());
}

#[test]
#[cfg_attr(miri, ignore)]
fn randomized_payloads_survive_growth() {
    use rand::Rng;

    const PER_PRODUCER: usize = 20_000;
    const PRODUCERS: usize = 4;

    let queue: Arc<BlockQueue<i64>> = Arc::new(BlockQueue::new(50, 10_000));
    let produced_sum = Arc::new(AtomicI64::new(0));
    let consumed_sum = Arc::new(AtomicI64::new(0));
    let consumed = Arc::new(AtomicI64::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let mut handles = vec![];

    for _ in 0..PRODUCERS {
        let queue = queue.clone();
        let produced_sum = produced_sum.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            for _ in 0..PER_PRODUCER {
                let value = rng.random_range(1..=1_000_000i64);
                loop {
                    if let Some(mut slot) = queue.producer_slot() {
                        *slot = value;
                        produced_sum.fetch_add(value, Ordering::AcqRel);
                        break;
                    }
                    thread::yield_now();
                }
            }
        }));
    }

    for _ in 0..2 {
        let queue = queue.clone();
        let consumed_sum = consumed_sum.clone();
        let consumed = consumed.clone();
        let done = done.clone();
        handles.push(thread::spawn(move || loop {
            if let Some(mut slot) = queue.consumer_slot() {
                consumed_sum.fetch_add(slot.take(), Ordering::AcqRel);
                consumed.fetch_add(1, Ordering::AcqRel);
            } else if done.load(Ordering::Acquire) && queue.empty() {
                break;
            } else {
                thread::yield_now();
            }
        }));
    }

    while consumed.load(Ordering::Acquire) < (PRODUCERS * PER_PRODUCER) as i64 {
        thread::yield_now();
    }
    done.store(true, Ordering::Release);

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        produced_sum.load(Ordering::Acquire),
        consumed_sum.load(Ordering::Acquire)
    );
    assert!(queue.empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn concurrent_growth_conserves_the_successful_subset() {
    const TARGET: i64 = 6_000;
    const PRODUCERS: usize = 3;

    let queue: Arc<BlockQueue<i64>> = Arc::new(BlockQueue::with_config(BlockQueueConfig {
        block_size: 50,
        capacity_limit: 5_000,
        completion: Completion::Auto,
        attempts: 1,
        growth: GrowthPolicy::Round,
    }));
    let counter = Arc::new(AtomicI64::new(TARGET));
    let produced_sum = Arc::new(AtomicI64::new(0));
    let produced_count = Arc::new(AtomicI64::new(0));
    let consumed_sum = Arc::new(AtomicI64::new(0));
    let consumed_count = Arc::new(AtomicI64::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let mut producers = vec![];
    for _ in 0..PRODUCERS {
        let queue = queue.clone();
        let counter = counter.clone();
        let produced_sum = produced_sum.clone();
        let produced_count = produced_count.clone();
        producers.push(thread::spawn(move || loop {
            let value = counter.fetch_sub(1, Ordering::AcqRel);
            if value <= 0 {
                break;
            }
            // A failed acquire drops the value: only the successful
            // subset must be conserved.
            if let Some(mut slot) = queue.producer_slot() {
                *slot = value;
                produced_sum.fetch_add(value, Ordering::AcqRel);
                produced_count.fetch_add(1, Ordering::AcqRel);
            }
        }));
    }

    let consumer = {
        let queue = queue.clone();
        let consumed_sum = consumed_sum.clone();
        let consumed_count = consumed_count.clone();
        let done = done.clone();
        thread::spawn(move || loop {
            if let Some(mut slot) = queue.consumer_slot() {
                consumed_sum.fetch_add(slot.take(), Ordering::AcqRel);
                consumed_count.fetch_add(1, Ordering::AcqRel);
            } else if done.load(Ordering::Acquire) && queue.empty() {
                break;
            } else {
                thread::yield_now();
            }
        })
    };

    for handle in producers {
        handle.join().unwrap();
    }
    done.store(true, Ordering::Release);
    consumer.join().unwrap();

    assert!(queue.capacity() > 50, "growth never happened");
    assert!(queue.capacity() <= 5_000);
    assert_eq!(
        produced_count.load(Ordering::Acquire),
        consumed_count.load(Ordering::Acquire)
    );
    assert_eq!(
        produced_sum.load(Ordering::Acquire),
        consumed_sum.load(Ordering::Acquire)
    );
    assert!(queue.empty());
}
