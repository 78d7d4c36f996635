use stampede_queue::LockedQueue;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn sequential_round_trip() {
    let queue: LockedQueue<i32> = LockedQueue::new();
    assert!(queue.empty());

    assert!(queue.enqueue(1));
    assert!(queue.enqueue(2));
    assert!(!queue.empty());

    assert_eq!(queue.dequeue(), Some(1));
    assert_eq!(queue.dequeue(), Some(2));
    assert_eq!(queue.dequeue(), None);
    assert!(queue.empty());

    queue.shutdown();
    assert!(!queue.enqueue(3));
    queue.stop();
    assert_eq!(queue.dequeue(), None);
}

/// Conservation plus per-producer FIFO: the values any one producer
/// enqueued must come out in that producer's order, whatever the global
/// interleaving.
#[test]
#[cfg_attr(miri, ignore)]
fn per_producer_streams_stay_ordered() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: i64 = 25_000;

    let queue: Arc<LockedQueue<i64>> = Arc::new(LockedQueue::new());
    let consumed = Arc::new(AtomicI64::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let mut producers = vec![];
    let mut consumers = vec![];

    for id in 0..PRODUCERS as i64 {
        let queue = queue.clone();
        producers.push(thread::spawn(move || {
            for seq in 0..PER_PRODUCER {
                // Tag values with their producer so streams can be
                // separated again on the far side.
                assert!(queue.enqueue(id * PER_PRODUCER + seq));
            }
        }));
    }

    for _ in 0..CONSUMERS {
        let queue = queue.clone();
        let consumed = consumed.clone();
        let done = done.clone();
        consumers.push(thread::spawn(move || {
            let mut observed = vec![];
            loop {
                if let Some(value) = queue.dequeue() {
                    observed.push(value);
                    consumed.fetch_add(1, Ordering::AcqRel);
                } else if done.load(Ordering::Acquire) && queue.empty() {
                    break;
                } else {
                    thread::yield_now();
                }
            }
            observed
        }));
    }

    for handle in producers {
        handle.join().unwrap();
    }
    while consumed.load(Ordering::Acquire) < (PRODUCERS as i64) * PER_PRODUCER {
        thread::yield_now();
    }
    done.store(true, Ordering::Release);

    let mut per_stream: Vec<Vec<i64>> = vec![vec![]; PRODUCERS];
    let mut total = 0i64;
    for handle in consumers {
        let observed = handle.join().unwrap();
        // Within one consumer, every producer's subsequence must be
        // increasing: the lock serializes enqueues, so reordering here
        // would mean the queue itself reordered a stream.
        let mut last_seen = vec![-1i64; PRODUCERS];
        for &value in &observed {
            let stream = (value / PER_PRODUCER) as usize;
            assert!(value > last_seen[stream], "stream {stream} reordered");
            last_seen[stream] = value;
        }
        for value in observed {
            let stream = (value / PER_PRODUCER) as usize;
            per_stream[stream].push(value);
            total += 1;
        }
    }

    assert_eq!(total, (PRODUCERS as i64) * PER_PRODUCER);
    for (id, stream) in per_stream.iter().enumerate() {
        assert_eq!(stream.len(), PER_PRODUCER as usize);
        // Merged across consumers the multiset must be complete.
        let mut sorted = stream.clone();
        sorted.sort_unstable();
        let base = id as i64 * PER_PRODUCER;
        for (offset, value) in sorted.iter().enumerate() {
            assert_eq!(*value, base + offset as i64);
        }
    }
    assert!(queue.empty());
}

/// FIFO within one producer's stream as seen by one consumer.
#[test]
#[cfg_attr(miri, ignore)]
fn single_consumer_sees_producer_order() {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: i64 = 10_000;

    let queue: Arc<LockedQueue<i64>> = Arc::new(LockedQueue::new());
    let mut handles = vec![];

    for id in 0..PRODUCERS as i64 {
        let queue = queue.clone();
        handles.push(thread::spawn(move || {
            for seq in 0..PER_PRODUCER {
                assert!(queue.enqueue(id * PER_PRODUCER + seq));
            }
        }));
    }

    let mut next_expected = vec![0i64; PRODUCERS];
    let mut seen = 0i64;
    while seen < (PRODUCERS as i64) * PER_PRODUCER {
        if let Some(value) = queue.dequeue() {
            let stream = (value / PER_PRODUCER) as usize;
            let seq = value % PER_PRODUCER;
            assert_eq!(seq, next_expected[stream], "stream {stream} reordered");
            next_expected[stream] += 1;
            seen += 1;
        } else {
            thread::yield_now();
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(queue.empty());
}
