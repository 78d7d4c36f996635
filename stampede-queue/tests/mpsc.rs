use stampede_queue::mpsc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn single_stream_is_fifo() {
    const ITEMS: i64 = 10_000;

    let (producer, mut consumer) = mpsc::queue::<i64>();

    let feeder = thread::spawn(move || {
        for i in 0..ITEMS {
            assert!(producer.enqueue(i));
        }
    });

    for expected in 0..ITEMS {
        loop {
            if let Some(value) = consumer.dequeue() {
                assert_eq!(value, expected);
                break;
            }
            thread::yield_now();
        }
    }

    feeder.join().unwrap();
    assert!(consumer.empty());
    assert_eq!(consumer.dequeue(), None);
}

#[test]
fn many_producers_lose_nothing() {
    const PRODUCERS: i64 = 4;
    const PER_PRODUCER: i64 = 25_000;

    let (producer, mut consumer) = mpsc::queue::<i64>();
    let counter = Arc::new(AtomicI64::new(PRODUCERS * PER_PRODUCER));
    let mut handles = vec![];

    for _ in 0..PRODUCERS {
        let producer = producer.clone();
        let counter = counter.clone();
        handles.push(thread::spawn(move || loop {
            let value = counter.fetch_sub(1, Ordering::AcqRel);
            if value <= 0 {
                break;
            }
            assert!(producer.enqueue(value));
        }));
    }

    let mut sum = 0i64;
    let mut seen = 0i64;
    while seen < PRODUCERS * PER_PRODUCER {
        if let Some(value) = consumer.dequeue() {
            sum += value;
            seen += 1;
        } else {
            thread::yield_now();
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let total = PRODUCERS * PER_PRODUCER;
    assert_eq!(sum, total * (total + 1) / 2);
    assert!(consumer.empty());
}

#[test]
fn shutdown_rejects_enqueues_but_drains() {
    let (producer, mut consumer) = mpsc::queue::<i32>();

    assert!(producer.enqueue(1));
    assert!(producer.enqueue(2));

    producer.shutdown();
    assert!(!producer.producing());
    assert!(!producer.enqueue(3));

    assert_eq!(consumer.dequeue(), Some(1));
    assert_eq!(consumer.dequeue(), Some(2));
    assert_eq!(consumer.dequeue(), None);
    assert!(consumer.empty());

    consumer.stop();
    assert!(!consumer.consuming());
    assert_eq!(consumer.dequeue(), None);
}
