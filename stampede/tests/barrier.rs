use stampede::ColorBarrier;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn same_color_holders_coexist() {
    let barrier = ColorBarrier::new();
    let a = barrier.green();
    let b = barrier.green();
    drop(a);
    drop(b);
    let a = barrier.red();
    let b = barrier.red();
    drop(b);
    drop(a);
}

#[test]
fn colors_exclude_each_other() {
    const GREENS: usize = 6;
    const REDS: usize = 2;
    const ROUNDS: usize = 5_000;

    let barrier = Arc::new(ColorBarrier::new());
    // Positive while any green is inside, negative while any red is.
    let occupancy = Arc::new(AtomicI64::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for _ in 0..GREENS {
        let barrier = barrier.clone();
        let occupancy = occupancy.clone();
        let violations = violations.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..ROUNDS {
                let _guard = barrier.green();
                if occupancy.fetch_add(1, Ordering::AcqRel) < 0 {
                    violations.fetch_add(1, Ordering::Relaxed);
                }
                occupancy.fetch_sub(1, Ordering::AcqRel);
            }
        }));
    }

    for _ in 0..REDS {
        let barrier = barrier.clone();
        let occupancy = occupancy.clone();
        let violations = violations.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..ROUNDS {
                let _guard = barrier.red();
                if occupancy.fetch_sub(1, Ordering::AcqRel) > 0 {
                    violations.fetch_add(1, Ordering::Relaxed);
                }
                occupancy.fetch_add(1, Ordering::AcqRel);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(violations.load(Ordering::Relaxed), 0);
    assert_eq!(occupancy.load(Ordering::Relaxed), 0);
}
