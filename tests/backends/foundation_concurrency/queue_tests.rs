#![cfg(test)]

use foundation_concurrency::{BoundedQueue, CancellationToken, CoordError};
use ntest::timeout;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PRODUCERS: usize = 4;
const ITEMS_PER_PRODUCER: usize = 250;

/// WHY: Items from one producer must come out in the order it put them
/// WHAT: Four producers and three consumers over a small queue; every item
/// is delivered exactly once and each producer's sequence stays increasing
#[test]
#[timeout(20000)]
fn test_multi_producer_multi_consumer_preserves_per_producer_order() {
    let queue = BoundedQueue::new(3).expect("should create queue");
    let token = CancellationToken::new();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|producer| {
            let queue = queue.clone();
            thread::spawn(move || {
                for seq in 0..ITEMS_PER_PRODUCER {
                    queue.put((producer, seq));
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            let token = token.clone();
            thread::spawn(move || {
                let mut received = Vec::new();
                while let Ok(item) = queue.take_until_cancelled(&token) {
                    received.push(item);
                }
                received
            })
        })
        .collect();

    for producer in producers {
        producer.join().expect("producer should finish");
    }
    while !queue.is_empty() {
        thread::yield_now();
    }
    token.cancel();

    let mut last_seen: HashMap<usize, usize> = HashMap::new();
    let mut total = 0;
    for consumer in consumers {
        let received = consumer.join().expect("consumer should finish");
        let mut local_last: HashMap<usize, usize> = HashMap::new();
        for (producer, seq) in received {
            if let Some(previous) = local_last.insert(producer, seq) {
                assert!(seq > previous, "producer {producer} reordered: {previous} then {seq}");
            }
            let highest = last_seen.entry(producer).or_insert(seq);
            *highest = (*highest).max(seq);
            total += 1;
        }
    }

    assert_eq!(total, PRODUCERS * ITEMS_PER_PRODUCER);
    for producer in 0..PRODUCERS {
        assert_eq!(last_seen.get(&producer), Some(&(ITEMS_PER_PRODUCER - 1)));
    }
}

/// WHY: The queue must never hold more than its capacity
/// WHAT: A sampler watching size() while producers flood a slow consumer
/// never observes more than the capacity
#[test]
#[timeout(20000)]
fn test_size_never_exceeds_capacity() {
    let queue = BoundedQueue::new(2).expect("should create queue");
    let max_seen = Arc::new(AtomicUsize::new(0));
    let done = CancellationToken::new();

    let sampler = {
        let queue = queue.clone();
        let max_seen = Arc::clone(&max_seen);
        let done = done.clone();
        thread::spawn(move || {
            while !done.is_cancelled() {
                max_seen.fetch_max(queue.size(), Ordering::SeqCst);
                thread::yield_now();
            }
        })
    };

    let producers: Vec<_> = (0..3)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    queue.put(i);
                }
            })
        })
        .collect();

    for _ in 0..150 {
        let _ = queue.take();
        if fastrand::u8(..) % 8 == 0 {
            thread::sleep(Duration::from_micros(200));
        }
    }

    for producer in producers {
        producer.join().expect("producer should finish");
    }
    done.cancel();
    sampler.join().expect("sampler should finish");

    assert!(queue.is_empty());
    assert!(max_seen.load(Ordering::SeqCst) <= 2);
}

/// WHY: A blocked producer must resume as soon as room is made
/// WHAT: Capacity-2 queue holding A and B; put(C) blocks until take()
/// returns A, after which the queue holds B then C
#[test]
#[timeout(5000)]
fn test_blocked_put_resumes_after_take() {
    let queue = BoundedQueue::new(2).expect("should create queue");
    queue.put("A");
    queue.put("B");
    assert!(queue.is_full());

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || queue.put("C"))
    };

    assert_eq!(
        queue.put_timeout("X", Duration::from_millis(20)),
        Err(CoordError::Timeout)
    );
    assert_eq!(queue.take(), "A");
    producer.join().expect("producer should finish");

    assert_eq!(queue.take(), "B");
    assert_eq!(queue.take(), "C");
    assert_eq!(queue.try_take(), None);
}

/// WHY: Cancelling must release every consumer stuck on an empty queue
/// WHAT: Several consumers blocked in take_until_cancelled all return Cancelled
#[test]
#[timeout(5000)]
fn test_cancel_releases_all_blocked_consumers() {
    let queue = BoundedQueue::<u32>::new(1).expect("should create queue");
    let token = CancellationToken::new();

    let consumers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            let token = token.clone();
            thread::spawn(move || queue.take_until_cancelled(&token))
        })
        .collect();

    while token.waiters() < 4 {
        thread::yield_now();
    }
    assert!(token.cancel());

    for consumer in consumers {
        assert_eq!(consumer.join().expect("should join"), Err(CoordError::Cancelled));
    }
    assert!(queue.is_empty());
}

/// WHY: Duration::MAX is how callers ask to wait for as long as it takes
/// WHAT: take_timeout with Duration::MAX returns a queued item and also
/// waits for one put later by another thread
#[test]
#[timeout(5000)]
fn test_unbounded_take_timeout() {
    let queue = BoundedQueue::new(1).expect("should create queue");
    queue.put("ready");
    assert_eq!(queue.take_timeout(Duration::MAX), Ok("ready"));

    let producer = {
        let queue = queue.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            queue.put("late");
        })
    };
    assert_eq!(queue.take_timeout(Duration::MAX), Ok("late"));
    producer.join().expect("producer should finish");
}
