#![cfg(test)]

use foundation_concurrency::{CancellationToken, CoordError, WaveConfig, WaveRunner};
use ntest::timeout;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing_test::traced_test;

const WAIT: Duration = Duration::from_secs(10);

/// WHY: The canonical wave folds squares of 1..=4
/// WHAT: combine receives [1, 4, 9, 16] in task order and the wave returns 30
#[test]
#[timeout(10000)]
fn test_wave_sums_squares() {
    let runner = WaveRunner::new(4).expect("should start runner");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);

    let sum = runner
        .execute_wave(
            4,
            |i| {
                let value = (i + 1) as u64;
                value * value
            },
            move |squares| {
                recorded.lock().expect("not poisoned").extend_from_slice(squares);
                squares.iter().sum::<u64>()
            },
            WAIT,
        )
        .expect("wave should release");

    assert_eq!(sum, 30);
    assert_eq!(*seen.lock().expect("not poisoned"), vec![1, 4, 9, 16]);
}

/// WHY: Tasks of one wave really run at the same time on distinct workers
/// WHAT: Every task records the thread it ran on; all names are distinct
/// and carry the configured prefix
#[test]
#[timeout(10000)]
fn test_wave_tasks_run_on_distinct_named_workers() {
    let runner = WaveRunner::with_config(WaveConfig::new(3).thread_name("squares"))
        .expect("should start runner");

    let names = runner
        .execute_wave(
            3,
            |_| thread::current().name().map(str::to_owned).unwrap_or_default(),
            |names| names.to_vec(),
            WAIT,
        )
        .expect("wave should release");

    let mut unique = names.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 3);
    assert!(names.iter().all(|name| name.starts_with("squares-")));
}

/// WHY: A runner serves many waves, from several callers at once
/// WHAT: Callers sharing one runner each get their own wave's result and
/// combine runs exactly once per wave
#[test]
#[timeout(30000)]
fn test_concurrent_callers_share_runner() {
    let runner = Arc::new(WaveRunner::new(4).expect("should start runner"));
    let combines = Arc::new(AtomicUsize::new(0));

    let callers: Vec<_> = (0..4usize)
        .map(|caller| {
            let runner = Arc::clone(&runner);
            let combines = Arc::clone(&combines);
            thread::spawn(move || {
                (0..10usize)
                    .map(|round| {
                        let combines = Arc::clone(&combines);
                        let base = caller * 1_000 + round * 10;
                        let sum = runner
                            .execute_wave(
                                2,
                                move |i| base + i,
                                move |values| {
                                    combines.fetch_add(1, Ordering::SeqCst);
                                    values.iter().sum::<usize>()
                                },
                                WAIT,
                            )
                            .expect("wave should release");
                        assert_eq!(sum, 2 * base + 1);
                    })
                    .count()
            })
        })
        .collect();

    let waves: usize = callers
        .into_iter()
        .map(|caller| caller.join().expect("caller should finish"))
        .sum();

    assert_eq!(waves, 40);
    assert_eq!(combines.load(Ordering::SeqCst), 40);
}

/// WHY: A failing task must fail its wave without poisoning the runner
/// WHAT: One panicking task gives BrokenBarrier, combine never runs, and the
/// next wave on the same runner succeeds
#[test]
#[timeout(10000)]
fn test_failed_task_breaks_only_its_wave() {
    let runner = WaveRunner::new(3).expect("should start runner");
    let combined = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&combined);

    let result = runner.execute_wave(
        3,
        |i| {
            if i == 0 {
                panic!("task {i} failed");
            }
            i
        },
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        WAIT,
    );

    assert_eq!(result, Err(CoordError::BrokenBarrier));
    assert_eq!(combined.load(Ordering::SeqCst), 0);

    let next = runner.execute_wave(3, |i| i * 2, |values| values.to_vec(), WAIT);
    assert_eq!(next, Ok(vec![0, 2, 4]));
}

/// WHY: A caller must not wait past its deadline
/// WHAT: A wave slower than its timeout reports Timeout promptly
#[test]
#[traced_test]
#[timeout(10000)]
fn test_slow_wave_reports_timeout() {
    let runner = WaveRunner::new(2).expect("should start runner");

    let result = runner.execute_wave(
        2,
        |i| {
            thread::sleep(Duration::from_millis(200));
            i
        },
        |values| values.len(),
        Duration::from_millis(10),
    );

    assert!(result.as_ref().is_err_and(CoordError::is_timeout));
    assert!(logs_contain("Wave 0 failed: Timeout"));
}

/// WHY: Duration::MAX is how callers ask to wait for as long as it takes
/// WHAT: A wave given an unbounded timeout returns its combined value
#[test]
#[timeout(10000)]
fn test_unbounded_timeout_waits_for_wave() {
    let runner = WaveRunner::new(2).expect("should start runner");
    let result = runner.execute_wave(2, |i| i, |values| values.len(), Duration::MAX);
    assert_eq!(result, Ok(2));
}

/// WHY: Cancelling a wave must release its waiting tasks
/// WHAT: With one task held back, cancelling the token ends the wave with
/// BrokenBarrier and frees the workers for the next wave
#[test]
#[timeout(10000)]
fn test_cancelled_wave_frees_workers() {
    let runner = Arc::new(WaveRunner::new(2).expect("should start runner"));
    let token = CancellationToken::new();
    let (hold_tx, hold_rx) = mpsc::channel::<()>();
    let hold_rx = Arc::new(Mutex::new(hold_rx));

    let wave = {
        let runner = Arc::clone(&runner);
        let token = token.clone();
        thread::spawn(move || {
            runner.execute_wave_until_cancelled(
                2,
                move |i| {
                    if i == 1 {
                        let _ = hold_rx.lock().expect("not poisoned").recv();
                    }
                    i
                },
                |values| values.len(),
                WAIT,
                &token,
            )
        })
    };

    while token.waiters() == 0 {
        thread::yield_now();
    }
    token.cancel();
    drop(hold_tx);

    assert_eq!(wave.join().expect("should join"), Err(CoordError::BrokenBarrier));
    assert_eq!(
        runner.execute_wave(2, |i| i, |values| values.len(), WAIT),
        Ok(2)
    );
}

/// WHY: The default entry point applies the configured deadline
/// WHAT: A runner configured with a short default timeout times out a slow wave
#[test]
#[timeout(10000)]
fn test_default_timeout_comes_from_config() {
    let runner = WaveRunner::with_config(
        WaveConfig::new(1).default_timeout(Duration::from_millis(10)),
    )
    .expect("should start runner");

    let slow = runner.execute_wave_default(
        1,
        |i| {
            thread::sleep(Duration::from_millis(200));
            i
        },
        |values| values[0],
    );
    assert_eq!(slow, Err(CoordError::Timeout));
    assert_eq!(
        runner.config().get_default_timeout(),
        Duration::from_millis(10)
    );
}
