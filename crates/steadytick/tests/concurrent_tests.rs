//! Concurrency tests for the interval timer.

mod common;

use common::{TestResult, TickLog, wait_until};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use steadytick::prelude::*;

const INTERVAL: Duration = Duration::from_millis(10);
const SETTLE: Duration = Duration::from_secs(5);

/// Listener that records the highest number of overlapping invocations.
fn overlap_probe(timer: &IntervalTimer) -> Arc<AtomicUsize> {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    {
        let max_seen = Arc::clone(&max_seen);
        timer.add_listener(move |_: &TimerHandle| {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
    }
    max_seen
}

#[test]
fn test_concurrent_start_stop_keeps_single_worker() -> TestResult {
    let timer = Arc::new(IntervalTimer::with_interval(INTERVAL));
    let max_overlap = overlap_probe(&timer);
    let mut handles = vec![];

    for i in 0..8 {
        let timer = Arc::clone(&timer);
        handles.push(thread::spawn(move || -> Result<(), TimerError> {
            for round in 0..50 {
                if (i + round) % 3 == 0 {
                    timer.stop();
                } else {
                    timer.start()?;
                }
                thread::sleep(Duration::from_millis(1));
            }
            Ok(())
        }));
    }

    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err("control thread panicked".into()),
        }
    }

    // Settle into a known state and confirm the timer still works.
    timer.start()?;
    let before = timer.tick_count();
    assert!(wait_until(SETTLE, || timer.tick_count() >= before + 3));
    timer.dispose();

    assert_eq!(
        max_overlap.load(Ordering::SeqCst),
        1,
        "synchronous ticks must never overlap"
    );
    assert_eq!(timer.worker_state(), WorkerState::Terminated);
    Ok(())
}

#[test]
fn test_dispose_races_with_start() -> TestResult {
    for _ in 0..20 {
        let timer = Arc::new(IntervalTimer::with_interval(INTERVAL));
        let log = TickLog::new();
        log.attach(&timer);

        let starter = {
            let timer = Arc::clone(&timer);
            thread::spawn(move || {
                for _ in 0..20 {
                    if timer.start().is_err() {
                        return true;
                    }
                }
                false
            })
        };

        thread::sleep(Duration::from_millis(2));
        timer.dispose();
        let after_dispose = log.len();

        if starter.join().is_err() {
            return Err("starter thread panicked".into());
        }

        assert!(!timer.is_running());
        assert!(matches!(timer.start(), Err(TimerError::Disposed)));
        thread::sleep(INTERVAL * 3);
        assert_eq!(log.len(), after_dispose);
    }
    Ok(())
}

#[test]
fn test_listeners_added_and_removed_while_ticking() -> TestResult {
    let timer = Arc::new(IntervalTimer::with_interval(INTERVAL));
    let log = TickLog::new();
    log.attach(&timer);
    timer.start()?;

    let mut handles = vec![];
    for _ in 0..4 {
        let timer = Arc::clone(&timer);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                let id = timer.add_listener(|_: &TimerHandle| Ok(()));
                thread::sleep(Duration::from_micros(200));
                assert!(timer.remove_listener(id));
            }
        }));
    }

    for handle in handles {
        if handle.join().is_err() {
            return Err("listener churn thread panicked".into());
        }
    }

    assert_eq!(timer.listener_count(), 1);
    assert!(wait_until(SETTLE, || log.len() >= 3));
    assert!(timer.is_running());
    Ok(())
}

#[test]
fn test_handles_stop_from_many_threads() -> TestResult {
    let timer = IntervalTimer::with_interval(INTERVAL);
    timer.start()?;
    assert!(wait_until(SETTLE, || timer.worker_state() == WorkerState::Active));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let handle = timer.handle();
            thread::spawn(move || handle.stop())
        })
        .collect();
    for handle in handles {
        if handle.join().is_err() {
            return Err("stop thread panicked".into());
        }
    }

    assert!(wait_until(SETTLE, || {
        timer.worker_state() == WorkerState::WaitingForStart
    }));
    assert!(!timer.is_running());
    Ok(())
}

#[test]
fn test_independent_timers_do_not_interfere() -> TestResult {
    let fast = IntervalTimer::with_interval(Duration::from_millis(10));
    let slow = IntervalTimer::with_interval(Duration::from_millis(100));
    let fast_log = TickLog::new();
    let slow_log = TickLog::new();
    fast_log.attach(&fast);
    slow_log.attach(&slow);

    fast.start()?;
    slow.start()?;
    thread::sleep(Duration::from_millis(350));
    fast.dispose();
    slow.dispose();

    assert!(fast_log.len() > slow_log.len() * 3);
    assert!(slow_log.len() >= 2);
    Ok(())
}

#[test]
fn test_overlapping_dispose_waits_for_teardown() -> TestResult {
    let timer = Arc::new(IntervalTimer::with_interval(INTERVAL));
    let entered = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicUsize::new(0));
    {
        let entered = Arc::clone(&entered);
        let finished = Arc::clone(&finished);
        timer.add_listener(move |_: &TimerHandle| {
            entered.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(300));
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    timer.start()?;
    assert!(wait_until(SETTLE, || entered.load(Ordering::SeqCst) >= 1));

    let first = {
        let timer = Arc::clone(&timer);
        thread::spawn(move || timer.dispose())
    };
    thread::sleep(Duration::from_millis(20));
    timer.dispose();

    // The tick in progress has completed and nothing is left running.
    assert!(!timer.is_running());
    assert_eq!(timer.worker_state(), WorkerState::Terminated);
    assert_eq!(timer.listener_count(), 0);
    assert_eq!(
        finished.load(Ordering::SeqCst),
        entered.load(Ordering::SeqCst)
    );

    if first.join().is_err() {
        return Err("disposing thread panicked".into());
    }
    Ok(())
}
