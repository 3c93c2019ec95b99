//! Auto-reset event used for the run gate and the wait signal.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A boolean event that wakes one waiter and then resets itself.
///
/// A `set()` with nobody waiting is remembered until the next wait consumes
/// it. Spurious condvar wakeups are absorbed internally.
#[derive(Debug, Default)]
pub struct Signal {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    /// Create an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal and wake a waiter.
    pub fn set(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.cond.notify_one();
    }

    /// Clear a pending set without waking anyone.
    pub fn reset(&self) {
        *self.flag.lock() = false;
    }

    /// Whether a set is pending.
    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.flag.lock()
    }

    /// Block until the signal is set, then consume it.
    pub fn wait(&self) {
        let mut flag = self.flag.lock();
        while !*flag {
            self.cond.wait(&mut flag);
        }
        *flag = false;
    }

    /// Block until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` if woken by `set()`, `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut flag = self.flag.lock();
        while !*flag {
            match deadline {
                Some(deadline) => {
                    if self.cond.wait_until(&mut flag, deadline).timed_out() {
                        break;
                    }
                }
                // Too far out to express as an Instant.
                None => self.cond.wait(&mut flag),
            }
        }
        let woken = *flag;
        *flag = false;
        woken
    }
}
