//! Shared helpers for the integration suites.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use steadytick::prelude::*;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .unwrap_or_default(); // Already initialized by another test
}

/// Poll `condition` every millisecond until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Instants at which a listener was invoked.
#[derive(Clone, Default)]
pub struct TickLog {
    ticks: Arc<Mutex<Vec<Instant>>>,
}

impl TickLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener on `timer` that records each tick.
    pub fn attach(&self, timer: &IntervalTimer) -> ListenerId {
        let ticks = Arc::clone(&self.ticks);
        timer.add_listener(move |_: &TimerHandle| {
            ticks.lock().push(Instant::now());
            Ok(())
        })
    }

    pub fn len(&self) -> usize {
        self.ticks.lock().len()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.ticks.lock().clone()
    }

    /// Offsets of every recorded tick from `origin`.
    pub fn offsets_from(&self, origin: Instant) -> Vec<Duration> {
        self.ticks
            .lock()
            .iter()
            .map(|tick| tick.saturating_duration_since(origin))
            .collect()
    }

    pub fn clear(&self) {
        self.ticks.lock().clear();
    }
}
