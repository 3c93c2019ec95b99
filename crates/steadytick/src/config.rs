//! Timer configuration.
//!
//! The interval floor is enforced everywhere an interval enters the timer:
//! values below [`MIN_INTERVAL`] are silently raised to it.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{TimerError, TimerResult};

/// Smallest interval the timer will run at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Interval used when none is configured.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// Largest interval representable by the worker (nanoseconds in a `u64`).
pub const MAX_INTERVAL: Duration = Duration::from_nanos(u64::MAX);

const MAX_INTERVAL_MS: u64 = u64::MAX / 1_000_000;

/// Clamp an interval into `[MIN_INTERVAL, MAX_INTERVAL]`.
#[must_use]
pub fn clamp_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_INTERVAL, MAX_INTERVAL)
}

/// How listeners are invoked on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Listeners run sequentially on the worker thread; the next wait starts
    /// only after every listener returned.
    #[default]
    Synchronous,
    /// Each listener runs on its own short-lived thread; the worker never
    /// waits for it and its failures are discarded.
    Asynchronous,
}

impl DispatchMode {
    /// Whether the worker is decoupled from listener completion.
    #[inline]
    #[must_use]
    pub fn is_async(self) -> bool {
        matches!(self, Self::Asynchronous)
    }
}

/// Construction options for an [`IntervalTimer`](crate::IntervalTimer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Tick interval in whole milliseconds. Values below 10 are raised to 10.
    ///
    /// [`TimerConfigBuilder::interval`] rounds a `Duration` to the nearest
    /// millisecond; use [`IntervalTimer::set_interval`](crate::IntervalTimer::set_interval)
    /// for sub-millisecond precision.
    pub interval_ms: u64,
    /// Fire once right after `start()` before the first wait.
    pub fire_immediately: bool,
    /// Listener dispatch mode.
    pub dispatch: DispatchMode,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            fire_immediately: false,
            dispatch: DispatchMode::Synchronous,
        }
    }
}

impl TimerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `interval_ms` cannot be represented in nanoseconds.
    pub fn validate(&self) -> TimerResult<()> {
        if self.interval_ms > MAX_INTERVAL_MS {
            return Err(TimerError::invalid_configuration(format!(
                "interval_ms must be at most {MAX_INTERVAL_MS}, got {}",
                self.interval_ms
            )));
        }
        Ok(())
    }

    /// Effective interval after clamping.
    #[must_use]
    pub fn interval(&self) -> Duration {
        clamp_interval(Duration::from_millis(self.interval_ms))
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> TimerConfigBuilder {
        TimerConfigBuilder::default()
    }
}

/// Builder for `TimerConfig`.
#[derive(Debug, Default)]
pub struct TimerConfigBuilder {
    config: TimerConfig,
}

impl TimerConfigBuilder {
    /// Set the interval in milliseconds.
    #[must_use]
    pub fn interval_ms(mut self, ms: u64) -> Self {
        self.config.interval_ms = ms;
        self
    }

    /// Set the interval from a `Duration`, rounded to the nearest millisecond.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        let rounded = interval.as_nanos().saturating_add(500_000) / 1_000_000;
        self.config.interval_ms = u64::try_from(rounded).unwrap_or(u64::MAX);
        self
    }

    /// Fire once immediately on every `start()`.
    #[must_use]
    pub fn fire_immediately(mut self, enabled: bool) -> Self {
        self.config.fire_immediately = enabled;
        self
    }

    /// Set the dispatch mode.
    #[must_use]
    pub fn dispatch(mut self, mode: DispatchMode) -> Self {
        self.config.dispatch = mode;
        self
    }

    /// Build the configuration, raising the interval to the 10 ms floor.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(mut self) -> TimerResult<TimerConfig> {
        self.config.validate()?;
        let floor_ms = u64::try_from(MIN_INTERVAL.as_millis()).unwrap_or(10);
        self.config.interval_ms = self.config.interval_ms.max(floor_ms);
        Ok(self.config)
    }
}
