//! Tick lateness tracking.
//!
//! Lateness is how far past its ideal boundary a tick actually fired.
//! Boundaries the worker slept through entirely are counted as skipped; the
//! timer never fires them retroactively.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_MAX_SAMPLES: usize = 1024;

/// Rolling lateness statistics for one active session.
///
/// `record_tick` is O(1) after the sample ring fills; percentiles are
/// computed on demand from the retained samples.
#[derive(Debug, Clone)]
pub struct LatenessMetrics {
    /// Ticks fired
    pub total_ticks: u64,

    /// Boundaries passed without a tick
    pub skipped_ticks: u64,

    /// Largest observed lateness in nanoseconds
    pub max_lateness_ns: u64,

    /// Lateness of the most recent tick in nanoseconds
    pub last_lateness_ns: u64,

    lateness_sum_ns: u128,

    /// Recent samples for percentile calculation (ring buffer)
    recent_samples: Vec<u64>,

    max_samples: usize,

    next_sample_index: usize,
}

impl Default for LatenessMetrics {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_SAMPLES)
    }
}

impl LatenessMetrics {
    /// Create metrics with the default sample capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metrics retaining at most `max_samples` samples for percentiles.
    #[must_use]
    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            total_ticks: 0,
            skipped_ticks: 0,
            max_lateness_ns: 0,
            last_lateness_ns: 0,
            lateness_sum_ns: 0,
            recent_samples: Vec::with_capacity(max_samples),
            max_samples,
            next_sample_index: 0,
        }
    }

    /// Record one fired tick.
    pub fn record_tick(&mut self, lateness: Duration, skipped: u64) {
        let lateness_ns = u64::try_from(lateness.as_nanos()).unwrap_or(u64::MAX);

        self.total_ticks = self.total_ticks.saturating_add(1);
        self.skipped_ticks = self.skipped_ticks.saturating_add(skipped);
        self.max_lateness_ns = self.max_lateness_ns.max(lateness_ns);
        self.last_lateness_ns = lateness_ns;
        self.lateness_sum_ns = self.lateness_sum_ns.saturating_add(u128::from(lateness_ns));

        if self.max_samples == 0 {
            return;
        }

        if self.recent_samples.len() < self.max_samples {
            self.recent_samples.push(lateness_ns);
        } else if let Some(slot) = self.recent_samples.get_mut(self.next_sample_index) {
            *slot = lateness_ns;
            self.next_sample_index = (self.next_sample_index + 1) % self.max_samples;
        }
    }

    /// Arbitrary percentile (0.0 to 1.0) of the retained samples, in nanoseconds.
    #[must_use]
    pub fn percentile_lateness_ns(&self, percentile: f64) -> u64 {
        if self.recent_samples.is_empty() {
            return 0;
        }

        let percentile = percentile.clamp(0.0, 1.0);
        let mut scratch = self.recent_samples.clone();
        let len = scratch.len();
        let index = ((len as f64 * percentile) as usize).min(len.saturating_sub(1));
        let (_, value, _) = scratch.select_nth_unstable(index);
        *value
    }

    /// p99 lateness in nanoseconds.
    #[must_use]
    pub fn p99_lateness_ns(&self) -> u64 {
        self.percentile_lateness_ns(0.99)
    }

    /// Mean lateness over every recorded tick, in nanoseconds.
    #[must_use]
    pub fn mean_lateness_ns(&self) -> u64 {
        if self.total_ticks == 0 {
            return 0;
        }
        u64::try_from(self.lateness_sum_ns / u128::from(self.total_ticks)).unwrap_or(u64::MAX)
    }

    /// Fraction of boundaries that were skipped (0.0 to 1.0).
    #[must_use]
    pub fn skipped_tick_rate(&self) -> f64 {
        let boundaries = self.total_ticks.saturating_add(self.skipped_ticks);
        if boundaries == 0 {
            0.0
        } else {
            self.skipped_ticks as f64 / boundaries as f64
        }
    }

    /// Number of samples currently retained.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.recent_samples.len()
    }

    /// Reset all metrics.
    pub fn reset(&mut self) {
        self.total_ticks = 0;
        self.skipped_ticks = 0;
        self.max_lateness_ns = 0;
        self.last_lateness_ns = 0;
        self.lateness_sum_ns = 0;
        self.recent_samples.clear();
        self.next_sample_index = 0;
    }

    /// Point-in-time copy of the headline numbers.
    #[must_use]
    pub fn snapshot(&self) -> LatenessSnapshot {
        LatenessSnapshot {
            total_ticks: self.total_ticks,
            skipped_ticks: self.skipped_ticks,
            last_lateness: Duration::from_nanos(self.last_lateness_ns),
            max_lateness: Duration::from_nanos(self.max_lateness_ns),
            mean_lateness: Duration::from_nanos(self.mean_lateness_ns()),
            p99_lateness: Duration::from_nanos(self.p99_lateness_ns()),
        }
    }
}

/// Copy of [`LatenessMetrics`] returned by
/// [`IntervalTimer::lateness`](crate::IntervalTimer::lateness).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatenessSnapshot {
    /// Ticks fired since the session started.
    pub total_ticks: u64,
    /// Boundaries passed without a tick.
    pub skipped_ticks: u64,
    /// Lateness of the most recent tick.
    pub last_lateness: Duration,
    /// Worst lateness observed.
    pub max_lateness: Duration,
    /// Mean lateness.
    pub mean_lateness: Duration,
    /// 99th percentile lateness over the retained samples.
    pub p99_lateness: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn us(n: u64) -> Duration {
        Duration::from_micros(n)
    }

    #[test]
    fn test_record_tick() {
        let mut metrics = LatenessMetrics::new();

        metrics.record_tick(us(100), 0);
        metrics.record_tick(us(300), 2);
        metrics.record_tick(us(200), 0);

        assert_eq!(metrics.total_ticks, 3);
        assert_eq!(metrics.skipped_ticks, 2);
        assert_eq!(metrics.max_lateness_ns, 300_000);
        assert_eq!(metrics.last_lateness_ns, 200_000);
        assert_eq!(metrics.mean_lateness_ns(), 200_000);
    }

    #[test]
    fn test_skipped_tick_rate() {
        let mut metrics = LatenessMetrics::new();
        assert!(metrics.skipped_tick_rate().abs() < f64::EPSILON);

        metrics.record_tick(us(1), 1);
        metrics.record_tick(us(1), 0);
        metrics.record_tick(us(1), 0);

        assert!((metrics.skipped_tick_rate() - 0.25).abs() < 1e-10);
    }

    #[test]
    fn test_p99() {
        let mut metrics = LatenessMetrics::with_capacity(100);
        for i in 0..100u64 {
            metrics.record_tick(us(i), 0);
        }

        let p99 = metrics.p99_lateness_ns();
        assert!(p99 >= 97_000, "p99 was {p99}");
        assert!(p99 <= 99_000, "p99 was {p99}");
    }

    #[test]
    fn test_ring_buffer_keeps_latest() {
        let mut metrics = LatenessMetrics::with_capacity(3);
        for i in 1..=5u64 {
            metrics.record_tick(us(i), 0);
        }

        assert_eq!(metrics.sample_count(), 3);
        let mut samples = metrics.recent_samples.clone();
        samples.sort_unstable();
        assert_eq!(samples, vec![3_000, 4_000, 5_000]);
    }

    #[test]
    fn test_zero_capacity() {
        let mut metrics = LatenessMetrics::with_capacity(0);
        metrics.record_tick(us(10), 0);

        assert_eq!(metrics.total_ticks, 1);
        assert_eq!(metrics.sample_count(), 0);
        assert_eq!(metrics.p99_lateness_ns(), 0);
    }

    #[test]
    fn test_reset_and_snapshot() {
        let mut metrics = LatenessMetrics::new();
        metrics.record_tick(us(50), 1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_ticks, 1);
        assert_eq!(snapshot.skipped_ticks, 1);
        assert_eq!(snapshot.max_lateness, us(50));

        metrics.reset();
        assert_eq!(metrics.snapshot(), LatenessSnapshot::default());
    }
}
