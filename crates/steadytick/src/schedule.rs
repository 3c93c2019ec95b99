//! Non-accumulating schedule arithmetic.
//!
//! Every wait is measured from a fixed origin: the next deadline is the next
//! multiple of the interval after the origin, never "previous fire plus
//! interval". A tick that runs long therefore shortens the following wait
//! instead of pushing every later tick back.

use std::time::Duration;

#[inline]
fn to_duration(ns: u128) -> Duration {
    Duration::from_nanos(u64::try_from(ns).unwrap_or(u64::MAX))
}

#[inline]
fn interval_ns(interval: Duration) -> u128 {
    interval.as_nanos().max(1)
}

/// Time left until the next interval boundary.
///
/// Returns a value in `(0, interval]`. Exactly on a boundary the full
/// interval is returned, so a tick is never fired twice for one boundary.
#[must_use]
pub fn remaining_until_next_tick(elapsed: Duration, interval: Duration) -> Duration {
    let period = interval_ns(interval);
    let into_period = elapsed.as_nanos() % period;
    to_duration(period.saturating_sub(into_period))
}

/// Index of the last boundary at or before `elapsed` (0 is the origin).
#[must_use]
pub fn boundary_index(elapsed: Duration, interval: Duration) -> u64 {
    u64::try_from(elapsed.as_nanos() / interval_ns(interval)).unwrap_or(u64::MAX)
}

/// How far `elapsed` is past the last boundary.
#[must_use]
pub fn lateness(elapsed: Duration, interval: Duration) -> Duration {
    to_duration(elapsed.as_nanos() % interval_ns(interval))
}

/// Boundaries strictly between two fired boundary indices.
///
/// These are the ticks the worker slept through; they are counted, not
/// replayed.
#[inline]
#[must_use]
pub fn skipped_between(previous: u64, current: u64) -> u64 {
    current.saturating_sub(previous).saturating_sub(1)
}

/// Offset of boundary `index` from the origin.
#[must_use]
pub fn boundary_offset(index: u64, interval: Duration) -> Duration {
    to_duration(u128::from(index).saturating_mul(interval.as_nanos()))
}
