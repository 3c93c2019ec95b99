//! Non-accumulating interval timer.
//!
//! [`IntervalTimer`] runs a background worker that invokes registered
//! listeners once per interval. Every wait is computed from the instant the
//! timer was started, so per-tick scheduling jitter and listener run time do
//! not accumulate into long-term drift:
//!
//! - **Absolute boundaries**: tick `n` targets `start + n * interval`
//! - **No catch-up**: a late wake-up fires one tick; skipped boundaries are
//!   counted in [`LatenessSnapshot`] but never replayed
//! - **Restartable**: `stop()` parks the worker, `start()` resumes with a new
//!   origin, `dispose()` (or `Drop`) joins it
//! - **Dispatch modes**: synchronous fan-out on the worker thread, or one
//!   detached thread per listener per tick
//!
//! # Limits
//!
//! Tick precision is bounded by the host scheduler (typically a few
//! milliseconds). The interval is never below 10 ms. Ticks are not delivered
//! while the machine is suspended.
//!
//! # Example
//!
//! ```no_run
//! use steadytick::prelude::*;
//! use std::time::Duration;
//!
//! let config = TimerConfig::builder()
//!     .interval(Duration::from_millis(50))
//!     .fire_immediately(true)
//!     .build()?;
//!
//! let timer = IntervalTimer::new(config);
//! timer.add_listener(|timer: &TimerHandle| {
//!     if timer.tick_count() >= 10 {
//!         timer.stop();
//!     }
//!     Ok(())
//! });
//!
//! timer.start()?;
//! # Ok::<(), TimerError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(unused_must_use)]
#![deny(missing_docs, missing_debug_implementations)]

pub mod config;
pub mod dispatch;
pub mod error;
pub mod lateness;
pub mod listener;
pub mod schedule;
pub mod signal;
pub mod timer;
pub mod worker;

pub mod prelude;

pub use config::{DEFAULT_INTERVAL, DispatchMode, MIN_INTERVAL, TimerConfig, TimerConfigBuilder};
pub use dispatch::ListenerFailure;
pub use error::{TimerError, TimerResult};
pub use lateness::{LatenessMetrics, LatenessSnapshot};
pub use listener::{ListenerError, ListenerId, ListenerResult, TickCallback};
pub use signal::Signal;
pub use timer::{IntervalTimer, TimerHandle};
pub use worker::WorkerState;
