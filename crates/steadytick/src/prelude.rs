//! Prelude module for common timer types.
//!
//! ```
//! use steadytick::prelude::*;
//! ```

pub use crate::config::{DispatchMode, MIN_INTERVAL, TimerConfig, TimerConfigBuilder};
pub use crate::error::{TimerError, TimerResult};
pub use crate::lateness::LatenessSnapshot;
pub use crate::listener::{ListenerError, ListenerId, ListenerResult};
pub use crate::timer::{IntervalTimer, TimerHandle};
pub use crate::worker::WorkerState;
