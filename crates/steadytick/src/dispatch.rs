//! Listener fan-out for a single tick.
//!
//! Synchronous dispatch runs listeners in registration order on the calling
//! thread and stops at the first failure. Asynchronous dispatch gives every
//! listener its own short-lived thread; the caller never waits and failures
//! are logged and dropped. Consecutive async ticks may overlap if a listener
//! outlives the interval.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};

use crate::listener::{ListenerError, ListenerId, TickCallback};
use crate::timer::TimerHandle;

/// Why a listener invocation failed.
#[derive(Debug, Error)]
pub enum ListenerFailure {
    /// The listener returned an error.
    #[error("listener returned error: {0}")]
    Returned(#[source] ListenerError),

    /// The listener panicked.
    #[error("listener panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Invoke one listener, turning both `Err` and panics into a failure.
pub(crate) fn invoke_guarded(
    callback: &TickCallback,
    handle: &TimerHandle,
) -> Result<(), ListenerFailure> {
    match catch_unwind(AssertUnwindSafe(|| callback(handle))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(ListenerFailure::Returned(error)),
        Err(payload) => Err(ListenerFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Run every listener in order; the first failure aborts the rest of the tick.
pub(crate) fn dispatch_sync(
    listeners: &[(ListenerId, TickCallback)],
    handle: &TimerHandle,
) -> Result<(), (ListenerId, ListenerFailure)> {
    for (id, callback) in listeners {
        invoke_guarded(callback, handle).map_err(|failure| (*id, failure))?;
    }
    Ok(())
}

/// Start every listener on its own thread and return immediately.
///
/// Returns the number of listeners that were actually dispatched.
pub(crate) fn dispatch_async(
    listeners: &[(ListenerId, TickCallback)],
    handle: &TimerHandle,
) -> usize {
    let mut dispatched = 0usize;
    for (id, callback) in listeners {
        let id = *id;
        let callback = Arc::clone(callback);
        let handle = handle.clone();
        let spawned = thread::Builder::new()
            .name(format!("steadytick-{id}"))
            .spawn(move || {
                if let Err(failure) = invoke_guarded(&callback, &handle) {
                    debug!(listener = %id, error = %failure, "Discarding async listener failure");
                }
            });
        match spawned {
            Ok(_detached) => dispatched = dispatched.saturating_add(1),
            Err(e) => warn!(listener = %id, "Failed to spawn async listener thread: {}", e),
        }
    }
    dispatched
}
