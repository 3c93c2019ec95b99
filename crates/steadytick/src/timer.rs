//! The public timer type and the handle passed to listeners.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::{DispatchMode, TimerConfig};
use crate::error::{TimerError, TimerResult};
use crate::lateness::LatenessSnapshot;
use crate::listener::{ListenerId, ListenerResult};
use crate::worker::{Shared, WorkerState, spawn_worker};

/// Non-accumulating interval timer.
///
/// Ticks are scheduled against the instant the timer was (re)started: the
/// n-th tick targets `start + n * interval` regardless of how long earlier
/// ticks took. A late wake-up fires once and then realigns; missed
/// boundaries are never replayed.
///
/// One background thread is created lazily on the first `start()` and reused
/// across `stop()`/`start()` cycles. Dropping the timer disposes it.
///
/// # Example
///
/// ```no_run
/// use steadytick::prelude::*;
/// use std::time::Duration;
///
/// let timer = IntervalTimer::new(TimerConfig::builder().interval_ms(100).build()?);
/// timer.add_listener(|timer: &TimerHandle| {
///     println!("tick {}", timer.tick_count());
///     Ok(())
/// });
/// timer.start()?;
/// std::thread::sleep(Duration::from_secs(1));
/// timer.dispose();
/// # Ok::<(), TimerError>(())
/// ```
pub struct IntervalTimer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Held by `dispose()` until teardown completes.
    teardown: Mutex<()>,
}

impl IntervalTimer {
    /// Create an idle timer. No thread is spawned until `start()`.
    #[must_use]
    pub fn new(config: TimerConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(&config)),
            worker: Mutex::new(None),
            teardown: Mutex::new(()),
        }
    }

    /// Create an idle timer with the given interval and default options.
    #[must_use]
    pub fn with_interval(interval: Duration) -> Self {
        let timer = Self::new(TimerConfig::default());
        timer.set_interval(interval);
        timer
    }

    /// Set all options at once. The interval is clamped to 10 ms.
    pub fn configure(&self, interval: Duration, fire_immediately: bool, dispatch: DispatchMode) {
        self.set_interval(interval);
        self.set_fire_immediately(fire_immediately);
        self.set_dispatch_mode(dispatch);
    }

    /// Current interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.shared.interval()
    }

    /// Change the interval; the running loop picks it up on its next wait.
    pub fn set_interval(&self, interval: Duration) {
        self.shared.set_interval(interval);
    }

    /// Whether `start()` fires a tick before the first wait.
    #[must_use]
    pub fn fire_immediately(&self) -> bool {
        self.shared.fire_immediately()
    }

    /// Enable or disable the immediate tick on `start()`.
    pub fn set_fire_immediately(&self, enabled: bool) {
        self.shared.set_fire_immediately(enabled);
    }

    /// Current dispatch mode.
    #[must_use]
    pub fn dispatch_mode(&self) -> DispatchMode {
        self.shared.dispatch_mode()
    }

    /// Change the dispatch mode; applies from the next tick.
    pub fn set_dispatch_mode(&self, mode: DispatchMode) {
        self.shared.set_dispatch_mode(mode);
    }

    /// Whether the tick loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Whether `dispose()` has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Current state of the background worker.
    #[must_use]
    pub fn worker_state(&self) -> WorkerState {
        self.shared.state()
    }

    /// Ticks fired over the lifetime of this timer.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.shared.tick_count()
    }

    /// Lateness statistics for the current (or last) active session.
    #[must_use]
    pub fn lateness(&self) -> LatenessSnapshot {
        self.shared.lateness()
    }

    /// Handle usable from other threads and listeners.
    #[must_use]
    pub fn handle(&self) -> TimerHandle {
        TimerHandle::from_shared(Arc::clone(&self.shared))
    }

    /// Register a tick listener. Listeners run in registration order.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&TimerHandle) -> ListenerResult + Send + Sync + 'static,
    {
        self.shared.listeners.add(Arc::new(listener))
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.len()
    }

    /// Start ticking.
    ///
    /// Spawns the worker if none is alive, then opens the run gate. Calling
    /// `start()` while running is a no-op, except that it cancels a `stop()`
    /// the worker has not yet acted on; ticking then resumes with the timing
    /// origin reset to now.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::Disposed`] after `dispose()`, or
    /// [`TimerError::WorkerSpawn`] if the worker thread cannot be created.
    pub fn start(&self) -> TimerResult<()> {
        let shared = &self.shared;
        if shared.is_disposed() {
            return Err(TimerError::Disposed);
        }

        let mut worker = self.worker.lock();
        let _control = shared.control.lock();
        if shared.is_disposed() {
            return Err(TimerError::Disposed);
        }

        if !shared.worker_alive.load(Ordering::Acquire) {
            if let Some(dead) = worker.take()
                && dead.join().is_err()
            {
                error!(timer = shared.id, "Previous timer worker panicked");
            }
            *worker = Some(spawn_worker(shared)?);
            shared.worker_alive.store(true, Ordering::Release);
        }

        let stop_pending = shared.cancel_requested.swap(false, Ordering::AcqRel);
        if shared.is_running() {
            if stop_pending {
                shared.restart_requested.store(true, Ordering::Release);
                shared.wake.set();
                debug!(timer = shared.id, "Pending stop superseded by start");
            }
            return Ok(());
        }

        shared.running.store(true, Ordering::Release);
        shared.set_state(WorkerState::Active);
        shared.wake.reset();
        shared.run_gate.set();
        info!(
            timer = shared.id,
            interval_ms = shared.interval().as_millis(),
            dispatch = ?shared.dispatch_mode(),
            "Timer started"
        );
        Ok(())
    }

    /// Request the tick loop to go idle without waiting for it.
    ///
    /// The worker observes the request at its next wake-up, never in the
    /// middle of a listener call. No-op if not running or disposed.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Stop permanently and release the worker.
    ///
    /// Joins the worker thread, so no synchronous listener runs after this
    /// returns. Asynchronous listener threads already dispatched are not
    /// waited for. All listeners are removed. Idempotent; a call that
    /// overlaps another blocks until the first one has finished.
    ///
    /// Called from inside a listener on the worker thread, the join is
    /// skipped; the worker exits as soon as that listener returns.
    pub fn dispose(&self) {
        let shared = &self.shared;
        if shared.on_worker_thread() {
            if !shared.disposed.swap(true, Ordering::AcqRel) {
                shared.request_exit();
                shared.listeners.clear();
                debug!(timer = shared.id, "Dispose called on worker thread; not joining");
            }
            return;
        }

        let _teardown = self.teardown.lock();
        let first = !shared.disposed.swap(true, Ordering::AcqRel);
        if first {
            shared.request_exit();
        }

        // Also reaps a worker that disposed itself from a listener.
        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && worker.join().is_err()
        {
            error!(timer = shared.id, "Timer worker panicked");
        }
        shared.set_state(WorkerState::Terminated);
        shared.listeners.clear();

        if first {
            info!(timer = shared.id, ticks = shared.tick_count(), "Timer disposed");
        }
    }
}

impl Default for IntervalTimer {
    fn default() -> Self {
        Self::new(TimerConfig::default())
    }
}

impl Drop for IntervalTimer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for IntervalTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalTimer")
            .field("id", &self.shared.id)
            .field("interval", &self.interval())
            .field("running", &self.is_running())
            .field("disposed", &self.is_disposed())
            .field("worker_state", &self.worker_state())
            .field("listeners", &self.shared.listeners)
            .finish()
    }
}

/// Shared view of a timer, handed to every listener.
///
/// A handle can read state, adjust the interval and request a stop. It
/// cannot start or dispose the timer, and it does not keep the worker alive.
#[derive(Clone)]
pub struct TimerHandle {
    shared: Arc<Shared>,
}

impl TimerHandle {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Current interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.shared.interval()
    }

    /// Change the interval (clamped to 10 ms).
    pub fn set_interval(&self, interval: Duration) {
        self.shared.set_interval(interval);
    }

    /// Whether the tick loop is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Whether the timer has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Ticks fired so far, including the one being delivered.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.shared.tick_count()
    }

    /// Request the tick loop to go idle; see [`IntervalTimer::stop`].
    pub fn stop(&self) {
        self.shared.request_stop();
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("id", &self.shared.id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
