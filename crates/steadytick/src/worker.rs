//! Background worker and the state it shares with its timer.
//!
//! The worker cycles `WaitingForStart -> Active -> WaitingForStart` until the
//! timer is disposed, at which point it ends in `Terminated`. A synchronous
//! listener failure ends the thread early; the next `start()` spawns a new one.
//!
//! `start()`, `stop()` and every decision the worker takes after waking are
//! serialized on `Shared::control`, so a stop/start pair issued while the
//! worker is asleep is never lost.

use parking_lot::Mutex;
use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{DispatchMode, TimerConfig, clamp_interval};
use crate::dispatch::{ListenerFailure, dispatch_async, dispatch_sync};
use crate::error::{TimerError, TimerResult};
use crate::lateness::{LatenessMetrics, LatenessSnapshot};
use crate::listener::{ListenerId, ListenerRegistry};
use crate::schedule::{boundary_index, lateness, remaining_until_next_tick, skipped_between};
use crate::signal::Signal;
use crate::timer::TimerHandle;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the timer whose worker runs on this thread, 0 elsewhere.
    static WORKER_OF: Cell<u64> = const { Cell::new(0) };
}

/// Lifecycle state of a timer's worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    /// No worker thread exists (never started, or the last one died).
    NotSpawned = 0,
    /// Worker is parked on the run gate.
    WaitingForStart = 1,
    /// Worker is inside its tick loop.
    Active = 2,
    /// Worker exited for good after disposal.
    Terminated = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::WaitingForStart,
            2 => Self::Active,
            3 => Self::Terminated,
            _ => Self::NotSpawned,
        }
    }
}

enum GateDecision {
    Enter,
    Stay,
    Exit,
}

enum WakeDecision {
    Fire,
    Restart,
    Stop,
    Exit,
}

enum ActiveExit {
    Stopped,
    Exit,
    ListenerFailed,
}

enum WorkerExit {
    Terminated,
    ListenerFailed,
    Panicked,
}

/// State shared between a timer, its handles and its worker thread.
pub(crate) struct Shared {
    pub(crate) id: u64,
    interval_ns: AtomicU64,
    fire_immediately: AtomicBool,
    async_dispatch: AtomicBool,
    pub(crate) running: AtomicBool,
    pub(crate) cancel_requested: AtomicBool,
    pub(crate) restart_requested: AtomicBool,
    pub(crate) exit_requested: AtomicBool,
    pub(crate) disposed: AtomicBool,
    pub(crate) worker_alive: AtomicBool,
    state: AtomicU8,
    tick_count: AtomicU64,
    pub(crate) control: Mutex<()>,
    pub(crate) run_gate: Signal,
    pub(crate) wake: Signal,
    pub(crate) listeners: ListenerRegistry,
    lateness: Mutex<LatenessMetrics>,
}

impl Shared {
    pub(crate) fn new(config: &TimerConfig) -> Self {
        let shared = Self {
            id: NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed),
            interval_ns: AtomicU64::new(0),
            fire_immediately: AtomicBool::new(config.fire_immediately),
            async_dispatch: AtomicBool::new(config.dispatch.is_async()),
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            restart_requested: AtomicBool::new(false),
            exit_requested: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            worker_alive: AtomicBool::new(false),
            state: AtomicU8::new(WorkerState::NotSpawned as u8),
            tick_count: AtomicU64::new(0),
            control: Mutex::new(()),
            run_gate: Signal::new(),
            wake: Signal::new(),
            listeners: ListenerRegistry::default(),
            lateness: Mutex::new(LatenessMetrics::new()),
        };
        shared.set_interval(config.interval());
        shared
    }

    pub(crate) fn interval(&self) -> Duration {
        Duration::from_nanos(self.interval_ns.load(Ordering::Acquire))
    }

    pub(crate) fn set_interval(&self, interval: Duration) {
        let ns = u64::try_from(clamp_interval(interval).as_nanos()).unwrap_or(u64::MAX);
        self.interval_ns.store(ns, Ordering::Release);
    }

    pub(crate) fn fire_immediately(&self) -> bool {
        self.fire_immediately.load(Ordering::Acquire)
    }

    pub(crate) fn set_fire_immediately(&self, enabled: bool) {
        self.fire_immediately.store(enabled, Ordering::Release);
    }

    pub(crate) fn dispatch_mode(&self) -> DispatchMode {
        if self.async_dispatch.load(Ordering::Acquire) {
            DispatchMode::Asynchronous
        } else {
            DispatchMode::Synchronous
        }
    }

    pub(crate) fn set_dispatch_mode(&self, mode: DispatchMode) {
        self.async_dispatch.store(mode.is_async(), Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::Acquire)
    }

    pub(crate) fn lateness(&self) -> LatenessSnapshot {
        self.lateness.lock().snapshot()
    }

    /// Ask the active loop to go idle. Does not wait for it to do so.
    pub(crate) fn request_stop(&self) {
        let _control = self.control.lock();
        if self.is_disposed() || !self.is_running() {
            return;
        }
        self.cancel_requested.store(true, Ordering::Release);
        self.wake.set();
        info!(timer = self.id, "Timer stop requested");
    }

    /// Permanently stop the worker: cancel, forbid restarts, wake both signals.
    pub(crate) fn request_exit(&self) {
        let _control = self.control.lock();
        self.cancel_requested.store(true, Ordering::Release);
        self.exit_requested.store(true, Ordering::Release);
        self.running.store(false, Ordering::Release);
        self.wake.set();
        self.run_gate.set();
    }

    /// Whether the caller is this timer's worker thread.
    pub(crate) fn on_worker_thread(&self) -> bool {
        WORKER_OF.with(Cell::get) == self.id
    }

    fn on_gate_opened(&self) -> GateDecision {
        let _control = self.control.lock();
        if self.exit_requested.load(Ordering::Acquire) {
            return GateDecision::Exit;
        }
        if self.cancel_requested.swap(false, Ordering::AcqRel) {
            // Stopped before the worker got here.
            self.set_state(WorkerState::WaitingForStart);
            self.running.store(false, Ordering::Release);
            return GateDecision::Stay;
        }
        self.restart_requested.store(false, Ordering::Release);
        self.running.store(true, Ordering::Release);
        self.set_state(WorkerState::Active);
        GateDecision::Enter
    }

    fn on_wake(&self) -> WakeDecision {
        let _control = self.control.lock();
        if self.exit_requested.load(Ordering::Acquire) {
            return WakeDecision::Exit;
        }
        if self.cancel_requested.swap(false, Ordering::AcqRel) {
            self.restart_requested.store(false, Ordering::Release);
            self.set_state(WorkerState::WaitingForStart);
            self.running.store(false, Ordering::Release);
            return WakeDecision::Stop;
        }
        if self.restart_requested.swap(false, Ordering::AcqRel) {
            return WakeDecision::Restart;
        }
        WakeDecision::Fire
    }

    fn retire(&self) {
        let _control = self.control.lock();
        self.running.store(false, Ordering::Release);
        self.restart_requested.store(false, Ordering::Release);
        self.worker_alive.store(false, Ordering::Release);
        if self.exit_requested.load(Ordering::Acquire) {
            self.set_state(WorkerState::Terminated);
        } else {
            self.set_state(WorkerState::NotSpawned);
        }
    }

    fn fire(
        &self,
        handle: &TimerHandle,
        lateness: Duration,
        skipped: u64,
    ) -> Result<(), (ListenerId, ListenerFailure)> {
        let tick = self.tick_count.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        self.lateness.lock().record_tick(lateness, skipped);

        let listeners = self.listeners.snapshot();
        debug!(
            timer = self.id,
            tick,
            listeners = listeners.len(),
            lateness_us = lateness.as_micros(),
            skipped,
            "Timer tick"
        );

        match self.dispatch_mode() {
            DispatchMode::Synchronous => dispatch_sync(&listeners, handle),
            DispatchMode::Asynchronous => {
                dispatch_async(&listeners, handle);
                Ok(())
            }
        }
    }
}

/// Spawn the worker thread. It parks on the run gate immediately.
pub(crate) fn spawn_worker(shared: &Arc<Shared>) -> TimerResult<JoinHandle<()>> {
    let id = shared.id;
    let worker_shared = Arc::clone(shared);
    shared.set_state(WorkerState::WaitingForStart);
    let spawned = thread::Builder::new()
        .name(format!("steadytick-worker-{id}"))
        .spawn(move || run_worker(&worker_shared));

    match spawned {
        Ok(handle) => {
            info!(timer = id, "Timer worker spawned");
            Ok(handle)
        }
        Err(e) => {
            shared.set_state(WorkerState::NotSpawned);
            Err(TimerError::worker_spawn(e))
        }
    }
}

fn run_worker(shared: &Arc<Shared>) {
    WORKER_OF.with(|worker_of| worker_of.set(shared.id));
    let handle = TimerHandle::from_shared(Arc::clone(shared));

    let exit = match catch_unwind(AssertUnwindSafe(|| worker_loop(shared, &handle))) {
        Ok(exit) => exit,
        Err(_) => WorkerExit::Panicked,
    };

    shared.retire();

    match exit {
        WorkerExit::Terminated => debug!(timer = shared.id, "Timer worker terminated"),
        WorkerExit::ListenerFailed => {
            warn!(timer = shared.id, "Timer worker exited after listener failure");
        }
        WorkerExit::Panicked => error!(timer = shared.id, "Timer worker panicked"),
    }
}

fn worker_loop(shared: &Shared, handle: &TimerHandle) -> WorkerExit {
    loop {
        shared.run_gate.wait();
        match shared.on_gate_opened() {
            GateDecision::Exit => return WorkerExit::Terminated,
            GateDecision::Stay => continue,
            GateDecision::Enter => {}
        }

        match run_active(shared, handle) {
            ActiveExit::Stopped => debug!(timer = shared.id, "Timer worker idle"),
            ActiveExit::Exit => return WorkerExit::Terminated,
            ActiveExit::ListenerFailed => return WorkerExit::ListenerFailed,
        }
    }
}

fn run_active(shared: &Shared, handle: &TimerHandle) -> ActiveExit {
    'session: loop {
        let origin = Instant::now();
        shared.lateness.lock().reset();

        let mut last_interval = shared.interval();
        let mut last_index = 0u64;
        debug!(
            timer = shared.id,
            interval_ms = last_interval.as_millis(),
            "Timer session started"
        );

        if shared.fire_immediately()
            && let Err((id, failure)) = shared.fire(handle, Duration::ZERO, 0)
        {
            warn!(timer = shared.id, listener = %id, error = %failure, "Tick listener failed");
            return ActiveExit::ListenerFailed;
        }

        loop {
            let interval = shared.interval();
            let elapsed = origin.elapsed();
            if interval != last_interval {
                // Boundary just passed under the new interval counts as fired.
                last_index = boundary_index(elapsed, interval);
                last_interval = interval;
            }

            shared.wake.wait_timeout(remaining_until_next_tick(elapsed, interval));

            match shared.on_wake() {
                WakeDecision::Fire => {}
                WakeDecision::Restart => continue 'session,
                WakeDecision::Stop => return ActiveExit::Stopped,
                WakeDecision::Exit => return ActiveExit::Exit,
            }

            let elapsed = origin.elapsed();
            let index = boundary_index(elapsed, interval);
            if index <= last_index {
                // Woken before the boundary.
                continue;
            }
            let skipped = skipped_between(last_index, index);
            last_index = index;

            if let Err((id, failure)) = shared.fire(handle, lateness(elapsed, interval), skipped) {
                warn!(timer = shared.id, listener = %id, error = %failure, "Tick listener failed");
                return ActiveExit::ListenerFailed;
            }
        }
    }
}
