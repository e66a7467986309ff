// Background maintenance workers.
//
// Three roles, each a dedicated thread: periodic health check, the
// 30-second monitor (idle/lifetime eviction), and the async-request
// workers draining the bounded task queue. Worker bodies are wrapped in
// catch_unwind: a panicking hook is logged and the worker keeps going.

use crossbeam::channel::RecvTimeoutError;
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::driver::Driver;
use crate::pool::core::PoolInner;
use crate::pool::queue::AsyncRequest;

/// Monitor worker cadence.
pub(crate) const MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Poll granularity for async-request workers between queue reads.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shutdown-aware sleep shared by the timed workers. Sleeping threads are
/// woken immediately when the pool stops.
pub(crate) struct ShutdownSignal {
    running: Mutex<bool>,
    cv: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            running: Mutex::new(true),
            cv: Condvar::new(),
        }
    }

    pub fn reset(&self) {
        *self.running.lock() = true;
    }

    pub fn stop(&self) {
        *self.running.lock() = false;
        self.cv.notify_all();
    }

    /// Sleep for `interval` or until stopped. Returns true when the full
    /// interval elapsed with the pool still running.
    pub fn wait_interval(&self, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        let mut running = self.running.lock();
        while *running {
            if self.cv.wait_until(&mut running, deadline).timed_out() {
                return *running;
            }
        }
        false
    }
}

pub(crate) fn spawn_health_check_worker<D: Driver>(pool: Arc<PoolInner<D>>) -> JoinHandle<()> {
    thread::spawn(move || {
        tracing::info!("health check worker thread started");
        let interval = pool.config().health_check_interval;

        while pool.shutdown_signal().wait_interval(interval) {
            let body = panic::catch_unwind(AssertUnwindSafe(|| {
                pool.perform_health_check();
            }));
            if body.is_err() {
                tracing::error!("health check worker caught a panic, continuing");
            }
        }

        tracing::info!("health check worker thread stopped");
    })
}

pub(crate) fn spawn_monitor_worker<D: Driver>(pool: Arc<PoolInner<D>>) -> JoinHandle<()> {
    thread::spawn(move || {
        tracing::info!("connection monitor worker thread started");

        while pool.shutdown_signal().wait_interval(MONITOR_INTERVAL) {
            let body = panic::catch_unwind(AssertUnwindSafe(|| {
                pool.remove_excess_connections();
                pool.cleanup_idle_connections();
            }));
            if body.is_err() {
                tracing::error!("connection monitor worker caught a panic, continuing");
            }
        }

        tracing::info!("connection monitor worker thread stopped");
    })
}

pub(crate) fn spawn_async_request_worker<D: Driver>(pool: Arc<PoolInner<D>>) -> JoinHandle<()> {
    let receiver = pool.requests().receiver();
    thread::spawn(move || {
        tracing::debug!("async request worker thread started");

        loop {
            match receiver.recv_timeout(QUEUE_POLL_INTERVAL) {
                Ok(request) => dispatch(&pool, request),
                Err(RecvTimeoutError::Timeout) => {
                    if !pool.is_running() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        tracing::debug!("async request worker thread stopped");
    })
}

/// Run one async request: synchronous acquire against the remaining
/// deadline, then hand the outcome to the callback.
pub(crate) fn dispatch<D: Driver>(pool: &Arc<PoolInner<D>>, request: AsyncRequest<D>) {
    let outcome = pool.acquire_sync(request.remaining());
    let callback = request.callback;
    if panic::catch_unwind(AssertUnwindSafe(move || callback(outcome))).is_err() {
        tracing::error!("async acquire callback panicked");
    }
}
