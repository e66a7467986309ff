//! Connection pool core engine.
//!
//! A bounded set of validated connections shared by many concurrent
//! clients. One mutex guards the registry of tracked handles, the idle
//! FIFO, and the in-flight creation reservations; the condition variable
//! rides that mutex and is signalled on release, on successful creation,
//! and (broadcast) on shutdown. Statistics counters are atomics updated
//! outside the lock.

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::PoolConfig;
use crate::driver::Driver;
use crate::error::PoolError;
use crate::pool::handle::ConnectionHandle;
use crate::pool::queue::{AsyncRequest, RequestQueue};
use crate::pool::statistics::{PoolStatistics, PoolStats};
use crate::pool::workers::{self, ShutdownSignal};

/// Custom validation hook: replaces the driver-based probe when set.
pub type ValidatorFn<C> = Box<dyn Fn(&mut C) -> bool + Send + Sync + 'static>;

/// Custom factory hook: replaces the driver connect when set.
pub type FactoryFn<C> = Box<dyn Fn() -> Result<C, PoolError> + Send + Sync + 'static>;

/// Exponential backoff for the first attempts, constant delay afterwards.
pub(crate) fn retry_backoff(attempt: u32, retry_delay: Duration) -> Duration {
    const MAX_EXPONENTIAL_BACKOFF_ATTEMPTS: u32 = 3;
    if attempt < MAX_EXPONENTIAL_BACKOFF_ATTEMPTS {
        Duration::from_secs(1u64 << attempt)
    } else {
        retry_delay
    }
}

/// State behind the single pool mutex.
///
/// Handles live in `registry` only; `available` holds ids, so every handle
/// has exactly one owning location at any moment (the registry entry),
/// and idle membership is a set relation rather than a second owner.
struct PoolState<C> {
    available: VecDeque<u64>,
    registry: HashMap<u64, Arc<ConnectionHandle<C>>>,
    pending_creates: usize,
}

impl<C> PoolState<C> {
    fn new() -> Self {
        Self {
            available: VecDeque::new(),
            registry: HashMap::new(),
            pending_creates: 0,
        }
    }
}

pub(crate) struct PoolInner<D: Driver> {
    config: PoolConfig,
    driver: D,
    state: Mutex<PoolState<D::Conn>>,
    available_cv: Condvar,
    running: AtomicBool,
    next_id: AtomicU64,
    stats: PoolStatistics,
    validator: RwLock<Option<ValidatorFn<D::Conn>>>,
    factory: RwLock<Option<FactoryFn<D::Conn>>>,
    shutdown: ShutdownSignal,
    requests: RequestQueue<D>,
}

impl<D: Driver> PoolInner<D> {
    fn new(config: PoolConfig, driver: D) -> Self {
        let requests = RequestQueue::new(config.async_queue_depth);
        Self {
            config,
            driver,
            state: Mutex::new(PoolState::new()),
            available_cv: Condvar::new(),
            running: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            stats: PoolStatistics::new(),
            validator: RwLock::new(None),
            factory: RwLock::new(None),
            shutdown: ShutdownSignal::new(),
            requests,
        }
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn driver(&self) -> &D {
        &self.driver
    }

    pub(crate) fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    pub(crate) fn requests(&self) -> &RequestQueue<D> {
        &self.requests
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Validate a raw connection through the custom hook or the driver
    /// probe.
    fn validate_raw(&self, raw: &mut D::Conn) -> bool {
        let validator = self.validator.read();
        match validator.as_ref() {
            Some(hook) => hook(raw),
            None => self.driver.validate(raw, &self.config.validation_query),
        }
    }

    /// Validate the handle's raw connection. A handle whose raw
    /// connection is already gone is invalid.
    pub(crate) fn validate_handle(&self, handle: &ConnectionHandle<D::Conn>) -> bool {
        let mut raw = handle.raw().lock();
        match raw.as_mut() {
            Some(conn) => self.validate_raw(conn),
            None => false,
        }
    }

    /// Close the handle's raw connection and account for the closed
    /// connection. Removal from the registry is the caller's business.
    fn close_handle(&self, handle: &ConnectionHandle<D::Conn>) {
        if let Some(raw) = handle.take_raw() {
            tracing::debug!("closing connection {}", handle.id());
            self.driver.close(raw);
            self.stats.record_connection_closed();
        }
    }

    /// Close without touching pool accounting. Used after shutdown, when
    /// the registry no longer tracks the handle.
    fn close_handle_quietly(&self, handle: &ConnectionHandle<D::Conn>) {
        if let Some(raw) = handle.take_raw() {
            self.driver.close(raw);
        }
    }

    /// Open a raw connection, retrying with backoff. Every failed attempt
    /// is counted as a failed creation.
    fn create_raw(&self) -> Result<D::Conn, PoolError> {
        let endpoint = self.config.endpoint();
        let max_retries = self.config.max_retries;

        for attempt in 0..=max_retries {
            let result = {
                let factory = self.factory.read();
                match factory.as_ref() {
                    Some(hook) => hook(),
                    None => {
                        self.driver
                            .connect(&endpoint, &self.config.username, &self.config.password)
                    }
                }
            };

            match result {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    self.stats.record_failed_creation();
                    tracing::error!(
                        "connection attempt {}/{} failed: {}",
                        attempt + 1,
                        max_retries + 1,
                        e
                    );
                }
            }

            if attempt >= max_retries {
                break;
            }

            let delay = retry_backoff(attempt, self.config.retry_delay);
            tracing::info!(
                "retrying connection in {:?} (attempt {}/{})",
                delay,
                attempt + 2,
                max_retries + 1
            );
            thread::sleep(delay);
        }

        Err(PoolError::CreationFailed(format!(
            "all connection attempts failed after {} tries",
            max_retries + 1
        )))
    }

    /// Create one connection and publish it to the pool. Capacity is
    /// reserved up front so concurrent callers can never push the tracked
    /// count past `max_pool_size`.
    pub(crate) fn add_connection(&self) -> Result<(), PoolError> {
        {
            let mut state = self.state.lock();
            if state.registry.len() + state.pending_creates >= self.config.max_pool_size {
                return Err(PoolError::CreationFailed(
                    "pool is at maximum capacity".to_string(),
                ));
            }
            state.pending_creates += 1;
        }
        self.create_reserved()
    }

    fn abandon_reservation(&self) {
        self.state.lock().pending_creates -= 1;
    }

    fn create_reserved(&self) -> Result<(), PoolError> {
        let mut raw = match self.create_raw() {
            Ok(raw) => raw,
            Err(e) => {
                self.abandon_reservation();
                return Err(e);
            }
        };

        if let Err(e) = self.driver.set_autocommit(&mut raw, true) {
            tracing::error!("failed to enable autocommit on new connection: {}", e);
            self.driver.close(raw);
            self.stats.record_failed_creation();
            self.abandon_reservation();
            return Err(e);
        }

        // A connection that cannot pass its own probe never enters the pool.
        if !self.validate_raw(&mut raw) {
            tracing::error!("new connection failed validation");
            self.driver.close(raw);
            self.stats.record_failed_creation();
            self.abandon_reservation();
            return Err(PoolError::ValidationFailed(
                "new connection failed validation".to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(ConnectionHandle::new(id, raw));

        {
            let mut state = self.state.lock();
            state.pending_creates -= 1;
            state.registry.insert(id, Arc::clone(&handle));
            state.available.push_back(id);
        }
        self.stats.record_connection_created();
        self.available_cv.notify_one();

        tracing::debug!("added new connection {}", id);
        Ok(())
    }

    /// Synchronous acquire. See the module documentation for the locking
    /// protocol.
    pub(crate) fn acquire_sync(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<PooledConnection<D>, PoolError> {
        self.stats.record_request();

        if !self.is_running() {
            self.stats.record_timeout();
            return Err(PoolError::Closed);
        }

        let deadline = Instant::now()
            .checked_add(timeout)
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(31_536_000));

        let mut state = self.state.lock();
        loop {
            if !self.is_running() {
                drop(state);
                self.stats.record_timeout();
                return Err(PoolError::Closed);
            }

            if let Some(id) = state.available.pop_front() {
                let handle = match state.registry.get(&id) {
                    Some(handle) => Arc::clone(handle),
                    None => continue,
                };
                drop(state);

                if self.validate_handle(&handle) {
                    handle.clear_suspect();
                    handle.update_last_used();
                    self.stats.record_lease();
                    self.stats.record_success();
                    tracing::debug!("acquired connection {}", id);
                    return Ok(PooledConnection::new(Arc::clone(self), handle));
                }

                // Invalid handles are closed and replaced transparently;
                // this is not a timeout.
                tracing::warn!("connection {} failed validation on acquire, closing", id);
                {
                    let mut st = self.state.lock();
                    st.registry.remove(&id);
                }
                self.close_handle(&handle);
                state = self.state.lock();
                continue;
            }

            if state.registry.len() + state.pending_creates < self.config.max_pool_size {
                drop(state);
                let created = self.add_connection();
                state = self.state.lock();
                if created.is_ok() {
                    continue;
                }
                if !state.available.is_empty() {
                    continue;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                drop(state);
                self.stats.record_timeout();
                tracing::warn!("connection request timed out after {:?}", timeout);
                return Err(PoolError::Timeout(timeout));
            }

            self.available_cv.wait_until(&mut state, deadline);
        }
    }

    /// Return a leased handle to the pool.
    pub(crate) fn release_handle(&self, handle: Arc<ConnectionHandle<D::Conn>>) {
        let id = handle.id();

        if !self.is_running() {
            // Late return after shutdown: close the raw connection, no
            // pool accounting.
            tracing::debug!("connection {} returned after shutdown, closing", id);
            self.close_handle_quietly(&handle);
            return;
        }

        self.stats.record_release();

        if self.validate_handle(&handle) {
            let mut state = self.state.lock();
            if self.is_running() && state.registry.contains_key(&id) {
                state.available.push_back(id);
                drop(state);
                self.available_cv.notify_one();
                tracing::debug!("returned connection {} to pool", id);
                return;
            }
            drop(state);
            // The pool shut down while we were validating.
            self.close_handle(&handle);
        } else {
            tracing::warn!("returned connection {} is invalid, closing", id);
            {
                let mut state = self.state.lock();
                state.registry.remove(&id);
            }
            self.close_handle(&handle);
        }
    }

    /// Evict idle connections past the idle timeout, as long as the pool
    /// stays at or above its minimum size.
    pub(crate) fn remove_excess_connections(&self) {
        let idle_timeout = self.config.idle_timeout.as_secs();
        let min = self.config.min_pool_size;
        let mut evicted = Vec::new();

        {
            let mut state = self.state.lock();
            let mut keep = VecDeque::with_capacity(state.available.len());
            while let Some(id) = state.available.pop_front() {
                let handle = match state.registry.get(&id) {
                    Some(handle) => Arc::clone(handle),
                    None => continue,
                };
                if handle.seconds_since_last_used() > idle_timeout && state.registry.len() > min {
                    state.registry.remove(&id);
                    evicted.push(handle);
                } else {
                    keep.push_back(id);
                }
            }
            state.available = keep;
        }

        for handle in evicted {
            tracing::debug!("removing excess idle connection {}", handle.id());
            self.close_handle(&handle);
        }
    }

    /// Evict idle connections that aged out. Lifetime wins over the
    /// minimum size; the idle-timeout clause keeps the pool at its
    /// minimum.
    pub(crate) fn cleanup_idle_connections(&self) {
        let idle_timeout = self.config.idle_timeout.as_secs();
        let max_lifetime = self.config.max_lifetime.as_secs();
        let min = self.config.min_pool_size;
        let mut evicted = Vec::new();

        {
            let mut state = self.state.lock();
            let mut keep = VecDeque::with_capacity(state.available.len());
            while let Some(id) = state.available.pop_front() {
                let handle = match state.registry.get(&id) {
                    Some(handle) => Arc::clone(handle),
                    None => continue,
                };

                let over_lifetime = handle.seconds_since_created() > max_lifetime;
                let over_idle = handle.seconds_since_last_used() > idle_timeout
                    && state.registry.len() > min;

                if over_lifetime || over_idle {
                    let reason = if over_lifetime {
                        "exceeded max lifetime"
                    } else {
                        "exceeded idle timeout"
                    };
                    tracing::debug!("closing connection {} ({})", id, reason);
                    state.registry.remove(&id);
                    evicted.push(handle);
                } else {
                    keep.push_back(id);
                }
            }
            state.available = keep;
        }

        for handle in evicted {
            self.close_handle(&handle);
        }
    }

    /// Validate every tracked connection, idle or leased. Leased handles
    /// are probed without acquiring them; a handle busy with its client is
    /// skipped. Returns the healthy count.
    pub(crate) fn perform_health_check(&self) -> usize {
        tracing::info!("performing health check on all connections");

        let handles: Vec<Arc<ConnectionHandle<D::Conn>>> =
            { self.state.lock().registry.values().cloned().collect() };
        let total = handles.len();
        let mut healthy = 0usize;

        for handle in handles {
            match handle.raw().try_lock() {
                Some(mut raw) => {
                    let valid = match raw.as_mut() {
                        Some(conn) => self.validate_raw(conn),
                        None => false,
                    };
                    drop(raw);
                    if valid {
                        handle.clear_suspect();
                        healthy += 1;
                    } else {
                        tracing::warn!("connection {} failed health check", handle.id());
                        handle.mark_suspect();
                        self.stats.record_health_check_failure();
                    }
                }
                // Busy with a client; the acquirer-side validation is
                // authoritative.
                None => healthy += 1,
            }
        }

        self.stats.record_health_check();
        tracing::info!("health check complete: {}/{} connections healthy", healthy, total);
        self.log_stats();
        healthy
    }

    /// Close every idle connection and forget all tracked handles. Leased
    /// handles stay with their clients and close when dropped.
    fn drain_and_clear(&self) {
        let drained = {
            let mut state = self.state.lock();
            let mut drained = Vec::new();
            while let Some(id) = state.available.pop_front() {
                if let Some(handle) = state.registry.remove(&id) {
                    drained.push(handle);
                }
            }
            state.registry.clear();
            drained
        };

        for handle in drained {
            self.close_handle(&handle);
        }
    }

    /// Fail every still-queued async request with `Closed`.
    fn fail_pending_requests(&self) {
        for request in self.requests.drain() {
            (request.callback)(Err(PoolError::Closed));
        }
    }

    pub(crate) fn log_stats(&self) {
        let snapshot = self.stats.snapshot();
        tracing::info!(
            "pool statistics: created={} active={} idle={} failed_creations={} \
             requests={} successful={} timed_out={} health_check_failures={} \
             utilization={:.0}% success_rate={:.0}%",
            snapshot.total_connections_created,
            snapshot.active_connections,
            snapshot.idle_connections,
            snapshot.failed_creations,
            snapshot.total_requests,
            snapshot.successful_requests,
            snapshot.timed_out_requests,
            snapshot.health_check_failures,
            snapshot.utilization() * 100.0,
            snapshot.success_rate() * 100.0,
        );
    }
}

/// Thread-safe database connection pool.
///
/// Clients call [`acquire`](ConnectionPool::acquire) with a deadline and
/// get back an exclusively-owned [`PooledConnection`]; dropping the lease
/// (or passing it to [`release`](ConnectionPool::release)) returns the
/// connection to the pool. Background workers validate connections and
/// evict stale or over-aged ones while the pool is running.
pub struct ConnectionPool<D: Driver> {
    inner: Arc<PoolInner<D>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<D: Driver> ConnectionPool<D> {
    /// Create a pool over the given driver. No connections are opened
    /// until [`initialize`](ConnectionPool::initialize).
    pub fn new(config: PoolConfig, driver: D) -> Self {
        tracing::info!(
            "connection pool created: endpoint={} initial={} min={} max={}",
            config.endpoint(),
            config.initial_pool_size,
            config.min_pool_size,
            config.max_pool_size
        );
        Self {
            inner: Arc::new(PoolInner::new(config, driver)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Create the initial connections and start the background workers.
    ///
    /// Any failure while building the initial set aborts initialization:
    /// already-created connections are closed, no workers are started,
    /// and the pool stays not-running.
    pub fn initialize(&self) -> Result<(), PoolError> {
        self.inner.config.validate()?;

        if self.inner.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("connection pool already initialized");
            return Ok(());
        }
        self.inner.shutdown.reset();

        tracing::info!("initializing connection pool");
        let initial = self.inner.config.initial_pool_size;
        for i in 0..initial {
            if let Err(e) = self.inner.add_connection() {
                tracing::error!(
                    "failed to create initial connection {}/{}: {}",
                    i + 1,
                    initial,
                    e
                );
                self.inner.running.store(false, Ordering::SeqCst);
                self.inner.drain_and_clear();
                return Err(e);
            }
        }
        tracing::info!("created {} initial connections", initial);

        let mut workers = self.workers.lock();
        if self.inner.config.enable_health_check {
            workers.push(workers::spawn_health_check_worker(Arc::clone(&self.inner)));
            tracing::info!("started health check worker thread");
        }
        workers.push(workers::spawn_monitor_worker(Arc::clone(&self.inner)));
        tracing::info!("started connection monitor worker thread");
        for _ in 0..self.inner.config.worker_thread_count {
            workers.push(workers::spawn_async_request_worker(Arc::clone(&self.inner)));
        }
        tracing::info!(
            "started {} async request worker threads",
            self.inner.config.worker_thread_count
        );

        self.inner.log_stats();
        tracing::info!("connection pool initialized");
        Ok(())
    }

    /// Stop the pool: wake and join every worker, close all idle
    /// connections, forget all tracked handles. Idempotent. Statistics
    /// remain readable. Outstanding leases are not revoked; they close
    /// when their owners drop them.
    pub fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        tracing::info!("shutting down connection pool");
        self.inner.shutdown.stop();
        self.inner.available_cv.notify_all();

        let workers = {
            let mut workers = self.workers.lock();
            std::mem::take(&mut *workers)
        };
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked during shutdown");
            }
        }

        self.inner.fail_pending_requests();
        self.inner.drain_and_clear();
        self.inner.log_stats();
        tracing::info!("connection pool shutdown complete");
    }

    /// Acquire a connection, waiting up to `timeout`.
    pub fn acquire(&self, timeout: Duration) -> Result<PooledConnection<D>, PoolError> {
        self.inner.acquire_sync(timeout)
    }

    /// Acquire with the configured default deadline.
    pub fn acquire_default(&self) -> Result<PooledConnection<D>, PoolError> {
        self.acquire(self.inner.config.connection_timeout)
    }

    /// Asynchronous acquire: the callback is invoked with the outcome on
    /// an async-request worker thread, never on the caller's own stack.
    /// The deadline starts now, queueing time included. With no async
    /// workers configured the request runs on a transient thread instead.
    pub fn acquire_async<F>(&self, callback: F, timeout: Duration)
    where
        F: FnOnce(Result<PooledConnection<D>, PoolError>) + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);

        if !inner.is_running() || inner.config.worker_thread_count == 0 {
            thread::spawn(move || {
                let outcome = inner.acquire_sync(timeout);
                callback(outcome);
            });
            return;
        }

        let request = AsyncRequest::new(Box::new(callback), timeout);
        match inner.requests.enqueue(request) {
            Ok(()) => {
                // Shutdown may have flipped `running` and run its one
                // queue drain between the check above and the enqueue.
                // Re-check and sweep so the request cannot sit in the
                // channel with every worker already joined.
                if !inner.is_running() {
                    thread::spawn(move || inner.fail_pending_requests());
                }
            }
            Err(request) => {
                tracing::warn!("async request queue full, rejecting acquire");
                let current = inner.requests.len();
                let max = inner.requests.capacity();
                thread::spawn(move || {
                    (request.callback)(Err(PoolError::QueueFull { current, max }));
                });
            }
        }
    }

    /// Return a connection to the pool explicitly. Equivalent to dropping
    /// the lease.
    pub fn release(&self, connection: PooledConnection<D>) {
        drop(connection);
    }

    /// Snapshot of the pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.inner.stats.snapshot()
    }

    /// Validate every tracked connection now. Returns the healthy count.
    pub fn perform_health_check(&self) -> usize {
        self.inner.perform_health_check()
    }

    /// Evict idle connections beyond the minimum pool size.
    pub fn remove_excess_connections(&self) {
        self.inner.remove_excess_connections()
    }

    /// True iff the pool is running, tracks at least one connection, and
    /// is servicing more than 80% of requests successfully.
    pub fn is_healthy(&self) -> bool {
        let snapshot = self.inner.stats.snapshot();
        self.inner.is_running()
            && snapshot.active_connections + snapshot.idle_connections > 0
            && snapshot.successful_requests as f64 / snapshot.total_requests.max(1) as f64 > 0.80
    }

    /// Replace the driver-based validation probe.
    pub fn set_custom_validator<F>(&self, validator: F)
    where
        F: Fn(&mut D::Conn) -> bool + Send + Sync + 'static,
    {
        *self.inner.validator.write() = Some(Box::new(validator));
    }

    /// Replace the driver-based connection factory.
    pub fn set_custom_factory<F>(&self, factory: F)
    where
        F: Fn() -> Result<D::Conn, PoolError> + Send + Sync + 'static,
    {
        *self.inner.factory.write() = Some(Box::new(factory));
    }

    /// Number of tracked connections, idle and leased.
    pub fn size(&self) -> usize {
        self.inner.state.lock().registry.len()
    }

    pub fn idle_count(&self) -> usize {
        self.inner.state.lock().available.len()
    }

    pub fn active_count(&self) -> usize {
        let state = self.inner.state.lock();
        state.registry.len() - state.available.len()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }
}

impl<D: Driver> Drop for ConnectionPool<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// An exclusively-owned lease on one pooled connection.
///
/// Dropping the lease returns the connection to the pool (or closes it,
/// if it no longer validates or the pool has shut down).
pub struct PooledConnection<D: Driver> {
    handle: Option<Arc<ConnectionHandle<D::Conn>>>,
    pool: Arc<PoolInner<D>>,
}

impl<D: Driver> PooledConnection<D> {
    pub(crate) fn new(pool: Arc<PoolInner<D>>, handle: Arc<ConnectionHandle<D::Conn>>) -> Self {
        Self {
            handle: Some(handle),
            pool,
        }
    }

    fn handle(&self) -> &ConnectionHandle<D::Conn> {
        self.handle.as_ref().unwrap()
    }

    pub fn id(&self) -> u64 {
        self.handle().id()
    }

    pub fn created_at(&self) -> Instant {
        self.handle().created_at()
    }

    pub fn last_used(&self) -> Instant {
        self.handle().last_used()
    }

    pub fn seconds_since_last_used(&self) -> u64 {
        self.handle().seconds_since_last_used()
    }

    pub fn seconds_since_created(&self) -> u64 {
        self.handle().seconds_since_created()
    }

    pub fn is_suspect(&self) -> bool {
        self.handle().is_suspect()
    }

    pub fn mark_suspect(&self) {
        self.handle().mark_suspect()
    }

    pub fn clear_suspect(&self) {
        self.handle().clear_suspect()
    }

    /// Execute a statement on this connection, refreshing its last-used
    /// time.
    pub fn execute(&self, query: &str) -> Result<(), PoolError> {
        let handle = self.handle();
        handle.update_last_used();
        let mut raw = handle.raw().lock();
        match raw.as_mut() {
            Some(conn) => self.pool.driver().execute(conn, query),
            None => Err(PoolError::Closed),
        }
    }

    /// Run the validation probe against this connection. Refreshes
    /// last-used on success.
    pub fn is_healthy(&self) -> bool {
        let handle = self.handle();
        if self.pool.validate_handle(handle) {
            handle.update_last_used();
            true
        } else {
            false
        }
    }
}

impl<D: Driver> Drop for PooledConnection<D> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.pool.release_handle(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::sync::atomic::AtomicUsize;

    struct StubDriver {
        serial: AtomicU64,
        closed: AtomicUsize,
    }

    impl StubDriver {
        fn new() -> Self {
            Self {
                serial: AtomicU64::new(1),
                closed: AtomicUsize::new(0),
            }
        }
    }

    impl Driver for StubDriver {
        type Conn = u64;

        fn connect(&self, _endpoint: &str, _username: &str, _password: &str) -> Result<u64> {
            Ok(self.serial.fetch_add(1, Ordering::SeqCst))
        }

        fn execute(&self, _conn: &mut u64, _query: &str) -> Result<()> {
            Ok(())
        }

        fn validate(&self, _conn: &mut u64, _probe: &str) -> bool {
            true
        }

        fn set_autocommit(&self, _conn: &mut u64, _enabled: bool) -> Result<()> {
            Ok(())
        }

        fn close(&self, _conn: u64) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn small_config() -> PoolConfig {
        PoolConfig {
            initial_pool_size: 1,
            min_pool_size: 1,
            max_pool_size: 2,
            enable_health_check: false,
            worker_thread_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_retry_backoff_schedule() {
        let constant = Duration::from_secs(7);
        assert_eq!(retry_backoff(0, constant), Duration::from_secs(1));
        assert_eq!(retry_backoff(1, constant), Duration::from_secs(2));
        assert_eq!(retry_backoff(2, constant), Duration::from_secs(4));
        assert_eq!(retry_backoff(3, constant), constant);
        assert_eq!(retry_backoff(9, constant), constant);
    }

    #[test]
    fn test_acquire_release_round_trip() {
        let pool = ConnectionPool::new(small_config(), StubDriver::new());
        pool.initialize().unwrap();

        let conn = pool.acquire_default().unwrap();
        assert_eq!(pool.active_count(), 1);
        conn.execute("SELECT 1").unwrap();
        pool.release(conn);

        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 1);
        pool.shutdown();
    }

    #[test]
    fn test_acquire_after_shutdown_is_closed() {
        let pool = ConnectionPool::new(small_config(), StubDriver::new());
        pool.initialize().unwrap();
        pool.shutdown();

        let before = pool.stats();
        match pool.acquire(Duration::from_millis(10)) {
            Err(PoolError::Closed) => {}
            other => panic!("expected Closed, got {:?}", other.map(|c| c.id())),
        }

        let after = pool.stats();
        assert_eq!(after.total_requests, before.total_requests + 1);
        assert_eq!(after.timed_out_requests, before.timed_out_requests + 1);
    }

    #[test]
    fn test_lifetime_eviction_ignores_minimum() {
        let config = PoolConfig {
            max_lifetime: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(600),
            ..small_config()
        };
        let pool = ConnectionPool::new(config, StubDriver::new());
        pool.initialize().unwrap();
        assert_eq!(pool.size(), 1);

        thread::sleep(Duration::from_millis(2100));
        pool.inner.cleanup_idle_connections();

        assert_eq!(pool.size(), 0);
        pool.shutdown();
    }

    #[test]
    fn test_invalid_config_rejected_at_initialize() {
        let config = PoolConfig {
            initial_pool_size: 0,
            min_pool_size: 1,
            max_pool_size: 1,
            ..Default::default()
        };
        let pool = ConnectionPool::new(config, StubDriver::new());

        assert!(matches!(
            pool.initialize(),
            Err(PoolError::InvalidConfig(_))
        ));
        assert!(!pool.is_healthy());
    }
}
