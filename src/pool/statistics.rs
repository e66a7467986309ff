// Pool statistics and monitoring.
//
// Counters are monotonic; `active`/`idle` are gauges maintained with atomic
// adds outside the pool mutex, so a snapshot may transiently disagree with
// the locked state. Snapshots are eventually consistent.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Live pool statistics, updated concurrently by clients and workers.
pub struct PoolStatistics {
    total_connections_created: AtomicU64,
    active_connections: AtomicUsize,
    idle_connections: AtomicUsize,
    failed_creations: AtomicU64,
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    timed_out_requests: AtomicU64,
    health_check_failures: AtomicU64,
    last_health_check: Mutex<Option<Instant>>,
}

fn gauge_decrement(gauge: &AtomicUsize) {
    let _ = gauge.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(v.saturating_sub(1)));
}

impl PoolStatistics {
    pub fn new() -> Self {
        Self {
            total_connections_created: AtomicU64::new(0),
            active_connections: AtomicUsize::new(0),
            idle_connections: AtomicUsize::new(0),
            failed_creations: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            successful_requests: AtomicU64::new(0),
            timed_out_requests: AtomicU64::new(0),
            health_check_failures: AtomicU64::new(0),
            last_health_check: Mutex::new(None),
        }
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_success(&self) {
        self.successful_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_timeout(&self) {
        self.timed_out_requests.fetch_add(1, Ordering::SeqCst);
    }

    /// A new connection was published to the pool.
    pub fn record_connection_created(&self) {
        self.total_connections_created.fetch_add(1, Ordering::SeqCst);
        self.idle_connections.fetch_add(1, Ordering::SeqCst);
    }

    /// A connection left the pool for good.
    pub fn record_connection_closed(&self) {
        gauge_decrement(&self.idle_connections);
    }

    /// An idle connection became leased.
    pub fn record_lease(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        gauge_decrement(&self.idle_connections);
    }

    /// A leased connection was returned.
    pub fn record_release(&self) {
        gauge_decrement(&self.active_connections);
        self.idle_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failed_creation(&self) {
        self.failed_creations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_health_check_failure(&self) {
        self.health_check_failures.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_health_check(&self) {
        *self.last_health_check.lock() = Some(Instant::now());
    }

    /// Atomically-consistent-enough snapshot of all counters and gauges.
    pub fn snapshot(&self) -> PoolStats {
        PoolStats {
            total_connections_created: self.total_connections_created.load(Ordering::SeqCst),
            active_connections: self.active_connections.load(Ordering::SeqCst),
            idle_connections: self.idle_connections.load(Ordering::SeqCst),
            failed_creations: self.failed_creations.load(Ordering::SeqCst),
            total_requests: self.total_requests.load(Ordering::SeqCst),
            successful_requests: self.successful_requests.load(Ordering::SeqCst),
            timed_out_requests: self.timed_out_requests.load(Ordering::SeqCst),
            health_check_failures: self.health_check_failures.load(Ordering::SeqCst),
            last_health_check: *self.last_health_check.lock(),
        }
    }
}

impl Default for PoolStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics snapshot, a plain value type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_connections_created: u64,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub failed_creations: u64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub timed_out_requests: u64,
    pub health_check_failures: u64,
    #[serde(skip)]
    pub last_health_check: Option<Instant>,
}

impl PoolStats {
    /// Fraction of tracked connections currently leased (0.0 to 1.0).
    pub fn utilization(&self) -> f64 {
        let total = self.active_connections + self.idle_connections;
        if total > 0 {
            self.active_connections as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that obtained a connection (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_requests > 0 {
            self.successful_requests as f64 / self.total_requests as f64
        } else {
            0.0
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn to_prometheus(&self) -> String {
        format!(
            "# TYPE pool_connections_created counter\npool_connections_created {}\n\
             # TYPE pool_active_connections gauge\npool_active_connections {}\n\
             # TYPE pool_idle_connections gauge\npool_idle_connections {}\n\
             # TYPE pool_failed_creations counter\npool_failed_creations {}\n\
             # TYPE pool_total_requests counter\npool_total_requests {}\n\
             # TYPE pool_successful_requests counter\npool_successful_requests {}\n\
             # TYPE pool_timed_out_requests counter\npool_timed_out_requests {}\n\
             # TYPE pool_health_check_failures counter\npool_health_check_failures {}\n",
            self.total_connections_created,
            self.active_connections,
            self.idle_connections,
            self.failed_creations,
            self.total_requests,
            self.successful_requests,
            self.timed_out_requests,
            self.health_check_failures,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_snapshot() {
        let stats = PoolStatistics::new();
        stats.record_connection_created();
        stats.record_request();
        stats.record_lease();
        stats.record_success();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_connections_created, 1);
        assert_eq!(snapshot.active_connections, 1);
        assert_eq!(snapshot.idle_connections, 0);
        assert_eq!(snapshot.successful_requests, 1);
    }

    #[test]
    fn test_utilization_and_success_rate() {
        let stats = PoolStatistics::new();
        for _ in 0..4 {
            stats.record_connection_created();
        }
        stats.record_lease();

        for _ in 0..10 {
            stats.record_request();
        }
        for _ in 0..9 {
            stats.record_success();
        }
        stats.record_timeout();

        let snapshot = stats.snapshot();
        assert!((snapshot.utilization() - 0.25).abs() < f64::EPSILON);
        assert!((snapshot.success_rate() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_snapshot_rates() {
        let snapshot = PoolStatistics::new().snapshot();
        assert_eq!(snapshot.utilization(), 0.0);
        assert_eq!(snapshot.success_rate(), 0.0);
        assert!(snapshot.last_health_check.is_none());
    }

    #[test]
    fn test_gauges_never_go_negative() {
        let stats = PoolStatistics::new();
        stats.record_connection_closed();
        stats.record_release();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.idle_connections, 1);
        assert_eq!(snapshot.active_connections, 0);
    }

    #[test]
    fn test_prometheus_export() {
        let stats = PoolStatistics::new();
        stats.record_connection_created();

        let text = stats.snapshot().to_prometheus();
        assert!(text.contains("pool_connections_created 1"));
        assert!(text.contains("# TYPE pool_idle_connections gauge"));
    }
}
