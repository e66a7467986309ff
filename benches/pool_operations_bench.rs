// Connection Pool Performance Benchmarks
// Tests the critical lease path (acquire/release), contended acquires,
// and statistics snapshots

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use connpool::{ConnectionPool, Driver, PoolConfig, Result};

struct BenchDriver {
    serial: AtomicU64,
}

impl BenchDriver {
    fn new() -> Self {
        Self {
            serial: AtomicU64::new(1),
        }
    }
}

impl Driver for BenchDriver {
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

    fn close(&self, _conn: u64) {}
}

fn bench_pool(max_size: usize) -> ConnectionPool<BenchDriver> {
    let config = PoolConfig {
        initial_pool_size: max_size,
        min_pool_size: 1,
        max_pool_size: max_size,
        enable_health_check: false,
        worker_thread_count: 0,
        ..Default::default()
    };

    let pool = ConnectionPool::new(config, BenchDriver::new());
    pool.initialize().expect("pool initialization failed");
    pool
}

fn bench_acquire_release(c: &mut Criterion) {
    let pool = bench_pool(8);

    c.bench_function("acquire_release", |b| {
        b.iter(|| {
            let conn = pool.acquire(Duration::from_secs(1)).unwrap();
            black_box(conn.id());
        });
    });

    pool.shutdown();
}

fn bench_contended_acquire(c: &mut Criterion) {
    let pool = Arc::new(bench_pool(4));

    c.bench_function("contended_acquire_8_threads", |b| {
        b.iter(|| {
            let mut clients = Vec::new();
            for _ in 0..8 {
                let pool = Arc::clone(&pool);
                clients.push(std::thread::spawn(move || {
                    let conn = pool.acquire(Duration::from_secs(5)).unwrap();
                    black_box(conn.id());
                }));
            }
            for client in clients {
                client.join().unwrap();
            }
        });
    });

    pool.shutdown();
}

fn bench_stats_snapshot(c: &mut Criterion) {
    let pool = bench_pool(4);

    c.bench_function("stats_snapshot", |b| {
        b.iter(|| {
            let stats = pool.stats();
            black_box(stats.utilization());
        });
    });

    pool.shutdown();
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_contended_acquire,
    bench_stats_snapshot
);
criterion_main!(benches);
