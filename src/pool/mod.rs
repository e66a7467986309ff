// # Connection Pool Module
//
// Thread-safe pooling of database connections with validation, retry,
// background maintenance, and statistics.
//
// ## Modules
//
// - `core`: pool engine (lease/return protocol, size management, lifecycle)
// - `handle`: connection handle with identity, timestamps, and the suspect flag
// - `queue`: bounded task queue for asynchronous acquire requests
// - `statistics`: monotonic counters and gauges, snapshotable atomically
// - `workers`: health-check, monitor, and async-request worker threads
//
// ## Example Usage
//
// ```rust,no_run
// use connpool::{ConnectionPool, PoolConfig};
// use std::time::Duration;
//
// fn main() -> Result<(), Box<dyn std::error::Error>> {
//     let config = PoolConfig::builder()
//         .host("db.internal")
//         .database("inventory")
//         .initial_pool_size(5)
//         .min_pool_size(2)
//         .max_pool_size(20)
//         .build()?;
//
//     // let pool = ConnectionPool::new(config, MyDriver::new());
//     // pool.initialize()?;
//     // let conn = pool.acquire(Duration::from_secs(5))?;
//     // conn.execute("INSERT INTO audit_log VALUES (1)")?;
//     // Connection returned to the pool on drop.
//
//     Ok(())
// }
// ```

pub mod core;
pub mod handle;
pub(crate) mod queue;
pub mod statistics;
pub(crate) mod workers;

pub use self::core::{ConnectionPool, FactoryFn, PooledConnection, ValidatorFn};
pub use self::handle::ConnectionHandle;
pub use self::statistics::{PoolStatistics, PoolStats};
