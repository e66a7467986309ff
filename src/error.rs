use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the connection pool.
#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Pool is closed")]
    Closed,

    #[error("Connection request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection creation failed: {0}")]
    CreationFailed(String),

    #[error("Connection validation failed: {0}")]
    ValidationFailed(String),

    #[error("Async request queue full: {current} >= {max}")]
    QueueFull { current: usize, max: usize },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
