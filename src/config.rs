//! Pool configuration and builder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::PoolError;

/// Configuration for the connection pool. Immutable after the pool is
/// constructed.
#[derive(Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Database host name or address
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database (schema) name
    pub database: String,

    /// User name passed to the driver
    pub username: String,

    /// Password passed to the driver. Never logged.
    pub password: String,

    /// Number of connections created during initialize
    pub initial_pool_size: usize,

    /// Minimum number of connections to maintain after startup
    pub min_pool_size: usize,

    /// Maximum number of connections allowed
    pub max_pool_size: usize,

    /// Default deadline for acquiring a connection
    pub connection_timeout: Duration,

    /// Idle connections older than this are eligible for eviction
    pub idle_timeout: Duration,

    /// Any connection older than this is evicted on inspection
    pub max_lifetime: Duration,

    /// Probe query used by the default validator
    pub validation_query: String,

    /// Enable the periodic health check worker
    pub enable_health_check: bool,

    /// Interval between health checks
    pub health_check_interval: Duration,

    /// Maximum connection creation retries
    pub max_retries: u32,

    /// Delay between retries once exponential backoff is exhausted
    pub retry_delay: Duration,

    /// Number of worker threads servicing asynchronous acquire requests
    pub worker_thread_count: usize,

    /// Capacity of the bounded asynchronous request queue
    pub async_queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            database: String::new(),
            username: String::new(),
            password: String::new(),
            initial_pool_size: 5,
            min_pool_size: 2,
            max_pool_size: 20,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
            validation_query: "SELECT 1".to_string(),
            enable_health_check: true,
            health_check_interval: Duration::from_secs(60),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            worker_thread_count: 2,
            async_queue_depth: 256,
        }
    }
}

impl PoolConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_pool_size == 0 {
            return Err(PoolError::InvalidConfig(
                "max_pool_size must be greater than zero".to_string(),
            ));
        }

        if self.min_pool_size > self.max_pool_size {
            return Err(PoolError::InvalidConfig(format!(
                "min_pool_size ({}) > max_pool_size ({})",
                self.min_pool_size, self.max_pool_size
            )));
        }

        if self.initial_pool_size < self.min_pool_size {
            return Err(PoolError::InvalidConfig(format!(
                "initial_pool_size ({}) < min_pool_size ({})",
                self.initial_pool_size, self.min_pool_size
            )));
        }

        if self.initial_pool_size > self.max_pool_size {
            return Err(PoolError::InvalidConfig(format!(
                "initial_pool_size ({}) > max_pool_size ({})",
                self.initial_pool_size, self.max_pool_size
            )));
        }

        if self.validation_query.is_empty() {
            return Err(PoolError::InvalidConfig(
                "validation_query must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Endpoint string handed to the driver: `tcp://<host>:<port>/<database>`.
    /// Credentials are passed separately and never appear here.
    pub fn endpoint(&self) -> String {
        format!("tcp://{}:{}/{}", self.host, self.port, self.database)
    }

    /// Create a builder for pool configuration.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("initial_pool_size", &self.initial_pool_size)
            .field("min_pool_size", &self.min_pool_size)
            .field("max_pool_size", &self.max_pool_size)
            .field("connection_timeout", &self.connection_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_lifetime", &self.max_lifetime)
            .field("validation_query", &self.validation_query)
            .field("enable_health_check", &self.enable_health_check)
            .field("health_check_interval", &self.health_check_interval)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("worker_thread_count", &self.worker_thread_count)
            .field("async_queue_depth", &self.async_queue_depth)
            .finish()
    }
}

/// Builder for pool configuration.
#[derive(Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.config.database = database.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn initial_pool_size(mut self, size: usize) -> Self {
        self.config.initial_pool_size = size;
        self
    }

    pub fn min_pool_size(mut self, size: usize) -> Self {
        self.config.min_pool_size = size;
        self
    }

    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.config.max_pool_size = size;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_lifetime = lifetime;
        self
    }

    pub fn validation_query(mut self, query: impl Into<String>) -> Self {
        self.config.validation_query = query.into();
        self
    }

    pub fn enable_health_check(mut self, enable: bool) -> Self {
        self.config.enable_health_check = enable;
        self
    }

    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.config.health_check_interval = interval;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn worker_thread_count(mut self, count: usize) -> Self {
        self.config.worker_thread_count = count;
        self
    }

    pub fn async_queue_depth(mut self, depth: usize) -> Self {
        self.config.async_queue_depth = depth;
        self
    }

    pub fn build(self) -> Result<PoolConfig, PoolError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation_min_over_max() {
        let config = PoolConfig {
            min_pool_size: 10,
            max_pool_size: 5,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_initial_below_min() {
        let config = PoolConfig {
            initial_pool_size: 1,
            min_pool_size: 2,
            max_pool_size: 5,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = PoolConfig::builder()
            .host("db.internal")
            .port(3307)
            .database("inventory")
            .initial_pool_size(4)
            .min_pool_size(2)
            .max_pool_size(8)
            .connection_timeout(Duration::from_secs(10))
            .build();

        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.max_pool_size, 8);
        assert_eq!(config.connection_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_endpoint_format() {
        let config = PoolConfig {
            host: "10.0.0.7".to_string(),
            port: 3306,
            database: "metrics".to_string(),
            ..Default::default()
        };

        assert_eq!(config.endpoint(), "tcp://10.0.0.7:3306/metrics");
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = PoolConfig {
            password: "hunter2".to_string(),
            ..Default::default()
        };

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
