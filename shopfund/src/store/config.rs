//! Database configuration module.
//!
//! Provides configuration structures for database connection management.

use std::env;
use std::time::Duration;

/// Default lock wait inside a unit of work
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,

    /// How long a unit of work waits for a row lock, in milliseconds
    pub lock_timeout_ms: u64,
}

impl DatabaseConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `DATABASE_URL`: PostgreSQL connection string (default: local development database)
    /// - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 20)
    /// - `DB_MIN_CONNECTIONS`: Minimum pool size (default: 5)
    /// - `DB_CONNECTION_TIMEOUT`: Connection timeout in seconds (default: 10)
    /// - `DB_IDLE_TIMEOUT`: Idle timeout in seconds (default: 600)
    /// - `DB_MAX_LIFETIME`: Max lifetime in seconds (default: 1800)
    /// - `DB_LOCK_TIMEOUT_MS`: Row lock wait in milliseconds (default: 2000)
    pub fn from_env() -> Self {
        let dev = Self::development();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(dev.database_url),
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", dev.max_connections),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", dev.min_connections),
            connection_timeout_secs: parse_env_or(
                "DB_CONNECTION_TIMEOUT",
                dev.connection_timeout_secs,
            ),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT", dev.idle_timeout_secs),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME", dev.max_lifetime_secs),
            lock_timeout_ms: parse_env_or("DB_LOCK_TIMEOUT_MS", dev.lock_timeout_ms),
        }
    }

    /// Create a default configuration for development
    ///
    /// Uses `postgres://postgres@localhost/shopfund` as the database URL
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/shopfund".to_string(),
            max_connections: 20,
            min_connections: 5,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT.as_millis() as u64,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
