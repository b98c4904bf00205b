//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use shopfund::settlement::SettlementConfig;
use shopfund::store::DatabaseConfig;
use std::net::SocketAddr;
use std::str::FromStr;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Prometheus scrape listener, disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Ledger backend
    pub storage: StorageMode,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Settlement engine configuration
    pub settlement: SettlementConfig,
    /// How external payments are confirmed
    pub gateway: GatewayMode,
    /// Insert the demo investor, shop and listing on startup
    pub seed_demo: bool,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Shared secret verifying caller identity tokens (required)
    pub jwt_secret: String,
    /// Shared secret verifying payment webhook signatures (required)
    pub webhook_secret: String,
}

/// Ledger backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Postgres,
    InMemory,
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageMode::Postgres),
            "memory" | "in-memory" | "in_memory" => Ok(StorageMode::InMemory),
            other => Err(format!("unknown ledger store: {other}")),
        }
    }
}

/// External payment confirmation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    /// Payments clear as soon as they are requested
    #[default]
    Instant,
    /// Payments clear on a background confirmation worker
    Deferred,
    /// Payments clear when the webhook reports them
    Callback,
}

impl FromStr for GatewayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "instant" => Ok(GatewayMode::Instant),
            "deferred" => Ok(GatewayMode::Deferred),
            "callback" | "webhook" => Ok(GatewayMode::Callback),
            other => Err(format!("unknown payment gateway mode: {other}")),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `in_memory` - Force the in-memory ledger (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        in_memory: bool,
    ) -> Result<Self, ConfigError> {
        // Bind address
        let bind = match bind_override {
            Some(addr) => addr,
            None => parse_env_checked("SERVER_BIND")?
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080))),
        };
        let metrics_bind = parse_env_checked("METRICS_BIND")?;

        // Ledger backend
        let storage = if in_memory {
            StorageMode::InMemory
        } else {
            parse_env_checked("LEDGER_STORE")?.unwrap_or(StorageMode::Postgres)
        };

        // Database configuration
        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        // Security configuration (REQUIRED)
        let jwt_secret = std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })?;

        let webhook_secret =
            std::env::var("WEBHOOK_SECRET").map_err(|_| ConfigError::MissingRequired {
                var: "WEBHOOK_SECRET".to_string(),
                hint: "Generate with: openssl rand -hex 16".to_string(),
            })?;

        let gateway = parse_env_checked("PAYMENT_GATEWAY")?.unwrap_or_default();
        let seed_demo = parse_env_or("SEED_DEMO", storage == StorageMode::InMemory);

        Ok(ServerConfig {
            bind,
            metrics_bind,
            storage,
            database,
            security: SecurityConfig {
                jwt_secret,
                webhook_secret,
            },
            settlement: SettlementConfig::from_env(),
            gateway,
            seed_demo,
        })
    }

    /// Validate configuration after loading
    ///
    /// # Returns
    ///
    /// * `Result<(), ConfigError>` - Success or validation error
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.security.webhook_secret.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "WEBHOOK_SECRET".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        if self.settlement.unit_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "SETTLEMENT_UNIT_TIMEOUT_MS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.settlement.retry.max_backoff < self.settlement.retry.initial_backoff {
            return Err(ConfigError::Invalid {
                var: "SETTLEMENT_MAX_BACKOFF_MS".to_string(),
                reason: format!(
                    "Must be at least the initial backoff ({:?})",
                    self.settlement.retry.initial_backoff
                ),
            });
        }

        if self.storage == StorageMode::Postgres
            && self.database.min_connections > self.database.max_connections
        {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse an optional variable, rejecting values that are set but malformed
fn parse_env_checked<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            var: key.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}
