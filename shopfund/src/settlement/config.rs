//! Settlement engine configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::store::timeouts::DEFAULT_TRANSACTION_TIMEOUT;

/// How the engine treats settlements that would exceed a listing's target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingPolicy {
    /// Reject when raised + pending reservations + amount exceeds target
    #[default]
    RejectOverflow,
    /// Accept settlements regardless of target
    AllowOverfunding,
}

impl FundingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundingPolicy::RejectOverflow => "reject_overflow",
            FundingPolicy::AllowOverfunding => "allow_overfunding",
        }
    }
}

impl FromStr for FundingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject_overflow" | "reject" => Ok(FundingPolicy::RejectOverflow),
            "allow_overfunding" | "allow" => Ok(FundingPolicy::AllowOverfunding),
            other => Err(format!("unknown funding policy: {other}")),
        }
    }
}

/// Bounded retry with exponential backoff for conflicting units of work
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Fraction of the delay randomised in either direction
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// Settlement engine configuration
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub funding_policy: FundingPolicy,
    pub retry: RetryPolicy,
    /// Upper bound on a single attempt's unit of work
    pub unit_timeout: Duration,
    /// Longest accepted caller idempotency key
    pub max_idempotency_key_len: usize,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            funding_policy: FundingPolicy::default(),
            retry: RetryPolicy::default(),
            unit_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            max_idempotency_key_len: 128,
        }
    }
}

impl SettlementConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let funding_policy = funding_policy_or(
            std::env::var("FUNDING_POLICY").ok().as_deref(),
            defaults.funding_policy,
        );

        let retry = RetryPolicy {
            max_attempts: parse_env_or("SETTLEMENT_MAX_ATTEMPTS", defaults.retry.max_attempts)
                .max(1),
            initial_backoff: Duration::from_millis(parse_env_or(
                "SETTLEMENT_INITIAL_BACKOFF_MS",
                defaults.retry.initial_backoff.as_millis() as u64,
            )),
            max_backoff: Duration::from_millis(parse_env_or(
                "SETTLEMENT_MAX_BACKOFF_MS",
                defaults.retry.max_backoff.as_millis() as u64,
            )),
            ..defaults.retry
        };

        Self {
            funding_policy,
            retry,
            unit_timeout: Duration::from_millis(parse_env_or(
                "SETTLEMENT_UNIT_TIMEOUT_MS",
                defaults.unit_timeout.as_millis() as u64,
            )),
            max_idempotency_key_len: defaults.max_idempotency_key_len,
        }
    }
}

/// Unknown policy names are logged and replaced by `default`
fn funding_policy_or(value: Option<&str>, default: FundingPolicy) -> FundingPolicy {
    match value {
        Some(value) => value.parse().unwrap_or_else(|err| {
            log::warn!("{err}, using {}", default.as_str());
            default
        }),
        None => default,
    }
}

fn parse_env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
