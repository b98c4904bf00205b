//! Prometheus metrics for monitoring settlement health and performance.
//!
//! Metrics are exposed in Prometheus text format on a dedicated scrape
//! listener when `METRICS_BIND` is set.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Request counts, duration, status codes
//! - **Settlement Metrics**: Outcomes by funding method, latency, amounts
//! - **Confirmation Metrics**: Webhook and handler outcomes
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use sf_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/api/v1/listings/{listing_id}/invest", 201);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use shopfund::ledger::FundingMethod;
use shopfund::{Paise, SettlementError};
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Sets up a Prometheus scrape endpoint on the specified address.
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record HTTP request duration in milliseconds.
pub fn http_request_duration_ms(method: &str, path: &str, duration_ms: f64) {
    metrics::histogram!("http_request_duration_ms",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_ms);
}

// ============================================================================
// Settlement Metrics
// ============================================================================

/// Outcome label for a settlement result
pub fn outcome_label(result: Result<(), &SettlementError>) -> &'static str {
    use shopfund::ErrorKind;

    match result {
        Ok(()) => "settled",
        Err(e) => match e.kind() {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::FundingCapExceeded => "funding_cap_exceeded",
            ErrorKind::ConflictAbort => "conflict",
            ErrorKind::StorageFailure => "storage_failure",
        },
    }
}

/// Increment settlements counter.
pub fn settlements_total(method: FundingMethod, outcome: &'static str) {
    metrics::counter!("settlements_total",
        "funding_method" => method.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record settlement latency in milliseconds.
pub fn settlement_duration_ms(method: FundingMethod, duration_ms: f64) {
    metrics::histogram!("settlement_duration_ms",
        "funding_method" => method.as_str()
    )
    .record(duration_ms);
}

/// Record settled amount distribution.
pub fn settled_amount_paise(amount: Paise) {
    metrics::histogram!("settled_amount_paise").record(amount.value() as f64);
}

// ============================================================================
// Confirmation Metrics
// ============================================================================

/// Increment confirmations counter.
pub fn confirmations_total(outcome: &'static str) {
    metrics::counter!("confirmations_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Increment rejected webhook counter.
pub fn webhook_rejections_total(reason: &'static str) {
    metrics::counter!("webhook_rejections_total",
        "reason" => reason
    )
    .increment(1);
}
