//! Structured logging configuration.
//!
//! The settlement library logs through the `log` facade; the subscriber
//! installed here forwards those records alongside the server's own
//! `tracing` events.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var and default to
/// `info,sqlx=warn,hyper=warn`.
///
/// # Example
///
/// ```no_run
/// use sf_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a rejected caller with structured data
///
/// # Arguments
///
/// * `event_type` - Type of security event
/// * `investor_id` - Caller, when known
/// * `message` - Event message
pub fn log_security_event(event_type: &str, investor_id: Option<&str>, message: &str) {
    tracing::warn!(
        event_type = event_type,
        investor_id = investor_id,
        "SECURITY: {}",
        message
    );
}

/// Log a completed settlement request
///
/// Slow settlements (over one second) are logged at warn level.
pub fn log_settlement(
    investor_id: &str,
    listing_id: &str,
    funding_method: &str,
    outcome: &str,
    duration_ms: u64,
) {
    if duration_ms > 1000 {
        tracing::warn!(
            investor_id = investor_id,
            listing_id = listing_id,
            funding_method = funding_method,
            outcome = outcome,
            duration_ms = duration_ms,
            "PERFORMANCE: Slow settlement"
        );
    } else {
        tracing::info!(
            investor_id = investor_id,
            listing_id = listing_id,
            funding_method = funding_method,
            outcome = outcome,
            duration_ms = duration_ms,
            "Settlement request completed"
        );
    }
}
