//! Timeout helpers for units of work.
//!
//! Work inside a unit that does not finish in time is dropped together with
//! the unit, which rolls it back, and reported as a retryable
//! [`SettlementError::Timeout`]. Commits are never placed under a timeout.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::settlement::{SettlementError, SettlementResult};

/// Default timeout for read-only queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a settlement unit of work (10 seconds)
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute a unit of work with timeout
///
/// # Arguments
///
/// * `duration` - Timeout duration
/// * `future` - Async operation to execute
///
/// # Returns
///
/// * `SettlementResult<T>` - Result of the operation or `SettlementError::Timeout`
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> SettlementResult<T>
where
    F: Future<Output = SettlementResult<T>>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(SettlementError::Timeout(duration)),
    }
}

/// Execute a read-only query with the default timeout (5 seconds)
pub async fn with_default_timeout<F, T>(future: F) -> SettlementResult<T>
where
    F: Future<Output = SettlementResult<T>>,
{
    with_timeout(DEFAULT_QUERY_TIMEOUT, future).await
}
