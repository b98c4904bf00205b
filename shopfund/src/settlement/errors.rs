//! Settlement error types.

use std::time::Duration;
use thiserror::Error;

use crate::ledger::{InvestmentId, InvestorId, ListingId, ListingStatus};
use crate::money::Paise;

/// Coarse error categories exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InsufficientFunds,
    InvalidInput,
    FundingCapExceeded,
    ConflictAbort,
    StorageFailure,
}

/// Settlement errors
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Listing does not exist
    #[error("Listing not found: {0}")]
    ListingNotFound(ListingId),

    /// Listing exists but does not accept investments
    #[error("Listing {listing_id} is not open for investment (status {status})")]
    ListingNotOpen {
        listing_id: ListingId,
        status: ListingStatus,
    },

    /// Investor does not exist
    #[error("Investor not found: {0}")]
    InvestorNotFound(InvestorId),

    /// Investment does not exist
    #[error("Investment not found: {0}")]
    InvestmentNotFound(InvestmentId),

    /// Wallet balance below the settlement amount
    #[error("Insufficient wallet balance: available {available}, required {required}")]
    InsufficientFunds { available: Paise, required: Paise },

    /// Request rejected before touching storage
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Settlement would push the listing past its target
    #[error("Listing target exceeded: remaining {remaining}, required {required}")]
    FundingCapExceeded { remaining: Paise, required: Paise },

    /// Concurrent write conflict detected by the store
    #[error("Concurrent update conflict: {0}")]
    ConflictAbort(String),

    /// Unit of work did not finish in time
    #[error("Settlement timed out after {0:?}")]
    Timeout(Duration),

    /// Underlying store unavailable or failing
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::ListingNotFound(_)
            | SettlementError::ListingNotOpen { .. }
            | SettlementError::InvestorNotFound(_)
            | SettlementError::InvestmentNotFound(_) => ErrorKind::NotFound,
            SettlementError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            SettlementError::InvalidInput(_) => ErrorKind::InvalidInput,
            SettlementError::FundingCapExceeded { .. } => ErrorKind::FundingCapExceeded,
            SettlementError::ConflictAbort(_) | SettlementError::Timeout(_) => {
                ErrorKind::ConflictAbort
            }
            SettlementError::StorageFailure(_) => ErrorKind::StorageFailure,
        }
    }

    /// Whether the core retries this error on its own
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ConflictAbort
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Storage errors are sanitized so SQL details never reach callers.
    pub fn client_message(&self) -> String {
        match self {
            SettlementError::StorageFailure(_) => "Internal server error".to_string(),
            SettlementError::ConflictAbort(_) | SettlementError::Timeout(_) => {
                "Ledger busy, please retry".to_string()
            }
            SettlementError::InvestorNotFound(_) => "Investor not found".to_string(),
            _ => self.to_string(),
        }
    }
}

/// SQLSTATE codes PostgreSQL uses for retryable write conflicts
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";

impl From<sqlx::Error> for SettlementError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED | LOCK_NOT_AVAILABLE) => {
                    return SettlementError::ConflictAbort(db_err.message().to_string());
                }
                // two racing requests with the same idempotency key; the retry replays
                Some(UNIQUE_VIOLATION) => {
                    return SettlementError::ConflictAbort(db_err.message().to_string());
                }
                Some(CHECK_VIOLATION) => {
                    return SettlementError::InvalidInput(db_err.message().to_string());
                }
                _ => {}
            }
        }
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return SettlementError::ConflictAbort("connection pool exhausted".to_string());
        }
        SettlementError::StorageFailure(err.to_string())
    }
}

/// Result type for settlement operations
pub type SettlementResult<T> = Result<T, SettlementError>;
