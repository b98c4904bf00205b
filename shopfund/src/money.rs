//! Fixed-point currency in minor units (paise).
//!
//! Every stored or computed amount in the ledger is a [`Paise`]. Arithmetic is
//! checked integer arithmetic only; there is no floating point anywhere on the
//! money path.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::settlement::{SettlementError, SettlementResult};

/// Amount of money in paise (1/100 of a rupee).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Paise(i64);

impl Paise {
    pub const ZERO: Paise = Paise(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Paise) -> Option<Paise> {
        self.0.checked_add(other.0).map(Paise)
    }

    pub fn checked_sub(self, other: Paise) -> Option<Paise> {
        self.0.checked_sub(other.0).map(Paise)
    }

    /// Price of `tickets` tickets at `self` per ticket.
    pub fn checked_mul_tickets(self, tickets: u32) -> Option<Paise> {
        self.0.checked_mul(i64::from(tickets)).map(Paise)
    }
}

impl From<i64> for Paise {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Paise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Share of `target` already raised, truncated to a whole percent.
///
/// Informational only; never fed back into the ledger.
///
/// # Errors
///
/// * `SettlementError::InvalidInput` - `target` is zero or negative
pub fn progress_percent(raised: Paise, target: Paise) -> SettlementResult<u32> {
    if !target.is_positive() {
        return Err(SettlementError::InvalidInput(format!(
            "listing target must be positive to compute progress, got {target}"
        )));
    }
    if raised.is_negative() {
        return Err(SettlementError::InvalidInput(format!(
            "raised amount cannot be negative, got {raised}"
        )));
    }

    // i128 keeps raised * 100 exact for any i64 input
    let percent = i128::from(raised.value()) * 100 / i128::from(target.value());
    Ok(u32::try_from(percent).unwrap_or(u32::MAX))
}
