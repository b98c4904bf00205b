//! Investment settlement: the engine that turns a ticket purchase into
//! ledger effects, the confirmation handler for externally paid investments,
//! and the payment events joining the two.

pub mod config;
pub mod confirmation;
pub mod engine;
pub mod errors;
pub mod events;
pub mod retry;

pub use config::{FundingPolicy, RetryPolicy, SettlementConfig};
pub use confirmation::ConfirmationHandler;
pub use engine::{SettleRequest, SettlementEngine};
pub use errors::{ErrorKind, SettlementError, SettlementResult};
pub use events::{
    CallbackGateway, ConfirmationWorker, DeferredGateway, InstantGateway, PaymentDispatch,
    PaymentGateway, PaymentReceived,
};

use crate::ledger::{Listing, ListingStatus};
use crate::money::Paise;
use crate::store::LedgerTx;

/// Commit the unit on success, roll it back on failure.
///
/// Callers bound only the work that precedes this call. Commit runs to
/// completion so a unit whose commit landed is never reported as timed out
/// and retried.
async fn finish<T>(tx: Box<dyn LedgerTx>, result: SettlementResult<T>) -> SettlementResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                log::warn!("Rollback failed after {err}: {rollback_err}");
            }
            Err(err)
        }
    }
}

/// Credit a locked listing.
///
/// Under [`FundingPolicy::RejectOverflow`] a listing reaching its target
/// moves to FUNDED and stops accepting purchases. Overfunded listings stay
/// LIVE.
async fn credit_listing(
    tx: &mut dyn LedgerTx,
    listing: &Listing,
    amount: Paise,
    policy: FundingPolicy,
) -> SettlementResult<Paise> {
    let raised = tx.credit_listing(listing.id, amount).await?;

    if policy == FundingPolicy::RejectOverflow
        && listing.status == ListingStatus::Live
        && raised >= listing.target_amount
    {
        tx.set_listing_status(listing.id, ListingStatus::Funded)
            .await?;
        log::info!(
            "Listing {} reached its target of {} (raised {})",
            listing.id,
            listing.target_amount,
            raised
        );
    }

    Ok(raised)
}
