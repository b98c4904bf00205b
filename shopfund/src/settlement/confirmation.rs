//! Confirmation of externally paid investments.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::config::{FundingPolicy, RetryPolicy, SettlementConfig};
use super::errors::{SettlementError, SettlementResult};
use super::events::PaymentReceived;
use super::{credit_listing, finish};
use crate::ledger::{Investment, InvestmentId, InvestmentStatus, LedgerTransaction};
use crate::store::timeouts::with_timeout;
use crate::store::{LedgerStore, LedgerTx};

/// Completes PENDING investments once their payment has cleared.
///
/// Confirmation credits the listing and appends the ledger row in one unit
/// of work. It never touches the investor wallet.
#[derive(Clone)]
pub struct ConfirmationHandler {
    store: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
    unit_timeout: Duration,
    funding_policy: FundingPolicy,
}

impl ConfirmationHandler {
    pub fn new(store: Arc<dyn LedgerStore>, config: &SettlementConfig) -> Self {
        Self {
            store,
            retry: config.retry.clone(),
            unit_timeout: config.unit_timeout,
            funding_policy: config.funding_policy,
        }
    }

    /// Apply a payment event after checking it matches the investment
    ///
    /// # Errors
    ///
    /// * `SettlementError::InvestmentNotFound` - Unknown investment
    /// * `SettlementError::InvalidInput` - Reference or amount mismatch
    pub async fn handle(&self, event: &PaymentReceived) -> SettlementResult<Investment> {
        let investment = self
            .store
            .investment(event.investment_id)
            .await?
            .ok_or(SettlementError::InvestmentNotFound(event.investment_id))?;

        if investment.payment_reference != event.payment_reference {
            return Err(SettlementError::InvalidInput(format!(
                "payment reference does not match investment {}",
                investment.id
            )));
        }
        if investment.amount_paid != event.amount {
            return Err(SettlementError::InvalidInput(format!(
                "payment amount {} does not match investment amount {}",
                event.amount, investment.amount_paid
            )));
        }

        self.confirm(event.investment_id).await
    }

    /// Move a PENDING investment to CONFIRMED and credit its listing
    ///
    /// Confirming an already CONFIRMED investment returns it unchanged.
    ///
    /// # Errors
    ///
    /// * `SettlementError::InvestmentNotFound` - Unknown investment
    /// * `SettlementError::ConflictAbort` - Retries exhausted on lock conflicts
    pub async fn confirm(&self, investment_id: InvestmentId) -> SettlementResult<Investment> {
        self.retry
            .run("confirm", || self.confirm_once(investment_id))
            .await
    }

    async fn confirm_once(&self, investment_id: InvestmentId) -> SettlementResult<Investment> {
        let policy = self.funding_policy;
        let (tx, result) = with_timeout(self.unit_timeout, async {
            let mut tx = self.store.begin().await?;
            let result = confirm_in(tx.as_mut(), investment_id, policy).await;
            Ok::<_, SettlementError>((tx, result))
        })
        .await?;
        finish(tx, result).await
    }
}

async fn confirm_in(
    tx: &mut dyn LedgerTx,
    investment_id: InvestmentId,
    policy: FundingPolicy,
) -> SettlementResult<Investment> {
    let mut investment = tx
        .lock_investment(investment_id)
        .await?
        .ok_or(SettlementError::InvestmentNotFound(investment_id))?;

    if investment.status == InvestmentStatus::Confirmed {
        log::debug!("Investment {investment_id} already confirmed");
        return Ok(investment);
    }

    let listing = tx
        .lock_listing(investment.listing_id)
        .await?
        .ok_or(SettlementError::ListingNotFound(investment.listing_id))?;

    tx.set_investment_status(investment_id, InvestmentStatus::Confirmed)
        .await?;
    investment.status = InvestmentStatus::Confirmed;
    investment.updated_at = Utc::now();

    let raised = credit_listing(tx, &listing, investment.amount_paid, policy).await?;
    tx.append_transaction(&LedgerTransaction::for_investment(
        &investment,
        listing.shop_id,
    ))
    .await?;

    log::info!(
        "Confirmed investment {} ({}): listing {} raised {}",
        investment.id,
        investment.payment_reference,
        listing.id,
        raised
    );

    Ok(investment)
}
