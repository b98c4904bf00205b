//! Settlement engine.
//!
//! Every settlement attempt is one unit of work: listing and investor are
//! re-read under lock, validated, and the investment, balance deltas and
//! ledger row are written together or not at all. Conflicting attempts are
//! retried with backoff; every other failure is returned as-is.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use super::config::{FundingPolicy, SettlementConfig};
use super::confirmation::ConfirmationHandler;
use super::errors::{SettlementError, SettlementResult};
use super::events::{InstantGateway, PaymentDispatch, PaymentGateway};
use super::{credit_listing, finish};
use crate::ledger::{
    FundingMethod, Investment, InvestorId, LedgerTransaction, Listing, ListingId,
};
use crate::money::Paise;
use crate::store::timeouts::with_timeout;
use crate::store::{LedgerStore, LedgerTx};

/// A ticket purchase request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettleRequest {
    pub listing_id: ListingId,
    pub investor_id: InvestorId,
    pub num_tickets: u32,
    pub funding_method: FundingMethod,
    /// Caller-chosen key making retries of this request idempotent
    pub idempotency_key: Option<String>,
}

impl SettleRequest {
    pub fn new(
        listing_id: ListingId,
        investor_id: InvestorId,
        num_tickets: u32,
        use_wallet: bool,
    ) -> Self {
        Self {
            listing_id,
            investor_id,
            num_tickets,
            funding_method: FundingMethod::from_use_wallet(use_wallet),
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Reject malformed requests before any storage access
    pub fn validate(&self, max_key_len: usize) -> SettlementResult<()> {
        if self.num_tickets == 0 {
            return Err(SettlementError::InvalidInput(
                "number of tickets must be positive".to_string(),
            ));
        }
        if let Some(key) = &self.idempotency_key {
            if key.trim().is_empty() {
                return Err(SettlementError::InvalidInput(
                    "idempotency key cannot be blank".to_string(),
                ));
            }
            if key.len() > max_key_len {
                return Err(SettlementError::InvalidInput(format!(
                    "idempotency key longer than {max_key_len} bytes"
                )));
            }
        }
        Ok(())
    }

    fn matches(&self, investment: &Investment) -> bool {
        investment.listing_id == self.listing_id
            && investment.num_tickets == self.num_tickets
            && investment.funding_method == self.funding_method
    }
}

/// Investment produced by one attempt, and whether it was an idempotent replay
struct Attempt {
    investment: Investment,
    replayed: bool,
}

/// Settlement engine
#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    confirmations: ConfirmationHandler,
    config: SettlementConfig,
}

impl SettlementEngine {
    /// Engine whose external payments clear immediately
    pub fn new(store: Arc<dyn LedgerStore>, config: SettlementConfig) -> Self {
        Self::with_gateway(store, Arc::new(InstantGateway), config)
    }

    pub fn with_gateway(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: SettlementConfig,
    ) -> Self {
        let confirmations = ConfirmationHandler::new(store.clone(), &config);
        Self {
            store,
            gateway,
            confirmations,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn confirmations(&self) -> &ConfirmationHandler {
        &self.confirmations
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Settle a ticket purchase
    ///
    /// Wallet purchases are CONFIRMED on return. External purchases are
    /// CONFIRMED when the gateway reports the payment at once, PENDING
    /// otherwise.
    ///
    /// # Errors
    ///
    /// * `SettlementError::InvalidInput` - Bad ticket count, key, or amount overflow
    /// * `SettlementError::ListingNotFound` / `ListingNotOpen` - Listing not fundable
    /// * `SettlementError::InvestorNotFound` - Unknown investor
    /// * `SettlementError::InsufficientFunds` - Wallet balance below amount
    /// * `SettlementError::FundingCapExceeded` - Purchase would exceed the target
    /// * `SettlementError::ConflictAbort` / `Timeout` - Retries exhausted
    /// * `SettlementError::StorageFailure` - Store unavailable
    pub async fn settle(&self, request: SettleRequest) -> SettlementResult<Investment> {
        request.validate(self.config.max_idempotency_key_len)?;
        let started = Instant::now();

        let result = match request.funding_method {
            FundingMethod::Wallet => self.settle_wallet(&request).await,
            FundingMethod::External => self.settle_external(&request).await,
        };

        match &result {
            Ok(investment) => log::info!(
                "Investment {} {}: listing {}, investor {}, {} ticket(s), {} paise via {} in {:?}",
                investment.id,
                investment.status,
                investment.listing_id,
                investment.investor_id,
                investment.num_tickets,
                investment.amount_paid,
                investment.funding_method,
                started.elapsed()
            ),
            Err(e) => log::warn!(
                "Settlement rejected for investor {} on listing {}: {}",
                request.investor_id,
                request.listing_id,
                e
            ),
        }

        result
    }

    async fn settle_wallet(&self, request: &SettleRequest) -> SettlementResult<Investment> {
        let attempt = self
            .config
            .retry
            .run("settle", || self.attempt(request))
            .await?;
        Ok(attempt.investment)
    }

    async fn settle_external(&self, request: &SettleRequest) -> SettlementResult<Investment> {
        let attempt = self
            .config
            .retry
            .run("reserve", || self.attempt(request))
            .await?;

        let investment = attempt.investment;
        if attempt.replayed {
            return Ok(investment);
        }

        match self.gateway.request_payment(&investment).await? {
            PaymentDispatch::Settled(event) => self.confirmations.handle(&event).await,
            PaymentDispatch::Awaiting => {
                log::debug!(
                    "Investment {} awaiting payment via {} gateway",
                    investment.id,
                    self.gateway.name()
                );
                Ok(investment)
            }
        }
    }

    /// One unit of work. Timing out before commit drops the unit, which
    /// rolls it back, so the retry starts from untouched state.
    async fn attempt(&self, request: &SettleRequest) -> SettlementResult<Attempt> {
        let policy = self.config.funding_policy;
        let (tx, result) = with_timeout(self.config.unit_timeout, async {
            let mut tx = self.store.begin().await?;
            let result = settle_in(tx.as_mut(), request, policy).await;
            Ok::<_, SettlementError>((tx, result))
        })
        .await?;
        finish(tx, result).await
    }
}

async fn settle_in(
    tx: &mut dyn LedgerTx,
    request: &SettleRequest,
    policy: FundingPolicy,
) -> SettlementResult<Attempt> {
    if let Some(key) = &request.idempotency_key
        && let Some(existing) = tx.find_by_idempotency_key(request.investor_id, key).await?
    {
        if !request.matches(&existing) {
            return Err(SettlementError::InvalidInput(format!(
                "idempotency key {key} was already used for a different purchase"
            )));
        }
        log::debug!("Replaying investment {} for key {key}", existing.id);
        return Ok(Attempt {
            investment: existing,
            replayed: true,
        });
    }

    let listing = tx
        .lock_listing(request.listing_id)
        .await?
        .ok_or(SettlementError::ListingNotFound(request.listing_id))?;

    if !listing.is_open_at(Utc::now()) {
        return Err(SettlementError::ListingNotOpen {
            listing_id: listing.id,
            status: listing.status,
        });
    }

    let amount = listing
        .ticket_price
        .checked_mul_tickets(request.num_tickets)
        .ok_or_else(|| SettlementError::InvalidInput("investment amount overflow".to_string()))?;

    let investor = tx
        .lock_investor(request.investor_id)
        .await?
        .ok_or(SettlementError::InvestorNotFound(request.investor_id))?;

    ensure_capacity(tx, &listing, amount, policy).await?;

    let investment = Investment::open(
        listing.id,
        investor.id,
        request.num_tickets,
        amount,
        request.funding_method,
        request.idempotency_key.clone(),
    );

    if request.funding_method == FundingMethod::External {
        tx.insert_investment(&investment).await?;
        return Ok(Attempt {
            investment,
            replayed: false,
        });
    }

    if investor.wallet_balance < amount {
        return Err(SettlementError::InsufficientFunds {
            available: investor.wallet_balance,
            required: amount,
        });
    }

    tx.insert_investment(&investment).await?;
    tx.debit_wallet(investor.id, amount).await?;
    credit_listing(tx, &listing, amount, policy).await?;
    tx.append_transaction(&LedgerTransaction::for_investment(
        &investment,
        listing.shop_id,
    ))
    .await?;

    Ok(Attempt {
        investment,
        replayed: false,
    })
}

/// Reject purchases that would take the listing past its target.
///
/// PENDING investments count against the target so that confirmations can
/// never overshoot it either. Reservations do not expire, so an external
/// payment that never arrives holds its share of the target indefinitely.
async fn ensure_capacity(
    tx: &mut dyn LedgerTx,
    listing: &Listing,
    amount: Paise,
    policy: FundingPolicy,
) -> SettlementResult<()> {
    if policy == FundingPolicy::AllowOverfunding {
        return Ok(());
    }

    let pending = tx.pending_total_for_listing(listing.id).await?;
    let committed = listing
        .raised_amount
        .checked_add(pending)
        .ok_or_else(|| SettlementError::StorageFailure("listing total overflow".to_string()))?;
    let remaining = listing
        .target_amount
        .checked_sub(committed)
        .filter(|remaining| !remaining.is_negative())
        .unwrap_or(Paise::ZERO);

    if amount > remaining {
        return Err(SettlementError::FundingCapExceeded {
            remaining,
            required: amount,
        });
    }
    Ok(())
}
