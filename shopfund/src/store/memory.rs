//! In-memory ledger store.
//!
//! Units of work are fully serialized: a unit holds the store lock from
//! `begin` until it commits, rolls back or is dropped, and writes go to a
//! staged copy that replaces the committed state only on commit.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use super::config::DEFAULT_LOCK_TIMEOUT;
use super::repository::{LedgerStore, LedgerTx};
use crate::ledger::{
    Investment, InvestmentId, InvestmentStatus, Investor, InvestorId, LedgerTransaction, Listing,
    ListingId, ListingStatus, Shop, ShopId,
};
use crate::money::Paise;
use crate::settlement::{SettlementError, SettlementResult};

#[derive(Debug, Clone, Default)]
struct LedgerState {
    investors: HashMap<InvestorId, Investor>,
    shops: HashMap<ShopId, Shop>,
    listings: HashMap<ListingId, Listing>,
    investments: HashMap<InvestmentId, Investment>,
    transactions: Vec<LedgerTransaction>,
}

/// In-memory ledger store for tests and local runs
#[derive(Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
    lock_timeout: Duration,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Store whose units give up waiting for the lock after `lock_timeout`
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
            lock_timeout,
        }
    }

    /// Number of committed transaction log rows
    pub async fn transaction_count(&self) -> SettlementResult<usize> {
        Ok(self.read().await?.transactions.len())
    }

    async fn read(&self) -> SettlementResult<MutexGuard<'_, LedgerState>> {
        tokio::time::timeout(self.lock_timeout, self.state.lock())
            .await
            .map_err(|_| SettlementError::Timeout(self.lock_timeout))
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> SettlementResult<Box<dyn LedgerTx>> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                SettlementError::ConflictAbort(format!(
                    "ledger lock not acquired within {:?}",
                    self.lock_timeout
                ))
            })?;
        let staged = guard.clone();

        Ok(Box::new(MemoryLedgerTx { guard, staged }))
    }

    async fn listing(&self, listing_id: ListingId) -> SettlementResult<Option<Listing>> {
        Ok(self.read().await?.listings.get(&listing_id).cloned())
    }

    async fn shop(&self, shop_id: ShopId) -> SettlementResult<Option<Shop>> {
        Ok(self.read().await?.shops.get(&shop_id).cloned())
    }

    async fn listings_by_status(&self, status: ListingStatus) -> SettlementResult<Vec<Listing>> {
        let state = self.read().await?;
        let mut listings: Vec<Listing> = state
            .listings
            .values()
            .filter(|listing| listing.status == status)
            .cloned()
            .collect();
        listings.sort_by_key(|listing| listing.created_at);
        Ok(listings)
    }

    async fn investor(&self, investor_id: InvestorId) -> SettlementResult<Option<Investor>> {
        Ok(self.read().await?.investors.get(&investor_id).cloned())
    }

    async fn investment(
        &self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Option<Investment>> {
        Ok(self.read().await?.investments.get(&investment_id).cloned())
    }

    async fn investments_for_listing(
        &self,
        listing_id: ListingId,
    ) -> SettlementResult<Vec<Investment>> {
        let state = self.read().await?;
        let mut investments: Vec<Investment> = state
            .investments
            .values()
            .filter(|investment| investment.listing_id == listing_id)
            .cloned()
            .collect();
        investments.sort_by_key(|investment| investment.created_at);
        Ok(investments)
    }

    async fn transactions_for_investment(
        &self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Vec<LedgerTransaction>> {
        let state = self.read().await?;
        Ok(state
            .transactions
            .iter()
            .filter(|entry| entry.metadata.investment_id == investment_id)
            .cloned()
            .collect())
    }

    async fn insert_investor(&self, investor: &Investor) -> SettlementResult<()> {
        if investor.wallet_balance.is_negative() {
            return Err(SettlementError::InvalidInput(
                "wallet balance cannot be negative".to_string(),
            ));
        }
        let mut state = self.read().await?;
        if state.investors.contains_key(&investor.id)
            || state.investors.values().any(|other| other.phone == investor.phone)
        {
            return Err(SettlementError::InvalidInput(format!(
                "investor {} already exists",
                investor.id
            )));
        }
        state.investors.insert(investor.id, investor.clone());
        Ok(())
    }

    async fn insert_shop(&self, shop: &Shop) -> SettlementResult<()> {
        let mut state = self.read().await?;
        if state.shops.contains_key(&shop.id)
            || state.shops.values().any(|other| other.phone == shop.phone)
        {
            return Err(SettlementError::InvalidInput(format!(
                "shop {} already exists",
                shop.id
            )));
        }
        state.shops.insert(shop.id, shop.clone());
        Ok(())
    }

    async fn insert_listing(&self, listing: &Listing) -> SettlementResult<()> {
        // same constraints the SQL schema enforces
        if !listing.ticket_price.is_positive() || !listing.target_amount.is_positive() {
            return Err(SettlementError::InvalidInput(
                "ticket price and target must be positive".to_string(),
            ));
        }
        if listing.raised_amount.is_negative() {
            return Err(SettlementError::InvalidInput(
                "raised amount cannot be negative".to_string(),
            ));
        }
        let mut state = self.read().await?;
        if !state.shops.contains_key(&listing.shop_id) {
            return Err(SettlementError::InvalidInput(format!(
                "unknown shop {}",
                listing.shop_id
            )));
        }
        if state.listings.contains_key(&listing.id) {
            return Err(SettlementError::InvalidInput(format!(
                "listing {} already exists",
                listing.id
            )));
        }
        state.listings.insert(listing.id, listing.clone());
        Ok(())
    }
}

struct MemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    staged: LedgerState,
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_listing(&mut self, listing_id: ListingId) -> SettlementResult<Option<Listing>> {
        Ok(self.staged.listings.get(&listing_id).cloned())
    }

    async fn lock_investor(
        &mut self,
        investor_id: InvestorId,
    ) -> SettlementResult<Option<Investor>> {
        Ok(self.staged.investors.get(&investor_id).cloned())
    }

    async fn lock_investment(
        &mut self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Option<Investment>> {
        Ok(self.staged.investments.get(&investment_id).cloned())
    }

    async fn find_by_idempotency_key(
        &mut self,
        investor_id: InvestorId,
        key: &str,
    ) -> SettlementResult<Option<Investment>> {
        Ok(self
            .staged
            .investments
            .values()
            .find(|investment| {
                investment.investor_id == investor_id
                    && investment.idempotency_key.as_deref() == Some(key)
            })
            .cloned())
    }

    async fn pending_total_for_listing(&mut self, listing_id: ListingId) -> SettlementResult<Paise> {
        self.staged
            .investments
            .values()
            .filter(|investment| {
                investment.listing_id == listing_id
                    && investment.status == InvestmentStatus::Pending
            })
            .try_fold(Paise::ZERO, |total, investment| {
                total.checked_add(investment.amount_paid)
            })
            .ok_or_else(|| SettlementError::StorageFailure("pending total overflow".to_string()))
    }

    async fn insert_investment(&mut self, investment: &Investment) -> SettlementResult<()> {
        let staged = &mut self.staged;
        if !staged.listings.contains_key(&investment.listing_id) {
            return Err(SettlementError::ListingNotFound(investment.listing_id));
        }
        if !staged.investors.contains_key(&investment.investor_id) {
            return Err(SettlementError::InvestorNotFound(investment.investor_id));
        }
        let duplicate = staged.investments.values().any(|other| {
            other.id == investment.id
                || other.payment_reference == investment.payment_reference
                || (other.investor_id == investment.investor_id
                    && investment.idempotency_key.is_some()
                    && other.idempotency_key == investment.idempotency_key)
        });
        if duplicate {
            return Err(SettlementError::ConflictAbort(format!(
                "investment {} conflicts with an existing row",
                investment.id
            )));
        }
        staged.investments.insert(investment.id, investment.clone());
        Ok(())
    }

    async fn set_investment_status(
        &mut self,
        investment_id: InvestmentId,
        status: InvestmentStatus,
    ) -> SettlementResult<()> {
        let investment = self
            .staged
            .investments
            .get_mut(&investment_id)
            .ok_or(SettlementError::InvestmentNotFound(investment_id))?;
        investment.status = status;
        investment.updated_at = Utc::now();
        Ok(())
    }

    async fn debit_wallet(
        &mut self,
        investor_id: InvestorId,
        amount: Paise,
    ) -> SettlementResult<Paise> {
        let investor = self
            .staged
            .investors
            .get_mut(&investor_id)
            .ok_or(SettlementError::InvestorNotFound(investor_id))?;

        let new_balance = investor
            .wallet_balance
            .checked_sub(amount)
            .filter(|balance| !balance.is_negative())
            .ok_or(SettlementError::InsufficientFunds {
                available: investor.wallet_balance,
                required: amount,
            })?;

        investor.wallet_balance = new_balance;
        investor.updated_at = Utc::now();
        Ok(new_balance)
    }

    async fn credit_listing(
        &mut self,
        listing_id: ListingId,
        amount: Paise,
    ) -> SettlementResult<Paise> {
        let listing = self
            .staged
            .listings
            .get_mut(&listing_id)
            .ok_or(SettlementError::ListingNotFound(listing_id))?;

        let raised = listing
            .raised_amount
            .checked_add(amount)
            .ok_or_else(|| SettlementError::InvalidInput("raised amount overflow".to_string()))?;

        listing.raised_amount = raised;
        listing.updated_at = Utc::now();
        Ok(raised)
    }

    async fn set_listing_status(
        &mut self,
        listing_id: ListingId,
        status: ListingStatus,
    ) -> SettlementResult<()> {
        let listing = self
            .staged
            .listings
            .get_mut(&listing_id)
            .ok_or(SettlementError::ListingNotFound(listing_id))?;
        listing.status = status;
        listing.updated_at = Utc::now();
        Ok(())
    }

    async fn append_transaction(&mut self, entry: &LedgerTransaction) -> SettlementResult<()> {
        if !self.staged.shops.contains_key(&entry.shop_id) {
            return Err(SettlementError::StorageFailure(format!(
                "transaction references unknown shop {}",
                entry.shop_id
            )));
        }
        self.staged.transactions.push(entry.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> SettlementResult<()> {
        let MemoryLedgerTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SettlementResult<()> {
        Ok(())
    }
}
