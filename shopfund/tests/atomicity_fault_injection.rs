//! Fault injection: a unit of work that fails part-way must leave no trace.

use async_trait::async_trait;
use shopfund::ledger::seed::seed_demo;
use shopfund::ledger::{
    Investment, InvestmentId, InvestmentStatus, Investor, InvestorId, LedgerTransaction, Listing,
    ListingId, ListingStatus, Shop, ShopId,
};
use shopfund::settlement::{
    CallbackGateway, ErrorKind, RetryPolicy, SettleRequest, SettlementConfig, SettlementEngine,
    SettlementError, SettlementResult,
};
use shopfund::store::{InMemoryLedgerStore, LedgerStore, LedgerTx};
use shopfund::Paise;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Which step of the unit of work fails
#[derive(Clone, Copy)]
enum Fault {
    AppendTransaction,
    CreditListing,
    /// Conflict on the first two commits, then succeed
    CommitConflict,
    /// First debit stalls past the unit timeout
    SlowDebit,
    /// Commit lands, then its acknowledgement is delayed
    SlowCommit,
}

/// Delay used by the slow faults, well past `SHORT_UNIT`
const STALL: Duration = Duration::from_millis(200);
const SHORT_UNIT: Duration = Duration::from_millis(50);

/// Store delegating to the in-memory store while injecting one fault
struct FaultyStore {
    inner: InMemoryLedgerStore,
    fault: Fault,
    armed: Arc<AtomicBool>,
    conflicts: Arc<AtomicU32>,
}

impl FaultyStore {
    fn new(inner: InMemoryLedgerStore, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            armed: Arc::new(AtomicBool::new(true)),
            conflicts: Arc::new(AtomicU32::new(0)),
        }
    }
}

struct FaultyTx {
    inner: Box<dyn LedgerTx>,
    fault: Fault,
    armed: Arc<AtomicBool>,
    conflicts: Arc<AtomicU32>,
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn begin(&self) -> SettlementResult<Box<dyn LedgerTx>> {
        Ok(Box::new(FaultyTx {
            inner: self.inner.begin().await?,
            fault: self.fault,
            armed: self.armed.clone(),
            conflicts: self.conflicts.clone(),
        }))
    }

    async fn listing(&self, listing_id: ListingId) -> SettlementResult<Option<Listing>> {
        self.inner.listing(listing_id).await
    }

    async fn shop(&self, shop_id: ShopId) -> SettlementResult<Option<Shop>> {
        self.inner.shop(shop_id).await
    }

    async fn listings_by_status(&self, status: ListingStatus) -> SettlementResult<Vec<Listing>> {
        self.inner.listings_by_status(status).await
    }

    async fn investor(&self, investor_id: InvestorId) -> SettlementResult<Option<Investor>> {
        self.inner.investor(investor_id).await
    }

    async fn investment(
        &self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Option<Investment>> {
        self.inner.investment(investment_id).await
    }

    async fn investments_for_listing(
        &self,
        listing_id: ListingId,
    ) -> SettlementResult<Vec<Investment>> {
        self.inner.investments_for_listing(listing_id).await
    }

    async fn transactions_for_investment(
        &self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Vec<LedgerTransaction>> {
        self.inner.transactions_for_investment(investment_id).await
    }

    async fn insert_investor(&self, investor: &Investor) -> SettlementResult<()> {
        self.inner.insert_investor(investor).await
    }

    async fn insert_shop(&self, shop: &Shop) -> SettlementResult<()> {
        self.inner.insert_shop(shop).await
    }

    async fn insert_listing(&self, listing: &Listing) -> SettlementResult<()> {
        self.inner.insert_listing(listing).await
    }
}

#[async_trait]
impl LedgerTx for FaultyTx {
    async fn lock_listing(&mut self, listing_id: ListingId) -> SettlementResult<Option<Listing>> {
        self.inner.lock_listing(listing_id).await
    }

    async fn lock_investor(
        &mut self,
        investor_id: InvestorId,
    ) -> SettlementResult<Option<Investor>> {
        self.inner.lock_investor(investor_id).await
    }

    async fn lock_investment(
        &mut self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Option<Investment>> {
        self.inner.lock_investment(investment_id).await
    }

    async fn find_by_idempotency_key(
        &mut self,
        investor_id: InvestorId,
        key: &str,
    ) -> SettlementResult<Option<Investment>> {
        self.inner.find_by_idempotency_key(investor_id, key).await
    }

    async fn pending_total_for_listing(&mut self, listing_id: ListingId) -> SettlementResult<Paise> {
        self.inner.pending_total_for_listing(listing_id).await
    }

    async fn insert_investment(&mut self, investment: &Investment) -> SettlementResult<()> {
        self.inner.insert_investment(investment).await
    }

    async fn set_investment_status(
        &mut self,
        investment_id: InvestmentId,
        status: InvestmentStatus,
    ) -> SettlementResult<()> {
        self.inner.set_investment_status(investment_id, status).await
    }

    async fn debit_wallet(
        &mut self,
        investor_id: InvestorId,
        amount: Paise,
    ) -> SettlementResult<Paise> {
        if matches!(self.fault, Fault::SlowDebit) && self.armed.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(STALL).await;
        }
        self.inner.debit_wallet(investor_id, amount).await
    }

    async fn credit_listing(
        &mut self,
        listing_id: ListingId,
        amount: Paise,
    ) -> SettlementResult<Paise> {
        if matches!(self.fault, Fault::CreditListing) && self.armed.load(Ordering::SeqCst) {
            return Err(SettlementError::StorageFailure("injected credit failure".into()));
        }
        self.inner.credit_listing(listing_id, amount).await
    }

    async fn set_listing_status(
        &mut self,
        listing_id: ListingId,
        status: ListingStatus,
    ) -> SettlementResult<()> {
        self.inner.set_listing_status(listing_id, status).await
    }

    async fn append_transaction(&mut self, entry: &LedgerTransaction) -> SettlementResult<()> {
        if matches!(self.fault, Fault::AppendTransaction) && self.armed.load(Ordering::SeqCst) {
            return Err(SettlementError::StorageFailure("injected append failure".into()));
        }
        self.inner.append_transaction(entry).await
    }

    async fn commit(self: Box<Self>) -> SettlementResult<()> {
        if matches!(self.fault, Fault::CommitConflict) && self.armed.load(Ordering::SeqCst) {
            if self.conflicts.fetch_add(1, Ordering::SeqCst) + 1 >= 2 {
                self.armed.store(false, Ordering::SeqCst);
            }
            return Err(SettlementError::ConflictAbort("injected serialization failure".into()));
        }
        let slow = matches!(self.fault, Fault::SlowCommit);
        self.inner.commit().await?;
        if slow {
            tokio::time::sleep(STALL).await;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> SettlementResult<()> {
        self.inner.rollback().await
    }
}

fn fast_retry() -> SettlementConfig {
    SettlementConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..RetryPolicy::default()
        },
        ..SettlementConfig::default()
    }
}

#[tokio::test]
async fn test_failed_log_append_rolls_back_debit_and_credit() {
    let inner = InMemoryLedgerStore::new();
    let demo = seed_demo(&inner).await.unwrap();
    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::AppendTransaction));
    let engine = SettlementEngine::new(store, fast_retry());

    let err = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);

    let investor = inner.investor(demo.investor.id).await.unwrap().unwrap();
    let listing = inner.listing(demo.listing.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::new(500_000));
    assert_eq!(listing.raised_amount, Paise::new(3_200_000));
    assert_eq!(inner.transaction_count().await.unwrap(), 0);
    assert!(
        inner
            .investments_for_listing(demo.listing.id)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_failed_confirmation_keeps_investment_pending() {
    let inner = InMemoryLedgerStore::new();
    let demo = seed_demo(&inner).await.unwrap();
    let faulty = FaultyStore::new(inner.clone(), Fault::CreditListing);
    faulty.armed.store(false, Ordering::SeqCst);
    let armed = faulty.armed.clone();
    let engine = SettlementEngine::with_gateway(Arc::new(faulty), Arc::new(CallbackGateway), fast_retry());

    let pending = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, false))
        .await
        .unwrap();

    armed.store(true, Ordering::SeqCst);
    let err = engine.confirmations().confirm(pending.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);

    let investment = inner.investment(pending.id).await.unwrap().unwrap();
    let listing = inner.listing(demo.listing.id).await.unwrap().unwrap();
    assert_eq!(investment.status, InvestmentStatus::Pending);
    assert_eq!(listing.raised_amount, Paise::new(3_200_000));
    assert_eq!(inner.transaction_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_commit_conflicts_are_retried() {
    let inner = InMemoryLedgerStore::new();
    let demo = seed_demo(&inner).await.unwrap();
    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::CommitConflict));
    let conflicts = store.conflicts.clone();
    let engine = SettlementEngine::new(store, fast_retry());

    let investment = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, true))
        .await
        .expect("third attempt commits");

    assert_eq!(conflicts.load(Ordering::SeqCst), 2);
    assert_eq!(investment.status, InvestmentStatus::Confirmed);
    let investor = inner.investor(demo.investor.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::ZERO);
    assert_eq!(inner.transaction_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_surface_conflict() {
    let inner = InMemoryLedgerStore::new();
    let demo = seed_demo(&inner).await.unwrap();
    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::CommitConflict));
    let mut config = fast_retry();
    config.retry.max_attempts = 2;
    let engine = SettlementEngine::new(store, config);

    let err = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, true))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConflictAbort);
    let investor = inner.investor(demo.investor.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::new(500_000));
}

#[tokio::test]
async fn test_slow_commit_is_not_retried_as_timeout() {
    let inner = InMemoryLedgerStore::new();
    let demo = seed_demo(&inner).await.unwrap();
    let investor = Investor::new("+919800000001", None, Paise::new(2_000_000));
    inner.insert_investor(&investor).await.unwrap();

    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::SlowCommit));
    let mut config = fast_retry();
    config.unit_timeout = SHORT_UNIT;
    let engine = SettlementEngine::new(store, config);

    let investment = engine
        .settle(SettleRequest::new(demo.listing.id, investor.id, 1, true))
        .await
        .expect("landed commit is reported as success");
    assert_eq!(investment.status, InvestmentStatus::Confirmed);

    let investor = inner.investor(investor.id).await.unwrap().unwrap();
    let listing = inner.listing(demo.listing.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::new(1_500_000));
    assert_eq!(listing.raised_amount, Paise::new(3_700_000));
    assert_eq!(inner.investments_for_listing(demo.listing.id).await.unwrap().len(), 1);
    assert_eq!(inner.transaction_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_timed_out_unit_rolls_back_before_retry() {
    let inner = InMemoryLedgerStore::new();
    let demo = seed_demo(&inner).await.unwrap();
    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::SlowDebit));
    let armed = store.armed.clone();
    let mut config = fast_retry();
    config.unit_timeout = SHORT_UNIT;
    let engine = SettlementEngine::new(store, config);

    let investment = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, true))
        .await
        .expect("second attempt commits");

    assert!(!armed.load(Ordering::SeqCst));
    let investments = inner.investments_for_listing(demo.listing.id).await.unwrap();
    assert_eq!(investments.len(), 1);
    assert_eq!(investments[0].id, investment.id);

    let investor = inner.investor(demo.investor.id).await.unwrap().unwrap();
    let listing = inner.listing(demo.listing.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::ZERO);
    assert_eq!(listing.raised_amount, Paise::new(3_700_000));
    assert_eq!(inner.transaction_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_timed_out_unit_leaves_ledger_untouched() {
    let inner = InMemoryLedgerStore::new();
    let demo = seed_demo(&inner).await.unwrap();
    let store = Arc::new(FaultyStore::new(inner.clone(), Fault::SlowDebit));
    let armed = store.armed.clone();
    let mut config = fast_retry();
    config.unit_timeout = SHORT_UNIT;
    config.retry.max_attempts = 1;
    let engine = SettlementEngine::new(store, config);

    let err = engine
        .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, true))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Timeout(_)));
    assert!(!armed.load(Ordering::SeqCst));

    let investor = inner.investor(demo.investor.id).await.unwrap().unwrap();
    assert_eq!(investor.wallet_balance, Paise::new(500_000));
    assert!(inner.investments_for_listing(demo.listing.id).await.unwrap().is_empty());
    assert_eq!(inner.transaction_count().await.unwrap(), 0);
}
