//! Ledger store traits.
//!
//! [`LedgerStore`] is the storage handle injected into the settlement engine
//! and confirmation handler. All money mutation happens inside a
//! [`LedgerTx`] unit of work, which either commits every staged write or none
//! of them. Dropping a unit without committing rolls it back.

use async_trait::async_trait;

use crate::ledger::{
    Investment, InvestmentId, InvestmentStatus, Investor, InvestorId, LedgerTransaction, Listing,
    ListingId, ListingStatus, Shop, ShopId,
};
use crate::money::Paise;
use crate::settlement::SettlementResult;

/// Transactional ledger storage
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a new unit of work
    async fn begin(&self) -> SettlementResult<Box<dyn LedgerTx>>;

    /// Get listing by ID
    async fn listing(&self, listing_id: ListingId) -> SettlementResult<Option<Listing>>;

    /// Get shop by ID
    async fn shop(&self, shop_id: ShopId) -> SettlementResult<Option<Shop>>;

    /// List listings in the given status, oldest first
    async fn listings_by_status(&self, status: ListingStatus) -> SettlementResult<Vec<Listing>>;

    /// Get investor by ID
    async fn investor(&self, investor_id: InvestorId) -> SettlementResult<Option<Investor>>;

    /// Get investment by ID
    async fn investment(&self, investment_id: InvestmentId)
    -> SettlementResult<Option<Investment>>;

    /// Investments made against a listing, oldest first
    async fn investments_for_listing(
        &self,
        listing_id: ListingId,
    ) -> SettlementResult<Vec<Investment>>;

    /// Ledger rows referencing an investment
    async fn transactions_for_investment(
        &self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Vec<LedgerTransaction>>;

    /// Provision an investor (first authentication or seeding)
    async fn insert_investor(&self, investor: &Investor) -> SettlementResult<()>;

    /// Provision a shop (first authentication or seeding)
    async fn insert_shop(&self, shop: &Shop) -> SettlementResult<()>;

    /// Provision a listing
    async fn insert_listing(&self, listing: &Listing) -> SettlementResult<()>;
}

/// One atomic unit of work against the ledger.
///
/// `lock_*` reads take the row for the remainder of the unit, so a
/// read-validate-write sequence cannot interleave with another unit touching
/// the same investor, listing or investment.
#[async_trait]
pub trait LedgerTx: Send {
    /// Read and lock a listing
    async fn lock_listing(&mut self, listing_id: ListingId) -> SettlementResult<Option<Listing>>;

    /// Read and lock an investor
    async fn lock_investor(&mut self, investor_id: InvestorId)
    -> SettlementResult<Option<Investor>>;

    /// Read and lock an investment
    async fn lock_investment(
        &mut self,
        investment_id: InvestmentId,
    ) -> SettlementResult<Option<Investment>>;

    /// Investment previously created by `investor_id` under `key`
    async fn find_by_idempotency_key(
        &mut self,
        investor_id: InvestorId,
        key: &str,
    ) -> SettlementResult<Option<Investment>>;

    /// Sum of PENDING investment amounts against a listing
    async fn pending_total_for_listing(&mut self, listing_id: ListingId) -> SettlementResult<Paise>;

    /// Insert a new investment row
    async fn insert_investment(&mut self, investment: &Investment) -> SettlementResult<()>;

    /// Move an investment to `status`
    async fn set_investment_status(
        &mut self,
        investment_id: InvestmentId,
        status: InvestmentStatus,
    ) -> SettlementResult<()>;

    /// Debit a wallet, refusing to go below zero
    ///
    /// # Returns
    ///
    /// * `SettlementResult<Paise>` - New wallet balance
    ///
    /// # Errors
    ///
    /// * `SettlementError::InsufficientFunds` - Balance below `amount`
    /// * `SettlementError::InvestorNotFound` - Unknown investor
    async fn debit_wallet(&mut self, investor_id: InvestorId, amount: Paise)
    -> SettlementResult<Paise>;

    /// Credit a listing's raised amount
    ///
    /// # Returns
    ///
    /// * `SettlementResult<Paise>` - New raised amount
    async fn credit_listing(&mut self, listing_id: ListingId, amount: Paise)
    -> SettlementResult<Paise>;

    /// Move a listing to `status`
    async fn set_listing_status(
        &mut self,
        listing_id: ListingId,
        status: ListingStatus,
    ) -> SettlementResult<()>;

    /// Append a row to the transaction log
    async fn append_transaction(&mut self, entry: &LedgerTransaction) -> SettlementResult<()>;

    /// Make every staged write visible atomically
    async fn commit(self: Box<Self>) -> SettlementResult<()>;

    /// Discard every staged write
    async fn rollback(self: Box<Self>) -> SettlementResult<()>;
}
