//! # Shopfund
//!
//! Investment settlement core for shop fundraising listings.
//!
//! Investors buy fractional tickets in a shop's listing, paying from a
//! pre-funded wallet or through an external payment channel. Each purchase
//! is settled as one atomic unit of work: funds are verified, the wallet is
//! debited, the listing is credited, a ledger row is appended and the
//! investment is recorded, all together or not at all.
//!
//! ## Core Modules
//!
//! - [`money`]: Fixed-point amounts in paise and progress computation
//! - [`ledger`]: Investor, shop, listing, investment and transaction models
//! - [`store`]: Transactional ledger storage (PostgreSQL and in-memory)
//! - [`settlement`]: Settlement engine, confirmation handler, payment events
//! - [`listing`]: Read-only listing views with progress
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use shopfund::{
//!     SettleRequest, SettlementConfig, SettlementEngine,
//!     ledger::seed::seed_demo, store::InMemoryLedgerStore,
//! };
//!
//! # tokio_test_main();
//! # fn tokio_test_main() {
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let store = Arc::new(InMemoryLedgerStore::new());
//! let demo = seed_demo(store.as_ref()).await.unwrap();
//!
//! let engine = SettlementEngine::new(store, SettlementConfig::default());
//! let investment = engine
//!     .settle(SettleRequest::new(demo.listing.id, demo.investor.id, 1, true))
//!     .await
//!     .unwrap();
//! assert_eq!(investment.amount_paid.value(), 500_000);
//! # });
//! # }
//! ```

/// Fixed-point currency.
pub mod money;
pub use money::{Paise, progress_percent};

/// Ledger data models.
pub mod ledger;

/// Ledger storage backends.
pub mod store;

/// Settlement engine and confirmation handling.
pub mod settlement;
pub use settlement::{
    ConfirmationHandler, ErrorKind, FundingPolicy, PaymentReceived, SettleRequest,
    SettlementConfig, SettlementEngine, SettlementError, SettlementResult,
};

/// Listing query service.
pub mod listing;
pub use listing::{ListingDetail, ListingProgress, ListingQueryService, ShopSummary};
