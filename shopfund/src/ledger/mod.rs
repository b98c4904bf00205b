//! Ledger entities: investors, shops, listings, investments and the
//! append-only transaction log.
//!
//! Money fields are [`Paise`](crate::money::Paise). Investor balances and
//! listing raised amounts are only ever changed by
//! [`SettlementEngine`](crate::settlement::SettlementEngine) and
//! [`ConfirmationHandler`](crate::settlement::ConfirmationHandler).

pub mod models;
pub mod seed;

pub use models::{
    ActorType, EXTERNAL_REFERENCE_PREFIX, FundingMethod, Investment, InvestmentId, InvestmentStatus, Investor, InvestorId,
    KycStatus, LedgerTransaction, Listing, ListingId, ListingStatus, ParseEnumError, Shop, ShopId,
    TransactionId, TransactionMetadata, TransactionType, WALLET_REFERENCE_PREFIX,
};
