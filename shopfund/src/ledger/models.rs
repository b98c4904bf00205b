//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::money::Paise;

/// Investor ID type
pub type InvestorId = Uuid;

/// Shop ID type
pub type ShopId = Uuid;

/// Listing ID type
pub type ListingId = Uuid;

/// Investment ID type
pub type InvestmentId = Uuid;

/// Ledger transaction ID type
pub type TransactionId = Uuid;

/// Reference prefix for investments paid from the investor wallet
pub const WALLET_REFERENCE_PREFIX: &str = "WALLET-";

/// Reference prefix for investments paid through an external channel
pub const EXTERNAL_REFERENCE_PREFIX: &str = "EXT-";

/// Error returned when a persisted enum value is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// KYC status of an investor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
}

string_enum!(KycStatus, "kyc status", {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

/// Listing lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Draft,
    Live,
    Funded,
    Closed,
    Cancelled,
}

string_enum!(ListingStatus, "listing status", {
    Draft => "DRAFT",
    Live => "LIVE",
    Funded => "FUNDED",
    Closed => "CLOSED",
    Cancelled => "CANCELLED",
});

/// Investment status.
///
/// `Pending` only exists on the external-payment path; wallet settlements are
/// created `Confirmed`. `Confirmed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestmentStatus {
    Pending,
    Confirmed,
}

string_enum!(InvestmentStatus, "investment status", {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
});

/// How an investment is paid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingMethod {
    Wallet,
    External,
}

string_enum!(FundingMethod, "funding method", {
    Wallet => "WALLET",
    External => "EXTERNAL",
});

impl FundingMethod {
    pub fn from_use_wallet(use_wallet: bool) -> Self {
        if use_wallet {
            FundingMethod::Wallet
        } else {
            FundingMethod::External
        }
    }

    /// Fresh unique payment reference carrying this method's origin marker
    pub fn new_reference(&self) -> String {
        let prefix = match self {
            FundingMethod::Wallet => WALLET_REFERENCE_PREFIX,
            FundingMethod::External => EXTERNAL_REFERENCE_PREFIX,
        };
        format!("{prefix}{}", Uuid::new_v4().simple())
    }
}

/// Ledger transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Investment,
}

string_enum!(TransactionType, "transaction type", {
    Investment => "INVESTMENT",
});

/// Kind of actor a ledger transaction is recorded against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    Investor,
    Shop,
}

string_enum!(ActorType, "actor type", {
    Investor => "INVESTOR",
    Shop => "SHOP",
});

/// Investor model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investor {
    pub id: InvestorId,
    pub phone: String,
    pub name: Option<String>,
    pub wallet_balance: Paise,
    pub kyc_status: KycStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Investor {
    pub fn new(phone: impl Into<String>, name: Option<String>, wallet_balance: Paise) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone: phone.into(),
            name,
            wallet_balance,
            kyc_status: KycStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Shop model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: ShopId,
    pub phone: String,
    pub owner_name: String,
    pub shop_name: String,
    pub city: String,
    /// Informational only, never used by settlement
    pub avg_daily_revenue: Option<Paise>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shop {
    pub fn new(
        phone: impl Into<String>,
        owner_name: impl Into<String>,
        shop_name: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone: phone.into(),
            owner_name: owner_name.into(),
            shop_name: shop_name.into(),
            city: city.into(),
            avg_daily_revenue: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fundraising listing model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub shop_id: ShopId,
    pub title: String,
    pub description: String,
    pub ticket_price: Paise,
    pub target_amount: Paise,
    pub raised_amount: Paise,
    pub status: ListingStatus,
    pub opens_at: Option<DateTime<Utc>>,
    pub closes_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// New LIVE listing with nothing raised and no funding window
    pub fn new(
        shop_id: ShopId,
        title: impl Into<String>,
        ticket_price: Paise,
        target_amount: Paise,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            shop_id,
            title: title.into(),
            description: String::new(),
            ticket_price,
            target_amount,
            raised_amount: Paise::ZERO,
            status: ListingStatus::Live,
            opens_at: None,
            closes_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the listing accepts new investments at `now`
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ListingStatus::Live
            && self.opens_at.is_none_or(|opens| opens <= now)
            && self.closes_at.is_none_or(|closes| now < closes)
    }
}

/// Investment model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub listing_id: ListingId,
    pub investor_id: InvestorId,
    pub num_tickets: u32,
    pub amount_paid: Paise,
    pub funding_method: FundingMethod,
    pub payment_reference: String,
    pub idempotency_key: Option<String>,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Investment {
    /// New investment in the initial state of its funding method
    pub fn open(
        listing_id: ListingId,
        investor_id: InvestorId,
        num_tickets: u32,
        amount_paid: Paise,
        funding_method: FundingMethod,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let status = match funding_method {
            FundingMethod::Wallet => InvestmentStatus::Confirmed,
            FundingMethod::External => InvestmentStatus::Pending,
        };
        Self {
            id: Uuid::new_v4(),
            listing_id,
            investor_id,
            num_tickets,
            amount_paid,
            funding_method,
            payment_reference: funding_method.new_reference(),
            idempotency_key,
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Metadata attached to an investment ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    pub listing_id: ListingId,
    pub investment_id: InvestmentId,
}

/// Append-only ledger transaction row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub tx_type: TransactionType,
    pub actor_type: ActorType,
    pub actor_id: Uuid,
    pub shop_id: ShopId,
    pub amount: Paise,
    pub metadata: TransactionMetadata,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Ledger row recording the money movement of a confirmed investment
    pub fn for_investment(investment: &Investment, shop_id: ShopId) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx_type: TransactionType::Investment,
            actor_type: ActorType::Investor,
            actor_id: investment.investor_id,
            shop_id,
            amount: investment.amount_paid,
            metadata: TransactionMetadata {
                listing_id: investment.listing_id,
                investment_id: investment.id,
            },
            created_at: Utc::now(),
        }
    }
}
