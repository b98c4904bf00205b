//! Read-only listing and investment views.

use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::ledger::{Investment, InvestmentId, Listing, ListingId, ListingStatus, Shop, ShopId};
use crate::money::{Paise, progress_percent};
use crate::settlement::{SettlementError, SettlementResult};
use crate::store::LedgerStore;
use crate::store::timeouts::with_default_timeout;

/// Public face of the shop behind a listing. The owner's phone stays private.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShopSummary {
    pub id: ShopId,
    pub shop_name: String,
    pub owner_name: String,
    pub city: String,
    pub avg_daily_revenue: Option<Paise>,
}

impl From<&Shop> for ShopSummary {
    fn from(shop: &Shop) -> Self {
        Self {
            id: shop.id,
            shop_name: shop.shop_name.clone(),
            owner_name: shop.owner_name.clone(),
            city: shop.city.clone(),
            avg_daily_revenue: shop.avg_daily_revenue,
        }
    }
}

/// Listing with its funding progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingProgress {
    #[serde(flatten)]
    pub listing: Listing,
    pub shop: ShopSummary,
    /// Whole percent of the target raised, truncated
    pub progress_percent: u32,
}

impl ListingProgress {
    /// # Errors
    ///
    /// * `SettlementError::InvalidInput` - Listing target is not positive
    /// * `SettlementError::StorageFailure` - `shop` does not own `listing`
    pub fn new(listing: Listing, shop: &Shop) -> SettlementResult<Self> {
        if listing.shop_id != shop.id {
            return Err(SettlementError::StorageFailure(format!(
                "listing {} belongs to shop {}, not {}",
                listing.id, listing.shop_id, shop.id
            )));
        }
        let progress_percent = progress_percent(listing.raised_amount, listing.target_amount)?;
        Ok(Self {
            listing,
            shop: shop.into(),
            progress_percent,
        })
    }
}

/// Listing with progress and the investments made against it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingDetail {
    #[serde(flatten)]
    pub progress: ListingProgress,
    pub investments: Vec<Investment>,
}

/// Listing query service
#[derive(Clone)]
pub struct ListingQueryService {
    store: Arc<dyn LedgerStore>,
}

impl ListingQueryService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Listing with progress
    ///
    /// # Errors
    ///
    /// * `SettlementError::ListingNotFound` - Unknown listing
    /// * `SettlementError::InvalidInput` - Listing target is not positive
    pub async fn listing_progress(&self, listing_id: ListingId) -> SettlementResult<ListingProgress> {
        let listing = with_default_timeout(self.store.listing(listing_id))
            .await?
            .ok_or(SettlementError::ListingNotFound(listing_id))?;
        let shop = self.shop(listing.shop_id).await?;
        ListingProgress::new(listing, &shop)
    }

    /// Listing with progress and investments
    pub async fn listing_detail(&self, listing_id: ListingId) -> SettlementResult<ListingDetail> {
        let progress = self.listing_progress(listing_id).await?;
        let investments =
            with_default_timeout(self.store.investments_for_listing(listing_id)).await?;
        Ok(ListingDetail {
            progress,
            investments,
        })
    }

    /// Listings in `status`, oldest first
    pub async fn listings(&self, status: ListingStatus) -> SettlementResult<Vec<ListingProgress>> {
        let listings = with_default_timeout(self.store.listings_by_status(status)).await?;

        let mut shops: HashMap<ShopId, Shop> = HashMap::new();
        let mut views = Vec::with_capacity(listings.len());
        for listing in listings {
            let shop = match shops.entry(listing.shop_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.shop(listing.shop_id).await?),
            };
            views.push(ListingProgress::new(listing, shop)?);
        }
        Ok(views)
    }

    pub async fn investment(&self, investment_id: InvestmentId) -> SettlementResult<Investment> {
        with_default_timeout(self.store.investment(investment_id))
            .await?
            .ok_or(SettlementError::InvestmentNotFound(investment_id))
    }

    /// A listing's shop is provisioned before the listing, so a miss is a
    /// broken ledger rather than a bad request.
    async fn shop(&self, shop_id: ShopId) -> SettlementResult<Shop> {
        with_default_timeout(self.store.shop(shop_id))
            .await?
            .ok_or_else(|| SettlementError::StorageFailure(format!("shop {shop_id} is missing")))
    }
}
