//! Listing API handlers.
//!
//! Public read-only views of listings and their funding progress.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfund::ledger::{InvestmentStatus, ListingId, ListingStatus, ShopId};
use shopfund::{ListingDetail, ListingProgress, ShopSummary};

use super::AppState;
use super::error::ApiError;

/// Shop behind a listing
#[derive(Debug, Serialize, Deserialize)]
pub struct ShopResponse {
    pub id: ShopId,
    pub shop_name: String,
    pub owner_name: String,
    pub city: String,
    pub avg_daily_revenue_paise: Option<i64>,
}

impl From<ShopSummary> for ShopResponse {
    fn from(shop: ShopSummary) -> Self {
        Self {
            id: shop.id,
            shop_name: shop.shop_name,
            owner_name: shop.owner_name,
            city: shop.city,
            avg_daily_revenue_paise: shop.avg_daily_revenue.map(|paise| paise.value()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListingResponse {
    pub id: ListingId,
    pub shop_id: ShopId,
    pub title: String,
    pub description: String,
    pub ticket_price_paise: i64,
    pub target_amount_paise: i64,
    pub raised_amount_paise: i64,
    pub progress_percent: u32,
    pub status: ListingStatus,
    pub opens_at: Option<DateTime<Utc>>,
    pub closes_at: Option<DateTime<Utc>>,
    pub shop: ShopResponse,
}

impl From<ListingProgress> for ListingResponse {
    fn from(progress: ListingProgress) -> Self {
        let listing = progress.listing;
        Self {
            id: listing.id,
            shop_id: listing.shop_id,
            title: listing.title,
            description: listing.description,
            ticket_price_paise: listing.ticket_price.value(),
            target_amount_paise: listing.target_amount.value(),
            raised_amount_paise: listing.raised_amount.value(),
            progress_percent: progress.progress_percent,
            status: listing.status,
            opens_at: listing.opens_at,
            closes_at: listing.closes_at,
            shop: progress.shop.into(),
        }
    }
}

/// Investment as shown publicly on a listing, without investor identity
#[derive(Debug, Serialize, Deserialize)]
pub struct InvestmentSummary {
    pub num_tickets: u32,
    pub amount_paid_paise: i64,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListingDetailResponse {
    #[serde(flatten)]
    pub listing: ListingResponse,
    pub investor_count: usize,
    pub investments: Vec<InvestmentSummary>,
}

impl From<ListingDetail> for ListingDetailResponse {
    fn from(detail: ListingDetail) -> Self {
        let mut investors: Vec<_> = detail.investments.iter().map(|i| i.investor_id).collect();
        investors.sort_unstable();
        investors.dedup();

        Self {
            listing: detail.progress.into(),
            investor_count: investors.len(),
            investments: detail
                .investments
                .into_iter()
                .map(|investment| InvestmentSummary {
                    num_tickets: investment.num_tickets,
                    amount_paid_paise: investment.amount_paid.value(),
                    status: investment.status,
                    created_at: investment.created_at,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListingsQuery {
    /// Listing status, e.g. `FUNDED`; LIVE when absent
    pub status: Option<String>,
}

/// List listings in one status with progress.
///
/// # Errors
///
/// - `400 Bad Request`: Unknown `status`
pub async fn list_listings(
    State(state): State<AppState>,
    Query(query): Query<ListingsQuery>,
) -> Result<Json<Vec<ListingResponse>>, ApiError> {
    let status = match query.status.as_deref() {
        Some(status) => status
            .parse::<ListingStatus>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => ListingStatus::Live,
    };
    let listings = state.listings.listings(status).await?;
    Ok(Json(listings.into_iter().map(Into::into).collect()))
}

/// Get a listing with progress and its investments.
///
/// # Errors
///
/// - `404 Not Found`: Unknown listing
/// - `400 Bad Request`: Listing has a non-positive target
pub async fn get_listing(
    State(state): State<AppState>,
    Path(listing_id): Path<ListingId>,
) -> Result<Json<ListingDetailResponse>, ApiError> {
    let detail = state.listings.listing_detail(listing_id).await?;
    Ok(Json(detail.into()))
}
