//! Investment API handlers.
//!
//! Buy tickets in a listing:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/listings/$LISTING/invest \
//!   -H "Authorization: Bearer TOKEN" \
//!   -H "Idempotency-Key: order-42" \
//!   -H "Content-Type: application/json" \
//!   -d '{"num_tickets": 1, "use_wallet": true}'
//! ```

use axum::{
    Json,
    extract::{Extension, Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopfund::SettleRequest;
use shopfund::ledger::{
    FundingMethod, Investment, InvestmentId, InvestmentStatus, InvestorId, ListingId,
};
use std::time::Instant;

use super::AppState;
use super::error::ApiError;
use super::middleware::Caller;
use super::request_id::RequestId;
use crate::{logging, metrics};

/// Header carrying the caller's idempotency key
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InvestRequest {
    pub num_tickets: i64,
    pub use_wallet: bool,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvestmentResponse {
    pub id: InvestmentId,
    pub listing_id: ListingId,
    pub investor_id: InvestorId,
    pub num_tickets: u32,
    pub amount_paid_paise: i64,
    pub funding_method: FundingMethod,
    pub payment_reference: String,
    pub status: InvestmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Investment> for InvestmentResponse {
    fn from(investment: Investment) -> Self {
        Self {
            id: investment.id,
            listing_id: investment.listing_id,
            investor_id: investment.investor_id,
            num_tickets: investment.num_tickets,
            amount_paid_paise: investment.amount_paid.value(),
            funding_method: investment.funding_method,
            payment_reference: investment.payment_reference,
            status: investment.status,
            created_at: investment.created_at,
            updated_at: investment.updated_at,
        }
    }
}

/// Resolve the idempotency key from body and header; both must agree when present
fn idempotency_key(
    body: Option<String>,
    headers: &HeaderMap,
) -> Result<Option<String>, ApiError> {
    let header = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            value
                .to_str()
                .map(str::to_string)
                .map_err(|_| ApiError::BadRequest("Idempotency-Key must be ASCII".to_string()))
        })
        .transpose()?;

    match (body, header) {
        (Some(body), Some(header)) if body != header => Err(ApiError::BadRequest(
            "Idempotency key in body and header differ".to_string(),
        )),
        (body, header) => Ok(body.or(header)),
    }
}

/// Buy tickets in a listing.
///
/// # Response
///
/// Returns `201 Created` with the investment. Wallet purchases are
/// `CONFIRMED`; external purchases are `CONFIRMED` or `PENDING` depending
/// on the payment gateway.
///
/// # Errors
///
/// - `400 Bad Request`: Non-positive tickets, malformed body
/// - `401 Unauthorized`: Missing or invalid token
/// - `402 Payment Required`: Wallet balance too low
/// - `403 Forbidden`: Caller is not an investor
/// - `404 Not Found`: Listing unknown or not open
/// - `409 Conflict`: Purchase would exceed the listing target
/// - `503 Service Unavailable`: Ledger busy, retry
pub async fn invest(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    request_id: RequestId,
    Path(listing_id): Path<ListingId>,
    headers: HeaderMap,
    payload: Result<Json<InvestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InvestmentResponse>), ApiError> {
    let investor_id = caller.require_investor()?;
    let Json(body) = payload?;

    let num_tickets = u32::try_from(body.num_tickets)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ApiError::BadRequest("num_tickets must be a positive integer".to_string()))?;

    let mut request = SettleRequest::new(listing_id, investor_id, num_tickets, body.use_wallet);
    if let Some(key) = idempotency_key(body.idempotency_key, &headers)? {
        request = request.with_idempotency_key(key);
    }

    let method = request.funding_method;
    let started = Instant::now();
    let result = state.engine.settle(request).await;
    let elapsed = started.elapsed();

    let outcome = metrics::outcome_label(result.as_ref().map(|_| ()));
    metrics::settlements_total(method, outcome);
    metrics::settlement_duration_ms(method, elapsed.as_secs_f64() * 1000.0);
    logging::log_settlement(
        &investor_id.to_string(),
        &listing_id.to_string(),
        method.as_str(),
        outcome,
        elapsed.as_millis() as u64,
    );
    tracing::debug!(request_id = request_id.as_str(), outcome, "Invest handled");

    let investment = result?;
    metrics::settled_amount_paise(investment.amount_paid);
    Ok((StatusCode::CREATED, Json(investment.into())))
}

/// Get one of the caller's investments.
///
/// Investments belonging to someone else are reported as not found.
pub async fn get_investment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(investment_id): Path<InvestmentId>,
) -> Result<Json<InvestmentResponse>, ApiError> {
    let investment = state.listings.investment(investment_id).await?;
    if investment.investor_id != caller.investor_id {
        return Err(shopfund::SettlementError::InvestmentNotFound(investment_id).into());
    }
    Ok(Json(investment.into()))
}
