//! Payment webhook.
//!
//! The payment channel reports cleared payments by POSTing a
//! `PaymentReceived` JSON body signed with HMAC-SHA256 over the raw body,
//! hex encoded in the `x-signature` header.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shopfund::PaymentReceived;

use super::AppState;
use super::error::ApiError;
use super::investments::InvestmentResponse;
use crate::{logging, metrics};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 body signature
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Check `signature` (hex) against the HMAC of `body`, in constant time
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA256 signature of `body`
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Apply a signed payment notification.
///
/// # Errors
///
/// - `401 Unauthorized`: Missing or wrong signature
/// - `400 Bad Request`: Malformed body, or reference/amount mismatch
/// - `404 Not Found`: Unknown investment
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InvestmentResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !verify_signature(&state.webhook_secret, &body, signature) {
        metrics::webhook_rejections_total("bad_signature");
        logging::log_security_event("bad_webhook_signature", None, "Webhook signature mismatch");
        return Err(ApiError::Unauthorized);
    }

    let event: PaymentReceived = serde_json::from_slice(&body).map_err(|e| {
        metrics::webhook_rejections_total("malformed");
        ApiError::BadRequest(format!("Malformed payment event: {e}"))
    })?;

    match state.engine.confirmations().handle(&event).await {
        Ok(investment) => {
            metrics::confirmations_total("confirmed");
            Ok(Json(investment.into()))
        }
        Err(e) => {
            metrics::confirmations_total(metrics::outcome_label(Err(&e)));
            Err(e.into())
        }
    }
}
