//! HTTP error mapping.
//!
//! Settlement errors map onto status codes by kind. Messages go through
//! `client_message()` so storage details never reach the caller.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use shopfund::{ErrorKind, SettlementError};

/// Error body returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    pub retryable: bool,
}

/// API error
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(&'static str),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Settlement(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
                ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                ErrorKind::FundingCapExceeded => StatusCode::CONFLICT,
                ErrorKind::ConflictAbort => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Settlement(e) => match e.kind() {
                ErrorKind::NotFound => "not_found",
                ErrorKind::InsufficientFunds => "insufficient_funds",
                ErrorKind::InvalidInput => "invalid_input",
                ErrorKind::FundingCapExceeded => "funding_cap_exceeded",
                ErrorKind::ConflictAbort => "conflict",
                ErrorKind::StorageFailure => "storage_failure",
            },
            ApiError::BadRequest(_) => "invalid_input",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
        }
    }

    fn client_message(&self) -> String {
        match self {
            ApiError::Settlement(e) => e.client_message(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Settlement(e) = &self
            && e.kind() == ErrorKind::StorageFailure
        {
            tracing::error!(error = %e, "Storage failure while serving request");
        }

        let retryable = matches!(&self, ApiError::Settlement(e) if e.is_retryable());
        let body = ErrorResponse {
            error: self.client_message(),
            kind: self.kind(),
            retryable,
        };

        let mut response = (status, Json(body)).into_response();
        if retryable {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
