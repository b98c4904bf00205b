//! HTTP API for the shopfund settlement ledger.
//!
//! # Modules
//!
//! - [`listings`]: Listing views with funding progress (public)
//! - [`investments`]: Ticket purchases and investment lookup (identity required)
//! - [`payments`]: Signed payment-confirmation webhook
//! - [`middleware`]: Identity verification and request metrics
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                                 - Health check (public)
//! GET  /api/v1/listings?status=LIVE            - Listings by status, LIVE by default (public)
//! GET  /api/v1/listings/{listing_id}           - Listing detail (public)
//! POST /api/v1/payments/webhook                - Payment confirmation (signed)
//! POST /api/v1/listings/{listing_id}/invest    - Buy tickets (identity required)
//! GET  /api/v1/investments/{investment_id}     - Own investment (identity required)
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use sf_server::api::{AppState, create_router};
//! use shopfund::store::{InMemoryLedgerStore, LedgerStore};
//! use shopfund::{SettlementConfig, SettlementEngine};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedgerStore::new());
//! let engine = SettlementEngine::new(store, SettlementConfig::default());
//! let state = AppState::new(
//!     engine,
//!     "0123456789abcdef0123456789abcdef",
//!     "webhook-secret-16",
//!     None,
//! );
//!
//! let app = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod error;
pub mod investments;
pub mod listings;
pub mod middleware;
pub mod payments;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde_json::json;
use shopfund::store::Database;
use shopfund::{ListingQueryService, SettlementEngine};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use middleware::IdentityVerifier;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SettlementEngine>,
    pub listings: ListingQueryService,
    pub identity: Arc<IdentityVerifier>,
    pub webhook_secret: Arc<String>,
    /// Present when the ledger lives in Postgres; used by the health check
    pub database: Option<Database>,
}

impl AppState {
    pub fn new(
        engine: SettlementEngine,
        jwt_secret: &str,
        webhook_secret: &str,
        database: Option<Database>,
    ) -> Self {
        let listings = ListingQueryService::new(engine.store().clone());
        Self {
            engine: Arc::new(engine),
            listings,
            identity: Arc::new(IdentityVerifier::new(jwt_secret)),
            webhook_secret: Arc::new(webhook_secret.to_string()),
            database,
        }
    }
}

/// Create the API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use sf_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let v1_routes = create_v1_router(state.clone());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", v1_routes)
        .layer(axum::middleware::from_fn(middleware::metrics_middleware))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router(state: AppState) -> Router<AppState> {
    // The webhook authenticates by body signature, not identity token
    let public_routes = Router::new()
        .route("/listings", get(listings::list_listings))
        .route("/listings/{listing_id}", get(listings::get_listing))
        .route("/payments/webhook", post(payments::payment_webhook));

    let protected_routes = Router::new()
        .route("/listings/{listing_id}/invest", post(investments::invest))
        .route(
            "/investments/{investment_id}",
            get(investments::get_investment),
        )
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the ledger backend answers, `503 Service Unavailable`
/// otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","storage":"postgres","database":true,"timestamp":"2026-01-01T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (storage, db_healthy) = match &state.database {
        Some(db) => ("postgres", db.health_check().await.is_ok()),
        None => ("memory", true),
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "storage": storage,
        "database": db_healthy,
        "funding_policy": state.engine.config().funding_policy.as_str(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
