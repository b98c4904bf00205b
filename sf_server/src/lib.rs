//! HTTP adapter for the shopfund settlement ledger.
//!
//! Exposes listing views, ticket purchases and the payment-confirmation
//! webhook over axum, with structured logging and Prometheus metrics.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
