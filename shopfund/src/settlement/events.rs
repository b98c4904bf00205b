//! Payment events and gateway stand-ins.
//!
//! External settlement is two decoupled operations: the engine records a
//! PENDING investment and hands it to a [`PaymentGateway`]; later a
//! [`PaymentReceived`] event reaches the confirmation handler. How the event
//! travels depends on the gateway:
//!
//! - [`InstantGateway`] reports the payment as received immediately.
//! - [`DeferredGateway`] queues the event for a [`ConfirmationWorker`] task.
//! - [`CallbackGateway`] does nothing; the event arrives through a webhook.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::confirmation::ConfirmationHandler;
use super::errors::{SettlementError, SettlementResult};
use crate::ledger::{Investment, InvestmentId};
use crate::money::Paise;

/// Notification that an external payment for an investment has cleared
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceived {
    pub investment_id: InvestmentId,
    pub payment_reference: String,
    pub amount: Paise,
}

impl PaymentReceived {
    /// Event matching `investment` exactly
    pub fn for_investment(investment: &Investment) -> Self {
        Self {
            investment_id: investment.id,
            payment_reference: investment.payment_reference.clone(),
            amount: investment.amount_paid,
        }
    }
}

/// What the gateway did with a payment request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentDispatch {
    /// Payment already cleared; confirm now
    Settled(PaymentReceived),
    /// Confirmation will arrive later
    Awaiting,
}

/// External payment channel
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Start collecting payment for a PENDING investment
    async fn request_payment(&self, investment: &Investment) -> SettlementResult<PaymentDispatch>;
}

/// Gateway that treats every payment as received on the spot
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantGateway;

#[async_trait]
impl PaymentGateway for InstantGateway {
    fn name(&self) -> &'static str {
        "instant"
    }

    async fn request_payment(&self, investment: &Investment) -> SettlementResult<PaymentDispatch> {
        Ok(PaymentDispatch::Settled(PaymentReceived::for_investment(
            investment,
        )))
    }
}

/// Gateway whose confirmations arrive through the payment webhook
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackGateway;

#[async_trait]
impl PaymentGateway for CallbackGateway {
    fn name(&self) -> &'static str {
        "callback"
    }

    async fn request_payment(&self, investment: &Investment) -> SettlementResult<PaymentDispatch> {
        log::info!(
            "Awaiting payment callback for investment {} ({})",
            investment.id,
            investment.payment_reference
        );
        Ok(PaymentDispatch::Awaiting)
    }
}

/// Gateway that queues payment events for a [`ConfirmationWorker`]
#[derive(Debug, Clone)]
pub struct DeferredGateway {
    sender: mpsc::Sender<PaymentReceived>,
}

#[async_trait]
impl PaymentGateway for DeferredGateway {
    fn name(&self) -> &'static str {
        "deferred"
    }

    async fn request_payment(&self, investment: &Investment) -> SettlementResult<PaymentDispatch> {
        self.sender
            .send(PaymentReceived::for_investment(investment))
            .await
            .map_err(|_| {
                SettlementError::StorageFailure("confirmation worker is stopped".to_string())
            })?;
        Ok(PaymentDispatch::Awaiting)
    }
}

/// Background task applying queued payment events
pub struct ConfirmationWorker {
    inbox: mpsc::Receiver<PaymentReceived>,
    handler: ConfirmationHandler,
}

impl ConfirmationWorker {
    /// Create a connected gateway and worker pair
    ///
    /// The worker must be spawned (`tokio::spawn(worker.run())`); it stops
    /// once every gateway clone has been dropped.
    pub fn channel(handler: ConfirmationHandler, capacity: usize) -> (DeferredGateway, Self) {
        let (sender, inbox) = mpsc::channel(capacity.max(1));
        (DeferredGateway { sender }, Self { inbox, handler })
    }

    /// Run the worker loop
    pub async fn run(mut self) {
        log::info!("Confirmation worker starting");

        while let Some(event) = self.inbox.recv().await {
            match self.handler.handle(&event).await {
                Ok(investment) => {
                    log::debug!("Worker confirmed investment {}", investment.id);
                }
                Err(e) => {
                    log::error!(
                        "Confirmation worker failed for investment {}: {}",
                        event.investment_id,
                        e
                    );
                }
            }
        }

        log::info!("Confirmation worker stopped");
    }
}
