use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::OrderStatus,
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        orders::OrderLedger,
        payment_gateway::{PaymentGateway, WebhookPayload},
    },
};

/// Header carrying the processor's callback signature
pub const SIGNATURE_HEADER: &str = "x-aba-signature";

/// What a verified callback did to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallbackOutcome {
    /// The order moved from `pending` to `paid`
    Confirmed,
    /// The order had already left `pending`; nothing changed
    AlreadyProcessed,
    /// No order matches the transaction id; acknowledged so the processor stops retrying
    UnknownOrder,
    /// The callback did not report a successful payment
    Ignored,
}

/// Applies payment-completion signals to orders
#[derive(Clone)]
pub struct PaymentReconciler {
    gateway: Arc<dyn PaymentGateway>,
    ledger: OrderLedger,
    event_sender: Option<Arc<EventSender>>,
}

impl PaymentReconciler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: OrderLedger,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            gateway,
            ledger,
            event_sender,
        }
    }

    /// Verifies and applies a processor callback.
    ///
    /// Malformed bodies and bad signatures fail with `SignatureInvalid` and
    /// never touch an order.
    #[instrument(skip_all)]
    pub async fn handle_processor_callback(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<CallbackOutcome, ServiceError> {
        let Some(payload) = WebhookPayload::parse(body) else {
            return Err(self.reject(None, "malformed payload").await);
        };

        let verified = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| self.gateway.verify_webhook_signature(&payload, s))
            .unwrap_or(false);
        if !verified {
            return Err(self
                .reject(Some(payload.tran_id.clone()), "signature verification failed")
                .await);
        }

        let Ok(order_id) = Uuid::parse_str(payload.tran_id.trim()) else {
            info!(tran_id = %payload.tran_id, "Callback for a transaction id that is not an order");
            return Ok(CallbackOutcome::UnknownOrder);
        };

        let Some(order) = self.ledger.find(order_id).await? else {
            info!(order_id = %order_id, "Callback for unknown order acknowledged");
            return Ok(CallbackOutcome::UnknownOrder);
        };

        if !payload.reports_success() {
            info!(order_id = %order_id, status = %payload.status, "Non-success callback ignored");
            return Ok(CallbackOutcome::Ignored);
        }

        if self
            .ledger
            .transition(order_id, OrderStatus::Paid, &[OrderStatus::Pending])
            .await?
        {
            info!(order_id = %order_id, apv = %payload.apv, "Payment confirmed");
            counter!("storefront.payments.confirmed", 1);
            if let Some(sender) = &self.event_sender {
                sender.send_or_log(Event::OrderPaid { order_id }).await;
            }
            return Ok(CallbackOutcome::Confirmed);
        }

        // The pre-CAS read may predate a concurrent confirmation
        let current = self
            .ledger
            .find(order_id)
            .await?
            .map_or(order.status, |order| order.status);
        if current == OrderStatus::Paid {
            info!(order_id = %order_id, "Duplicate payment callback absorbed");
        } else {
            warn!(
                order_id = %order_id,
                status = %current,
                "Payment reported for an order that is no longer pending"
            );
        }
        Ok(CallbackOutcome::AlreadyProcessed)
    }

    /// Current status of an order, visible only to its owner.
    pub async fn poll_status(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderStatus, ServiceError> {
        Ok(self.ledger.find_owned(order_id, user_id).await?.status)
    }

    async fn reject(&self, tran_id: Option<String>, reason: &str) -> ServiceError {
        warn!(
            tran_id = tran_id.as_deref().unwrap_or("<none>"),
            reason,
            "Rejected payment callback"
        );
        counter!("storefront.webhooks.rejected", 1);
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::PaymentSignatureRejected { tran_id })
                .await;
        }
        ServiceError::SignatureInvalid
    }
}
