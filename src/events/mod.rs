use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{OrderStatus, PaymentMethod};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event; a closed channel is logged and otherwise ignored.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Domain events raised by the order workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        user_id: Uuid,
        payment_method: PaymentMethod,
        total_price: Decimal,
    },
    OrderPaid {
        order_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    PaymentSignatureRejected {
        tran_id: Option<String>,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                user_id,
                payment_method,
                total_price,
            } => info!(
                order_id = %order_id,
                user_id = %user_id,
                payment_method = %payment_method,
                total_price = %total_price,
                "Order placed"
            ),
            Event::OrderPaid { order_id } => info!(order_id = %order_id, "Order paid"),
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => info!(
                order_id = %order_id,
                old_status = %old_status,
                new_status = %new_status,
                "Order status changed"
            ),
            Event::PaymentSignatureRejected { tran_id } => warn!(
                tran_id = tran_id.as_deref().unwrap_or("<none>"),
                "Payment callback rejected"
            ),
        }
    }

    info!("Event processing loop stopped");
}
