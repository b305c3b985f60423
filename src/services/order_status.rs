use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{Model as OrderModel, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders::{OrderLedger, ORDER_NOT_FOUND},
};

/// Manual status changes made from the back office
#[derive(Clone)]
pub struct OrderStatusService {
    ledger: OrderLedger,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderStatusService {
    pub fn new(ledger: OrderLedger, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            ledger,
            event_sender,
        }
    }

    /// Updates the status of an order with validation
    ///
    /// Requesting the current status is a no-op. The write only lands if the
    /// order still holds the status the transition was validated against.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.load(order_id).await?;
        let old_status = order.status;

        if old_status == new_status {
            return Ok(order);
        }

        ensure_transition(old_status, new_status)?;

        if !self
            .ledger
            .transition(order_id, new_status, &[old_status])
            .await?
        {
            let fresh = self.load(order_id).await?;
            if fresh.status == new_status {
                return Ok(fresh);
            }
            warn!(
                order_id = %order_id,
                observed = %fresh.status,
                "Order status changed concurrently"
            );
            ensure_transition(fresh.status, new_status)?;
            return Err(ServiceError::InvalidStatus(format!(
                "Order status changed to '{}' while updating; retry the request",
                fresh.status
            )));
        }

        info!(
            "Order {} status updated from '{}' to '{}'",
            order_id, old_status, new_status
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status,
                    new_status,
                })
                .await;
        }

        self.load(order_id).await
    }

    async fn load(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        self.ledger
            .find(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(ORDER_NOT_FOUND.to_string()))
    }
}

fn ensure_transition(from: OrderStatus, to: OrderStatus) -> Result<(), ServiceError> {
    if from.can_transition_to(to) {
        Ok(())
    } else if from.is_terminal() {
        Err(ServiceError::InvalidStatus(format!(
            "Order is already {} and can no longer change",
            from
        )))
    } else {
        Err(ServiceError::InvalidStatus(format!(
            "Cannot transition from status '{}' to '{}'",
            from, to
        )))
    }
}
