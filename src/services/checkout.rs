use std::sync::Arc;

use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::transaction_scope,
    entities::{OrderStatus, PaymentMethod},
    errors::{CheckoutError, ServiceError},
    events::{Event, EventSender},
    services::{
        catalog::CatalogStore,
        orders::{not_blank, NewLineItem, NewOrder, OrderLedger, ShippingAddress},
        payment_gateway::PaymentGateway,
    },
};

/// One cart entry as submitted by the storefront.
///
/// Any client-side price sent alongside is ignored; the catalog is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(alias = "id")]
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub quantity: i32,
    #[validate(custom = "not_blank")]
    pub color: String,
    #[validate(custom = "not_blank")]
    pub size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    #[validate(length(min = 1, message = "Cart is empty"))]
    pub cart_items: Vec<CartItem>,
    pub shipping_address: ShippingAddress,
}

impl PlaceOrderRequest {
    fn validate_all(&self) -> Result<(), ServiceError> {
        self.validate()?;
        self.shipping_address.validate().map_err(|e| {
            ServiceError::ValidationError(format!("Shipping address is incomplete: {e}"))
        })?;
        for item in &self.cart_items {
            item.validate()?;
        }
        Ok(())
    }
}

/// Outcome of a successful checkout
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedOrder {
    pub order_id: Uuid,
    pub total_price: Decimal,
    pub qr_code: Option<String>,
}

/// Turns carts into durable orders and starts KHQR payments
#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<dyn CatalogStore>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: OrderLedger,
    event_sender: Option<Arc<EventSender>>,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        gateway: Arc<dyn PaymentGateway>,
        ledger: OrderLedger,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            catalog,
            gateway,
            ledger,
            event_sender,
        }
    }

    /// Places an order for `user_id`.
    ///
    /// Catalog reads finish before the transaction opens; the header and all
    /// items commit together. For KHQR the gateway is called once after the
    /// commit, and a gateway failure leaves the order `pending` for retry.
    #[instrument(skip(self, request), fields(user_id = %user_id, payment_method = %payment_method))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        request: PlaceOrderRequest,
        payment_method: PaymentMethod,
    ) -> Result<PlacedOrder, CheckoutError> {
        request.validate_all()?;

        let lines = self.price_lines(&request.cart_items).await?;

        let ledger = self.ledger.clone();
        let new_order = NewOrder {
            user_id,
            shipping_address: request.shipping_address,
            payment_method,
        };
        let order = transaction_scope(self.ledger.db(), move |txn| {
            Box::pin(async move { ledger.insert_order(txn, new_order, &lines).await })
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Order creation rolled back");
            e
        })?;

        info!(order_id = %order.id, total_price = %order.total_price, "Order placed");
        counter!("storefront.orders.placed", 1, "payment_method" => payment_method.to_string());

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderPlaced {
                    order_id: order.id,
                    user_id,
                    payment_method,
                    total_price: order.total_price,
                })
                .await;
        }

        let qr_code = match payment_method {
            PaymentMethod::Cod => None,
            PaymentMethod::QrPush => Some(self.issue_qr(order.id, order.total_price).await?),
        };

        Ok(PlacedOrder {
            order_id: order.id,
            total_price: order.total_price,
            qr_code,
        })
    }

    /// Re-issues a QR for a pending KHQR order, bound to its stored total.
    #[instrument(skip(self), fields(user_id = %user_id, order_id = %order_id))]
    pub async fn retry_qr_payment(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<PlacedOrder, CheckoutError> {
        let order = self.ledger.find_owned(order_id, user_id).await?;

        if order.payment_method != PaymentMethod::QrPush {
            return Err(ServiceError::InvalidStatus(
                "Order is not paid by KHQR".to_string(),
            )
            .into());
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Order is already {}",
                order.status
            ))
            .into());
        }

        let qr_code = self.issue_qr(order.id, order.total_price).await?;
        Ok(PlacedOrder {
            order_id: order.id,
            total_price: order.total_price,
            qr_code: Some(qr_code),
        })
    }

    async fn price_lines(&self, cart: &[CartItem]) -> Result<Vec<NewLineItem>, ServiceError> {
        let mut lines = Vec::with_capacity(cart.len());
        for item in cart {
            let listing = self
                .catalog
                .price_and_stock(item.product_id, &item.color, &item.size)
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Product with ID {} ({} / {}) not found.",
                        item.product_id, item.color, item.size
                    ))
                })?;

            if listing.stock < item.quantity {
                warn!(
                    product_id = %item.product_id,
                    requested = item.quantity,
                    available = listing.stock,
                    "Ordered quantity exceeds reported stock"
                );
            }

            lines.push(NewLineItem {
                product_id: item.product_id,
                quantity: item.quantity,
                price_at_purchase: listing.price,
                color: item.color.clone(),
                size: item.size.clone(),
            });
        }
        Ok(lines)
    }

    async fn issue_qr(&self, order_id: Uuid, amount: Decimal) -> Result<String, CheckoutError> {
        self.gateway
            .generate_qr_code(order_id, amount)
            .await
            .map(|qr| qr.qr_code)
            .map_err(|source| {
                warn!(order_id = %order_id, "Order left pending without a QR code");
                CheckoutError {
                    order_id: Some(order_id),
                    source,
                }
            })
    }
}
