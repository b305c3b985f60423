use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus, PaymentMethod},
    entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    entities::product::{Entity as ProductEntity, Model as ProductModel},
    errors::ServiceError,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

pub const ORDER_NOT_FOUND: &str = "Order not found.";

/// Delivery address captured at checkout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(custom = "not_blank")]
    pub name: String,
    #[validate(custom = "not_blank")]
    #[serde(alias = "address")]
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[validate(custom = "not_blank")]
    pub city: String,
    #[validate(custom = "not_blank")]
    pub postal_code: String,
    #[serde(default = "default_country")]
    #[validate(custom = "not_blank")]
    pub country: String,
}

/// Largest total the `orders.total_price` column can hold
fn max_order_total() -> Decimal {
    Decimal::new(999_999_999_999, 2)
}

fn default_country() -> String {
    "Cambodia".to_string()
}

pub(crate) fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank"));
    }
    Ok(())
}

impl From<&OrderModel> for ShippingAddress {
    fn from(order: &OrderModel) -> Self {
        Self {
            name: order.shipping_name.clone(),
            address_line1: order.shipping_address_line1.clone(),
            address_line2: order.shipping_address_line2.clone(),
            city: order.shipping_city.clone(),
            postal_code: order.shipping_postal_code.clone(),
            country: order.shipping_country.clone(),
        }
    }
}

/// Order header to persist; the total is derived from the line items.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
}

/// Line item with the catalog price frozen at purchase time
#[derive(Debug, Clone, PartialEq)]
pub struct NewLineItem {
    pub product_id: Uuid,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
    pub color: String,
    pub size: String,
}

impl NewLineItem {
    pub fn subtotal(&self) -> Decimal {
        self.price_at_purchase * Decimal::from(self.quantity)
    }
}

/// A stored line item with the current catalog name of its product
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub item: OrderItemModel,
    pub product_name: Option<String>,
}

impl From<(OrderItemModel, Option<ProductModel>)> for OrderLine {
    fn from((item, product): (OrderItemModel, Option<ProductModel>)) -> Self {
        Self {
            item,
            product_name: product.map(|p| p.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderWithItems {
    pub order: OrderModel,
    pub items: Vec<OrderLine>,
}

/// Paid and delivered sales for one UTC calendar day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyIncome {
    pub date: NaiveDate,
    pub total_sales: Decimal,
}

/// Durable record of orders and their line items
#[derive(Clone)]
pub struct OrderLedger {
    db: Arc<DbPool>,
}

impl OrderLedger {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    /// Writes the order header and its items on `conn`.
    ///
    /// Callers pass a transaction so a failing item discards the header too.
    #[instrument(skip_all, fields(user_id = %new_order.user_id, items = items.len()))]
    pub async fn insert_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        new_order: NewOrder,
        items: &[NewLineItem],
    ) -> Result<OrderModel, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "An order needs at least one item".to_string(),
            ));
        }

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let total_price: Decimal = items.iter().map(NewLineItem::subtotal).sum();
        if total_price > max_order_total() {
            return Err(ServiceError::ValidationError(format!(
                "Order total {total_price} exceeds the maximum of {}",
                max_order_total()
            )));
        }
        let address = new_order.shipping_address;

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(new_order.user_id),
            total_price: Set(total_price),
            shipping_name: Set(address.name),
            shipping_address_line1: Set(address.address_line1),
            shipping_address_line2: Set(address.address_line2),
            shipping_city: Set(address.city),
            shipping_postal_code: Set(address.postal_code),
            shipping_country: Set(address.country),
            status: Set(OrderStatus::Pending),
            payment_method: Set(new_order.payment_method),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order in database");
            ServiceError::DatabaseError(e)
        })?;

        for item in items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                price_at_purchase: Set(item.price_at_purchase),
                color_at_purchase: Set(item.color.clone()),
                size_at_purchase: Set(item.size.clone()),
            }
            .insert(conn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, product_id = %item.product_id, "Failed to create order item");
                ServiceError::DatabaseError(e)
            })?;
        }

        debug!(order_id = %order_id, total_price = %total_price, "Order rows written");
        Ok(order)
    }

    pub async fn find(&self, order_id: Uuid) -> Result<Option<OrderModel>, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(self.db())
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })
    }

    /// Loads an order only if `user_id` owns it; otherwise reports it missing.
    pub async fn find_owned(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(self.db())
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(ORDER_NOT_FOUND.to_string()))
    }

    pub async fn items(&self, order_id: Uuid) -> Result<Vec<OrderLine>, ServiceError> {
        Ok(OrderItemEntity::find()
            .find_also_related(ProductEntity)
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(self.db())
            .await
            .map_err(ServiceError::DatabaseError)?
            .into_iter()
            .map(OrderLine::from)
            .collect())
    }

    /// Moves `order_id` to `to` only if its current status is one of `allowed_from`.
    ///
    /// A single conditional `UPDATE`; returns whether a row changed.
    #[instrument(skip_all, fields(order_id = %order_id, to = %to))]
    pub async fn transition(
        &self,
        order_id: Uuid,
        to: OrderStatus,
        allowed_from: &[OrderStatus],
    ) -> Result<bool, ServiceError> {
        if allowed_from.is_empty() {
            return Ok(false);
        }

        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(to))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.is_in(allowed_from.iter().copied()))
            .exec(self.db())
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to update order status");
                ServiceError::DatabaseError(e)
            })?;

        Ok(result.rows_affected == 1)
    }

    /// Every order, newest first (admin view)
    pub async fn list_all(&self) -> Result<Vec<OrderWithItems>, ServiceError> {
        let orders = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db())
            .await
            .map_err(ServiceError::DatabaseError)?;
        self.attach_items(orders).await
    }

    /// The customer's own orders, newest first
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderWithItems>, ServiceError> {
        let orders = OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(self.db())
            .await
            .map_err(ServiceError::DatabaseError)?;
        self.attach_items(orders).await
    }

    async fn attach_items(
        &self,
        orders: Vec<OrderModel>,
    ) -> Result<Vec<OrderWithItems>, ServiceError> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut by_order: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in OrderItemEntity::find()
            .find_also_related(ProductEntity)
            .filter(order_item::Column::OrderId.is_in(ids))
            .all(self.db())
            .await
            .map_err(ServiceError::DatabaseError)?
        {
            let line = OrderLine::from(row);
            by_order.entry(line.item.order_id).or_default().push(line);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                OrderWithItems { order, items }
            })
            .collect())
    }

    /// Sums paid and delivered orders per UTC day of creation, oldest day first.
    pub async fn income_report(&self) -> Result<Vec<DailyIncome>, ServiceError> {
        let orders = OrderEntity::find()
            .filter(order::Column::Status.is_in([OrderStatus::Paid, OrderStatus::Delivered]))
            .all(self.db())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load orders for income report");
                ServiceError::DatabaseError(e)
            })?;

        let mut per_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();
        for order in orders {
            *per_day.entry(order.created_at.date_naive()).or_default() += order.total_price;
        }

        Ok(per_day
            .into_iter()
            .map(|(date, total_sales)| DailyIncome { date, total_sales })
            .collect())
    }
}
