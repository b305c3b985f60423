use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{OrderStatus, PaymentMethod},
    errors::{CheckoutError, ServiceError},
    services::{
        checkout::{PlaceOrderRequest, PlacedOrder},
        orders::{OrderLine, OrderWithItems, ShippingAddress},
        payment_gateway::format_amount,
    },
    ApiResponse, AppState,
};

fn parse_status(raw: &str) -> Result<OrderStatus, ServiceError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pending" => Ok(OrderStatus::Pending),
        "paid" => Ok(OrderStatus::Paid),
        "shipped" => Ok(OrderStatus::Shipped),
        "delivered" => Ok(OrderStatus::Delivered),
        "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
        other => Err(ServiceError::InvalidStatus(format!(
            "Unknown order status: {other}"
        ))),
    }
}

// Order DTOs
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct KhqrCheckoutResponse {
    pub order_id: Uuid,
    pub qr_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CodCheckoutResponse {
    pub order_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderStatusResponse {
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    /// Current catalog name; the price, color and size are frozen at purchase
    pub product_name: Option<String>,
    pub quantity: i32,
    pub price_at_purchase: Decimal,
    pub color: String,
    pub size: String,
}

impl From<OrderLine> for OrderItemResponse {
    fn from(OrderLine { item, product_name }: OrderLine) -> Self {
        Self {
            id: item.id,
            product_id: item.product_id,
            product_name,
            quantity: item.quantity,
            price_at_purchase: item.price_at_purchase,
            color: item.color_at_purchase,
            size: item.size_at_purchase,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub total_price: Decimal,
    pub shipping_address: ShippingAddress,
    pub item_count: usize,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderWithItems> for OrderResponse {
    fn from(OrderWithItems { order, items }: OrderWithItems) -> Self {
        Self {
            shipping_address: ShippingAddress::from(&order),
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            payment_method: order.payment_method,
            total_price: order.total_price,
            item_count: items.len(),
            items: items.into_iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncomeReportEntry {
    /// UTC calendar day, `YYYY-MM-DD`
    pub date: String,
    /// Two-decimal amount string
    pub total_sales: String,
}

fn qr_response(placed: PlacedOrder) -> Result<KhqrCheckoutResponse, CheckoutError> {
    let order_id = placed.order_id;
    let qr_code = placed.qr_code.ok_or_else(|| CheckoutError {
        order_id: Some(order_id),
        source: ServiceError::InternalError("QR checkout finished without a QR code".to_string()),
    })?;
    Ok(KhqrCheckoutResponse { order_id, qr_code })
}

/// Start a KHQR checkout
#[utoipa::path(
    post,
    path = "/api/v1/orders/initiate-khqr",
    summary = "Start KHQR checkout",
    description = "Create a pending order priced from the catalog and return a KHQR payload for it",
    request_body = PlaceOrderRequest,
    responses(
        (status = 200, description = "Order created and QR issued", body = KhqrCheckoutResponse,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid cart or address", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor unavailable; body carries the pending orderId", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn initiate_khqr_checkout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<Json<KhqrCheckoutResponse>, CheckoutError> {
    let placed = state
        .services
        .checkout
        .place_order(auth_user.user_id, request, PaymentMethod::QrPush)
        .await?;
    Ok(Json(qr_response(placed)?))
}

/// Place a cash-on-delivery order
#[utoipa::path(
    post,
    path = "/api/v1/orders/cod",
    summary = "Place COD order",
    request_body = PlaceOrderRequest,
    responses(
        (status = 201, description = "Order created", body = CodCheckoutResponse,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid cart or address", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn place_cod_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, CheckoutError> {
    let placed = state
        .services
        .checkout
        .place_order(auth_user.user_id, request, PaymentMethod::Cod)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CodCheckoutResponse {
            order_id: placed.order_id,
        }),
    ))
}

/// Poll the status of one of the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders/status/{orderId}",
    params(("orderId" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Current status", body = OrderStatusResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn get_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<OrderStatusResponse>, ServiceError> {
    let status = state
        .services
        .reconciler
        .poll_status(order_id, auth_user.user_id)
        .await?;
    Ok(Json(OrderStatusResponse { status }))
}

/// Re-issue the QR for a pending KHQR order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{orderId}/khqr",
    params(("orderId" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "QR issued for the stored order total", body = KhqrCheckoutResponse),
        (status = 400, description = "Order is not a pending KHQR order", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn retry_khqr_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<KhqrCheckoutResponse>, CheckoutError> {
    let placed = state
        .services
        .checkout
        .retry_qr_payment(auth_user.user_id, order_id)
        .await?;
    Ok(Json(qr_response(placed)?))
}

/// The caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders/my-orders",
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "orders"
)]
pub async fn my_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state
        .services
        .ledger
        .list_for_user(auth_user.user_id)
        .await?
        .into_iter()
        .map(OrderResponse::from)
        .collect();
    Ok(Json(ApiResponse::success(orders)))
}

/// Every order, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn list_orders(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state
        .services
        .ledger
        .list_all()
        .await?
        .into_iter()
        .map(OrderResponse::from)
        .collect();
    Ok(Json(ApiResponse::success(orders)))
}

/// Manual status override
#[utoipa::path(
    put,
    path = "/api/v1/orders/{orderId}/status",
    params(("orderId" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Order status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Unknown status or illegal transition", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let status = parse_status(&request.status)?;
    let order = state
        .services
        .order_status
        .update_status(order_id, status)
        .await?;
    let items = state.services.ledger.items(order.id).await?;

    Ok(Json(ApiResponse::success(OrderResponse::from(
        OrderWithItems { order, items },
    ))))
}

/// Paid and delivered sales per day
#[utoipa::path(
    get,
    path = "/api/v1/orders/reports/income",
    responses(
        (status = 200, description = "Daily income, oldest day first", body = ApiResponse<Vec<IncomeReportEntry>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "admin"
)]
pub async fn income_report(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<IncomeReportEntry>>>, ServiceError> {
    let report = state
        .services
        .ledger
        .income_report()
        .await?
        .into_iter()
        .map(|day| IncomeReportEntry {
            date: day.date.format("%Y-%m-%d").to_string(),
            total_sales: format_amount(day.total_sales),
        })
        .collect();
    Ok(Json(ApiResponse::success(report)))
}
