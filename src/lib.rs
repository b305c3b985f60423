//! Storefront API Library
//!
//! Order placement and KHQR payment confirmation for the storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::auth::{AuthRouterExt, AuthService, ADMIN_ROLE};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    // Customer routes: any authenticated user, ownership enforced in the services
    let customer = Router::new()
        .route(
            "/orders/initiate-khqr",
            post(handlers::orders::initiate_khqr_checkout),
        )
        .route("/orders/cod", post(handlers::orders::place_cod_order))
        .route(
            "/orders/status/:order_id",
            get(handlers::orders::get_order_status),
        )
        .route("/orders/my-orders", get(handlers::orders::my_orders))
        .route(
            "/orders/:order_id/khqr",
            post(handlers::orders::retry_khqr_payment),
        )
        .with_auth();

    let admin = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route(
            "/orders/:order_id/status",
            put(handlers::orders::update_order_status),
        )
        .route(
            "/orders/reports/income",
            get(handlers::orders::income_report),
        )
        .with_role(ADMIN_ROLE);

    // Payment webhook (does not require auth, but signature-verified)
    let payment_webhook = Router::new().route(
        "/orders/webhook/payment-complete",
        post(handlers::payment_webhooks::payment_complete_webhook),
    );

    Router::new()
        .route("/status", get(api_status))
        .nest("/health", health::health_routes())
        .merge(customer)
        .merge(admin)
        .merge(payment_webhook)
}

/// Full application router with request id, tracing and auth wiring.
///
/// CORS and compression are left to the binary since they depend on deployment.
pub fn build_router(state: AppState) -> Router {
    let auth_service = state.auth.clone();

    Router::new()
        .route("/", get(|| async { "storefront-api up" }))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        // Inject AuthService into request extensions for auth middleware
        .layer(Extension(auth_service))
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> Json<ApiResponse<Value>> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git": option_env!("GIT_HASH").unwrap_or("unknown"),
        "service": "storefront-api",
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
    });

    Json(ApiResponse::success(status_data))
}
