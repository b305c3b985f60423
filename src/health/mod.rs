/*!
 * # Health Check Module
 *
 * - Readiness check (`/health`) - pings the database
 * - Liveness check (`/health/live`) - process is up
 * - Version (`/health/version`) - build information
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

use crate::AppState;

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Health check detail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub details: HashMap<String, HealthDetail>,
}

/// Probes every backing component
pub async fn check_components(db: &DatabaseConnection) -> HealthInfo {
    let mut details = HashMap::new();

    let database = match crate::db::check_connection(db).await {
        Ok(()) => HealthDetail {
            status: HealthStatus::Up,
            message: None,
            timestamp: Utc::now(),
        },
        Err(e) => {
            debug!(error = %e, "Database health check failed");
            HealthDetail {
                status: HealthStatus::Down,
                message: Some("database unreachable".to_string()),
                timestamp: Utc::now(),
            }
        }
    };
    details.insert("database".to_string(), database);

    let status = if details.values().any(|d| d.status == HealthStatus::Down) {
        HealthStatus::Down
    } else {
        HealthStatus::Up
    };

    HealthInfo {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        details,
    }
}

/// Returns build and version information
pub async fn version_info() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "commit": option_env!("GIT_HASH").unwrap_or("unknown"),
        "built": option_env!("BUILD_TIME").unwrap_or("unknown"),
    }))
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Readiness check endpoint called");

    let health = check_components(&state.db).await;
    let status_code = match health.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Liveness check endpoint
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "alive": true,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(readiness_check))
        .route("/live", get(liveness_check))
        .route("/version", get(version_info))
}
