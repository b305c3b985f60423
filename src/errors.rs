use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing JSON endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Not Found",
    "message": "Not found: Order not found",
    "request_id": "req-abc123xyz",
    "timestamp": "2025-07-14T10:30:00+00:00"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Not Found")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Order created before the failure, when there is one the client can retry against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("Invalid webhook signature")]
    SignatureInvalid,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidStatus(_) | Self::SignatureInvalid => {
                StatusCode::BAD_REQUEST
            }
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_) | Self::ConfigurationError(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::ConfigurationError(_) | Self::InternalError(_) => {
                "Internal server error".to_string()
            }
            Self::GatewayUnavailable(_) => {
                "Payment provider is currently unavailable, please try again".to_string()
            }
            _ => self.to_string(),
        }
    }

    fn error_response(&self, order_id: Option<String>) -> (StatusCode, ErrorResponse) {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            order_id,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, body)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, body) = self.error_response(None);
        (status, Json(body)).into_response()
    }
}

/// Failure of a checkout whose order row was already committed.
///
/// Carries the order id so the client can retry payment initiation for the
/// same order instead of placing a new one.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct CheckoutError {
    pub order_id: Option<uuid::Uuid>,
    #[source]
    pub source: ServiceError,
}

impl From<ServiceError> for CheckoutError {
    fn from(source: ServiceError) -> Self {
        Self {
            order_id: None,
            source,
        }
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let (status, body) = self
            .source
            .error_response(self.order_id.map(|id| id.to_string()));
        (status, Json(body)).into_response()
    }
}
