use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, info};

use crate::{errors::ServiceError, services::reconciler::SIGNATURE_HEADER, AppState};

pub const WEBHOOK_ACK: &str = "Webhook received.";
pub const INVALID_SIGNATURE: &str = "Invalid signature.";

// POST /api/v1/orders/webhook/payment-complete
#[utoipa::path(
    post,
    path = "/api/v1/orders/webhook/payment-complete",
    request_body = String,
    params(("x-aba-signature" = String, Header, description = "Base64 RSA-SHA512 signature over tran_id, apv and status")),
    responses(
        (status = 200, description = "Webhook accepted", body = String),
        (status = 400, description = "Invalid signature or payload", body = String),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn payment_complete_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match state
        .services
        .reconciler
        .handle_processor_callback(&body, signature)
        .await
    {
        Ok(outcome) => {
            info!(?outcome, "Payment callback processed");
            (StatusCode::OK, WEBHOOK_ACK).into_response()
        }
        Err(ServiceError::SignatureInvalid) => {
            (StatusCode::BAD_REQUEST, INVALID_SIGNATURE).into_response()
        }
        Err(err) => {
            // Non-2xx makes the processor redeliver.
            error!(error = %err, "Payment callback could not be applied");
            err.into_response()
        }
    }
}
