use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "1.0.0",
        description = r#"
# Storefront Orders API

Order placement and KHQR payment confirmation for the streetwear storefront.

## Authentication

Customer and admin endpoints take a JWT bearer token:

```
Authorization: Bearer <your-jwt-token>
```

The payment-complete webhook is called by the processor and is verified
with the `x-aba-signature` header instead.

## Error Handling

```json
{
  "error": "Bad Gateway",
  "message": "Payment provider is currently unavailable, please try again",
  "order_id": "5f0c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:5000", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Checkout and order tracking"),
        (name = "payments", description = "Payment processor callbacks"),
        (name = "admin", description = "Back-office order management")
    ),
    paths(
        crate::handlers::orders::initiate_khqr_checkout,
        crate::handlers::orders::place_cod_order,
        crate::handlers::orders::get_order_status,
        crate::handlers::orders::retry_khqr_payment,
        crate::handlers::orders::my_orders,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::income_report,
        crate::handlers::payment_webhooks::payment_complete_webhook,
    ),
    components(
        schemas(
            crate::services::checkout::PlaceOrderRequest,
            crate::services::checkout::CartItem,
            crate::services::orders::ShippingAddress,
            crate::entities::OrderStatus,
            crate::entities::PaymentMethod,
            crate::handlers::orders::KhqrCheckoutResponse,
            crate::handlers::orders::CodCheckoutResponse,
            crate::handlers::orders::OrderStatusResponse,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::orders::OrderResponse,
            crate::handlers::orders::OrderItemResponse,
            crate::handlers::orders::IncomeReportEntry,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}
