#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use rsa::{
    pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding},
    RsaPrivateKey,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use serde_json::{json, Value};
use storefront_api::{
    auth::{AuthConfig, AuthService, Claims},
    config::{AppConfig, PaymentGatewayConfig},
    db,
    entities::{order, product, product_variant, OrderStatus},
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        payment_gateway::{sign_base64, PayWayGateway, PaymentGateway},
        reconciler::SIGNATURE_HEADER,
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const QR_PAYLOAD: &str = "00020101021230510016abaakhppxxx@abaa01151250519140330120208ABA Bank";

static MERCHANT_KEY: Lazy<RsaPrivateKey> = Lazy::new(generate_key);
static PROCESSOR_KEY: Lazy<RsaPrivateKey> = Lazy::new(generate_key);

fn generate_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("rsa keygen")
}

/// Helper harness for spinning up the router against an in-memory SQLite database
/// and a stubbed PayWay API.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub payway: MockServer,
    pub user_id: Uuid,
    pub other_user_id: Uuid,
    pub admin_id: Uuid,
    user_token: String,
    other_token: String,
    admin_token: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let payway = MockServer::start().await;

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            5000,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment = PaymentGatewayConfig {
            api_url: payway.uri(),
            merchant_id: "ec000123".to_string(),
            public_api_key: "test-public-api-key".to_string(),
            private_key_pem: MERCHANT_KEY
                .to_pkcs8_pem(LineEnding::LF)
                .expect("encode merchant key")
                .to_string(),
            processor_public_key_pem: PROCESSOR_KEY
                .to_public_key()
                .to_public_key_pem(LineEnding::LF)
                .expect("encode processor key"),
            request_timeout_secs: 5,
        };

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let gateway: Arc<dyn PaymentGateway> =
            Arc::new(PayWayGateway::from_config(&cfg.payment).expect("gateway config is complete"));

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let services = AppServices::new(db_arc.clone(), gateway, event_sender);

        let state = AppState {
            db: db_arc,
            config: cfg.clone(),
            services,
            auth: auth_service,
        };
        let router = storefront_api::build_router(state.clone());

        let user_id = Uuid::new_v4();
        let other_user_id = Uuid::new_v4();
        let admin_id = Uuid::new_v4();

        Self {
            router,
            user_token: mint_token(&cfg, user_id, &[]),
            other_token: mint_token(&cfg, other_user_id, &[]),
            admin_token: mint_token(&cfg, admin_id, &["admin"]),
            state,
            payway,
            user_id,
            other_user_id,
            admin_id,
            _event_task: event_task,
        }
    }

    pub fn user_token(&self) -> &str {
        &self.user_token
    }

    pub fn other_token(&self) -> &str {
        &self.other_token
    }

    pub fn admin_token(&self) -> &str {
        &self.admin_token
    }

    /// The processor answers every purchase with `QR_PAYLOAD`.
    pub async fn payway_issues_qr(&self) {
        Mock::given(method("POST"))
            .and(path("/payments/purchase"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "qr_code": QR_PAYLOAD,
                "status": { "code": "00", "message": "Success." }
            })))
            .mount(&self.payway)
            .await;
    }

    /// The processor rejects every purchase with `status`.
    pub async fn payway_fails(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/payments/purchase"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "status": { "code": "1", "message": "Service temporarily unavailable" }
            })))
            .mount(&self.payway)
            .await;
    }

    /// JSON bodies of every purchase request the processor received
    pub async fn purchase_requests(&self) -> Vec<Value> {
        self.payway
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == "/payments/purchase")
            .map(|r| serde_json::from_slice(&r.body).expect("purchase body is json"))
            .collect()
    }

    pub async fn seed_product(&self, price: Decimal, stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        product::ActiveModel {
            id: Set(id),
            name: Set(format!("Oversized Tee {}", &id.to_string()[..8])),
            price: Set(price),
            stock_quantity: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed product");
        id
    }

    pub async fn set_product_price(&self, product_id: Uuid, price: Decimal) {
        let mut product: product::ActiveModel = product::Entity::find_by_id(product_id)
            .one(self.state.db.as_ref())
            .await
            .expect("load product")
            .expect("product exists")
            .into();
        product.price = Set(price);
        product.updated_at = Set(Utc::now());
        product
            .update(self.state.db.as_ref())
            .await
            .expect("update product price");
    }

    pub async fn seed_variant(&self, product_id: Uuid, color: &str, size: &str, stock: i32) {
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            color: Set(color.to_string()),
            size: Set(size.to_string()),
            stock_quantity: Set(stock),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed variant");
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(self.state.db.as_ref())
            .await
            .expect("count orders")
    }

    pub async fn stored_status(&self, order_id: Uuid) -> OrderStatus {
        self.state
            .services
            .ledger
            .find(order_id)
            .await
            .expect("load order")
            .expect("order exists")
            .status
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Posts a processor callback, optionally signed.
    pub async fn callback(&self, body: &Value, signature: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/orders/webhook/payment-complete")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        let request = builder
            .body(Body::from(serde_json::to_vec(body).expect("serialize callback")))
            .expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Places a KHQR order for the default user and returns its id.
    pub async fn place_khqr_order(&self, product_id: Uuid, quantity: i32) -> Uuid {
        let response = self
            .request(
                Method::POST,
                "/api/v1/orders/initiate-khqr",
                Some(checkout_body(product_id, quantity)),
                Some(self.user_token()),
            )
            .await;
        let body = json_body(response).await;
        body["orderId"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .unwrap_or_else(|| panic!("no orderId in {body}"))
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

fn mint_token(cfg: &AppConfig, user_id: Uuid, roles: &[&str]) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email: Some(format!("{user_id}@example.com")),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        iat: now,
        exp: now + 3600,
        iss: cfg.jwt_issuer.clone(),
        aud: cfg.jwt_audience.clone(),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )
    .expect("encode access token")
}

/// Signature the processor would send for this callback
pub fn processor_signature(tran_id: &str, apv: &str, status: &str) -> String {
    sign_base64(&PROCESSOR_KEY, &format!("{tran_id}{apv}{status}"))
}

pub fn shipping_address() -> Value {
    json!({
        "name": "Sokha Chan",
        "addressLine1": "No. 12, Street 240",
        "city": "Phnom Penh",
        "postalCode": "12207",
        "country": "Cambodia"
    })
}

pub fn checkout_body(product_id: Uuid, quantity: i32) -> Value {
    json!({
        "cartItems": [
            { "productId": product_id, "quantity": quantity, "color": "Black", "size": "M" }
        ],
        "shippingAddress": shipping_address()
    })
}

/// Reads a money field whether it was serialized as a string or a number.
pub fn decimal_field(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        other => other.to_string().parse().expect("decimal number"),
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
        .to_vec()
}

pub async fn json_body(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).expect("parse response body")
}

pub async fn text_body(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).expect("utf-8 body")
}
