mod common;

use axum::http::{Method, StatusCode};
use rust_decimal_macros::dec;
use serde_json::json;
use storefront_api::entities::OrderStatus;
use uuid::Uuid;

use common::{checkout_body, decimal_field, json_body, TestApp};

async fn place_cod_order(app: &TestApp, product_id: Uuid, quantity: i32) -> Uuid {
    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/cod",
            Some(checkout_body(product_id, quantity)),
            Some(app.user_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    Uuid::parse_str(json_body(response).await["orderId"].as_str().unwrap()).unwrap()
}

async fn set_status(app: &TestApp, order_id: Uuid, status: &str) -> axum::response::Response {
    app.request(
        Method::PUT,
        &format!("/api/v1/orders/{order_id}/status"),
        Some(json!({ "status": status })),
        Some(app.admin_token()),
    )
    .await
}

#[tokio::test]
async fn admin_routes_reject_customers() {
    let app = TestApp::new().await;

    for (method, uri) in [
        (Method::GET, "/api/v1/orders".to_string()),
        (Method::GET, "/api/v1/orders/reports/income".to_string()),
        (
            Method::PUT,
            format!("/api/v1/orders/{}/status", Uuid::new_v4()),
        ),
    ] {
        let body = (method == Method::PUT).then(|| json!({ "status": "paid" }));
        let response = app
            .request(method.clone(), &uri, body.clone(), Some(app.user_token()))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{method} {uri}");

        let response = app.request(method.clone(), &uri, body, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn admin_lists_every_order_with_items() {
    let app = TestApp::new().await;
    let product_id = app.seed_product(dec!(19.99), 10).await;
    place_cod_order(&app, product_id, 1).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders/cod",
            Some(checkout_body(product_id, 2)),
            Some(app.other_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some(app.admin_token()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    let orders = body["data"].as_array().expect("order list");
    assert_eq!(orders.len(), 2);
    for order in orders {
        assert_eq!(order["status"], "pending");
        let items = order["items"].as_array().expect("items");
        assert_eq!(items.len(), 1);
        assert_eq!(decimal_field(&items[0]["priceAtPurchase"]), dec!(19.99));
        assert!(items[0]["productName"]
            .as_str()
            .is_some_and(|name| name.starts_with("Oversized Tee")));
    }
}

#[tokio::test]
async fn admin_walks_order_through_fulfilment() {
    let app = TestApp::new().await;
    let product_id = app.seed_product(dec!(30.00), 10).await;
    let order_id = place_cod_order(&app, product_id, 1).await;

    for (status, expected) in [
        ("paid", OrderStatus::Paid),
        ("SHIPPED", OrderStatus::Shipped),
        ("delivered", OrderStatus::Delivered),
    ] {
        let response = set_status(&app, order_id, status).await;
        assert_eq!(response.status(), StatusCode::OK, "moving to {status}");
        let body = json_body(response).await;
        assert_eq!(body["data"]["id"], order_id.to_string());
        assert_eq!(body["data"]["status"], expected.to_string());
        assert_eq!(app.stored_status(order_id).await, expected);
    }

    // Delivered is terminal
    let response = set_status(&app, order_id, "cancelled").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.stored_status(order_id).await, OrderStatus::Delivered);
}

#[tokio::test]
async fn admin_status_changes_are_validated() {
    let app = TestApp::new().await;
    let product_id = app.seed_product(dec!(30.00), 10).await;
    let order_id = place_cod_order(&app, product_id, 1).await;

    let response = set_status(&app, order_id, "delivered").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = set_status(&app, order_id, "refunded").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.stored_status(order_id).await, OrderStatus::Pending);

    let response = set_status(&app, Uuid::new_v4(), "paid").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = set_status(&app, order_id, "canceled").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.stored_status(order_id).await, OrderStatus::Cancelled);
}

#[tokio::test]
async fn income_report_counts_paid_and_delivered_orders() {
    let app = TestApp::new().await;
    let product_id = app.seed_product(dec!(50.00), 10).await;

    let paid = place_cod_order(&app, product_id, 2).await;
    let delivered = place_cod_order(&app, product_id, 1).await;
    let cancelled = place_cod_order(&app, product_id, 3).await;
    place_cod_order(&app, product_id, 4).await;

    assert_eq!(set_status(&app, paid, "paid").await.status(), StatusCode::OK);
    for status in ["paid", "shipped", "delivered"] {
        assert_eq!(
            set_status(&app, delivered, status).await.status(),
            StatusCode::OK
        );
    }
    assert_eq!(
        set_status(&app, cancelled, "cancelled").await.status(),
        StatusCode::OK
    );

    let response = app
        .request(
            Method::GET,
            "/api/v1/orders/reports/income",
            None,
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let report = body["data"].as_array().expect("report rows");
    assert_eq!(report.len(), 1);
    let date = report[0]["date"].as_str().expect("date");
    assert!(chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok());
    assert_eq!(report[0]["totalSales"], "150.00");
}

#[tokio::test]
async fn customers_cannot_touch_each_others_orders() {
    let app = TestApp::new().await;
    app.payway_issues_qr().await;
    let product_id = app.seed_product(dec!(50.00), 10).await;
    let order_id = app.place_khqr_order(product_id, 1).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/khqr"),
            None,
            Some(app.other_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::GET,
            "/api/v1/orders/my-orders",
            None,
            Some(app.other_token()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json_body(response).await["data"]
        .as_array()
        .expect("order list")
        .is_empty());
    assert_eq!(app.purchase_requests().await.len(), 1);
}

#[tokio::test]
async fn health_and_status_endpoints_respond() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/v1/health/live", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["service"], "storefront-api");
    assert_eq!(body["data"]["environment"], "test");
}
