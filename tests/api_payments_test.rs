//! Integration tests for the payment link lifecycle
//!
//! Tests cover:
//! - Creating NGN and SUI priced payments
//! - Amount limits and input validation
//! - On-chain verification, idempotency and duplicate digests
//! - Side-effect dispatch after settlement
//! - Contract-mediated payments and product links

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{contract_transfer, dec, transfer, wallet, TestApp, BASE_URL};

fn decimal(value: &Value) -> bigdecimal::BigDecimal {
    dec(value.as_str().expect("decimal serialized as string"))
}

async fn create_naira_payment(app: &TestApp, amount: &str) -> Value {
    let (status, body) = app
        .post(
            "/api/payments",
            json!({
                "merchant_id": app.merchant.id,
                "amount": amount,
                "currency": "NGN",
                "description": "Order #1",
                "reference": "order-1",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"].clone()
}

#[tokio::test]
async fn test_create_payment_prices_naira_at_static_rate() {
    let app = TestApp::new().await;

    let data = create_naira_payment(&app, "150000").await;

    assert_eq!(decimal(&data["amounts"]["sui"]), dec("100"));
    assert_eq!(decimal(&data["amounts"]["naira"]), dec("150000"));
    assert_eq!(data["amounts"]["blockchain"], "100000000000");
    assert_eq!(data["amounts"]["display"], "100.000000 SUI");
    assert_eq!(decimal(&data["exchange_rate"]), dec("1500"));
    assert_eq!(data["recipient_address"], wallet('1'));
    assert_eq!(data["mode"], "direct_transfer");

    let link = data["payment_link"].as_str().unwrap();
    assert_eq!(
        link,
        format!("{}/pay/{}", BASE_URL, data["payment_id"].as_str().unwrap())
    );
}

#[tokio::test]
async fn test_create_payment_accepts_numeric_sui_amount() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/api/payments",
            json!({ "merchant_id": app.merchant.id, "amount": 2, "currency": "SUI" }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&body["data"]["amounts"]["sui"]), dec("2"));
    assert_eq!(decimal(&body["data"]["amounts"]["naira"]), dec("3000"));
}

#[tokio::test]
async fn test_create_payment_rejects_bad_input() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/api/payments",
            json!({ "merchant_id": app.merchant.id, "amount": "49.99" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_AMOUNT");
    assert_eq!(body["success"], Value::Null);

    let (status, _) = app
        .post(
            "/api/payments",
            json!({ "merchant_id": app.merchant.id, "amount": "10000000.01" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/api/payments",
            json!({ "merchant_id": app.merchant.id, "amount": "1000", "currency": "EUR" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_CURRENCY");

    let (status, body) = app
        .post(
            "/api/payments",
            json!({ "merchant_id": app.merchant.id, "amount": "abc" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_AMOUNT");

    let (status, body) = app.post("/api/payments", json!({ "amount": "1000" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, _) = app
        .post("/api/payments", json!({ "merchant_id": app.merchant.id }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_payment_for_unknown_merchant() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/api/payments",
            json!({ "merchant_id": uuid::Uuid::new_v4(), "amount": "1000" }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "MERCHANT_NOT_FOUND");
}

#[tokio::test]
async fn test_verify_settles_payment_and_dispatches_side_effects() {
    let app = TestApp::new().await;
    let data = create_naira_payment(&app, "150000").await;
    let payment_id = data["payment_id"].as_str().unwrap().to_string();

    // 99.9995 SUI is within the 0.001 SUI tolerance of 100
    app.chain.insert(transfer("digest-ok", &wallet('1'), 99_999_500_000));

    let (status, body) = app
        .post(
            &format!("/api/payments/{}/verify", payment_id),
            json!({
                "transaction_hash": "digest-ok",
                "customer_address": wallet('c'),
                "customer_email": "buyer@example.com",
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["already_verified"], false);
    assert_eq!(body["data"]["payment"]["status"], "paid");
    assert_eq!(body["data"]["payment"]["transaction_hash"], "digest-ok");
    assert_eq!(body["data"]["verification"]["confirmation"], "balance_change");
    assert!(body["data"].get("outbox").is_none());

    app.settle_outbox(2).await;
    let emails = app.outbox.emails.lock().unwrap().clone();
    let recipients: Vec<&str> = emails.iter().map(|m| m.to.as_str()).collect();
    assert!(recipients.contains(&"buyer@example.com"));
    assert!(recipients.contains(&"owner@ada.example"));

    let webhooks = app.outbox.webhooks.lock().unwrap().clone();
    assert_eq!(webhooks.len(), 1);
    assert_eq!(webhooks[0].0, "https://ada.example/hooks");
    assert_eq!(webhooks[0].1.txn.as_deref(), Some("digest-ok"));

    let (status, body) = app.get(&format!("/api/payments/{}", payment_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["payment"]["customer_email"], "buyer@example.com");
}

#[tokio::test]
async fn test_verify_is_idempotent() {
    let app = TestApp::new().await;
    let data = create_naira_payment(&app, "150000").await;
    let uri = format!("/api/payments/{}/verify", data["payment_id"].as_str().unwrap());
    app.chain.insert(transfer("digest-once", &wallet('1'), 100_000_000_000));

    let (status, _) = app
        .post(&uri, json!({ "transaction_hash": "digest-once" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    app.settle_outbox(1).await;

    let (status, body) = app
        .post(&uri, json!({ "transaction_hash": "digest-once" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["already_verified"], true);
    assert_eq!(body["data"]["verification"], Value::Null);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(app.outbox.webhooks.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_underpayment_leaves_payment_pending() {
    let app = TestApp::new().await;
    let data = create_naira_payment(&app, "150000").await;
    let payment_id = data["payment_id"].as_str().unwrap();
    app.chain.insert(transfer("digest-short", &wallet('1'), 95_000_000_000));

    let (status, body) = app
        .post(
            &format!("/api/payments/{}/verify", payment_id),
            json!({ "transaction_hash": "digest-short" }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "AMOUNT_MISMATCH");

    let (_, body) = app.get(&format!("/api/payments/{}", payment_id)).await;
    assert_eq!(body["data"]["status"], "pending");
    assert!(app.outbox.webhooks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_verify_reports_unknown_and_missing_digest() {
    let app = TestApp::new().await;
    let data = create_naira_payment(&app, "1500").await;
    let uri = format!("/api/payments/{}/verify", data["payment_id"].as_str().unwrap());

    let (status, body) = app
        .post(&uri, json!({ "transaction_hash": "not-on-chain" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "TRANSACTION_NOT_FOUND");

    let (status, _) = app.post(&uri, json!({ "transaction_hash": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            &format!("/api/payments/{}/verify", uuid::Uuid::new_v4()),
            json!({ "transaction_hash": "anything" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "PAYMENT_NOT_FOUND");
}

#[tokio::test]
async fn test_digest_cannot_settle_two_payments() {
    let app = TestApp::new().await;
    let first = create_naira_payment(&app, "1500").await;
    let second = create_naira_payment(&app, "1500").await;
    app.chain.insert(transfer("digest-shared", &wallet('1'), 1_000_000_000));

    let (status, _) = app
        .post(
            &format!("/api/payments/{}/verify", first["payment_id"].as_str().unwrap()),
            json!({ "transaction_hash": "digest-shared" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .post(
            &format!("/api/payments/{}/verify", second["payment_id"].as_str().unwrap()),
            json!({ "transaction_hash": "digest-shared" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "DUPLICATE_TRANSACTION");
}

#[tokio::test]
async fn test_contract_mediated_payment() {
    let app = TestApp::with_options(true).await;

    let (status, body) = app
        .post(
            "/api/payments",
            json!({
                "merchant_id": app.merchant.id,
                "amount": "0.5",
                "currency": "SUI",
                "mode": "contract_mediated",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["data"]["recipient_address"], wallet('2'));
    let payment_id = body["data"]["payment_id"].as_str().unwrap().to_string();

    // Merchant receives 0.5 - 0.01 admin fee
    app.chain
        .insert(contract_transfer("digest-contract", &wallet('2'), 490_000_000));

    let (status, body) = app
        .post(
            &format!("/api/payments/{}/verify", payment_id),
            json!({ "transaction_hash": "digest-contract" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let details = &body["data"]["payment"]["contract_details"];
    assert_eq!(decimal(&details["admin_fee"]), dec("0.01"));
    assert_eq!(decimal(&details["merchant_received"]), dec("0.49"));
}

#[tokio::test]
async fn test_contract_mode_requires_merchant_opt_in() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/api/payments",
            json!({
                "merchant_id": app.merchant.id,
                "amount": "0.5",
                "currency": "SUI",
                "mode": "smart_contract",
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_receipt_requires_paid_payment() {
    let app = TestApp::new().await;
    let data = create_naira_payment(&app, "1500").await;
    let payment_id = data["payment_id"].as_str().unwrap().to_string();
    let receipt_uri = format!("/api/payments/{}/receipt", payment_id);

    let (status, body) = app
        .post(&receipt_uri, json!({ "email": "buyer@example.com" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "PAYMENT_NOT_COMPLETED");

    app.chain.insert(transfer("digest-r", &wallet('1'), 1_000_000_000));
    let (status, _) = app
        .post(
            &format!("/api/payments/{}/verify", payment_id),
            json!({ "transaction_hash": "digest-r" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    app.settle_outbox(1).await;
    let before = app.outbox.emails.lock().unwrap().len();

    let (status, body) = app
        .post(&receipt_uri, json!({ "email": "friend@example.com" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sent"], true);

    let emails = app.outbox.emails.lock().unwrap().clone();
    assert_eq!(emails.len(), before + 1);
    assert_eq!(emails.last().unwrap().to, "friend@example.com");

    let (status, _) = app
        .post(&receipt_uri, json!({ "email": "not-an-email" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_product_payment_redirects_after_verification() {
    let app = TestApp::new().await;

    let (status, body) = app
        .owner_post(
            "/api/products",
            json!({
                "merchant_id": app.merchant.id,
                "name": "Ankara tote",
                "price_in_sui": "2.5",
                "redirect_url": "https://ada.example/thanks",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let product_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post("/api/payments", json!({ "product_id": product_id }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(decimal(&body["data"]["amounts"]["sui"]), dec("2.5"));
    let payment_id = body["data"]["payment_id"].as_str().unwrap().to_string();

    app.chain.insert(transfer("digest-product", &wallet('1'), 2_500_000_000));
    let (status, body) = app
        .post(
            &format!("/api/payments/{}/verify", payment_id),
            json!({ "txnHash": "digest-product" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(
        body["data"]["redirect_url"],
        format!("https://ada.example/thanks?paymentId={}", payment_id)
    );
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::new().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/payments/not-a-uuid")
                .header("x-request-id", "req-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}
