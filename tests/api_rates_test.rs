//! Integration tests for the rates API endpoints
//!
//! Tests cover:
//! - Live market summary and quote
//! - Static versus live exchange rates
//! - Per-merchant USDT/NGN rates
//! - Conversion and its error handling

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{dec, TestApp};

#[tokio::test]
async fn test_live_rates_with_platform_default() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/rates/live").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["market"]["symbol"], "SUI/USDT");
    assert_eq!(data["market"]["source"], "fixed");
    assert_eq!(dec(data["quote"]["sui_usdt"].as_str().unwrap()), dec("2"));
    assert_eq!(dec(data["quote"]["usdt_ngn"].as_str().unwrap()), dec("1500"));
    assert_eq!(dec(data["quote"]["sui_ngn"].as_str().unwrap()), dec("3000"));
    assert_eq!(data["quote"]["merchant_id"], serde_json::Value::Null);
    assert_eq!(data["cache"]["has_cache"], true);
}

#[tokio::test]
async fn test_live_rates_use_merchant_rate() {
    let app = TestApp::new().await;
    let merchant_id = app.merchant.id;

    let (status, _) = app
        .owner_put(
            &format!("/api/merchants/{}/rate-settings/usdt-rate", merchant_id),
            json!({ "rate": "1600" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .get(&format!("/api/rates/live?merchant_id={}", merchant_id))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(body["data"]["quote"]["usdt_ngn"].as_str().unwrap()), dec("1600"));
    assert_eq!(dec(body["data"]["quote"]["sui_ngn"].as_str().unwrap()), dec("3200"));
}

#[tokio::test]
async fn test_exchange_rates() {
    let app = TestApp::new().await;

    let (status, body) = app.get("/api/rates/exchange").await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(dec(data["static_rate"].as_str().unwrap()), dec("1500"));
    assert_eq!(data["static_rate_formatted"], "₦1,500.00");
    assert_eq!(data["live_rate_formatted"], "₦3,000.00");
    assert_eq!(data["live"]["price_source"], "fresh");
}

#[tokio::test]
async fn test_convert_static_and_live() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/api/rates/convert",
            json!({ "amount": 3000, "from": "NGN", "to": "SUI" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(body["data"]["result"].as_str().unwrap()), dec("2"));
    assert_eq!(body["data"]["live"], false);

    let (status, body) = app
        .post(
            "/api/rates/convert",
            json!({ "amount": "3000", "from": "ngn", "to": "sui", "live": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(body["data"]["result"].as_str().unwrap()), dec("1"));
    assert_eq!(dec(body["data"]["rate"].as_str().unwrap()), dec("3000"));

    let (status, body) = app
        .post(
            "/api/rates/convert",
            json!({ "amount": "1.5", "from": "SUI", "to": "NGN" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(body["data"]["result"].as_str().unwrap()), dec("2250"));
    assert_eq!(body["data"]["formatted"], "₦2,250.00");
}

#[tokio::test]
async fn test_convert_rejects_invalid_input() {
    let app = TestApp::new().await;

    let (status, body) = app
        .post(
            "/api/rates/convert",
            json!({ "amount": 0, "from": "NGN", "to": "SUI" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_AMOUNT");

    let (status, body) = app
        .post(
            "/api/rates/convert",
            json!({ "amount": "-5", "from": "NGN", "to": "SUI" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_AMOUNT");

    let (status, body) = app
        .post(
            "/api/rates/convert",
            json!({ "amount": 10, "from": "NGN", "to": "GBP" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_CURRENCY");

    let (status, _) = app
        .post(
            "/api/rates/convert",
            json!({ "amount": 10, "from": "USDT", "to": "SUI" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
