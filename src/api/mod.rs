//! HTTP API
//!
//! Route table:
//!
//! - `GET  /health`, `/health/ready`, `/health/live`
//! - `/api/payments` create, status, verify, receipt
//! - `/api/rates` live quote, exchange rates, conversion
//! - `/api/merchants` registration; `/api/merchants/{id}` wallet info,
//!   settings, payments, rate settings
//! - `/api/products` create, list, get, delete
//!
//! Handlers that change merchant-owned data, and the merchant payment
//! listing, require the merchant's API key (see [`auth`]).

pub mod auth;
pub mod merchants;
pub mod payments;
pub mod products;
pub mod rates;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::database::merchant_repository::Merchant;
use crate::database::repository::{MerchantStore, ProductStore};
use crate::error::{AppError, DomainError};
use crate::health::HealthChecker;
use crate::middleware::error::get_request_id_from_headers;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::pricing::PricingService;
use crate::services::{PaymentOrchestrator, SideEffectDispatcher};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub pricing: Arc<PricingService>,
    pub merchants: Arc<dyn MerchantStore>,
    pub products: Arc<dyn ProductStore>,
    pub dispatcher: Arc<SideEffectDispatcher>,
    pub health: HealthChecker,
    /// Base URL for shareable product links
    pub public_base_url: String,
}

/// All routes, without middleware
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .route("/api/payments", post(payments::create_payment))
        .route("/api/payments/{id}", get(payments::get_payment))
        .route("/api/payments/{id}/verify", post(payments::verify_payment))
        .route("/api/payments/{id}/receipt", post(payments::send_receipt))
        .route("/api/rates/live", get(rates::live_rates))
        .route("/api/rates/exchange", get(rates::exchange_rates))
        .route("/api/rates/convert", post(rates::convert))
        .route("/api/merchants", post(merchants::create_merchant))
        .route("/api/merchants/{id}", get(merchants::get_merchant))
        .route("/api/merchants/{id}/settings", put(merchants::update_settings))
        .route("/api/merchants/{id}/wallet", post(merchants::set_wallet))
        .route("/api/merchants/{id}/payments", get(merchants::list_payments))
        .route("/api/merchants/{id}/rate-settings", get(merchants::get_rate_settings))
        .route(
            "/api/merchants/{id}/rate-settings/usdt-rate",
            put(merchants::set_usdt_rate),
        )
        .route(
            "/api/merchants/{id}/rate-settings/preferences",
            put(merchants::update_preferences),
        )
        .route(
            "/api/products",
            post(products::create_product).get(products::list_products),
        )
        .route(
            "/api/products/{id}",
            get(products::get_product).delete(products::delete_product),
        )
        .with_state(state)
}

/// Request id, request logging, CORS and tracing layers.
///
/// An empty origin list allows any origin.
pub fn with_middleware(router: Router, cors_allowed_origins: &[String]) -> Router {
    router
        .layer(cors_layer(cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(parsed)
    }
}

// ============================================================================
// Shared handler helpers
// ============================================================================

/// Convert a module error into an `AppError` tagged with the request id
pub(crate) fn api_error<E: Into<AppError>>(headers: &HeaderMap) -> impl Fn(E) -> AppError + '_ {
    move |err| {
        let err: AppError = err.into();
        match get_request_id_from_headers(headers) {
            Some(request_id) => err.with_request_id(request_id),
            None => err,
        }
    }
}

pub(crate) async fn load_merchant(
    state: &AppState,
    merchant_id: uuid::Uuid,
) -> Result<Merchant, AppError> {
    state
        .merchants
        .find_by_id(merchant_id)
        .await?
        .ok_or_else(|| {
            AppError::domain(DomainError::MerchantNotFound {
                merchant_id: merchant_id.to_string(),
            })
        })
}

// ============================================================================
// Health
// ============================================================================

async fn health(State(state): State<AppState>) -> Response {
    let status = state.health.check_health().await;
    let code = if status.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status)).into_response()
}

async fn readiness(State(state): State<AppState>) -> Response {
    let status = state.health.check_health().await;
    if status.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not ready", "checks": status.checks })),
        )
            .into_response()
    }
}

async fn liveness() -> Json<serde_json::Value> {
    Json(json!({ "status": "alive" }))
}
