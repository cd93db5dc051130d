use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use super::{api_error, AppState};
use crate::error::AppError;
use crate::middleware::error::success_response;
use crate::services::currency_converter::{self, format_currency, Currency};
use crate::services::live_price::{CacheStatus, MarketSummary};
use crate::services::pricing::RateQuote;

/// Query parameters for the rate endpoints
#[derive(Debug, Deserialize)]
pub struct RatesQuery {
    /// Use this merchant's USDT/NGN rate instead of the platform default
    pub merchant_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct LiveRatesResponse {
    pub market: MarketSummary,
    pub quote: RateQuote,
    pub cache: CacheStatus,
}

#[derive(Debug, Serialize)]
pub struct ExchangeRatesResponse {
    /// NGN per SUI used when live pricing is off
    pub static_rate: BigDecimal,
    pub static_rate_formatted: String,
    pub live: RateQuote,
    pub live_rate_formatted: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertBody {
    /// JSON number or numeric string
    pub amount: Value,
    pub from: String,
    pub to: String,
    pub merchant_id: Option<Uuid>,
    #[serde(default)]
    pub live: bool,
}

/// GET /api/rates/live
pub async fn live_rates(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RatesQuery>,
) -> Result<Json<Value>, AppError> {
    let quote = state
        .pricing
        .quote(query.merchant_id)
        .await
        .map_err(api_error(&headers))?;
    let oracle = state.pricing.oracle();

    Ok(success_response(LiveRatesResponse {
        market: oracle.market_summary().await,
        quote,
        cache: oracle.cache_status().await,
    }))
}

/// GET /api/rates/exchange
pub async fn exchange_rates(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<RatesQuery>,
) -> Result<Json<Value>, AppError> {
    let static_rate = state.pricing.static_rate().await;
    let live = state
        .pricing
        .quote(query.merchant_id)
        .await
        .map_err(api_error(&headers))?;

    Ok(success_response(ExchangeRatesResponse {
        static_rate_formatted: format_currency(&static_rate, Currency::Ngn),
        static_rate,
        live_rate_formatted: format_currency(&live.sui_ngn, Currency::Ngn),
        live,
        timestamp: Utc::now(),
    }))
}

/// POST /api/rates/convert
pub async fn convert(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ConvertBody>,
) -> Result<Json<Value>, AppError> {
    let amount = currency_converter::parse_amount(&body.amount).map_err(api_error(&headers))?;
    let from = Currency::from_str(&body.from).map_err(api_error(&headers))?;
    let to = Currency::from_str(&body.to).map_err(api_error(&headers))?;

    let conversion = state
        .pricing
        .convert(&amount, from, to, body.merchant_id, body.live)
        .await
        .map_err(api_error(&headers))?;

    Ok(success_response(conversion))
}
