//! Live Price Oracle
//!
//! SUI/USDT market price with a short-lived in-process cache. The oracle never
//! fails outward: when the provider is unreachable it serves the last known
//! price, and with no history at all a fixed fallback.

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Signed};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::env_or;
use crate::middleware::logging::log_external_call;

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("Price provider request failed: {0}")]
    Http(String),

    #[error("Price provider returned HTTP {status}")]
    Status { status: u16 },

    #[error("Invalid price received: {0}")]
    InvalidPrice(String),

    #[error("Price provider timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

pub type PriceResult<T> = Result<T, PriceError>;

impl From<reqwest::Error> for PriceError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => PriceError::Status {
                status: status.as_u16(),
            },
            None => PriceError::Http(err.to_string()),
        }
    }
}

/// 24h ticker statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTicker {
    pub last_price: BigDecimal,
    pub price_change: BigDecimal,
    pub price_change_percent: BigDecimal,
    pub high: BigDecimal,
    pub low: BigDecimal,
    pub volume: BigDecimal,
}

/// Source of SUI/USDT market data
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn fetch_price(&self) -> PriceResult<BigDecimal>;

    async fn fetch_market_summary(&self) -> PriceResult<MarketTicker>;

    fn name(&self) -> &str;
}

// ============================================================================
// Binance
// ============================================================================

#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    pub symbol: String,
    pub timeout: Duration,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            symbol: "SUIUSDT".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl BinanceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: env_or("BINANCE_API_URL", defaults.base_url),
            symbol: env_or("BINANCE_SYMBOL", defaults.symbol),
            timeout: Duration::from_secs(env_or("PRICE_TIMEOUT_SECS", 5)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    last_price: String,
    price_change: String,
    price_change_percent: String,
    high_price: String,
    low_price: String,
    volume: String,
}

fn parse_decimal(field: &str, raw: &str) -> PriceResult<BigDecimal> {
    BigDecimal::from_str(raw.trim())
        .map_err(|_| PriceError::InvalidPrice(format!("{}: '{}'", field, raw)))
}

fn parse_positive_price(raw: &str) -> PriceResult<BigDecimal> {
    let price = parse_decimal("price", raw)?;
    if !price.is_positive() {
        return Err(PriceError::InvalidPrice(raw.to_string()));
    }
    Ok(price)
}

/// Binance public REST ticker
pub struct BinancePriceProvider {
    client: Client,
    config: BinanceConfig,
}

impl BinancePriceProvider {
    pub fn new(config: BinanceConfig) -> PriceResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("SuiFlow-Payment-System/1.0")
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| PriceError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> PriceResult<T> {
        let url = format!(
            "{}{}?symbol={}",
            self.config.base_url.trim_end_matches('/'),
            path,
            self.config.symbol
        );
        let started = Instant::now();

        let result = timeout(self.config.timeout, async {
            let response = self.client.get(&url).send().await?.error_for_status()?;
            Ok::<T, PriceError>(response.json::<T>().await?)
        })
        .await;

        let outcome = match result {
            Ok(inner) => inner,
            Err(_) => Err(PriceError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }),
        };
        log_external_call("binance", path, started.elapsed(), outcome.is_ok());
        outcome
    }
}

#[async_trait]
impl PriceProvider for BinancePriceProvider {
    async fn fetch_price(&self) -> PriceResult<BigDecimal> {
        let ticker: TickerPrice = self.get_json("/api/v3/ticker/price").await?;
        parse_positive_price(&ticker.price)
    }

    async fn fetch_market_summary(&self) -> PriceResult<MarketTicker> {
        let ticker: Ticker24h = self.get_json("/api/v3/ticker/24hr").await?;
        Ok(MarketTicker {
            last_price: parse_positive_price(&ticker.last_price)?,
            price_change: parse_decimal("priceChange", &ticker.price_change)?,
            price_change_percent: parse_decimal(
                "priceChangePercent",
                &ticker.price_change_percent,
            )?,
            high: parse_decimal("highPrice", &ticker.high_price)?,
            low: parse_decimal("lowPrice", &ticker.low_price)?,
            volume: parse_decimal("volume", &ticker.volume)?,
        })
    }

    fn name(&self) -> &str {
        "Binance API"
    }
}

// ============================================================================
// Oracle
// ============================================================================

/// Where a quoted price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Fresh,
    Cached,
    Stale,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceQuote {
    /// USDT per SUI
    pub price: BigDecimal,
    pub source: PriceSource,
    pub fetched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSummary {
    pub symbol: String,
    pub current_price: BigDecimal,
    pub price_change_24h: Option<BigDecimal>,
    pub price_change_percent_24h: Option<BigDecimal>,
    pub high_24h: Option<BigDecimal>,
    pub low_24h: Option<BigDecimal>,
    pub volume_24h: Option<BigDecimal>,
    pub last_updated: DateTime<Utc>,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub has_cache: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub age_secs: Option<u64>,
    pub is_valid: bool,
}

#[derive(Debug, Clone)]
pub struct PriceOracleConfig {
    pub cache_validity: Duration,
    pub fallback_price: BigDecimal,
}

impl Default for PriceOracleConfig {
    fn default() -> Self {
        Self {
            cache_validity: Duration::from_secs(30),
            fallback_price: BigDecimal::new(250.into(), 2),
        }
    }
}

impl PriceOracleConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_validity: Duration::from_secs(env_or("PRICE_CACHE_SECS", 30)),
            fallback_price: env_or("SUI_FALLBACK_PRICE_USDT", defaults.fallback_price),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedPrice {
    price: BigDecimal,
    fetched_at: DateTime<Utc>,
    fetched_instant: Instant,
}

/// Cached SUI/USDT price, one per process
pub struct PriceOracle {
    provider: Arc<dyn PriceProvider>,
    cache: RwLock<Option<CachedPrice>>,
    config: PriceOracleConfig,
}

impl PriceOracle {
    pub fn new(provider: Arc<dyn PriceProvider>, config: PriceOracleConfig) -> Self {
        Self {
            provider,
            cache: RwLock::new(None),
            config,
        }
    }

    /// Current SUI/USDT price. Never fails.
    pub async fn get_price(&self) -> PriceQuote {
        if let Some(cached) = self.cache.read().await.clone() {
            if cached.fetched_instant.elapsed() < self.config.cache_validity {
                debug!(price = %cached.price, "Using cached SUI price");
                return PriceQuote {
                    price: cached.price,
                    source: PriceSource::Cached,
                    fetched_at: Some(cached.fetched_at),
                };
            }
        }

        match self.provider.fetch_price().await {
            Ok(price) => {
                let fetched_at = Utc::now();
                *self.cache.write().await = Some(CachedPrice {
                    price: price.clone(),
                    fetched_at,
                    fetched_instant: Instant::now(),
                });
                info!(price = %price, provider = self.provider.name(), "Live SUI price fetched");
                PriceQuote {
                    price,
                    source: PriceSource::Fresh,
                    fetched_at: Some(fetched_at),
                }
            }
            Err(e) => self.degraded_quote(&e).await,
        }
    }

    async fn degraded_quote(&self, error: &PriceError) -> PriceQuote {
        match self.cache.read().await.clone() {
            Some(stale) => {
                warn!(
                    error = %error,
                    price = %stale.price,
                    age_secs = stale.fetched_instant.elapsed().as_secs(),
                    "Price fetch failed, serving stale price"
                );
                PriceQuote {
                    price: stale.price,
                    source: PriceSource::Stale,
                    fetched_at: Some(stale.fetched_at),
                }
            }
            None => {
                warn!(
                    error = %error,
                    fallback = %self.config.fallback_price,
                    "Price fetch failed with no cached price, serving fallback"
                );
                PriceQuote {
                    price: self.config.fallback_price.clone(),
                    source: PriceSource::Fallback,
                    fetched_at: None,
                }
            }
        }
    }

    /// 24h summary; degrades to the current price alone on provider failure
    pub async fn market_summary(&self) -> MarketSummary {
        match self.provider.fetch_market_summary().await {
            Ok(ticker) => MarketSummary {
                symbol: "SUI/USDT".to_string(),
                current_price: ticker.last_price,
                price_change_24h: Some(ticker.price_change),
                price_change_percent_24h: Some(ticker.price_change_percent),
                high_24h: Some(ticker.high),
                low_24h: Some(ticker.low),
                volume_24h: Some(ticker.volume),
                last_updated: Utc::now(),
                source: self.provider.name().to_string(),
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "Market summary unavailable, using current price only");
                let quote = self.get_price().await;
                MarketSummary {
                    symbol: "SUI/USDT".to_string(),
                    current_price: quote.price,
                    price_change_24h: None,
                    price_change_percent_24h: None,
                    high_24h: None,
                    low_24h: None,
                    volume_24h: None,
                    last_updated: Utc::now(),
                    source: "Fallback".to_string(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub async fn clear_cache(&self) {
        *self.cache.write().await = None;
        info!("Price cache cleared");
    }

    pub async fn cache_status(&self) -> CacheStatus {
        match self.cache.read().await.as_ref() {
            Some(cached) => {
                let age = cached.fetched_instant.elapsed();
                CacheStatus {
                    has_cache: true,
                    last_updated: Some(cached.fetched_at),
                    age_secs: Some(age.as_secs()),
                    is_valid: age < self.config.cache_validity,
                }
            }
            None => CacheStatus {
                has_cache: false,
                last_updated: None,
                age_secs: None,
                is_valid: false,
            },
        }
    }
}
