use async_trait::async_trait;
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::env_or;
use crate::middleware::logging::log_external_call;
use crate::services::currency_converter::decimal_from_f64;
use crate::services::pricing::PricingService;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RateRefreshError {
    #[error("rate request failed: {0}")]
    Request(String),

    #[error("rate provider returned HTTP {status}")]
    Status { status: u16 },

    #[error("rate response had no sui/ngn quote")]
    MissingQuote,

    #[error("rate update rejected: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RateRefreshConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub api_base_url: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    /// Backoff before retry `n` is `2^n * backoff_base`
    pub backoff_base: Duration,
}

impl Default for RateRefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(1800),
            api_base_url: "https://api.coingecko.com".to_string(),
            request_timeout: Duration::from_secs(5),
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
        }
    }
}

impl RateRefreshConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_or("RATE_AUTO_UPDATE", defaults.enabled),
            interval: Duration::from_secs(env_or(
                "RATE_UPDATE_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )),
            api_base_url: env_or("COINGECKO_API_URL", defaults.api_base_url),
            request_timeout: Duration::from_secs(env_or(
                "RATE_API_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            max_attempts: env_or("RATE_API_RETRY_ATTEMPTS", defaults.max_attempts)
                .clamp(1, MAX_FETCH_ATTEMPTS),
            backoff_base: defaults.backoff_base,
        }
    }
}

/// Upper bound on `RATE_API_RETRY_ATTEMPTS`
pub const MAX_FETCH_ATTEMPTS: u32 = 10;

/// Exponential backoff, saturating instead of overflowing
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

// ---------------------------------------------------------------------------
// Rate source
// ---------------------------------------------------------------------------

/// Source of the market NGN-per-SUI rate
#[async_trait]
pub trait FiatRateSource: Send + Sync {
    async fn fetch_ngn_per_sui(&self) -> Result<BigDecimal, RateRefreshError>;
}

#[derive(Debug, Deserialize)]
struct SimplePriceResponse {
    sui: Option<SimplePrice>,
}

#[derive(Debug, Deserialize)]
struct SimplePrice {
    ngn: Option<f64>,
}

/// CoinGecko `simple/price` client
pub struct CoinGeckoRateSource {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl CoinGeckoRateSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RateRefreshError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("SuiFlow-Backend/1.0")
            .build()
            .map_err(|e| RateRefreshError::Request(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }
}

#[async_trait]
impl FiatRateSource for CoinGeckoRateSource {
    async fn fetch_ngn_per_sui(&self) -> Result<BigDecimal, RateRefreshError> {
        let endpoint = "/api/v3/simple/price";
        let url = format!(
            "{}{}?ids=sui&vs_currencies=ngn",
            self.base_url.trim_end_matches('/'),
            endpoint
        );
        let started = Instant::now();

        let request = self.client.get(&url).send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                log_external_call("coingecko", endpoint, started.elapsed(), false);
                return Err(RateRefreshError::Request(e.to_string()));
            }
            Err(_) => {
                log_external_call("coingecko", endpoint, started.elapsed(), false);
                return Err(RateRefreshError::Request(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            log_external_call("coingecko", endpoint, started.elapsed(), false);
            return Err(RateRefreshError::Status {
                status: status.as_u16(),
            });
        }

        let body: SimplePriceResponse = response
            .json()
            .await
            .map_err(|e| RateRefreshError::Request(e.to_string()))?;
        log_external_call("coingecko", endpoint, started.elapsed(), true);

        let ngn = body
            .sui
            .and_then(|quote| quote.ngn)
            .ok_or(RateRefreshError::MissingQuote)?;
        decimal_from_f64(ngn).map_err(|e| RateRefreshError::Rejected(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Periodically refreshes the static NGN-per-SUI rate from market data
pub struct RateRefreshWorker {
    source: Arc<dyn FiatRateSource>,
    pricing: Arc<PricingService>,
    config: RateRefreshConfig,
}

impl RateRefreshWorker {
    pub fn new(
        source: Arc<dyn FiatRateSource>,
        pricing: Arc<PricingService>,
        config: RateRefreshConfig,
    ) -> Self {
        Self {
            source,
            pricing,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            max_attempts = self.config.max_attempts,
            "rate refresh worker started"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("rate refresh worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    if let Err(e) = self.refresh_once().await {
                        warn!(error = %e, "rate refresh failed, keeping current rate");
                    }
                }
            }
        }

        info!("rate refresh worker stopped");
    }

    /// One refresh with retries; returns the rate now in effect
    pub async fn refresh_once(&self) -> Result<BigDecimal, RateRefreshError> {
        let rate = self.fetch_with_retry().await?;
        let previous = self.pricing.static_rate().await;

        self.pricing
            .set_static_rate(rate.clone())
            .await
            .map_err(|e| RateRefreshError::Rejected(e.to_string()))?;

        info!(
            old_rate = %previous,
            new_rate = %rate,
            "static rate refreshed from market data"
        );
        Ok(rate)
    }

    async fn fetch_with_retry(&self) -> Result<BigDecimal, RateRefreshError> {
        let attempts = self.config.max_attempts.clamp(1, MAX_FETCH_ATTEMPTS);
        let mut attempt = 1;
        loop {
            debug!(attempt, attempts, "fetching market rate");
            match self.source.fetch_ngn_per_sui().await {
                Ok(rate) => return Ok(rate),
                Err(e) if attempt < attempts => {
                    let delay = retry_delay(self.config.backoff_base, attempt);
                    warn!(
                        attempt,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "market rate fetch failed"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryStore;
    use crate::services::live_price::test_support::MockPriceProvider;
    use crate::services::live_price::{PriceOracle, PriceOracleConfig};
    use crate::services::merchant_rate::{MerchantRateConfig, MerchantRateService};
    use crate::services::pricing::PricingConfig;
    use std::str::FromStr;
    use std::sync::Mutex;

    /// Serves queued results, then repeats the last one
    struct ScriptedSource {
        results: Mutex<Vec<Result<BigDecimal, RateRefreshError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<BigDecimal, RateRefreshError>>) -> Self {
            Self {
                results: Mutex::new(results),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl FiatRateSource for ScriptedSource {
        async fn fetch_ngn_per_sui(&self) -> Result<BigDecimal, RateRefreshError> {
            *self.calls.lock().unwrap() += 1;
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                results.remove(0)
            } else {
                match &results[0] {
                    Ok(rate) => Ok(rate.clone()),
                    Err(_) => Err(RateRefreshError::MissingQuote),
                }
            }
        }
    }

    fn pricing() -> Arc<PricingService> {
        let oracle = Arc::new(PriceOracle::new(
            Arc::new(MockPriceProvider::new("2.00")),
            PriceOracleConfig::default(),
        ));
        let rates = Arc::new(MerchantRateService::new(
            Arc::new(InMemoryStore::new()),
            MerchantRateConfig::default(),
        ));
        Arc::new(PricingService::new(oracle, rates, PricingConfig::default()))
    }

    fn config() -> RateRefreshConfig {
        RateRefreshConfig {
            backoff_base: Duration::from_millis(1),
            ..RateRefreshConfig::default()
        }
    }

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_updates_static_rate() {
        let pricing = pricing();
        let source = Arc::new(ScriptedSource::new(vec![Ok(dec("1620.5"))]));
        let worker = RateRefreshWorker::new(source.clone(), pricing.clone(), config());

        let rate = worker.refresh_once().await.unwrap();
        assert_eq!(rate, dec("1620.5"));
        assert_eq!(pricing.static_rate().await, dec("1620.5"));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_retries_then_succeeds() {
        let pricing = pricing();
        let source = Arc::new(ScriptedSource::new(vec![
            Err(RateRefreshError::Status { status: 429 }),
            Err(RateRefreshError::Request("reset".to_string())),
            Ok(dec("1700")),
        ]));
        let worker = RateRefreshWorker::new(source.clone(), pricing.clone(), config());

        worker.refresh_once().await.unwrap();
        assert_eq!(source.calls(), 3);
        assert_eq!(pricing.static_rate().await, dec("1700"));
    }

    #[tokio::test]
    async fn test_refresh_gives_up_after_max_attempts() {
        let pricing = pricing();
        let source = Arc::new(ScriptedSource::new(vec![Err(RateRefreshError::MissingQuote)]));
        let worker = RateRefreshWorker::new(source.clone(), pricing.clone(), config());

        assert!(worker.refresh_once().await.is_err());
        assert_eq!(source.calls(), 3);
        assert_eq!(pricing.static_rate().await, dec("1500"));
    }

    #[tokio::test]
    async fn test_out_of_range_rate_keeps_current() {
        let pricing = pricing();
        let source = Arc::new(ScriptedSource::new(vec![Ok(dec("250000"))]));
        let worker = RateRefreshWorker::new(source, pricing.clone(), config());

        let err = worker.refresh_once().await.unwrap_err();
        assert!(matches!(err, RateRefreshError::Rejected(_)));
        assert_eq!(pricing.static_rate().await, dec("1500"));
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let worker = RateRefreshWorker::new(
            Arc::new(ScriptedSource::new(vec![Ok(dec("1500"))])),
            pricing(),
            config(),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.run(rx));

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_retry_delay_saturates() {
        let base = Duration::from_millis(100);
        assert_eq!(retry_delay(base, 1), Duration::from_millis(200));
        assert_eq!(retry_delay(base, 3), Duration::from_millis(800));
        assert_eq!(retry_delay(base, 40), base.saturating_mul(u32::MAX));
        assert_eq!(retry_delay(Duration::MAX, 5), Duration::MAX);
    }

    #[test]
    fn test_retry_attempts_from_env_are_bounded() {
        std::env::set_var("RATE_API_RETRY_ATTEMPTS", "50");
        assert_eq!(RateRefreshConfig::from_env().max_attempts, MAX_FETCH_ATTEMPTS);
        std::env::set_var("RATE_API_RETRY_ATTEMPTS", "0");
        assert_eq!(RateRefreshConfig::from_env().max_attempts, 1);
        std::env::remove_var("RATE_API_RETRY_ATTEMPTS");
        assert_eq!(RateRefreshConfig::from_env().max_attempts, 3);
    }

    #[test]
    fn test_simple_price_parsing() {
        let body: SimplePriceResponse =
            serde_json::from_str(r#"{"sui":{"ngn":5123.45}}"#).unwrap();
        assert_eq!(body.sui.and_then(|q| q.ngn), Some(5123.45));

        let empty: SimplePriceResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.sui.is_none());
    }
}
