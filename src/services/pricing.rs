//! Pricing Service
//!
//! Combines the live SUI/USDT price, merchant USDT/NGN rates and the
//! platform's static NGN-per-SUI rate into quotes and conversions.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::env_or;
use crate::error::{AppError, ValidationError};
use crate::services::currency_converter::{self, format_currency, ConversionError, Currency};
use crate::services::live_price::{PriceOracle, PriceSource};
use crate::services::merchant_rate::{MerchantRateService, RateStoreError};

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    RateStore(#[from] RateStoreError),

    #[error("Static rate {rate} must be between {min} and {max}")]
    StaticRateOutOfRange {
        rate: BigDecimal,
        min: BigDecimal,
        max: BigDecimal,
    },

    #[error("Unsupported conversion {from} -> {to}")]
    UnsupportedPair { from: Currency, to: Currency },
}

pub type PricingResult<T> = Result<T, PricingError>;

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::Conversion(e) => e.into(),
            PricingError::RateStore(e) => e.into(),
            PricingError::StaticRateOutOfRange { rate, min, max } => {
                AppError::validation(ValidationError::RateOutOfRange {
                    rate: rate.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                })
            }
            PricingError::UnsupportedPair { from, to } => {
                AppError::validation(ValidationError::InvalidCurrency {
                    currency: format!("{}->{}", from, to),
                    reason: "Only NGN <-> SUI conversions are supported".to_string(),
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Initial NGN per SUI for static pricing
    pub static_rate: BigDecimal,
    pub min_static_rate: BigDecimal,
    pub max_static_rate: BigDecimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            static_rate: BigDecimal::from(1500),
            min_static_rate: BigDecimal::from(100),
            max_static_rate: BigDecimal::from(10_000),
        }
    }
}

impl PricingConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            static_rate: env_or("SUI_TO_NGN_RATE", defaults.static_rate.clone()),
            ..defaults
        }
    }
}

/// Rates in effect for one merchant (or the platform default)
#[derive(Debug, Clone, Serialize)]
pub struct RateQuote {
    pub sui_usdt: BigDecimal,
    pub usdt_ngn: BigDecimal,
    pub sui_ngn: BigDecimal,
    pub live: bool,
    pub price_source: PriceSource,
    pub merchant_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    pub amount: BigDecimal,
    pub from: Currency,
    pub to: Currency,
    pub result: BigDecimal,
    /// NGN per SUI applied
    pub rate: BigDecimal,
    pub live: bool,
    pub formatted: String,
}

pub struct PricingService {
    oracle: Arc<PriceOracle>,
    rates: Arc<MerchantRateService>,
    static_rate: RwLock<BigDecimal>,
    config: PricingConfig,
}

impl PricingService {
    pub fn new(
        oracle: Arc<PriceOracle>,
        rates: Arc<MerchantRateService>,
        config: PricingConfig,
    ) -> Self {
        Self {
            oracle,
            rates,
            static_rate: RwLock::new(config.static_rate.clone()),
            config,
        }
    }

    pub fn oracle(&self) -> &Arc<PriceOracle> {
        &self.oracle
    }

    pub fn rates(&self) -> &Arc<MerchantRateService> {
        &self.rates
    }

    pub async fn static_rate(&self) -> BigDecimal {
        self.static_rate.read().await.clone()
    }

    pub async fn set_static_rate(&self, rate: BigDecimal) -> PricingResult<()> {
        if rate < self.config.min_static_rate || rate > self.config.max_static_rate {
            return Err(PricingError::StaticRateOutOfRange {
                rate,
                min: self.config.min_static_rate.clone(),
                max: self.config.max_static_rate.clone(),
            });
        }

        let mut current = self.static_rate.write().await;
        let previous = std::mem::replace(&mut *current, rate.clone());
        info!(old_rate = %previous, new_rate = %rate, "Static SUI/NGN rate updated");
        Ok(())
    }

    /// Live quote using the merchant's USDT/NGN rate, or the default without one
    pub async fn quote(&self, merchant_id: Option<Uuid>) -> PricingResult<RateQuote> {
        let usdt_ngn = match merchant_id {
            Some(id) => self.rates.get_rate(id).await?,
            None => self.rates.default_rate().clone(),
        };
        let price = self.oracle.get_price().await;
        let sui_ngn = currency_converter::implied_fiat_rate(&price.price, &usdt_ngn)?;

        Ok(RateQuote {
            sui_usdt: price.price,
            usdt_ngn,
            sui_ngn,
            live: true,
            price_source: price.source,
            merchant_id,
        })
    }

    /// NGN per SUI used to price a payment.
    ///
    /// Live pricing is skipped for merchants that opted out, and for merchants
    /// that prefer the static rate over the oracle's fallback constant.
    pub async fn ngn_per_sui(
        &self,
        merchant_id: Option<Uuid>,
        live: bool,
    ) -> PricingResult<BigDecimal> {
        if !live {
            return Ok(self.static_rate().await);
        }

        if let Some(id) = merchant_id {
            let settings = self.rates.get_settings(id).await?;
            if !settings.prefer_live_pricing {
                debug!(merchant_id = %id, "Merchant prefers static pricing");
                return Ok(self.static_rate().await);
            }

            let quote = self.quote(Some(id)).await?;
            if quote.price_source == PriceSource::Fallback && settings.fallback_to_static_rate {
                debug!(merchant_id = %id, "Live price unavailable, using static rate");
                return Ok(self.static_rate().await);
            }
            return Ok(quote.sui_ngn);
        }

        Ok(self.quote(None).await?.sui_ngn)
    }

    /// Convert between NGN and SUI at the applicable rate
    pub async fn convert(
        &self,
        amount: &BigDecimal,
        from: Currency,
        to: Currency,
        merchant_id: Option<Uuid>,
        live: bool,
    ) -> PricingResult<Conversion> {
        let (result, rate) = match (from, to) {
            (Currency::Ngn, Currency::Sui) => {
                if live {
                    let quote = self.quote(merchant_id).await?;
                    let result = currency_converter::fiat_to_native_via_usdt(
                        amount,
                        &quote.usdt_ngn,
                        &quote.sui_usdt,
                    )?;
                    (result, quote.sui_ngn)
                } else {
                    let rate = self.static_rate().await;
                    (currency_converter::to_native(amount, &rate)?, rate)
                }
            }
            (Currency::Sui, Currency::Ngn) => {
                if live {
                    let quote = self.quote(merchant_id).await?;
                    let result = currency_converter::native_to_fiat_via_usdt(
                        amount,
                        &quote.sui_usdt,
                        &quote.usdt_ngn,
                    )?;
                    (result, quote.sui_ngn)
                } else {
                    let rate = self.static_rate().await;
                    (currency_converter::to_fiat(amount, &rate)?, rate)
                }
            }
            (from, to) => return Err(PricingError::UnsupportedPair { from, to }),
        };

        Ok(Conversion {
            amount: amount.clone(),
            from,
            to,
            formatted: format_currency(&result, to),
            result,
            rate,
            live,
        })
    }
}
