//! Merchant Rate Store
//!
//! Per-merchant USDT→NGN rate with a capped change history. Settings are
//! created lazily with the platform default on first read and cached in Redis
//! when a cache is configured.

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::cache::{Cache, RedisCache};
use crate::cache::keys::merchant_rate::SettingsKey;
use crate::config::env_or;
use crate::database::error::DatabaseError;
use crate::database::merchant_rate_repository::{
    MerchantRateSettings, RateHistoryEntry, RateSource,
};
use crate::database::repository::MerchantRateStore;
use crate::error::{AppError, ValidationError};
use crate::services::currency_converter::Currency;

#[derive(Debug, thiserror::Error)]
pub enum RateStoreError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Rate {rate} must be between {min} and {max}")]
    RateOutOfRange {
        rate: BigDecimal,
        min: BigDecimal,
        max: BigDecimal,
    },

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

pub type RateStoreResult<T> = Result<T, RateStoreError>;

impl From<RateStoreError> for AppError {
    fn from(err: RateStoreError) -> Self {
        match err {
            RateStoreError::Database(db) => db.into(),
            RateStoreError::RateOutOfRange { rate, min, max } => {
                AppError::validation(ValidationError::RateOutOfRange {
                    rate: rate.to_string(),
                    min: min.to_string(),
                    max: max.to_string(),
                })
            }
            RateStoreError::InvalidThreshold(reason) => {
                AppError::validation(ValidationError::InvalidField {
                    field: "price_change_threshold".to_string(),
                    reason,
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MerchantRateConfig {
    pub min_rate: BigDecimal,
    pub max_rate: BigDecimal,
    pub default_rate: BigDecimal,
    pub history_cap: usize,
    pub cache_ttl: Duration,
}

impl Default for MerchantRateConfig {
    fn default() -> Self {
        Self {
            min_rate: BigDecimal::from(100),
            max_rate: BigDecimal::from(10_000),
            default_rate: BigDecimal::from(1500),
            history_cap: 10,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

impl MerchantRateConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_rate: env_or("DEFAULT_USDT_NGN_RATE", defaults.default_rate.clone()),
            cache_ttl: Duration::from_secs(env_or("MERCHANT_RATE_CACHE_TTL", 300)),
            ..defaults
        }
    }
}

/// Partial update of pricing preferences; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RatePreferences {
    pub prefer_live_pricing: Option<bool>,
    pub fallback_to_static_rate: Option<bool>,
    pub default_display_currency: Option<Currency>,
    pub price_change_threshold: Option<BigDecimal>,
}

pub struct MerchantRateService {
    store: Arc<dyn MerchantRateStore>,
    cache: Option<RedisCache>,
    config: MerchantRateConfig,
}

impl MerchantRateService {
    pub fn new(store: Arc<dyn MerchantRateStore>, config: MerchantRateConfig) -> Self {
        Self {
            store,
            cache: None,
            config,
        }
    }

    pub fn with_cache(mut self, cache: RedisCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &MerchantRateConfig {
        &self.config
    }

    pub fn default_rate(&self) -> &BigDecimal {
        &self.config.default_rate
    }

    /// Settings for a merchant, creating defaults on first access
    pub async fn get_settings(&self, merchant_id: Uuid) -> RateStoreResult<MerchantRateSettings> {
        if let Some(cached) = self.cached(merchant_id).await {
            return Ok(cached);
        }

        let settings = match self.store.find(merchant_id).await? {
            Some(settings) => settings,
            None => {
                let created = self
                    .store
                    .insert_if_absent(self.default_settings(merchant_id))
                    .await?;
                info!(merchant_id = %merchant_id, rate = %created.usdt_to_ngn_rate, "Created default rate settings");
                created
            }
        };

        self.store_in_cache(&settings).await;
        Ok(settings)
    }

    pub async fn get_rate(&self, merchant_id: Uuid) -> RateStoreResult<BigDecimal> {
        Ok(self.get_settings(merchant_id).await?.usdt_to_ngn_rate)
    }

    /// Replace the merchant's rate. Bounds are inclusive.
    pub async fn set_rate(
        &self,
        merchant_id: Uuid,
        new_rate: BigDecimal,
        updated_by: &str,
        source: RateSource,
    ) -> RateStoreResult<MerchantRateSettings> {
        self.ensure_in_range(&new_rate)?;

        let mut settings = self.load_for_write(merchant_id).await?;
        let now = Utc::now();

        settings.rate_history.insert(
            0,
            RateHistoryEntry {
                rate: new_rate.clone(),
                updated_at: now,
                updated_by: updated_by.to_string(),
                source,
            },
        );
        settings.rate_history.truncate(self.config.history_cap);
        settings.usdt_to_ngn_rate = new_rate;
        settings.rate_updated_at = now;
        settings.rate_updated_by = updated_by.to_string();

        let saved = self.store.save(settings).await?;
        self.invalidate(merchant_id).await;

        info!(
            merchant_id = %merchant_id,
            rate = %saved.usdt_to_ngn_rate,
            updated_by = updated_by,
            source = ?source,
            "Merchant USDT rate updated"
        );
        Ok(saved)
    }

    /// Percent change from the previous history entry, 2 dp; zero without one
    pub async fn rate_change_percent(&self, merchant_id: Uuid) -> RateStoreResult<BigDecimal> {
        let settings = self.get_settings(merchant_id).await?;
        Ok(change_percent(&settings))
    }

    pub async fn update_preferences(
        &self,
        merchant_id: Uuid,
        preferences: RatePreferences,
    ) -> RateStoreResult<MerchantRateSettings> {
        if let Some(threshold) = &preferences.price_change_threshold {
            if threshold < &BigDecimal::zero() {
                return Err(RateStoreError::InvalidThreshold(
                    "Threshold cannot be negative".to_string(),
                ));
            }
        }

        let mut settings = self.load_for_write(merchant_id).await?;
        if let Some(prefer_live) = preferences.prefer_live_pricing {
            settings.prefer_live_pricing = prefer_live;
        }
        if let Some(fallback) = preferences.fallback_to_static_rate {
            settings.fallback_to_static_rate = fallback;
        }
        if let Some(currency) = preferences.default_display_currency {
            settings.default_display_currency = currency;
        }
        if let Some(threshold) = preferences.price_change_threshold {
            settings.price_change_threshold = threshold;
        }

        let saved = self.store.save(settings).await?;
        self.invalidate(merchant_id).await;
        debug!(merchant_id = %merchant_id, "Merchant rate preferences updated");
        Ok(saved)
    }

    fn ensure_in_range(&self, rate: &BigDecimal) -> RateStoreResult<()> {
        if rate < &self.config.min_rate || rate > &self.config.max_rate {
            return Err(RateStoreError::RateOutOfRange {
                rate: rate.clone(),
                min: self.config.min_rate.clone(),
                max: self.config.max_rate.clone(),
            });
        }
        Ok(())
    }

    fn default_settings(&self, merchant_id: Uuid) -> MerchantRateSettings {
        let now = Utc::now();
        MerchantRateSettings {
            merchant_id,
            usdt_to_ngn_rate: self.config.default_rate.clone(),
            rate_updated_at: now,
            rate_updated_by: "system".to_string(),
            prefer_live_pricing: true,
            fallback_to_static_rate: true,
            default_display_currency: Currency::Ngn,
            price_change_threshold: BigDecimal::from(5),
            rate_history: vec![RateHistoryEntry {
                rate: self.config.default_rate.clone(),
                updated_at: now,
                updated_by: "system".to_string(),
                source: RateSource::System,
            }],
            created_at: now,
            updated_at: now,
        }
    }

    /// Writes always start from the store, never the cache
    async fn load_for_write(&self, merchant_id: Uuid) -> RateStoreResult<MerchantRateSettings> {
        match self.store.find(merchant_id).await? {
            Some(settings) => Ok(settings),
            None => Ok(self
                .store
                .insert_if_absent(self.default_settings(merchant_id))
                .await?),
        }
    }

    async fn cached(&self, merchant_id: Uuid) -> Option<MerchantRateSettings> {
        let cache = self.cache.as_ref()?;
        let key = SettingsKey::new(merchant_id).to_string();
        match <RedisCache as Cache<MerchantRateSettings>>::get(cache, &key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, key = %key, "Rate settings cache read failed");
                None
            }
        }
    }

    async fn store_in_cache(&self, settings: &MerchantRateSettings) {
        if let Some(cache) = &self.cache {
            let key = SettingsKey::new(settings.merchant_id).to_string();
            if let Err(e) = cache.set(&key, settings, Some(self.config.cache_ttl)).await {
                warn!(error = %e, key = %key, "Rate settings cache write failed");
            }
        }
    }

    async fn invalidate(&self, merchant_id: Uuid) {
        if let Some(cache) = &self.cache {
            let key = SettingsKey::new(merchant_id).to_string();
            if let Err(e) = <RedisCache as Cache<MerchantRateSettings>>::delete(cache, &key).await {
                warn!(error = %e, key = %key, "Rate settings cache invalidation failed");
            }
        }
    }
}

/// `(current - previous) / previous * 100`, rounded to 2 dp
pub fn change_percent(settings: &MerchantRateSettings) -> BigDecimal {
    let Some(previous) = settings.rate_history.get(1).map(|entry| &entry.rate) else {
        return BigDecimal::zero().with_scale(2);
    };
    if previous.is_zero() {
        return BigDecimal::zero().with_scale(2);
    }

    ((&settings.usdt_to_ngn_rate - previous) / previous * BigDecimal::from(100))
        .with_scale_round(2, RoundingMode::HalfUp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::InMemoryStore;
    use std::str::FromStr;

    fn service() -> MerchantRateService {
        MerchantRateService::new(Arc::new(InMemoryStore::new()), MerchantRateConfig::default())
    }

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[tokio::test]
    async fn test_lazy_defaults() {
        let service = service();
        let merchant = Uuid::new_v4();

        let settings = service.get_settings(merchant).await.unwrap();
        assert_eq!(settings.usdt_to_ngn_rate, dec("1500"));
        assert_eq!(settings.rate_history.len(), 1);
        assert_eq!(settings.rate_history[0].source, RateSource::System);
        assert!(settings.prefer_live_pricing);
        assert_eq!(settings.default_display_currency, Currency::Ngn);

        // Second read returns the same record, no new history
        let again = service.get_settings(merchant).await.unwrap();
        assert_eq!(again.rate_history.len(), 1);
    }

    #[tokio::test]
    async fn test_bounds_are_inclusive() {
        let service = service();
        let merchant = Uuid::new_v4();

        assert!(service.set_rate(merchant, dec("100"), "m", RateSource::Manual).await.is_ok());
        assert!(service.set_rate(merchant, dec("10000"), "m", RateSource::Manual).await.is_ok());

        let low = service.set_rate(merchant, dec("99.99"), "m", RateSource::Manual).await;
        assert!(matches!(low, Err(RateStoreError::RateOutOfRange { .. })));
        let high = service.set_rate(merchant, dec("10000.01"), "m", RateSource::Manual).await;
        assert!(matches!(high, Err(RateStoreError::RateOutOfRange { .. })));

        assert_eq!(service.get_rate(merchant).await.unwrap(), dec("10000"));
    }

    #[tokio::test]
    async fn test_history_cap_evicts_oldest() {
        let service = service();
        let merchant = Uuid::new_v4();

        for i in 0..12 {
            let rate = BigDecimal::from(1000 + i);
            service.set_rate(merchant, rate, "merchant", RateSource::Manual).await.unwrap();
        }

        let settings = service.get_settings(merchant).await.unwrap();
        assert_eq!(settings.rate_history.len(), 10);
        assert_eq!(settings.rate_history[0].rate, BigDecimal::from(1011));
        assert_eq!(settings.rate_history[9].rate, BigDecimal::from(1002));
        assert!(settings
            .rate_history
            .iter()
            .all(|entry| entry.source == RateSource::Manual));
    }

    #[tokio::test]
    async fn test_rate_change_percent() {
        let service = service();
        let merchant = Uuid::new_v4();

        assert_eq!(
            service.rate_change_percent(merchant).await.unwrap(),
            dec("0.00")
        );

        service.set_rate(merchant, dec("1650"), "merchant", RateSource::Manual).await.unwrap();
        assert_eq!(
            service.rate_change_percent(merchant).await.unwrap(),
            dec("10.00")
        );

        service.set_rate(merchant, dec("1600"), "merchant", RateSource::Manual).await.unwrap();
        assert_eq!(
            service.rate_change_percent(merchant).await.unwrap(),
            dec("-3.03")
        );
    }

    #[tokio::test]
    async fn test_update_preferences_is_partial() {
        let service = service();
        let merchant = Uuid::new_v4();

        let updated = service
            .update_preferences(
                merchant,
                RatePreferences {
                    prefer_live_pricing: Some(false),
                    default_display_currency: Some(Currency::Sui),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!updated.prefer_live_pricing);
        assert!(updated.fallback_to_static_rate);
        assert_eq!(updated.default_display_currency, Currency::Sui);
        assert_eq!(updated.price_change_threshold, BigDecimal::from(5));

        let negative = service
            .update_preferences(
                merchant,
                RatePreferences {
                    price_change_threshold: Some(dec("-1")),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(negative, Err(RateStoreError::InvalidThreshold(_))));
    }

    #[test]
    fn test_out_of_range_maps_to_validation() {
        let err: AppError = RateStoreError::RateOutOfRange {
            rate: dec("50"),
            min: dec("100"),
            max: dec("10000"),
        }
        .into();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.error_code(), crate::error::ErrorCode::RateOutOfRange);
    }
}
