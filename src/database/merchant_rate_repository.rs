use crate::database::error::DatabaseError;
use crate::database::repository::MerchantRateStore;
use crate::services::currency_converter::Currency;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

/// Who or what produced a rate change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RateSource {
    Manual,
    Api,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateHistoryEntry {
    pub rate: BigDecimal,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub source: RateSource,
}

/// Per-merchant USDT→NGN rate and pricing preferences
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MerchantRateSettings {
    pub merchant_id: Uuid,
    pub usdt_to_ngn_rate: BigDecimal,
    pub rate_updated_at: DateTime<Utc>,
    pub rate_updated_by: String,
    pub prefer_live_pricing: bool,
    pub fallback_to_static_rate: bool,
    pub default_display_currency: Currency,
    /// Percent change that should alert the merchant
    pub price_change_threshold: BigDecimal,
    /// Most recent first
    pub rate_history: Vec<RateHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct MerchantRateRow {
    merchant_id: Uuid,
    usdt_to_ngn_rate: BigDecimal,
    rate_updated_at: DateTime<Utc>,
    rate_updated_by: String,
    prefer_live_pricing: bool,
    fallback_to_static_rate: bool,
    default_display_currency: String,
    price_change_threshold: BigDecimal,
    rate_history: Json<Vec<RateHistoryEntry>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MerchantRateRow> for MerchantRateSettings {
    type Error = DatabaseError;

    fn try_from(row: MerchantRateRow) -> Result<Self, Self::Error> {
        let default_display_currency = Currency::from_str(&row.default_display_currency)
            .map_err(|e| DatabaseError::decode(e.to_string()))?;

        Ok(MerchantRateSettings {
            merchant_id: row.merchant_id,
            usdt_to_ngn_rate: row.usdt_to_ngn_rate,
            rate_updated_at: row.rate_updated_at,
            rate_updated_by: row.rate_updated_by,
            prefer_live_pricing: row.prefer_live_pricing,
            fallback_to_static_rate: row.fallback_to_static_rate,
            default_display_currency,
            price_change_threshold: row.price_change_threshold,
            rate_history: row.rate_history.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const RATE_COLUMNS: &str = "merchant_id, usdt_to_ngn_rate, rate_updated_at, rate_updated_by, \
     prefer_live_pricing, fallback_to_static_rate, default_display_currency, \
     price_change_threshold, rate_history, created_at, updated_at";

/// Postgres storage for merchant rate settings
pub struct MerchantRateRepository {
    pool: PgPool,
}

impl MerchantRateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MerchantRateStore for MerchantRateRepository {
    async fn find(&self, merchant_id: Uuid) -> Result<Option<MerchantRateSettings>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM merchant_rate_settings WHERE merchant_id = $1",
            RATE_COLUMNS
        );

        sqlx::query_as::<_, MerchantRateRow>(&query)
            .bind(merchant_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(MerchantRateSettings::try_from)
            .transpose()
    }

    async fn insert_if_absent(
        &self,
        settings: MerchantRateSettings,
    ) -> Result<MerchantRateSettings, DatabaseError> {
        let merchant_id = settings.merchant_id;

        sqlx::query(
            "INSERT INTO merchant_rate_settings
                (merchant_id, usdt_to_ngn_rate, rate_updated_at, rate_updated_by,
                 prefer_live_pricing, fallback_to_static_rate, default_display_currency,
                 price_change_threshold, rate_history)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (merchant_id) DO NOTHING",
        )
        .bind(settings.merchant_id)
        .bind(settings.usdt_to_ngn_rate)
        .bind(settings.rate_updated_at)
        .bind(settings.rate_updated_by)
        .bind(settings.prefer_live_pricing)
        .bind(settings.fallback_to_static_rate)
        .bind(settings.default_display_currency.as_str())
        .bind(settings.price_change_threshold)
        .bind(Json(settings.rate_history))
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        self.find(merchant_id)
            .await?
            .ok_or_else(|| DatabaseError::not_found("merchant_rate_settings", merchant_id.to_string()))
    }

    async fn save(
        &self,
        settings: MerchantRateSettings,
    ) -> Result<MerchantRateSettings, DatabaseError> {
        let merchant_id = settings.merchant_id;
        let query = format!(
            "UPDATE merchant_rate_settings
             SET usdt_to_ngn_rate = $2, rate_updated_at = $3, rate_updated_by = $4,
                 prefer_live_pricing = $5, fallback_to_static_rate = $6,
                 default_display_currency = $7, price_change_threshold = $8,
                 rate_history = $9, updated_at = NOW()
             WHERE merchant_id = $1
             RETURNING {}",
            RATE_COLUMNS
        );

        sqlx::query_as::<_, MerchantRateRow>(&query)
            .bind(settings.merchant_id)
            .bind(settings.usdt_to_ngn_rate)
            .bind(settings.rate_updated_at)
            .bind(settings.rate_updated_by)
            .bind(settings.prefer_live_pricing)
            .bind(settings.fallback_to_static_rate)
            .bind(settings.default_display_currency.as_str())
            .bind(settings.price_change_threshold)
            .bind(Json(settings.rate_history))
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .ok_or_else(|| DatabaseError::not_found("merchant_rate_settings", merchant_id.to_string()))?
            .try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_source_serializes_lowercase() {
        assert_eq!(serde_json::to_value(RateSource::Manual).unwrap(), "manual");
        assert_eq!(serde_json::to_value(RateSource::System).unwrap(), "system");
        let source: RateSource = serde_json::from_str("\"api\"").unwrap();
        assert_eq!(source, RateSource::Api);
    }
}
