use crate::database::error::DatabaseError;
use crate::database::repository::MerchantStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Merchant account entity
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Merchant {
    pub id: Uuid,
    pub email: String,
    pub business_name: String,
    /// Default payout address
    pub wallet_address: String,
    /// Address used for contract-mediated payments, when configured
    pub sui_wallet_address: Option<String>,
    pub webhook_url: Option<String>,
    pub smart_contract_enabled: bool,
    /// SHA-256 of the merchant's API key, hex encoded
    #[serde(skip_serializing, default)]
    pub api_key_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Merchant {
    /// Payout address for a contract-mediated payment
    pub fn contract_recipient(&self) -> &str {
        self.sui_wallet_address
            .as_deref()
            .filter(|addr| !addr.is_empty())
            .unwrap_or(&self.wallet_address)
    }
}

#[derive(Debug, Clone)]
pub struct NewMerchant {
    pub id: Uuid,
    pub email: String,
    pub business_name: String,
    pub wallet_address: String,
    pub sui_wallet_address: Option<String>,
    pub webhook_url: Option<String>,
    pub smart_contract_enabled: bool,
    pub api_key_hash: String,
}

/// Partial update of merchant-controlled settings; `None` leaves a field as is
#[derive(Debug, Clone, Default)]
pub struct MerchantSettingsUpdate {
    pub business_name: Option<String>,
    /// `Some(None)` clears the webhook
    pub webhook_url: Option<Option<String>>,
    pub smart_contract_enabled: Option<bool>,
}

impl MerchantSettingsUpdate {
    pub fn apply(&self, merchant: &mut Merchant) {
        if let Some(name) = &self.business_name {
            merchant.business_name = name.clone();
        }
        if let Some(webhook_url) = &self.webhook_url {
            merchant.webhook_url = webhook_url.clone();
        }
        if let Some(enabled) = self.smart_contract_enabled {
            merchant.smart_contract_enabled = enabled;
        }
    }
}

const MERCHANT_COLUMNS: &str = "id, email, business_name, wallet_address, sui_wallet_address, \
     webhook_url, smart_contract_enabled, api_key_hash, created_at, updated_at";

/// Repository for merchant accounts
pub struct MerchantRepository {
    pool: PgPool,
}

impl MerchantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MerchantStore for MerchantRepository {
    async fn insert(&self, merchant: NewMerchant) -> Result<Merchant, DatabaseError> {
        let query = format!(
            "INSERT INTO merchants
                (id, email, business_name, wallet_address, sui_wallet_address, webhook_url,
                 smart_contract_enabled, api_key_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            MERCHANT_COLUMNS
        );

        sqlx::query_as::<_, Merchant>(&query)
            .bind(merchant.id)
            .bind(merchant.email)
            .bind(merchant.business_name)
            .bind(merchant.wallet_address)
            .bind(merchant.sui_wallet_address)
            .bind(merchant.webhook_url)
            .bind(merchant.smart_contract_enabled)
            .bind(merchant.api_key_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Merchant>, DatabaseError> {
        let query = format!("SELECT {} FROM merchants WHERE id = $1", MERCHANT_COLUMNS);

        sqlx::query_as::<_, Merchant>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn update_sui_wallet(
        &self,
        id: Uuid,
        sui_wallet_address: &str,
    ) -> Result<Option<Merchant>, DatabaseError> {
        let query = format!(
            "UPDATE merchants SET sui_wallet_address = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            MERCHANT_COLUMNS
        );

        sqlx::query_as::<_, Merchant>(&query)
            .bind(id)
            .bind(sui_wallet_address)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn update_settings(
        &self,
        id: Uuid,
        update: MerchantSettingsUpdate,
    ) -> Result<Option<Merchant>, DatabaseError> {
        let query = format!(
            "UPDATE merchants SET
                business_name = COALESCE($2, business_name),
                webhook_url = CASE WHEN $3 THEN $4 ELSE webhook_url END,
                smart_contract_enabled = COALESCE($5, smart_contract_enabled),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            MERCHANT_COLUMNS
        );

        sqlx::query_as::<_, Merchant>(&query)
            .bind(id)
            .bind(update.business_name)
            .bind(update.webhook_url.is_some())
            .bind(update.webhook_url.flatten())
            .bind(update.smart_contract_enabled)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }
}
