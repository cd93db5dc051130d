//! Storage seams
//!
//! Each aggregate has a store trait with a Postgres implementation in its
//! `*_repository` module and an in-memory one in [`super::memory`].

use async_trait::async_trait;
use uuid::Uuid;

use super::error::DatabaseError;
use super::merchant_rate_repository::MerchantRateSettings;
use super::merchant_repository::{Merchant, MerchantSettingsUpdate, NewMerchant};
use super::payment_repository::{NewPayment, Payment, PaymentSettlement};
use super::product_repository::{NewProduct, Product};

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: NewPayment) -> Result<Payment, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError>;

    async fn find_by_transaction_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<Payment>, DatabaseError>;

    /// Most recent first
    async fn list_by_merchant(
        &self,
        merchant_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError>;

    /// Transition `pending → paid`.
    ///
    /// Returns `None` when the payment is missing or no longer pending, so at
    /// most one concurrent caller observes `Some`.
    async fn mark_paid(
        &self,
        id: Uuid,
        settlement: PaymentSettlement,
    ) -> Result<Option<Payment>, DatabaseError>;
}

#[async_trait]
pub trait MerchantStore: Send + Sync {
    /// Fails with a unique violation when the email is taken
    async fn insert(&self, merchant: NewMerchant) -> Result<Merchant, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Merchant>, DatabaseError>;

    async fn update_sui_wallet(
        &self,
        id: Uuid,
        sui_wallet_address: &str,
    ) -> Result<Option<Merchant>, DatabaseError>;

    async fn update_settings(
        &self,
        id: Uuid,
        update: MerchantSettingsUpdate,
    ) -> Result<Option<Merchant>, DatabaseError>;
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert(&self, product: NewProduct) -> Result<Product, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, DatabaseError>;

    async fn list_by_merchant(&self, merchant_id: Uuid) -> Result<Vec<Product>, DatabaseError>;

    /// Returns true if a row was removed
    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait MerchantRateStore: Send + Sync {
    async fn find(&self, merchant_id: Uuid) -> Result<Option<MerchantRateSettings>, DatabaseError>;

    /// Insert `settings` unless a row already exists; returns whichever row wins
    async fn insert_if_absent(
        &self,
        settings: MerchantRateSettings,
    ) -> Result<MerchantRateSettings, DatabaseError>;

    /// Overwrite the stored settings for `settings.merchant_id`
    async fn save(
        &self,
        settings: MerchantRateSettings,
    ) -> Result<MerchantRateSettings, DatabaseError>;
}
