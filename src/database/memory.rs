//! In-memory store used with `SKIP_EXTERNALS=true` and in tests.
//!
//! Implements every store trait over `RwLock<HashMap>`s with the same
//! semantics as the Postgres repositories, including the pending-only
//! `mark_paid` transition.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::{DatabaseError, DatabaseErrorKind};
use super::merchant_rate_repository::MerchantRateSettings;
use super::merchant_repository::{Merchant, MerchantSettingsUpdate, NewMerchant};
use super::payment_repository::{NewPayment, Payment, PaymentSettlement, PaymentStatus};
use super::product_repository::{NewProduct, Product};
use super::repository::{MerchantRateStore, MerchantStore, PaymentStore, ProductStore};

#[derive(Default)]
pub struct InMemoryStore {
    payments: RwLock<HashMap<Uuid, Payment>>,
    merchants: RwLock<HashMap<Uuid, Merchant>>,
    products: RwLock<HashMap<Uuid, Product>>,
    rate_settings: RwLock<HashMap<Uuid, MerchantRateSettings>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn duplicate(constraint: &str) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::UniqueViolation {
        constraint: constraint.to_string(),
    })
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            return Err(duplicate("payments_pkey"));
        }

        let record = Payment {
            id: payment.id,
            merchant_id: payment.merchant_id,
            product_id: payment.product_id,
            amount: payment.amount,
            amount_fiat: payment.amount_fiat,
            currency: payment.currency,
            exchange_rate: payment.exchange_rate,
            recipient_address: payment.recipient_address,
            mode: payment.mode,
            status: PaymentStatus::Pending,
            transaction_hash: None,
            customer_address: None,
            customer_email: None,
            description: payment.description,
            reference: payment.reference,
            payment_link: payment.payment_link,
            contract_details: None,
            created_at: Utc::now(),
            paid_at: None,
        };
        payments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn find_by_transaction_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|p| p.transaction_hash.as_deref() == Some(transaction_hash))
            .cloned())
    }

    async fn list_by_merchant(
        &self,
        merchant_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError> {
        let mut payments: Vec<Payment> = self
            .payments
            .read()
            .await
            .values()
            .filter(|p| p.merchant_id == Some(merchant_id))
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        payments.truncate(limit.max(0) as usize);
        Ok(payments)
    }

    async fn mark_paid(
        &self,
        id: Uuid,
        settlement: PaymentSettlement,
    ) -> Result<Option<Payment>, DatabaseError> {
        let mut payments = self.payments.write().await;

        let taken = payments.values().any(|p| {
            p.id != id && p.transaction_hash.as_deref() == Some(&settlement.transaction_hash)
        });
        if taken {
            return Err(duplicate("payments_transaction_hash_key"));
        }

        match payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.status = PaymentStatus::Paid;
                payment.transaction_hash = Some(settlement.transaction_hash);
                payment.customer_address = settlement.customer_address;
                payment.customer_email = settlement.customer_email;
                payment.contract_details = settlement.contract_details;
                payment.paid_at = Some(Utc::now());
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl MerchantStore for InMemoryStore {
    async fn insert(&self, merchant: NewMerchant) -> Result<Merchant, DatabaseError> {
        let mut merchants = self.merchants.write().await;
        if merchants.contains_key(&merchant.id) {
            return Err(duplicate("merchants_pkey"));
        }
        if merchants
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&merchant.email))
        {
            return Err(duplicate("merchants_email_key"));
        }

        let now = Utc::now();
        let record = Merchant {
            id: merchant.id,
            email: merchant.email,
            business_name: merchant.business_name,
            wallet_address: merchant.wallet_address,
            sui_wallet_address: merchant.sui_wallet_address,
            webhook_url: merchant.webhook_url,
            smart_contract_enabled: merchant.smart_contract_enabled,
            api_key_hash: merchant.api_key_hash,
            created_at: now,
            updated_at: now,
        };
        merchants.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Merchant>, DatabaseError> {
        Ok(self.merchants.read().await.get(&id).cloned())
    }

    async fn update_sui_wallet(
        &self,
        id: Uuid,
        sui_wallet_address: &str,
    ) -> Result<Option<Merchant>, DatabaseError> {
        let mut merchants = self.merchants.write().await;
        Ok(merchants.get_mut(&id).map(|merchant| {
            merchant.sui_wallet_address = Some(sui_wallet_address.to_string());
            merchant.updated_at = Utc::now();
            merchant.clone()
        }))
    }

    async fn update_settings(
        &self,
        id: Uuid,
        update: MerchantSettingsUpdate,
    ) -> Result<Option<Merchant>, DatabaseError> {
        let mut merchants = self.merchants.write().await;
        Ok(merchants.get_mut(&id).map(|merchant| {
            update.apply(merchant);
            merchant.updated_at = Utc::now();
            merchant.clone()
        }))
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn insert(&self, product: NewProduct) -> Result<Product, DatabaseError> {
        let mut products = self.products.write().await;
        if products.contains_key(&product.id) {
            return Err(duplicate("products_pkey"));
        }

        let record = Product {
            id: product.id,
            merchant_id: product.merchant_id,
            name: product.name,
            description: product.description,
            price_in_sui: product.price_in_sui,
            merchant_address: product.merchant_address,
            payment_link: product.payment_link,
            redirect_url: product.redirect_url,
            created_at: Utc::now(),
        };
        products.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, DatabaseError> {
        Ok(self.products.read().await.get(&id).cloned())
    }

    async fn list_by_merchant(&self, merchant_id: Uuid) -> Result<Vec<Product>, DatabaseError> {
        let mut products: Vec<Product> = self
            .products
            .read()
            .await
            .values()
            .filter(|p| p.merchant_id == merchant_id)
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.products.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl MerchantRateStore for InMemoryStore {
    async fn find(&self, merchant_id: Uuid) -> Result<Option<MerchantRateSettings>, DatabaseError> {
        Ok(self.rate_settings.read().await.get(&merchant_id).cloned())
    }

    async fn insert_if_absent(
        &self,
        settings: MerchantRateSettings,
    ) -> Result<MerchantRateSettings, DatabaseError> {
        let mut rate_settings = self.rate_settings.write().await;
        Ok(rate_settings
            .entry(settings.merchant_id)
            .or_insert(settings)
            .clone())
    }

    async fn save(
        &self,
        mut settings: MerchantRateSettings,
    ) -> Result<MerchantRateSettings, DatabaseError> {
        let mut rate_settings = self.rate_settings.write().await;
        if !rate_settings.contains_key(&settings.merchant_id) {
            return Err(DatabaseError::not_found(
                "merchant_rate_settings",
                settings.merchant_id.to_string(),
            ));
        }
        settings.updated_at = Utc::now();
        rate_settings.insert(settings.merchant_id, settings.clone());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::payment_repository::PaymentMode;
    use crate::services::currency_converter::Currency;
    use bigdecimal::BigDecimal;

    fn new_payment() -> NewPayment {
        let id = Uuid::new_v4();
        NewPayment {
            id,
            merchant_id: Some(Uuid::new_v4()),
            product_id: None,
            amount: BigDecimal::from(100),
            amount_fiat: BigDecimal::from(150_000),
            currency: Currency::Ngn,
            exchange_rate: BigDecimal::from(1500),
            recipient_address: "0xabc".to_string(),
            mode: PaymentMode::DirectTransfer,
            description: None,
            reference: None,
            payment_link: format!("https://suiflow.app/pay/{}", id),
        }
    }

    fn settlement(digest: &str) -> PaymentSettlement {
        PaymentSettlement {
            transaction_hash: digest.to_string(),
            customer_address: None,
            customer_email: None,
            contract_details: None,
        }
    }

    #[tokio::test]
    async fn test_mark_paid_only_once() {
        let store = InMemoryStore::new();
        let payment = PaymentStore::insert(&store, new_payment()).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);

        let first = store.mark_paid(payment.id, settlement("digest-1")).await.unwrap();
        assert!(first.is_some());
        let second = store.mark_paid(payment.id, settlement("digest-1")).await.unwrap();
        assert!(second.is_none());

        let stored = PaymentStore::find_by_id(&store, payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Paid);
        assert_eq!(stored.transaction_hash.as_deref(), Some("digest-1"));
        assert!(stored.paid_at.is_some());
    }

    #[tokio::test]
    async fn test_digest_cannot_settle_two_payments() {
        let store = InMemoryStore::new();
        let a = PaymentStore::insert(&store, new_payment()).await.unwrap();
        let b = PaymentStore::insert(&store, new_payment()).await.unwrap();

        store.mark_paid(a.id, settlement("shared")).await.unwrap();
        let err = store.mark_paid(b.id, settlement("shared")).await.unwrap_err();
        assert!(matches!(err.kind, DatabaseErrorKind::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_mark_paid_has_one_winner() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let payment = PaymentStore::insert(store.as_ref(), new_payment()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.mark_paid(payment.id, settlement("race")).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    fn new_merchant(email: &str) -> NewMerchant {
        NewMerchant {
            id: Uuid::new_v4(),
            email: email.to_string(),
            business_name: "Shop".to_string(),
            wallet_address: format!("0x{}", "1".repeat(64)),
            sui_wallet_address: None,
            webhook_url: None,
            smart_contract_enabled: false,
            api_key_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_merchant_email_is_unique() {
        let store = InMemoryStore::new();
        MerchantStore::insert(&store, new_merchant("shop@example.com"))
            .await
            .unwrap();

        let err = MerchantStore::insert(&store, new_merchant("SHOP@example.com"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_update_settings() {
        let store = InMemoryStore::new();
        let merchant = MerchantStore::insert(&store, new_merchant("shop@example.com"))
            .await
            .unwrap();

        let updated = store
            .update_settings(
                merchant.id,
                MerchantSettingsUpdate {
                    webhook_url: Some(Some("https://shop.example/hooks".to_string())),
                    smart_contract_enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(updated.smart_contract_enabled);
        assert_eq!(updated.webhook_url.as_deref(), Some("https://shop.example/hooks"));
        assert_eq!(updated.api_key_hash, "hash");

        let missing = store
            .update_settings(Uuid::new_v4(), MerchantSettingsUpdate::default())
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
