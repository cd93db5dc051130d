use crate::database::error::DatabaseError;
use crate::database::repository::ProductStore;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// A fixed-price item sold through a shareable link
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_in_sui: BigDecimal,
    /// Address credited by payments for this product
    pub merchant_address: String,
    pub payment_link: String,
    /// Where the customer lands after a verified payment
    pub redirect_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// `{redirect_url}?paymentId={id}`, when a redirect is configured
    pub fn redirect_for(&self, payment_id: Uuid) -> Option<String> {
        self.redirect_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .map(|url| {
                let separator = if url.contains('?') { '&' } else { '?' };
                format!("{}{}paymentId={}", url, separator, payment_id)
            })
    }
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_in_sui: BigDecimal,
    pub merchant_address: String,
    pub payment_link: String,
    pub redirect_url: Option<String>,
}

const PRODUCT_COLUMNS: &str = "id, merchant_id, name, description, price_in_sui, \
     merchant_address, payment_link, redirect_url, created_at";

/// Repository for merchant products
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductStore for ProductRepository {
    async fn insert(&self, product: NewProduct) -> Result<Product, DatabaseError> {
        let query = format!(
            "INSERT INTO products
                (id, merchant_id, name, description, price_in_sui, merchant_address,
                 payment_link, redirect_url)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            PRODUCT_COLUMNS
        );

        sqlx::query_as::<_, Product>(&query)
            .bind(product.id)
            .bind(product.merchant_id)
            .bind(product.name)
            .bind(product.description)
            .bind(product.price_in_sui)
            .bind(product.merchant_address)
            .bind(product.payment_link)
            .bind(product.redirect_url)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>, DatabaseError> {
        let query = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);

        sqlx::query_as::<_, Product>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn list_by_merchant(&self, merchant_id: Uuid) -> Result<Vec<Product>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM products WHERE merchant_id = $1 ORDER BY created_at DESC",
            PRODUCT_COLUMNS
        );

        sqlx::query_as::<_, Product>(&query)
            .bind(merchant_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }
}
