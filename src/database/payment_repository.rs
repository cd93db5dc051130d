use crate::database::error::DatabaseError;
use crate::database::repository::PaymentStore;
use crate::services::currency_converter::Currency;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Domain types
// ============================================================================

/// Payment lifecycle. Transitions only move forward out of `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn to_db_status(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Failed)
    }
}

/// How the customer settles on chain
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Plain wallet-to-wallet transfer
    #[default]
    #[serde(alias = "traditional")]
    DirectTransfer,
    /// Routed through the payment processor contract, which splits off the admin fee
    #[serde(alias = "smart_contract")]
    ContractMediated,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::DirectTransfer => "direct_transfer",
            PaymentMode::ContractMediated => "contract_mediated",
        }
    }
}

impl FromStr for PaymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct_transfer" | "traditional" => Ok(PaymentMode::DirectTransfer),
            "contract_mediated" | "smart_contract" => Ok(PaymentMode::ContractMediated),
            other => Err(format!("unknown payment mode '{}'", other)),
        }
    }
}

/// Contract-side details recorded on a contract-mediated payment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContractDetails {
    pub package_id: String,
    pub processor_object_id: String,
    pub admin_fee: BigDecimal,
    pub merchant_received: BigDecimal,
}

/// A single payment intent and its outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub merchant_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    /// SUI amount, authoritative for settlement
    pub amount: BigDecimal,
    /// Advisory Naira value at creation
    pub amount_fiat: BigDecimal,
    pub currency: Currency,
    /// Naira per SUI used at creation
    pub exchange_rate: BigDecimal,
    pub recipient_address: String,
    pub mode: PaymentMode,
    pub status: PaymentStatus,
    pub transaction_hash: Option<String>,
    pub customer_address: Option<String>,
    pub customer_email: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub payment_link: String,
    pub contract_details: Option<ContractDetails>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn is_paid(&self) -> bool {
        self.status == PaymentStatus::Paid
    }
}

/// Fields supplied when a payment is created
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: Uuid,
    pub merchant_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub amount_fiat: BigDecimal,
    pub currency: Currency,
    pub exchange_rate: BigDecimal,
    pub recipient_address: String,
    pub mode: PaymentMode,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub payment_link: String,
}

/// Fields written by the pending → paid transition
#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    pub transaction_hash: String,
    pub customer_address: Option<String>,
    pub customer_email: Option<String>,
    pub contract_details: Option<ContractDetails>,
}

// ============================================================================
// Row mapping
// ============================================================================

#[derive(Debug, Clone, FromRow)]
struct PaymentRow {
    id: Uuid,
    merchant_id: Option<Uuid>,
    product_id: Option<Uuid>,
    amount: BigDecimal,
    amount_fiat: BigDecimal,
    currency: String,
    exchange_rate: BigDecimal,
    recipient_address: String,
    mode: String,
    status: String,
    transaction_hash: Option<String>,
    customer_address: Option<String>,
    customer_email: Option<String>,
    description: Option<String>,
    reference: Option<String>,
    payment_link: String,
    contract_details: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = PaymentStatus::from_db_status(&row.status)
            .ok_or_else(|| DatabaseError::decode(format!("unknown status '{}'", row.status)))?;
        let mode = PaymentMode::from_str(&row.mode).map_err(DatabaseError::decode)?;
        let currency = Currency::from_str(&row.currency)
            .map_err(|e| DatabaseError::decode(e.to_string()))?;
        let contract_details = row
            .contract_details
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| DatabaseError::decode(format!("contract_details: {}", e)))?;

        Ok(Payment {
            id: row.id,
            merchant_id: row.merchant_id,
            product_id: row.product_id,
            amount: row.amount,
            amount_fiat: row.amount_fiat,
            currency,
            exchange_rate: row.exchange_rate,
            recipient_address: row.recipient_address,
            mode,
            status,
            transaction_hash: row.transaction_hash,
            customer_address: row.customer_address,
            customer_email: row.customer_email,
            description: row.description,
            reference: row.reference,
            payment_link: row.payment_link,
            contract_details,
            created_at: row.created_at,
            paid_at: row.paid_at,
        })
    }
}

const PAYMENT_COLUMNS: &str = "id, merchant_id, product_id, amount, amount_fiat, currency, \
     exchange_rate, recipient_address, mode, status, transaction_hash, customer_address, \
     customer_email, description, reference, payment_link, contract_details, created_at, paid_at";

// ============================================================================
// Postgres repository
// ============================================================================

/// Postgres-backed payment storage
pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn insert(&self, payment: NewPayment) -> Result<Payment, DatabaseError> {
        let query = format!(
            "INSERT INTO payments
                (id, merchant_id, product_id, amount, amount_fiat, currency, exchange_rate,
                 recipient_address, mode, status, description, reference, payment_link)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10, $11, $12)
             RETURNING {}",
            PAYMENT_COLUMNS
        );

        let row = sqlx::query_as::<_, PaymentRow>(&query)
            .bind(payment.id)
            .bind(payment.merchant_id)
            .bind(payment.product_id)
            .bind(payment.amount)
            .bind(payment.amount_fiat)
            .bind(payment.currency.as_str())
            .bind(payment.exchange_rate)
            .bind(payment.recipient_address)
            .bind(payment.mode.as_str())
            .bind(payment.description)
            .bind(payment.reference)
            .bind(payment.payment_link)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, DatabaseError> {
        let query = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn find_by_transaction_hash(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<Payment>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM payments WHERE transaction_hash = $1",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(transaction_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Payment::try_from)
            .transpose()
    }

    async fn list_by_merchant(
        &self,
        merchant_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Payment>, DatabaseError> {
        let query = format!(
            "SELECT {} FROM payments WHERE merchant_id = $1 ORDER BY created_at DESC LIMIT $2",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(merchant_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .into_iter()
            .map(Payment::try_from)
            .collect()
    }

    async fn mark_paid(
        &self,
        id: Uuid,
        settlement: PaymentSettlement,
    ) -> Result<Option<Payment>, DatabaseError> {
        let contract_details = settlement
            .contract_details
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DatabaseError::decode(e.to_string()))?;

        // Compare-and-swap: only a still-pending row transitions
        let query = format!(
            "UPDATE payments
             SET status = 'paid', transaction_hash = $2, customer_address = $3,
                 customer_email = $4, contract_details = $5, paid_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING {}",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentRow>(&query)
            .bind(id)
            .bind(settlement.transaction_hash)
            .bind(settlement.customer_address)
            .bind(settlement.customer_email)
            .bind(contract_details)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(Payment::try_from)
            .transpose()
    }
}
