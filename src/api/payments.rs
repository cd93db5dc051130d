use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::{api_error, AppState};
use crate::database::payment_repository::{Payment, PaymentMode, PaymentStatus};
use crate::error::{AppError, ValidationError};
use crate::middleware::error::success_response;
use crate::services::currency_converter::{self, format_currency, Currency};
use crate::services::{CreatePaymentRequest, CustomerInfo, PaymentTarget};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentBody {
    pub merchant_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    /// JSON number or numeric string
    pub amount: Option<Value>,
    pub currency: Option<String>,
    #[serde(default)]
    pub mode: PaymentMode,
    pub description: Option<String>,
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaymentAmounts {
    pub naira: BigDecimal,
    pub sui: BigDecimal,
    pub display: String,
    /// Smallest on-chain unit (MIST)
    pub blockchain: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub payment_id: Uuid,
    pub payment_link: String,
    pub amounts: PaymentAmounts,
    pub exchange_rate: BigDecimal,
    pub recipient_address: String,
    pub mode: PaymentMode,
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub status: PaymentStatus,
    pub payment: Payment,
}

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentBody {
    #[serde(alias = "txnHash", alias = "digest")]
    pub transaction_hash: Option<String>,
    pub customer_address: Option<String>,
    pub customer_email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptBody {
    pub email: String,
}

/// POST /api/payments
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePaymentBody>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let target = match (body.product_id, body.merchant_id) {
        (Some(product_id), _) => PaymentTarget::Product(product_id),
        (None, Some(merchant_id)) => PaymentTarget::Merchant(merchant_id),
        (None, None) => {
            return Err(api_error(&headers)(AppError::validation(
                ValidationError::MissingField {
                    field: "merchant_id".to_string(),
                },
            )))
        }
    };

    let amount = body
        .amount
        .as_ref()
        .filter(|v| !v.is_null())
        .map(currency_converter::parse_amount)
        .transpose()
        .map_err(api_error(&headers))?;

    let currency = match body.currency.as_deref() {
        Some(code) => Currency::from_str(code).map_err(api_error(&headers))?,
        // Products are priced in SUI; merchant links default to naira
        None if matches!(target, PaymentTarget::Product(_)) => Currency::Sui,
        None => Currency::Ngn,
    };

    let payment = state
        .orchestrator
        .create_payment(CreatePaymentRequest {
            target,
            amount,
            currency,
            mode: body.mode,
            description: body.description,
            reference: body.reference,
        })
        .await
        .map_err(api_error(&headers))?;

    let mist = currency_converter::native_to_smallest_units(&payment.amount)
        .map_err(api_error(&headers))?;

    let response = CreatePaymentResponse {
        payment_id: payment.id,
        payment_link: payment.payment_link.clone(),
        amounts: PaymentAmounts {
            display: format_currency(&payment.amount, Currency::Sui),
            naira: payment.amount_fiat.clone(),
            sui: payment.amount.clone(),
            blockchain: mist.to_string(),
        },
        exchange_rate: payment.exchange_rate.clone(),
        recipient_address: payment.recipient_address.clone(),
        mode: payment.mode,
    };

    Ok((StatusCode::CREATED, success_response(response)))
}

/// GET /api/payments/{id}
pub async fn get_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let payment = state
        .orchestrator
        .get_payment(payment_id)
        .await
        .map_err(api_error(&headers))?;

    Ok(success_response(PaymentStatusResponse {
        status: payment.status,
        payment,
    }))
}

/// POST /api/payments/{id}/verify
///
/// Side effects of a fresh settlement are dispatched on a background task.
pub async fn verify_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<VerifyPaymentBody>,
) -> Result<Json<Value>, AppError> {
    let digest = body.transaction_hash.unwrap_or_default();
    let mut report = state
        .orchestrator
        .verify_payment(
            payment_id,
            &digest,
            CustomerInfo {
                address: body.customer_address,
                email: body.customer_email,
            },
        )
        .await
        .map_err(api_error(&headers))?;

    let outbox = std::mem::take(&mut report.outbox);
    if !outbox.is_empty() {
        let dispatcher = state.dispatcher.clone();
        tokio::spawn(async move {
            let summary = dispatcher.dispatch(outbox).await;
            if summary.is_clean() {
                info!(payment_id = %payment_id, delivered = summary.delivered, "Payment side effects dispatched");
            }
        });
    }

    Ok(success_response(report))
}

/// POST /api/payments/{id}/receipt
pub async fn send_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(payment_id): Path<Uuid>,
    Json(body): Json<ReceiptBody>,
) -> Result<Json<Value>, AppError> {
    let payment = state
        .orchestrator
        .send_receipt(payment_id, &body.email)
        .await
        .map_err(api_error(&headers))?;

    Ok(success_response(serde_json::json!({
        "sent": true,
        "payment_id": payment.id,
        "email": body.email.trim(),
    })))
}
