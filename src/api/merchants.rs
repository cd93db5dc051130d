use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::auth::{generate_api_key, hash_api_key, MerchantKey};
use super::{api_error, load_merchant, AppState};
use crate::database::merchant_rate_repository::{MerchantRateSettings, RateSource};
use crate::database::merchant_repository::{Merchant, MerchantSettingsUpdate, NewMerchant};
use crate::database::payment_repository::Payment;
use crate::error::{AppError, DomainError, ValidationError};
use crate::logging::mask_address;
use crate::middleware::error::success_response;
use crate::services::currency_converter;
use crate::services::merchant_rate::{change_percent, RatePreferences};
use crate::services::validation::{normalize_sui_address, validate_email};

/// Wallet details safe to show to paying customers
#[derive(Debug, Serialize)]
pub struct MerchantWalletInfo {
    pub id: Uuid,
    pub business_name: String,
    pub wallet_address: String,
    pub sui_wallet_address: Option<String>,
    pub smart_contract_enabled: bool,
}

impl From<Merchant> for MerchantWalletInfo {
    fn from(merchant: Merchant) -> Self {
        Self {
            id: merchant.id,
            business_name: merchant.business_name,
            wallet_address: merchant.wallet_address,
            sui_wallet_address: merchant.sui_wallet_address,
            smart_contract_enabled: merchant.smart_contract_enabled,
        }
    }
}

/// Owner's view of a merchant, returned to key holders
#[derive(Debug, Serialize)]
pub struct MerchantProfile {
    pub id: Uuid,
    pub email: String,
    pub business_name: String,
    pub wallet_address: String,
    pub sui_wallet_address: Option<String>,
    pub webhook_url: Option<String>,
    pub smart_contract_enabled: bool,
}

impl From<Merchant> for MerchantProfile {
    fn from(merchant: Merchant) -> Self {
        Self {
            id: merchant.id,
            email: merchant.email,
            business_name: merchant.business_name,
            wallet_address: merchant.wallet_address,
            sui_wallet_address: merchant.sui_wallet_address,
            webhook_url: merchant.webhook_url,
            smart_contract_enabled: merchant.smart_contract_enabled,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMerchantBody {
    pub email: String,
    pub business_name: String,
    pub wallet_address: String,
    pub sui_wallet_address: Option<String>,
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub smart_contract_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct MerchantRegistration {
    pub merchant: MerchantProfile,
    /// Shown once; only its hash is kept
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsBody {
    pub business_name: Option<String>,
    /// Empty string removes the webhook
    pub webhook_url: Option<String>,
    pub smart_contract_enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct SetWalletBody {
    pub sui_wallet_address: String,
}

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<Payment>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct RateSettingsResponse {
    pub settings: MerchantRateSettings,
    /// Percent change from the previous rate, 2 dp
    pub rate_change_percent: BigDecimal,
}

impl From<MerchantRateSettings> for RateSettingsResponse {
    fn from(settings: MerchantRateSettings) -> Self {
        Self {
            rate_change_percent: change_percent(&settings),
            settings,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetRateBody {
    /// USDT→NGN, JSON number or numeric string
    pub rate: Value,
}

fn required_text(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(ValidationError::MissingField {
            field: field.to_string(),
        }));
    }
    Ok(value.to_string())
}

fn validate_webhook_url(url: &str) -> Result<String, AppError> {
    let invalid = |reason: &str| {
        AppError::validation(ValidationError::InvalidField {
            field: "webhook_url".to_string(),
            reason: reason.to_string(),
        })
    };
    let parsed = reqwest::Url::parse(url.trim()).map_err(|_| invalid("Not a valid URL"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("Webhook URL must use http or https"));
    }
    Ok(parsed.to_string())
}

fn optional_webhook(url: Option<&str>) -> Result<Option<String>, AppError> {
    url.map(str::trim)
        .filter(|url| !url.is_empty())
        .map(validate_webhook_url)
        .transpose()
}

/// POST /api/merchants
pub async fn create_merchant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateMerchantBody>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let email = body.email.trim().to_lowercase();
    validate_email(&email).map_err(api_error(&headers))?;
    let business_name =
        required_text("business_name", &body.business_name).map_err(api_error(&headers))?;
    let wallet_address =
        normalize_sui_address(&body.wallet_address).map_err(api_error(&headers))?;
    let sui_wallet_address = body
        .sui_wallet_address
        .as_deref()
        .filter(|addr| !addr.trim().is_empty())
        .map(normalize_sui_address)
        .transpose()
        .map_err(api_error(&headers))?;
    let webhook_url = optional_webhook(body.webhook_url.as_deref()).map_err(api_error(&headers))?;

    let api_key = generate_api_key();
    let merchant = state
        .merchants
        .insert(NewMerchant {
            id: Uuid::new_v4(),
            email: email.clone(),
            business_name,
            wallet_address,
            sui_wallet_address,
            webhook_url,
            smart_contract_enabled: body.smart_contract_enabled,
            api_key_hash: hash_api_key(&api_key),
        })
        .await
        .map_err(|err| {
            if err.is_unique_violation() {
                api_error(&headers)(AppError::domain(DomainError::MerchantAlreadyExists {
                    email: email.clone(),
                }))
            } else {
                api_error(&headers)(err)
            }
        })?;

    info!(
        merchant_id = %merchant.id,
        wallet = %mask_address(&merchant.wallet_address),
        smart_contract_enabled = merchant.smart_contract_enabled,
        "Merchant registered"
    );
    Ok((
        StatusCode::CREATED,
        success_response(MerchantRegistration {
            merchant: MerchantProfile::from(merchant),
            api_key,
        }),
    ))
}

/// GET /api/merchants/{id}
pub async fn get_merchant(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(merchant_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let merchant = load_merchant(&state, merchant_id)
        .await
        .map_err(api_error(&headers))?;
    Ok(success_response(MerchantWalletInfo::from(merchant)))
}

/// PUT /api/merchants/{id}/settings
pub async fn update_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    key: MerchantKey,
    Path(merchant_id): Path<Uuid>,
    Json(body): Json<UpdateSettingsBody>,
) -> Result<Json<Value>, AppError> {
    let merchant = load_merchant(&state, merchant_id)
        .await
        .map_err(api_error(&headers))?;
    key.authorize(&merchant).map_err(api_error(&headers))?;

    let update = MerchantSettingsUpdate {
        business_name: body
            .business_name
            .as_deref()
            .map(|name| required_text("business_name", name))
            .transpose()
            .map_err(api_error(&headers))?,
        webhook_url: match body.webhook_url.as_deref() {
            None => None,
            Some(url) => Some(optional_webhook(Some(url)).map_err(api_error(&headers))?),
        },
        smart_contract_enabled: body.smart_contract_enabled,
    };

    let merchant = state
        .merchants
        .update_settings(merchant_id, update)
        .await
        .map_err(api_error(&headers))?
        .ok_or_else(|| {
            api_error(&headers)(AppError::domain(DomainError::MerchantNotFound {
                merchant_id: merchant_id.to_string(),
            }))
        })?;

    info!(
        merchant_id = %merchant_id,
        webhook = merchant.webhook_url.is_some(),
        smart_contract_enabled = merchant.smart_contract_enabled,
        "Merchant settings updated"
    );
    Ok(success_response(MerchantProfile::from(merchant)))
}

/// POST /api/merchants/{id}/wallet
pub async fn set_wallet(
    State(state): State<AppState>,
    headers: HeaderMap,
    key: MerchantKey,
    Path(merchant_id): Path<Uuid>,
    Json(body): Json<SetWalletBody>,
) -> Result<Json<Value>, AppError> {
    let merchant = load_merchant(&state, merchant_id)
        .await
        .map_err(api_error(&headers))?;
    key.authorize(&merchant).map_err(api_error(&headers))?;
    let address = normalize_sui_address(&body.sui_wallet_address).map_err(api_error(&headers))?;

    let merchant = state
        .merchants
        .update_sui_wallet(merchant_id, &address)
        .await
        .map_err(api_error(&headers))?
        .ok_or_else(|| {
            api_error(&headers)(AppError::domain(DomainError::MerchantNotFound {
                merchant_id: merchant_id.to_string(),
            }))
        })?;

    info!(
        merchant_id = %merchant_id,
        sui_wallet = %mask_address(&address),
        "Merchant Sui wallet updated"
    );
    Ok(success_response(MerchantWalletInfo::from(merchant)))
}

/// GET /api/merchants/{id}/payments
pub async fn list_payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    key: MerchantKey,
    Path(merchant_id): Path<Uuid>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Value>, AppError> {
    let merchant = load_merchant(&state, merchant_id)
        .await
        .map_err(api_error(&headers))?;
    key.authorize(&merchant).map_err(api_error(&headers))?;

    let payments = state
        .orchestrator
        .list_merchant_payments(merchant_id, query.limit)
        .await
        .map_err(api_error(&headers))?;

    Ok(success_response(PaymentListResponse {
        count: payments.len(),
        payments,
    }))
}

/// GET /api/merchants/{id}/rate-settings
pub async fn get_rate_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(merchant_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    load_merchant(&state, merchant_id)
        .await
        .map_err(api_error(&headers))?;
    let settings = state
        .pricing
        .rates()
        .get_settings(merchant_id)
        .await
        .map_err(api_error(&headers))?;

    Ok(success_response(RateSettingsResponse::from(settings)))
}

/// PUT /api/merchants/{id}/rate-settings/usdt-rate
pub async fn set_usdt_rate(
    State(state): State<AppState>,
    headers: HeaderMap,
    key: MerchantKey,
    Path(merchant_id): Path<Uuid>,
    Json(body): Json<SetRateBody>,
) -> Result<Json<Value>, AppError> {
    let merchant = load_merchant(&state, merchant_id)
        .await
        .map_err(api_error(&headers))?;
    key.authorize(&merchant).map_err(api_error(&headers))?;
    let rate = currency_converter::parse_amount(&body.rate).map_err(api_error(&headers))?;

    let settings = state
        .pricing
        .rates()
        .set_rate(merchant_id, rate, &merchant.email, RateSource::Manual)
        .await
        .map_err(api_error(&headers))?;

    Ok(success_response(RateSettingsResponse::from(settings)))
}

/// PUT /api/merchants/{id}/rate-settings/preferences
pub async fn update_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
    key: MerchantKey,
    Path(merchant_id): Path<Uuid>,
    Json(preferences): Json<RatePreferences>,
) -> Result<Json<Value>, AppError> {
    let merchant = load_merchant(&state, merchant_id)
        .await
        .map_err(api_error(&headers))?;
    key.authorize(&merchant).map_err(api_error(&headers))?;
    let settings = state
        .pricing
        .rates()
        .update_preferences(merchant_id, preferences)
        .await
        .map_err(api_error(&headers))?;

    Ok(success_response(RateSettingsResponse::from(settings)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_url_must_be_http() {
        assert_eq!(
            optional_webhook(Some(" https://shop.example.com/hook ")).unwrap(),
            Some("https://shop.example.com/hook".to_string())
        );
        assert_eq!(optional_webhook(Some("")).unwrap(), None);
        assert_eq!(optional_webhook(None).unwrap(), None);
        assert!(optional_webhook(Some("ftp://shop.example.com")).is_err());
        assert!(optional_webhook(Some("not a url")).is_err());
    }

    #[test]
    fn test_profile_hides_key_hash() {
        let merchant = Merchant {
            id: Uuid::new_v4(),
            email: "shop@example.com".to_string(),
            business_name: "Shop".to_string(),
            wallet_address: format!("0x{}", "a".repeat(64)),
            sui_wallet_address: None,
            webhook_url: Some("https://shop.example.com/hook".to_string()),
            smart_contract_enabled: true,
            api_key_hash: hash_api_key("secret"),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let json = serde_json::to_value(MerchantProfile::from(merchant)).unwrap();
        assert!(json.get("api_key_hash").is_none());
        assert_eq!(json["smart_contract_enabled"], true);
    }
}
