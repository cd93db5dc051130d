//! Merchant API keys
//!
//! A key is issued once, when the merchant registers, and only its SHA-256
//! digest is stored. Handlers that change merchant-owned data take a
//! [`MerchantKey`] and call [`MerchantKey::authorize`] with the merchant
//! being acted on.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::database::merchant_repository::Merchant;
use crate::error::{AppError, DomainError};
use crate::middleware::error::get_request_id_from_headers;

pub const API_KEY_PREFIX: &str = "sfk_";

/// Alternative to `Authorization: Bearer`
pub const API_KEY_HEADER: &str = "x-api-key";

/// New random key; shown to the merchant once
pub fn generate_api_key() -> String {
    format!(
        "{}{}{}",
        API_KEY_PREFIX,
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

pub fn hash_api_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// API key presented on the request
#[derive(Debug)]
pub struct MerchantKey(String);

impl MerchantKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn authorize(&self, merchant: &Merchant) -> Result<(), AppError> {
        if !merchant.api_key_hash.is_empty() && hash_api_key(&self.0) == merchant.api_key_hash {
            return Ok(());
        }
        warn!(merchant_id = %merchant.id, "API key rejected");
        Err(AppError::domain(DomainError::Forbidden {
            merchant_id: merchant.id.to_string(),
        }))
    }
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let header = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    bearer
        .or(header)
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for MerchantKey {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match presented_key(&parts.headers) {
            Some(key) => Ok(MerchantKey::new(key)),
            None => {
                let err = AppError::domain(DomainError::Unauthorized {
                    reason: "A merchant API key is required".to_string(),
                });
                Err(match get_request_id_from_headers(&parts.headers) {
                    Some(request_id) => err.with_request_id(request_id),
                    None => err,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::Utc;

    fn merchant(api_key_hash: String) -> Merchant {
        Merchant {
            id: Uuid::new_v4(),
            email: "shop@example.com".to_string(),
            business_name: "Shop".to_string(),
            wallet_address: format!("0x{}", "1".repeat(64)),
            sui_wallet_address: None,
            webhook_url: None,
            smart_contract_enabled: false,
            api_key_hash,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_generated_keys_are_unique_and_prefixed() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a, b);
        assert!(a.starts_with(API_KEY_PREFIX));
        assert_eq!(a.len(), API_KEY_PREFIX.len() + 64);
        assert_eq!(hash_api_key(&a).len(), 64);
    }

    #[test]
    fn test_authorize_checks_the_owning_merchant() {
        let key = generate_api_key();
        let owner = merchant(hash_api_key(&key));
        let other = merchant(hash_api_key(&generate_api_key()));

        assert!(MerchantKey::new(key.clone()).authorize(&owner).is_ok());
        let err = MerchantKey::new(key).authorize(&other).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn test_merchant_without_key_rejects_everything() {
        let keyless = merchant(String::new());
        assert!(MerchantKey::new("").authorize(&keyless).is_err());
        assert!(MerchantKey::new("anything").authorize(&keyless).is_err());
    }

    #[test]
    fn test_key_from_either_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("sfk_header"));
        assert_eq!(presented_key(&headers), Some("sfk_header"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer sfk_bearer"));
        assert_eq!(presented_key(&headers), Some("sfk_bearer"));

        let mut basic = HeaderMap::new();
        basic.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(presented_key(&basic), None);
    }
}
