//! Input format checks shared by the API and the orchestrator

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{AppError, ValidationError};

static SUI_ADDRESS: OnceLock<Regex> = OnceLock::new();
static EMAIL: OnceLock<Regex> = OnceLock::new();

fn sui_address_pattern() -> &'static Regex {
    SUI_ADDRESS.get_or_init(|| Regex::new(r"^0x[a-fA-F0-9]{64}$").expect("static pattern"))
}

fn email_pattern() -> &'static Regex {
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static pattern"))
}

/// `0x` followed by 64 hex characters
pub fn is_valid_sui_address(address: &str) -> bool {
    sui_address_pattern().is_match(address)
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email)
}

pub fn validate_sui_address(address: &str) -> Result<(), AppError> {
    if is_valid_sui_address(address) {
        return Ok(());
    }
    Err(AppError::validation(ValidationError::InvalidWalletAddress {
        address: address.to_string(),
        reason: "Expected 0x followed by 64 hex characters".to_string(),
    }))
}

/// Validate and lowercase, the form RPC nodes report owners in
pub fn normalize_sui_address(address: &str) -> Result<String, AppError> {
    let address = address.trim();
    validate_sui_address(address)?;
    Ok(address.to_ascii_lowercase())
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if is_valid_email(email) {
        return Ok(());
    }
    Err(AppError::validation(ValidationError::InvalidEmail {
        email: email.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sui_address_format() {
        assert!(is_valid_sui_address(&format!("0x{}", "a".repeat(64))));
        assert!(is_valid_sui_address(&format!("0x{}", "F0".repeat(32))));
        assert!(!is_valid_sui_address(&format!("0x{}", "a".repeat(63))));
        assert!(!is_valid_sui_address(&format!("0x{}", "g".repeat(64))));
        assert!(!is_valid_sui_address(&"a".repeat(66)));
    }

    #[test]
    fn test_normalize_lowercases_hex() {
        let upper = format!("0x{}", "AB".repeat(32));
        assert_eq!(
            normalize_sui_address(&format!("  {} ", upper)).unwrap(),
            format!("0x{}", "ab".repeat(32))
        );
        assert!(normalize_sui_address("0x1234").is_err());
    }

    #[test]
    fn test_email_format() {
        assert!(is_valid_email("buyer@example.com"));
        assert!(!is_valid_email("buyer@example"));
        assert!(!is_valid_email("buyer example.com"));
        assert!(validate_email("nope").is_err());
    }
}
