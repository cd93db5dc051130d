//! Unified error handling for the SuiFlow backend
//!
//! Every module error converts into [`AppError`], which carries the HTTP
//! status mapping, a machine-readable [`ErrorCode`] and a user-facing message.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::logging::mask_address;

/// Error codes for programmatic handling by API clients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Validation errors (400)
    #[serde(rename = "INVALID_AMOUNT")]
    InvalidAmount,
    #[serde(rename = "INVALID_RATE")]
    InvalidRate,
    #[serde(rename = "RATE_OUT_OF_RANGE")]
    RateOutOfRange,
    #[serde(rename = "INVALID_CURRENCY")]
    InvalidCurrency,
    #[serde(rename = "INVALID_WALLET_ADDRESS")]
    InvalidWalletAddress,

    // Verification failures (422)
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "TRANSACTION_FAILED")]
    TransactionFailed,
    #[serde(rename = "WRONG_CONTRACT")]
    WrongContract,
    #[serde(rename = "AMOUNT_MISMATCH")]
    AmountMismatch,
    #[serde(rename = "NO_CREDIT_FOUND")]
    NoCreditFound,

    // Domain errors
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "MERCHANT_NOT_FOUND")]
    MerchantNotFound,
    #[serde(rename = "PRODUCT_NOT_FOUND")]
    ProductNotFound,
    #[serde(rename = "PAYMENT_NOT_COMPLETED")]
    PaymentNotCompleted,
    #[serde(rename = "DUPLICATE_TRANSACTION")]
    DuplicateTransaction,
    #[serde(rename = "MERCHANT_ALREADY_EXISTS")]
    MerchantAlreadyExists,

    // Authentication (401/403)
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "FORBIDDEN")]
    Forbidden,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CACHE_ERROR")]
    CacheError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors
    #[serde(rename = "EXTERNAL_SERVICE_UNAVAILABLE")]
    ExternalServiceUnavailable,
    #[serde(rename = "BLOCKCHAIN_ERROR")]
    BlockchainError,
    #[serde(rename = "EXTERNAL_SERVICE_TIMEOUT")]
    ExternalServiceTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule failures, including failed on-chain verification
#[derive(Debug, Clone)]
pub enum DomainError {
    /// The RPC node has no such transaction or could not be reached
    TransactionNotFound { digest: String },
    /// The transaction executed but its effects status is not success
    TransactionFailed { digest: String, reason: String },
    /// Contract-mediated payment did not call the configured package
    WrongContract { digest: String, expected_package: String },
    /// Recipient was credited, but not with the expected amount
    AmountMismatch { expected: String, observed: String },
    /// Nothing in the transaction credits the recipient
    NoCreditFound { recipient: String },
    PaymentNotFound { payment_id: String },
    MerchantNotFound { merchant_id: String },
    ProductNotFound { product_id: String },
    /// Operation requires a paid payment
    PaymentNotCompleted { payment_id: String },
    /// Digest already settled a different payment
    DuplicateTransaction { digest: String },
    MerchantAlreadyExists { email: String },
    /// No usable API key on the request
    Unauthorized { reason: String },
    /// API key does not belong to the merchant being acted on
    Forbidden { merchant_id: String },
}

/// Infrastructure-level errors (database, cache, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Cache { message: String },
    Configuration { message: String },
}

/// External service errors (RPC node, market data, email relay)
#[derive(Debug, Clone)]
pub enum ExternalError {
    ServiceUnavailable { service: String, message: String },
    Blockchain { message: String, is_retryable: bool },
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidAmount { amount: String, reason: String },
    InvalidRate { rate: String, reason: String },
    RateOutOfRange { rate: String, min: String, max: String },
    InvalidCurrency { currency: String, reason: String },
    InvalidWalletAddress { address: String, reason: String },
    InvalidEmail { email: String },
    MissingField { field: String },
    InvalidField { field: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => 422,
                DomainError::TransactionFailed { .. } => 422,
                DomainError::WrongContract { .. } => 422,
                DomainError::AmountMismatch { .. } => 422,
                DomainError::NoCreditFound { .. } => 422,
                DomainError::PaymentNotFound { .. } => 404,
                DomainError::MerchantNotFound { .. } => 404,
                DomainError::ProductNotFound { .. } => 404,
                DomainError::PaymentNotCompleted { .. } => 409,
                DomainError::DuplicateTransaction { .. } => 409,
                DomainError::MerchantAlreadyExists { .. } => 409,
                DomainError::Unauthorized { .. } => 401,
                DomainError::Forbidden { .. } => 403,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::ServiceUnavailable { .. } => 503,
                ExternalError::Blockchain { .. } => 502,
                ExternalError::Timeout { .. } => 504,
            },
            AppErrorKind::Validation(_) => 400,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { .. } => ErrorCode::TransactionNotFound,
                DomainError::TransactionFailed { .. } => ErrorCode::TransactionFailed,
                DomainError::WrongContract { .. } => ErrorCode::WrongContract,
                DomainError::AmountMismatch { .. } => ErrorCode::AmountMismatch,
                DomainError::NoCreditFound { .. } => ErrorCode::NoCreditFound,
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                DomainError::MerchantNotFound { .. } => ErrorCode::MerchantNotFound,
                DomainError::ProductNotFound { .. } => ErrorCode::ProductNotFound,
                DomainError::PaymentNotCompleted { .. } => ErrorCode::PaymentNotCompleted,
                DomainError::DuplicateTransaction { .. } => ErrorCode::DuplicateTransaction,
                DomainError::MerchantAlreadyExists { .. } => ErrorCode::MerchantAlreadyExists,
                DomainError::Unauthorized { .. } => ErrorCode::Unauthorized,
                DomainError::Forbidden { .. } => ErrorCode::Forbidden,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Cache { .. } => ErrorCode::CacheError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::ServiceUnavailable { .. } => ErrorCode::ExternalServiceUnavailable,
                ExternalError::Blockchain { .. } => ErrorCode::BlockchainError,
                ExternalError::Timeout { .. } => ErrorCode::ExternalServiceTimeout,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
                ValidationError::InvalidRate { .. } => ErrorCode::InvalidRate,
                ValidationError::RateOutOfRange { .. } => ErrorCode::RateOutOfRange,
                ValidationError::InvalidCurrency { .. } => ErrorCode::InvalidCurrency,
                ValidationError::InvalidWalletAddress { .. } => ErrorCode::InvalidWalletAddress,
                _ => ErrorCode::ValidationError,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::TransactionNotFound { digest } => {
                    format!("Transaction '{}' was not found on chain", digest)
                }
                DomainError::TransactionFailed { digest, reason } => {
                    format!("Transaction '{}' did not succeed: {}", digest, reason)
                }
                DomainError::WrongContract {
                    digest,
                    expected_package,
                } => {
                    format!(
                        "Transaction '{}' did not call the payment contract ({})",
                        digest,
                        mask_address(expected_package)
                    )
                }
                DomainError::AmountMismatch { expected, observed } => {
                    format!(
                        "Payment amount mismatch. Expected: {} MIST, Received: {} MIST",
                        expected, observed
                    )
                }
                DomainError::NoCreditFound { recipient } => {
                    format!(
                        "No transfer to merchant wallet {} found in transaction",
                        mask_address(recipient)
                    )
                }
                DomainError::PaymentNotFound { payment_id } => {
                    format!("Payment '{}' not found", payment_id)
                }
                DomainError::MerchantNotFound { merchant_id } => {
                    format!("Merchant '{}' not found", merchant_id)
                }
                DomainError::ProductNotFound { product_id } => {
                    format!("Product '{}' not found", product_id)
                }
                DomainError::PaymentNotCompleted { payment_id } => {
                    format!("Payment '{}' has not been completed yet", payment_id)
                }
                DomainError::DuplicateTransaction { digest } => {
                    format!("Transaction '{}' was already used for another payment", digest)
                }
                DomainError::MerchantAlreadyExists { email } => {
                    format!("A merchant is already registered with '{}'", email)
                }
                DomainError::Unauthorized { reason } => reason.clone(),
                DomainError::Forbidden { merchant_id } => {
                    format!("API key is not valid for merchant '{}'", merchant_id)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::ServiceUnavailable { service, .. } => {
                    format!("{} is temporarily unavailable. Please try again", service)
                }
                ExternalError::Blockchain { is_retryable, .. } => {
                    if *is_retryable {
                        "Sui network is busy. Please try again in a moment".to_string()
                    } else {
                        "Blockchain request failed. Please contact support".to_string()
                    }
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
                ValidationError::InvalidRate { rate, reason } => {
                    format!("Invalid rate '{}': {}", rate, reason)
                }
                ValidationError::RateOutOfRange { rate, min, max } => {
                    format!("Rate {} must be between {} and {}", rate, min, max)
                }
                ValidationError::InvalidCurrency { currency, reason } => {
                    format!("Invalid currency '{}': {}", currency, reason)
                }
                ValidationError::InvalidWalletAddress { address, reason } => {
                    format!("Invalid wallet address '{}': {}", address, reason)
                }
                ValidationError::InvalidEmail { email } => {
                    format!("Invalid email address '{}'", email)
                }
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            // The node may not have indexed the transaction yet
            AppErrorKind::Domain(DomainError::TransactionNotFound { .. }) => true,
            AppErrorKind::Domain(_) => false,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Cache { .. } => true,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::ServiceUnavailable { .. } => true,
                ExternalError::Blockchain { is_retryable, .. } => *is_retryable,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// Conversions from module errors live next to those errors
// (database/error.rs, services/*.rs) to keep this module dependency-free.

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
