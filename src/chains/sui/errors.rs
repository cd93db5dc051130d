use thiserror::Error;

use crate::error::{AppError, AppErrorKind, ExternalError};

pub type SuiResult<T> = Result<T, SuiError>;

#[derive(Debug, Error)]
pub enum SuiError {
    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("RPC error {code}: {message}")]
    RpcError { code: i64, message: String },

    #[error("Rate limit exceeded. Please try again later")]
    RateLimitError,

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    #[error("Timeout error: operation timed out after {seconds} seconds")]
    TimeoutError { seconds: u64 },
}

impl SuiError {
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn rpc_error(code: i64, message: impl Into<String>) -> Self {
        Self::RpcError {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn serialization_error(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    pub fn timeout_error(seconds: u64) -> Self {
        Self::TimeoutError { seconds }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SuiError::NetworkError { .. } | SuiError::RateLimitError | SuiError::TimeoutError { .. }
        )
    }
}

impl From<reqwest::Error> for SuiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SuiError::timeout_error(0)
        } else if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            SuiError::RateLimitError
        } else {
            SuiError::network_error(format!("Request error: {}", err))
        }
    }
}

impl From<serde_json::Error> for SuiError {
    fn from(err: serde_json::Error) -> Self {
        SuiError::serialization_error(format!("JSON error: {}", err))
    }
}

impl From<SuiError> for AppError {
    fn from(err: SuiError) -> Self {
        let kind = match &err {
            SuiError::TimeoutError { seconds } => ExternalError::Timeout {
                service: "Sui RPC".to_string(),
                timeout_secs: *seconds,
            },
            _ => ExternalError::Blockchain {
                message: err.to_string(),
                is_retryable: err.is_retryable(),
            },
        };
        AppError::new(AppErrorKind::External(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SuiError::network_error("down").is_retryable());
        assert!(SuiError::RateLimitError.is_retryable());
        assert!(!SuiError::rpc_error(-32602, "invalid params").is_retryable());
    }

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let app: AppError = SuiError::timeout_error(10).into();
        assert_eq!(app.status_code(), 504);

        let app: AppError = SuiError::rpc_error(-32000, "boom").into();
        assert_eq!(app.status_code(), 502);
    }
}
