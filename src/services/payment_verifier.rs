//! Chain Verifier
//!
//! Decides whether an on-chain transaction settles a payment: the transaction
//! must exist, have succeeded and credit the expected recipient with the
//! expected amount (within a tolerance). Contract-mediated payments must also
//! call the payment processor package, and the recipient is expected to
//! receive the amount net of the admin fee.
//!
//! The verifier is stateless and never retries.

use bigdecimal::BigDecimal;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chains::traits::{ChainClient, ExecutionStatus, TransactionReceipt};
use crate::config::env_or;
use crate::database::payment_repository::PaymentMode;
use crate::error::{AppError, DomainError};
use crate::logging::mask_address;
use crate::services::currency_converter::{native_to_smallest_units, ConversionError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VerificationError {
    #[error("Transaction {digest} not found")]
    TransactionNotFound { digest: String },

    #[error("Transaction {digest} failed: {reason}")]
    TransactionFailed { digest: String, reason: String },

    #[error("Transaction {digest} did not call package {expected_package}")]
    WrongContract {
        digest: String,
        expected_package: String,
    },

    #[error("Amount mismatch: expected {expected} MIST, observed {observed} MIST")]
    AmountMismatch { expected: i128, observed: i128 },

    #[error("No credit to {recipient} found")]
    NoCreditFound { recipient: String },

    #[error("Invalid expected amount: {0}")]
    InvalidAmount(#[from] ConversionError),
}

pub type VerificationResult<T> = Result<T, VerificationError>;

impl From<VerificationError> for AppError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::TransactionNotFound { digest } => {
                AppError::domain(DomainError::TransactionNotFound { digest })
            }
            VerificationError::TransactionFailed { digest, reason } => {
                AppError::domain(DomainError::TransactionFailed { digest, reason })
            }
            VerificationError::WrongContract {
                digest,
                expected_package,
            } => AppError::domain(DomainError::WrongContract {
                digest,
                expected_package,
            }),
            VerificationError::AmountMismatch { expected, observed } => {
                AppError::domain(DomainError::AmountMismatch {
                    expected: expected.to_string(),
                    observed: observed.to_string(),
                })
            }
            VerificationError::NoCreditFound { recipient } => {
                AppError::domain(DomainError::NoCreditFound { recipient })
            }
            VerificationError::InvalidAmount(conversion) => conversion.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub coin_type: String,
    /// Allowed |observed - expected| in MIST
    pub tolerance_units: i128,
    pub package_id: String,
    pub processor_object_id: String,
    pub admin_address: String,
    /// Fee withheld by the processor contract, in SUI
    pub admin_fee: BigDecimal,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            coin_type: "0x2::sui::SUI".to_string(),
            tolerance_units: 1_000_000,
            package_id: "0x2a0eeb98d575a07fe472e02e3872fd5fabc960e0350c19e084aaff7535235fa6"
                .to_string(),
            processor_object_id:
                "0xd1a10185b58c7501bd23aedb5e7d1942bca97e0b882ee52fd930cad1169d6feee".to_string(),
            admin_address: "0x6b3bd536eb26182cfb83b921d2a2216e3275583298beeb1d736fc94dc29669cd"
                .to_string(),
            admin_fee: BigDecimal::new(1.into(), 2),
        }
    }
}

impl VerifierConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            coin_type: env_or("SUI_COIN_TYPE", defaults.coin_type),
            tolerance_units: env_or("PAYMENT_TOLERANCE_MIST", defaults.tolerance_units),
            package_id: env_or("PAYMENT_PACKAGE_ID", defaults.package_id),
            processor_object_id: env_or("PAYMENT_PROCESSOR_OBJECT_ID", defaults.processor_object_id),
            admin_address: env_or("PAYMENT_ADMIN_ADDRESS", defaults.admin_address),
            admin_fee: std::env::var("PAYMENT_ADMIN_FEE_SUI")
                .ok()
                .and_then(|raw| BigDecimal::from_str(&raw).ok())
                .unwrap_or(defaults.admin_fee),
        }
    }
}

/// How the recipient credit was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// A balance change credited the recipient within tolerance
    BalanceChange,
    /// No balance change matched; a transfer event named the recipient
    TransferEvent,
}

/// Result of the admin fee check on contract-mediated payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminFeeCheck {
    Matched,
    Mismatched { observed: i128 },
    Missing,
}

/// Evidence for a passed verification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedPayment {
    pub digest: String,
    pub mode: PaymentMode,
    pub confirmation: Confirmation,
    pub expected_units: i128,
    pub observed_units: Option<i128>,
    pub admin_fee: Option<AdminFeeCheck>,
}

/// What a transaction must do to settle a payment
#[derive(Debug, Clone)]
pub struct VerificationRequest<'a> {
    pub digest: &'a str,
    pub amount: &'a BigDecimal,
    pub recipient: &'a str,
    pub mode: PaymentMode,
}

pub struct ChainVerifier {
    chain: Arc<dyn ChainClient>,
    config: VerifierConfig,
}

impl ChainVerifier {
    pub fn new(chain: Arc<dyn ChainClient>, config: VerifierConfig) -> Self {
        Self { chain, config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub async fn verify(
        &self,
        request: VerificationRequest<'_>,
    ) -> VerificationResult<VerifiedPayment> {
        let expected_units = native_to_smallest_units(request.amount)?;

        info!(
            digest = %request.digest,
            mode = request.mode.as_str(),
            expected_mist = %expected_units,
            recipient = %mask_address(request.recipient),
            "Verifying transaction"
        );

        let receipt = self.fetch(request.digest).await?;

        if let ExecutionStatus::Failure { error } = &receipt.status {
            warn!(digest = %request.digest, reason = %error, "Transaction did not succeed");
            return Err(VerificationError::TransactionFailed {
                digest: request.digest.to_string(),
                reason: error.clone(),
            });
        }

        let verified = match request.mode {
            PaymentMode::DirectTransfer => {
                self.verify_direct(&receipt, request.recipient, expected_units)
            }
            PaymentMode::ContractMediated => {
                self.verify_contract(&receipt, request.recipient, request.amount)
            }
        }?;

        info!(
            digest = %request.digest,
            confirmation = ?verified.confirmation,
            observed_mist = ?verified.observed_units,
            "Transaction verified"
        );
        Ok(verified)
    }

    async fn fetch(&self, digest: &str) -> VerificationResult<TransactionReceipt> {
        match self.chain.get_transaction(digest).await {
            Ok(Some(receipt)) => Ok(receipt),
            Ok(None) => {
                warn!(digest = %digest, "Transaction not found on chain");
                Err(VerificationError::TransactionNotFound {
                    digest: digest.to_string(),
                })
            }
            Err(e) => {
                warn!(digest = %digest, error = %e, "Chain lookup failed");
                Err(VerificationError::TransactionNotFound {
                    digest: digest.to_string(),
                })
            }
        }
    }

    fn within_tolerance(&self, expected: i128, observed: i128) -> bool {
        (observed - expected).abs() <= self.config.tolerance_units
    }

    fn verify_direct(
        &self,
        receipt: &TransactionReceipt,
        recipient: &str,
        expected_units: i128,
    ) -> VerificationResult<VerifiedPayment> {
        if let Some(credit) = receipt.credit_to(recipient, &self.config.coin_type) {
            if !self.within_tolerance(expected_units, credit.amount) {
                return Err(VerificationError::AmountMismatch {
                    expected: expected_units,
                    observed: credit.amount,
                });
            }
            return Ok(VerifiedPayment {
                digest: receipt.digest.clone(),
                mode: PaymentMode::DirectTransfer,
                confirmation: Confirmation::BalanceChange,
                expected_units,
                observed_units: Some(credit.amount),
                admin_fee: None,
            });
        }

        // Looser confirmation: the amount cannot be checked from an event alone
        if receipt.transfer_events_to(recipient).next().is_some() {
            debug!(digest = %receipt.digest, "Recipient confirmed via transfer event");
            return Ok(VerifiedPayment {
                digest: receipt.digest.clone(),
                mode: PaymentMode::DirectTransfer,
                confirmation: Confirmation::TransferEvent,
                expected_units,
                observed_units: None,
                admin_fee: None,
            });
        }

        Err(VerificationError::NoCreditFound {
            recipient: recipient.to_string(),
        })
    }

    fn verify_contract(
        &self,
        receipt: &TransactionReceipt,
        recipient: &str,
        amount: &BigDecimal,
    ) -> VerificationResult<VerifiedPayment> {
        if !receipt.calls_package(&self.config.package_id) {
            return Err(VerificationError::WrongContract {
                digest: receipt.digest.clone(),
                expected_package: self.config.package_id.clone(),
            });
        }

        let fee_units = native_to_smallest_units(&self.config.admin_fee)?;
        let expected_units = native_to_smallest_units(amount)? - fee_units;

        let credit = receipt
            .credit_to(recipient, &self.config.coin_type)
            .ok_or_else(|| VerificationError::NoCreditFound {
                recipient: recipient.to_string(),
            })?;

        if !self.within_tolerance(expected_units, credit.amount) {
            return Err(VerificationError::AmountMismatch {
                expected: expected_units,
                observed: credit.amount,
            });
        }

        let admin_fee = match receipt.credit_to(&self.config.admin_address, &self.config.coin_type)
        {
            Some(fee) if self.within_tolerance(fee_units, fee.amount) => AdminFeeCheck::Matched,
            Some(fee) => {
                warn!(
                    digest = %receipt.digest,
                    expected_mist = %fee_units,
                    observed_mist = %fee.amount,
                    "Admin fee differs from configured fee"
                );
                AdminFeeCheck::Mismatched {
                    observed: fee.amount,
                }
            }
            None => {
                warn!(digest = %receipt.digest, "Admin fee credit not found in balance changes");
                AdminFeeCheck::Missing
            }
        };

        Ok(VerifiedPayment {
            digest: receipt.digest.clone(),
            mode: PaymentMode::ContractMediated,
            confirmation: Confirmation::BalanceChange,
            expected_units,
            observed_units: Some(credit.amount),
            admin_fee: Some(admin_fee),
        })
    }
}
