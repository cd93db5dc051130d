//! Payment Orchestrator Service
//!
//! Creates payment intents priced in Naira or SUI, settles them against
//! on-chain transactions, and produces the outbox of side effects that a
//! settled payment triggers (merchant webhook, receipt and notification
//! emails). Delivery of the outbox is left to the caller.

use bigdecimal::{BigDecimal, RoundingMode};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::env_or;
use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::merchant_repository::Merchant;
use crate::database::payment_repository::{
    ContractDetails, NewPayment, Payment, PaymentMode, PaymentSettlement,
};
use crate::database::repository::{MerchantStore, PaymentStore, ProductStore};
use crate::error::{AppError, DomainError, ValidationError};
use crate::logging::mask_address;
use crate::services::currency_converter::{
    self, ConversionError, Currency, FIAT_DECIMALS, NATIVE_DECIMALS,
};
use crate::services::notification::{NotificationError, NotificationService};
use crate::services::payment_verifier::{
    ChainVerifier, VerificationError, VerificationRequest, VerifiedPayment,
};
use crate::services::pricing::{PricingError, PricingService};
use crate::services::validation::is_valid_email;

// ============================================================================
// Configuration Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Smallest payment accepted, in NGN
    pub min_amount_fiat: BigDecimal,
    /// Largest payment accepted, in NGN
    pub max_amount_fiat: BigDecimal,
    /// Base URL that payment links are built from
    pub link_base_url: String,
    /// Price new payments from the oracle instead of the static rate
    pub use_live_pricing: bool,
    /// Upper bound for merchant payment listings
    pub max_page_size: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_amount_fiat: BigDecimal::from(50),
            max_amount_fiat: BigDecimal::from(10_000_000),
            link_base_url: "http://localhost:8000".to_string(),
            use_live_pricing: false,
            max_page_size: 100,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            min_amount_fiat: BigDecimal::from(env_or("PAYMENT_MIN_NGN", 50_i64)),
            max_amount_fiat: BigDecimal::from(env_or("PAYMENT_MAX_NGN", 10_000_000_i64)),
            link_base_url: env_or("PUBLIC_BASE_URL", defaults.link_base_url),
            use_live_pricing: env_or("PAYMENT_LIVE_PRICING", defaults.use_live_pricing),
            max_page_size: env_or("PAYMENT_MAX_PAGE_SIZE", defaults.max_page_size),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum OrchestratorError {
    PaymentNotFound(Uuid),
    MerchantNotFound(Uuid),
    ProductNotFound(Uuid),
    MissingAmount,
    AmountOutOfRange {
        amount_fiat: BigDecimal,
        min: BigDecimal,
        max: BigDecimal,
    },
    ContractModeDisabled {
        merchant_id: Uuid,
    },
    /// Contract payments must exceed the fee the processor withholds
    AmountBelowAdminFee {
        amount: BigDecimal,
        admin_fee: BigDecimal,
    },
    MissingTransactionHash,
    InvalidEmail(String),
    PaymentNotCompleted(Uuid),
    DuplicateTransaction(String),
    Verification(VerificationError),
    Pricing(PricingError),
    Conversion(ConversionError),
    Database(DatabaseError),
    Notification(NotificationError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PaymentNotFound(id) => write!(f, "Payment {} not found", id),
            Self::MerchantNotFound(id) => write!(f, "Merchant {} not found", id),
            Self::ProductNotFound(id) => write!(f, "Product {} not found", id),
            Self::MissingAmount => write!(f, "An amount is required"),
            Self::AmountOutOfRange {
                amount_fiat,
                min,
                max,
            } => write!(
                f,
                "Payment of NGN {} is outside the allowed range NGN {} - NGN {}",
                amount_fiat, min, max
            ),
            Self::ContractModeDisabled { merchant_id } => write!(
                f,
                "Merchant {} has not enabled contract-mediated payments",
                merchant_id
            ),
            Self::AmountBelowAdminFee { amount, admin_fee } => write!(
                f,
                "Contract payment of {} SUI does not cover the {} SUI admin fee",
                amount, admin_fee
            ),
            Self::MissingTransactionHash => write!(f, "Transaction hash is required"),
            Self::InvalidEmail(email) => write!(f, "Invalid email address '{}'", email),
            Self::PaymentNotCompleted(id) => write!(f, "Payment {} is not paid yet", id),
            Self::DuplicateTransaction(digest) => {
                write!(f, "Transaction {} already settled another payment", digest)
            }
            Self::Verification(e) => write!(f, "Verification failed: {}", e),
            Self::Pricing(e) => write!(f, "Pricing failed: {}", e),
            Self::Conversion(e) => write!(f, "Conversion failed: {}", e),
            Self::Database(e) => write!(f, "{}", e),
            Self::Notification(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<VerificationError> for OrchestratorError {
    fn from(err: VerificationError) -> Self {
        Self::Verification(err)
    }
}

impl From<PricingError> for OrchestratorError {
    fn from(err: PricingError) -> Self {
        Self::Pricing(err)
    }
}

impl From<ConversionError> for OrchestratorError {
    fn from(err: ConversionError) -> Self {
        Self::Conversion(err)
    }
}

impl From<DatabaseError> for OrchestratorError {
    fn from(err: DatabaseError) -> Self {
        Self::Database(err)
    }
}

impl From<NotificationError> for OrchestratorError {
    fn from(err: NotificationError) -> Self {
        Self::Notification(err)
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::PaymentNotFound(id) => AppError::domain(DomainError::PaymentNotFound {
                payment_id: id.to_string(),
            }),
            OrchestratorError::MerchantNotFound(id) => {
                AppError::domain(DomainError::MerchantNotFound {
                    merchant_id: id.to_string(),
                })
            }
            OrchestratorError::ProductNotFound(id) => AppError::domain(DomainError::ProductNotFound {
                product_id: id.to_string(),
            }),
            OrchestratorError::MissingAmount => AppError::validation(ValidationError::MissingField {
                field: "amount".to_string(),
            }),
            OrchestratorError::AmountOutOfRange {
                amount_fiat,
                min,
                max,
            } => AppError::validation(ValidationError::InvalidAmount {
                amount: amount_fiat.to_string(),
                reason: format!("Payments must be between NGN {} and NGN {}", min, max),
            }),
            OrchestratorError::ContractModeDisabled { .. } => {
                AppError::validation(ValidationError::InvalidField {
                    field: "mode".to_string(),
                    reason: "Contract-mediated payments are not enabled for this merchant"
                        .to_string(),
                })
            }
            OrchestratorError::AmountBelowAdminFee { amount, admin_fee } => {
                AppError::validation(ValidationError::InvalidAmount {
                    amount: amount.to_string(),
                    reason: format!(
                        "Contract-mediated payments must exceed the {} SUI admin fee",
                        admin_fee
                    ),
                })
            }
            OrchestratorError::MissingTransactionHash => {
                AppError::validation(ValidationError::MissingField {
                    field: "transaction_hash".to_string(),
                })
            }
            OrchestratorError::InvalidEmail(email) => {
                AppError::validation(ValidationError::InvalidEmail { email })
            }
            OrchestratorError::PaymentNotCompleted(id) => {
                AppError::domain(DomainError::PaymentNotCompleted {
                    payment_id: id.to_string(),
                })
            }
            OrchestratorError::DuplicateTransaction(digest) => {
                AppError::domain(DomainError::DuplicateTransaction { digest })
            }
            OrchestratorError::Verification(e) => e.into(),
            OrchestratorError::Pricing(e) => e.into(),
            OrchestratorError::Conversion(e) => e.into(),
            OrchestratorError::Database(e) => e.into(),
            OrchestratorError::Notification(e) => e.into(),
        }
    }
}

// ============================================================================
// Request & Response Types
// ============================================================================

/// Who gets paid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTarget {
    Merchant(Uuid),
    Product(Uuid),
}

#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub target: PaymentTarget,
    /// Required for merchant targets; products default to their SUI price
    pub amount: Option<BigDecimal>,
    pub currency: Currency,
    pub mode: PaymentMode,
    pub description: Option<String>,
    pub reference: Option<String>,
}

/// Customer details captured at verification
#[derive(Debug, Clone, Default)]
pub struct CustomerInfo {
    pub address: Option<String>,
    pub email: Option<String>,
}

/// Deferred work triggered by a settled payment
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    MerchantWebhook {
        url: String,
        payment: Payment,
    },
    ReceiptEmail {
        to: String,
        merchant_name: String,
        payment: Payment,
    },
    MerchantNotification {
        to: String,
        payment: Payment,
    },
}

impl SideEffect {
    pub fn kind(&self) -> &'static str {
        match self {
            SideEffect::MerchantWebhook { .. } => "merchant_webhook",
            SideEffect::ReceiptEmail { .. } => "receipt_email",
            SideEffect::MerchantNotification { .. } => "merchant_notification",
        }
    }

    pub fn payment(&self) -> &Payment {
        match self {
            SideEffect::MerchantWebhook { payment, .. }
            | SideEffect::ReceiptEmail { payment, .. }
            | SideEffect::MerchantNotification { payment, .. } => payment,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub payment: Payment,
    pub already_verified: bool,
    pub redirect_url: Option<String>,
    /// Present when this call performed the verification
    pub verification: Option<VerifiedPayment>,
    #[serde(skip)]
    pub outbox: Vec<SideEffect>,
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct PaymentOrchestrator {
    payments: Arc<dyn PaymentStore>,
    merchants: Arc<dyn MerchantStore>,
    products: Arc<dyn ProductStore>,
    pricing: Arc<PricingService>,
    verifier: Arc<ChainVerifier>,
    notifications: Arc<NotificationService>,
    config: OrchestratorConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        merchants: Arc<dyn MerchantStore>,
        products: Arc<dyn ProductStore>,
        pricing: Arc<PricingService>,
        verifier: Arc<ChainVerifier>,
        notifications: Arc<NotificationService>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            payments,
            merchants,
            products,
            pricing,
            verifier,
            notifications,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Price and persist a pending payment
    pub async fn create_payment(&self, request: CreatePaymentRequest) -> OrchestratorResult<Payment> {
        let (merchant, product) = match request.target {
            PaymentTarget::Merchant(id) => (self.load_merchant(id).await?, None),
            PaymentTarget::Product(id) => {
                let product = self
                    .products
                    .find_by_id(id)
                    .await?
                    .ok_or(OrchestratorError::ProductNotFound(id))?;
                let merchant = self.load_merchant(product.merchant_id).await?;
                (merchant, Some(product))
            }
        };

        if request.mode == PaymentMode::ContractMediated && !merchant.smart_contract_enabled {
            return Err(OrchestratorError::ContractModeDisabled {
                merchant_id: merchant.id,
            });
        }

        let recipient_address = match (&product, request.mode) {
            (Some(product), _) => product.merchant_address.clone(),
            (None, PaymentMode::ContractMediated) => merchant.contract_recipient().to_string(),
            (None, PaymentMode::DirectTransfer) => merchant.wallet_address.clone(),
        };

        let (amount, currency) = match (request.amount, &product) {
            (Some(amount), _) => (amount, request.currency),
            (None, Some(product)) => (product.price_in_sui.clone(), Currency::Sui),
            (None, None) => return Err(OrchestratorError::MissingAmount),
        };

        let rate = self
            .pricing
            .ngn_per_sui(Some(merchant.id), self.config.use_live_pricing)
            .await?;

        let (amount_sui, amount_fiat) = match currency {
            Currency::Ngn => {
                let sui = currency_converter::to_native(&amount, &rate)?;
                (sui, amount.with_scale_round(FIAT_DECIMALS, RoundingMode::HalfUp))
            }
            Currency::Sui => {
                let fiat = currency_converter::to_fiat(&amount, &rate)?;
                (
                    amount.with_scale_round(NATIVE_DECIMALS, RoundingMode::HalfUp),
                    fiat,
                )
            }
            other => {
                return Err(ConversionError::UnsupportedCurrency(other.to_string()).into());
            }
        };

        self.ensure_within_limits(&amount_fiat)?;
        if request.mode == PaymentMode::ContractMediated {
            self.ensure_covers_admin_fee(&amount_sui)?;
        }

        let id = Uuid::new_v4();
        let payment = self
            .payments
            .insert(NewPayment {
                id,
                merchant_id: Some(merchant.id),
                product_id: product.as_ref().map(|p| p.id),
                amount: amount_sui,
                amount_fiat,
                currency,
                exchange_rate: rate,
                recipient_address,
                mode: request.mode,
                description: request.description,
                reference: request.reference,
                payment_link: self.payment_link(id),
            })
            .await?;

        info!(
            payment_id = %payment.id,
            merchant_id = %merchant.id,
            amount_sui = %payment.amount,
            amount_ngn = %payment.amount_fiat,
            rate = %payment.exchange_rate,
            mode = payment.mode.as_str(),
            recipient = %mask_address(&payment.recipient_address),
            "Payment created"
        );
        Ok(payment)
    }

    /// Settle a pending payment against an on-chain transaction.
    ///
    /// Only the caller whose pending → paid transition wins receives a
    /// non-empty outbox; everyone else sees `already_verified`.
    pub async fn verify_payment(
        &self,
        payment_id: Uuid,
        transaction_hash: &str,
        customer: CustomerInfo,
    ) -> OrchestratorResult<VerificationReport> {
        let digest = transaction_hash.trim();
        if digest.is_empty() {
            return Err(OrchestratorError::MissingTransactionHash);
        }

        let customer_email = non_empty(customer.email);
        if let Some(email) = &customer_email {
            if !is_valid_email(email) {
                return Err(OrchestratorError::InvalidEmail(email.clone()));
            }
        }

        let payment = self.get_payment(payment_id).await?;
        if payment.is_paid() {
            info!(payment_id = %payment.id, "Payment already verified");
            return self.already_verified(payment).await;
        }

        if let Some(existing) = self.payments.find_by_transaction_hash(digest).await? {
            if existing.id != payment.id {
                warn!(
                    payment_id = %payment.id,
                    settled_payment_id = %existing.id,
                    digest = %digest,
                    "Transaction already settled another payment"
                );
                return Err(OrchestratorError::DuplicateTransaction(digest.to_string()));
            }
        }

        let verified = self
            .verifier
            .verify(VerificationRequest {
                digest,
                amount: &payment.amount,
                recipient: &payment.recipient_address,
                mode: payment.mode,
            })
            .await
            .inspect_err(|e| {
                warn!(payment_id = %payment.id, digest = %digest, error = %e, "Payment left pending");
            })?;

        let settlement = PaymentSettlement {
            transaction_hash: digest.to_string(),
            customer_address: non_empty(customer.address),
            customer_email,
            contract_details: self.contract_details(&payment),
        };

        let paid = match self.payments.mark_paid(payment.id, settlement).await {
            Ok(Some(paid)) => paid,
            Ok(None) => {
                info!(payment_id = %payment.id, "Lost settlement race, payment already paid");
                let current = self.get_payment(payment.id).await?;
                return self.already_verified(current).await;
            }
            Err(DatabaseError {
                kind: DatabaseErrorKind::UniqueViolation { .. },
            }) => return Err(OrchestratorError::DuplicateTransaction(digest.to_string())),
            Err(e) => return Err(e.into()),
        };

        info!(
            payment_id = %paid.id,
            digest = %digest,
            amount_sui = %paid.amount,
            "Payment verified and marked paid"
        );

        let merchant = self.find_merchant(&paid).await?;
        let outbox = build_outbox(&paid, merchant.as_ref());
        let redirect_url = self.redirect_url(&paid).await?;

        Ok(VerificationReport {
            payment: paid,
            already_verified: false,
            redirect_url,
            verification: Some(verified),
            outbox,
        })
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> OrchestratorResult<Payment> {
        self.payments
            .find_by_id(payment_id)
            .await?
            .ok_or(OrchestratorError::PaymentNotFound(payment_id))
    }

    /// Most recent payments first, at most `limit` (capped by configuration)
    pub async fn list_merchant_payments(
        &self,
        merchant_id: Uuid,
        limit: Option<i64>,
    ) -> OrchestratorResult<Vec<Payment>> {
        self.load_merchant(merchant_id).await?;
        let limit = limit
            .unwrap_or(self.config.max_page_size)
            .clamp(1, self.config.max_page_size);
        Ok(self.payments.list_by_merchant(merchant_id, limit).await?)
    }

    /// Email a receipt for a paid payment; delivery failures are returned
    pub async fn send_receipt(&self, payment_id: Uuid, email: &str) -> OrchestratorResult<Payment> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(OrchestratorError::InvalidEmail(email.to_string()));
        }

        let payment = self.get_payment(payment_id).await?;
        if !payment.is_paid() {
            return Err(OrchestratorError::PaymentNotCompleted(payment_id));
        }

        let merchant_name = self
            .find_merchant(&payment)
            .await?
            .map(|m| m.business_name)
            .unwrap_or_else(|| "SuiFlow merchant".to_string());

        self.notifications
            .send_customer_receipt(&payment, &merchant_name, email)
            .await?;
        Ok(payment)
    }

    // ------------------------------------------------------------------------

    async fn load_merchant(&self, merchant_id: Uuid) -> OrchestratorResult<Merchant> {
        self.merchants
            .find_by_id(merchant_id)
            .await?
            .ok_or(OrchestratorError::MerchantNotFound(merchant_id))
    }

    async fn find_merchant(&self, payment: &Payment) -> OrchestratorResult<Option<Merchant>> {
        match payment.merchant_id {
            Some(id) => Ok(self.merchants.find_by_id(id).await?),
            None => Ok(None),
        }
    }

    async fn redirect_url(&self, payment: &Payment) -> OrchestratorResult<Option<String>> {
        let Some(product_id) = payment.product_id else {
            return Ok(None);
        };
        Ok(self
            .products
            .find_by_id(product_id)
            .await?
            .and_then(|product| product.redirect_for(payment.id)))
    }

    async fn already_verified(&self, payment: Payment) -> OrchestratorResult<VerificationReport> {
        let redirect_url = self.redirect_url(&payment).await?;
        Ok(VerificationReport {
            payment,
            already_verified: true,
            redirect_url,
            verification: None,
            outbox: Vec::new(),
        })
    }

    fn ensure_within_limits(&self, amount_fiat: &BigDecimal) -> OrchestratorResult<()> {
        if amount_fiat < &self.config.min_amount_fiat || amount_fiat > &self.config.max_amount_fiat
        {
            return Err(OrchestratorError::AmountOutOfRange {
                amount_fiat: amount_fiat.clone(),
                min: self.config.min_amount_fiat.clone(),
                max: self.config.max_amount_fiat.clone(),
            });
        }
        Ok(())
    }

    fn ensure_covers_admin_fee(&self, amount_sui: &BigDecimal) -> OrchestratorResult<()> {
        let admin_fee = &self.verifier.config().admin_fee;
        if amount_sui <= admin_fee {
            return Err(OrchestratorError::AmountBelowAdminFee {
                amount: amount_sui.clone(),
                admin_fee: admin_fee.clone(),
            });
        }
        Ok(())
    }

    fn payment_link(&self, id: Uuid) -> String {
        format!("{}/pay/{}", self.config.link_base_url.trim_end_matches('/'), id)
    }

    fn contract_details(&self, payment: &Payment) -> Option<ContractDetails> {
        if payment.mode != PaymentMode::ContractMediated {
            return None;
        }
        let verifier = self.verifier.config();
        Some(ContractDetails {
            package_id: verifier.package_id.clone(),
            processor_object_id: verifier.processor_object_id.clone(),
            admin_fee: verifier.admin_fee.clone(),
            merchant_received: &payment.amount - &verifier.admin_fee,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn build_outbox(payment: &Payment, merchant: Option<&Merchant>) -> Vec<SideEffect> {
    let mut outbox = Vec::new();

    if let Some(url) = merchant.and_then(|m| m.webhook_url.as_deref()) {
        if !url.is_empty() {
            outbox.push(SideEffect::MerchantWebhook {
                url: url.to_string(),
                payment: payment.clone(),
            });
        }
    }

    if let Some(email) = &payment.customer_email {
        outbox.push(SideEffect::ReceiptEmail {
            to: email.clone(),
            merchant_name: merchant
                .map(|m| m.business_name.clone())
                .unwrap_or_else(|| "SuiFlow merchant".to_string()),
            payment: payment.clone(),
        });
    }

    if let Some(merchant) = merchant.filter(|m| !m.email.is_empty()) {
        outbox.push(SideEffect::MerchantNotification {
            to: merchant.email.clone(),
            payment: payment.clone(),
        });
    }

    outbox
}
