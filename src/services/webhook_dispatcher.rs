//! Side-effect delivery for verified payments
//!
//! The orchestrator returns an outbox of [`SideEffect`]s; this module delivers
//! them concurrently after the response has been produced. Failures are logged
//! and reported, never propagated.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::config::env_or;
use crate::database::payment_repository::{ContractDetails, Payment, PaymentMode, PaymentStatus};
use crate::middleware::logging::log_external_call;
use crate::services::notification::{NotificationError, NotificationService};
use crate::services::payment_orchestrator::SideEffect;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook request failed: {0}")]
    Request(String),

    #[error("Webhook endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("Webhook timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

pub type WebhookResult<T> = Result<T, WebhookError>;

/// Body POSTed to the merchant's webhook URL
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub event: String,
    pub amount: BigDecimal,
    pub txn: Option<String>,
    pub status: PaymentStatus,
    pub reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub payment_type: PaymentMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smart_contract: Option<ContractDetails>,
}

impl WebhookPayload {
    pub const PAYMENT_SUCCESS: &'static str = "payment.success";

    pub fn payment_success(payment: &Payment) -> Self {
        Self {
            event: Self::PAYMENT_SUCCESS.to_string(),
            amount: payment.amount.clone(),
            txn: payment.transaction_hash.clone(),
            status: payment.status,
            reference: payment.reference.clone(),
            paid_at: payment.paid_at,
            created_at: payment.created_at,
            payment_type: payment.mode,
            smart_contract: match payment.mode {
                PaymentMode::ContractMediated => payment.contract_details.clone(),
                PaymentMode::DirectTransfer => None,
            },
        }
    }
}

#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> WebhookResult<()>;
}

/// JSON POST with a fixed timeout and no retry
pub struct WebhookClient {
    client: Client,
    timeout: Duration,
}

impl WebhookClient {
    pub fn new(timeout: Duration) -> WebhookResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("SuiFlow-Webhooks/1.0")
            .build()
            .map_err(|e| WebhookError::Request(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    pub fn from_env() -> WebhookResult<Self> {
        Self::new(Duration::from_secs(env_or("WEBHOOK_TIMEOUT_SECS", 10)))
    }
}

#[async_trait]
impl WebhookSender for WebhookClient {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> WebhookResult<()> {
        let started = Instant::now();
        let request = self.client.post(url).json(payload).send();

        let response = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                log_external_call("merchant_webhook", url, started.elapsed(), false);
                return Err(WebhookError::Request(e.to_string()));
            }
            Err(_) => {
                log_external_call("merchant_webhook", url, started.elapsed(), false);
                return Err(WebhookError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let status = response.status();
        log_external_call("merchant_webhook", url, started.elapsed(), status.is_success());
        if !status.is_success() {
            return Err(WebhookError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedEffect {
    pub kind: &'static str,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: Vec<FailedEffect>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
enum DeliveryError {
    #[error(transparent)]
    Webhook(#[from] WebhookError),
    #[error(transparent)]
    Email(#[from] NotificationError),
}

pub struct SideEffectDispatcher {
    webhooks: Arc<dyn WebhookSender>,
    notifications: Arc<NotificationService>,
}

impl SideEffectDispatcher {
    pub fn new(webhooks: Arc<dyn WebhookSender>, notifications: Arc<NotificationService>) -> Self {
        Self {
            webhooks,
            notifications,
        }
    }

    /// Deliver every entry concurrently; never fails
    pub async fn dispatch(&self, outbox: Vec<SideEffect>) -> DispatchReport {
        if outbox.is_empty() {
            return DispatchReport::default();
        }

        let deliveries = outbox.iter().map(|effect| async move {
            let outcome = self.deliver(effect).await;
            (effect, outcome)
        });

        let mut report = DispatchReport::default();
        for (effect, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        payment_id = %effect.payment().id,
                        effect = effect.kind(),
                        error = %e,
                        "Side effect delivery failed"
                    );
                    report.failed.push(FailedEffect {
                        kind: effect.kind(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            delivered = report.delivered,
            failed = report.failed.len(),
            "Outbox dispatched"
        );
        report
    }

    async fn deliver(&self, effect: &SideEffect) -> Result<(), DeliveryError> {
        match effect {
            SideEffect::MerchantWebhook { url, payment } => {
                let payload = WebhookPayload::payment_success(payment);
                self.webhooks.post(url, &payload).await?;
            }
            SideEffect::ReceiptEmail {
                to,
                merchant_name,
                payment,
            } => {
                self.notifications
                    .send_customer_receipt(payment, merchant_name, to)
                    .await?;
            }
            SideEffect::MerchantNotification { to, payment } => {
                self.notifications
                    .send_merchant_notification(payment, to)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingWebhooks {
        posted: Mutex<Vec<(String, WebhookPayload)>>,
        failing: bool,
    }

    impl RecordingWebhooks {
        pub fn failing() -> Self {
            Self {
                failing: true,
                ..Default::default()
            }
        }

        pub fn posted(&self) -> Vec<(String, WebhookPayload)> {
            self.posted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WebhookSender for RecordingWebhooks {
        async fn post(&self, url: &str, payload: &WebhookPayload) -> WebhookResult<()> {
            if self.failing {
                return Err(WebhookError::Status { status: 500 });
            }
            self.posted
                .lock()
                .unwrap()
                .push((url.to_string(), payload.clone()));
            Ok(())
        }
    }
}
