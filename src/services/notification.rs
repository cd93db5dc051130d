//! Payment receipt emails
//!
//! Messages go through an [`EmailTransport`]: an HTTP relay in production, or
//! a transport that only logs when no relay is configured.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::config::env_or;
use crate::database::payment_repository::Payment;
use crate::error::{AppError, AppErrorKind, ExternalError};
use crate::logging::mask_email;
use crate::middleware::logging::log_external_call;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Email relay request failed: {0}")]
    Transport(String),

    #[error("Email relay returned HTTP {status}")]
    Status { status: u16 },

    #[error("Email relay timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

pub type NotificationResult<T> = Result<T, NotificationError>;

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        let external = match err {
            NotificationError::Timeout { seconds } => ExternalError::Timeout {
                service: "email".to_string(),
                timeout_secs: seconds,
            },
            other => ExternalError::ServiceUnavailable {
                service: "email".to_string(),
                message: other.to_string(),
            },
        };
        AppError::new(AppErrorKind::External(external))
    }
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub from_address: String,
    /// HTTP relay endpoint; emails are only logged when unset
    pub relay_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            from_address: "SuiFlow <noreply@suiflow.app>".to_string(),
            relay_url: None,
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl NotificationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            from_address: env_or("EMAIL_FROM", defaults.from_address),
            relay_url: std::env::var("EMAIL_RELAY_URL").ok().filter(|v| !v.is_empty()),
            api_key: std::env::var("EMAIL_API_KEY").ok().filter(|v| !v.is_empty()),
            timeout: Duration::from_secs(env_or("EMAIL_TIMEOUT_SECS", 10)),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> NotificationResult<()>;

    fn name(&self) -> &str;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Default)]
pub struct LogEmailTransport;

#[async_trait]
impl EmailTransport for LogEmailTransport {
    async fn send(&self, message: &EmailMessage) -> NotificationResult<()> {
        info!(
            to = %mask_email(&message.to),
            subject = %message.subject,
            "Email delivery skipped, no relay configured"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Posts `{from, to, subject, html}` to an HTTP email relay with a bearer key
pub struct HttpEmailTransport {
    client: Client,
    url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpEmailTransport {
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> NotificationResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("SuiFlow-Backend/1.0")
            .build()
            .map_err(|e| NotificationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key,
            timeout,
        })
    }
}

#[async_trait]
impl EmailTransport for HttpEmailTransport {
    async fn send(&self, message: &EmailMessage) -> NotificationResult<()> {
        let started = Instant::now();

        let mut request = self.client.post(&self.url).json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                log_external_call("email_relay", "send", started.elapsed(), false);
                return Err(NotificationError::Transport(e.to_string()));
            }
            Err(_) => {
                log_external_call("email_relay", "send", started.elapsed(), false);
                return Err(NotificationError::Timeout {
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        let status = response.status();
        log_external_call("email_relay", "send", started.elapsed(), status.is_success());
        if !status.is_success() {
            return Err(NotificationError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Service
// ============================================================================

pub struct NotificationService {
    transport: Arc<dyn EmailTransport>,
    from_address: String,
}

impl NotificationService {
    pub fn new(transport: Arc<dyn EmailTransport>, from_address: impl Into<String>) -> Self {
        Self {
            transport,
            from_address: from_address.into(),
        }
    }

    /// HTTP relay when `relay_url` is set, log transport otherwise
    pub fn from_config(config: &NotificationConfig) -> NotificationResult<Self> {
        let transport: Arc<dyn EmailTransport> = match &config.relay_url {
            Some(url) => Arc::new(HttpEmailTransport::new(
                url.clone(),
                config.api_key.clone(),
                config.timeout,
            )?),
            None => Arc::new(LogEmailTransport),
        };
        info!(transport = transport.name(), "Notification service initialized");
        Ok(Self::new(transport, config.from_address.clone()))
    }

    /// Receipt for the paying customer
    pub async fn send_customer_receipt(
        &self,
        payment: &Payment,
        merchant_name: &str,
        to: &str,
    ) -> NotificationResult<()> {
        let message = EmailMessage {
            from: self.from_address.clone(),
            to: to.to_string(),
            subject: receipt_subject(payment, merchant_name),
            html: receipt_html(payment, merchant_name),
        };
        self.deliver(payment, message).await
    }

    /// Heads-up for the merchant that a payment settled
    pub async fn send_merchant_notification(
        &self,
        payment: &Payment,
        to: &str,
    ) -> NotificationResult<()> {
        let customer = customer_label(payment);
        let message = EmailMessage {
            from: self.from_address.clone(),
            to: to.to_string(),
            subject: format!("New Payment Received - {} SUI from {}", payment.amount, customer),
            html: merchant_html(payment, &customer),
        };
        self.deliver(payment, message).await
    }

    async fn deliver(&self, payment: &Payment, message: EmailMessage) -> NotificationResult<()> {
        match self.transport.send(&message).await {
            Ok(()) => {
                info!(
                    payment_id = %payment.id,
                    to = %mask_email(&message.to),
                    subject = %message.subject,
                    "Email sent"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    payment_id = %payment.id,
                    to = %mask_email(&message.to),
                    error = %e,
                    "Email delivery failed"
                );
                Err(e)
            }
        }
    }
}

// ============================================================================
// Templates
// ============================================================================

pub fn receipt_subject(payment: &Payment, merchant_name: &str) -> String {
    format!("Payment Receipt - {} SUI to {}", payment.amount, merchant_name)
}

fn customer_label(payment: &Payment) -> String {
    payment
        .customer_email
        .clone()
        .or_else(|| payment.customer_address.clone())
        .unwrap_or_else(|| "a customer".to_string())
}

fn short_hash(hash: &str) -> String {
    let chars: Vec<char> = hash.chars().collect();
    if chars.len() <= 16 {
        return hash.to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("{}...{}", head, tail)
}

fn details_block(payment: &Payment) -> String {
    let hash = payment.transaction_hash.as_deref().unwrap_or_default();
    let paid_at = payment
        .paid_at
        .map(|t| t.format("%B %-d, %Y %H:%M UTC").to_string())
        .unwrap_or_default();
    format!(
        "<p><strong>Date &amp; Time:</strong> {}</p>\
         <p><strong>Payment ID:</strong> <code>{}</code></p>\
         <p><strong>Transaction:</strong> <code>{}</code></p>\
         <p><strong>Network:</strong> Sui Blockchain</p>\
         <p><strong>Full Tx Hash:</strong> <code>{}</code></p>",
        paid_at,
        payment.id,
        short_hash(hash),
        hash
    )
}

fn receipt_html(payment: &Payment, merchant_name: &str) -> String {
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h1>Payment Successful</h1>\
         <p>Thank you for your payment.</p>\
         <p><strong>Amount Paid:</strong> {} SUI</p>\
         <p><strong>Merchant:</strong> {}</p>\
         {}\
         <p style=\"color: #999; font-size: 12px;\">This is an automated receipt from SuiFlow. \
         For support, please contact the merchant directly.</p>\
         </div>",
        payment.amount,
        merchant_name,
        details_block(payment)
    )
}

fn merchant_html(payment: &Payment, customer: &str) -> String {
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h1>New Payment Received</h1>\
         <p><strong>Amount Received:</strong> {} SUI</p>\
         <p><strong>Customer:</strong> {}</p>\
         {}\
         <p style=\"color: #999; font-size: 12px;\">SuiFlow Payment Notification</p>\
         </div>",
        payment.amount,
        customer,
        details_block(payment)
    )
}
