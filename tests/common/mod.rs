//! Shared harness for the HTTP integration tests
//!
//! Builds the full router over in-memory stores with fake chain, market,
//! email and webhook seams.

#![allow(dead_code)]

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use bigdecimal::BigDecimal;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use suiflow_backend::api::auth::hash_api_key;
use suiflow_backend::api::{self, AppState};
use suiflow_backend::chains::sui::SuiResult;
use suiflow_backend::chains::traits::{
    BalanceChange, ChainClient, ExecutionStatus, MoveCall, TransactionReceipt,
};
use suiflow_backend::database::memory::InMemoryStore;
use suiflow_backend::database::merchant_repository::{Merchant, NewMerchant};
use suiflow_backend::database::repository::MerchantStore;
use suiflow_backend::health::HealthChecker;
use suiflow_backend::services::live_price::{
    MarketTicker, PriceOracle, PriceOracleConfig, PriceProvider, PriceResult,
};
use suiflow_backend::services::merchant_rate::{MerchantRateConfig, MerchantRateService};
use suiflow_backend::services::notification::{
    EmailMessage, EmailTransport, NotificationResult, NotificationService,
};
use suiflow_backend::services::payment_verifier::{ChainVerifier, VerifierConfig};
use suiflow_backend::services::pricing::{PricingConfig, PricingService};
use suiflow_backend::services::webhook_dispatcher::{
    WebhookPayload, WebhookResult, WebhookSender,
};
use suiflow_backend::services::{OrchestratorConfig, PaymentOrchestrator, SideEffectDispatcher};

pub const SUI: &str = "0x2::sui::SUI";
pub const BASE_URL: &str = "https://pay.suiflow.test";
/// Key issued to the seeded merchant
pub const API_KEY: &str = "sfk_test_owner_key";

pub fn wallet(fill: char) -> String {
    format!("0x{}", fill.to_string().repeat(64))
}

pub fn dec(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

// ============================================================================
// Fakes
// ============================================================================

pub struct FixedPrice(pub BigDecimal);

#[async_trait]
impl PriceProvider for FixedPrice {
    async fn fetch_price(&self) -> PriceResult<BigDecimal> {
        Ok(self.0.clone())
    }

    async fn fetch_market_summary(&self) -> PriceResult<MarketTicker> {
        Ok(MarketTicker {
            last_price: self.0.clone(),
            price_change: dec("0.05"),
            price_change_percent: dec("2.5"),
            high: self.0.clone(),
            low: self.0.clone(),
            volume: dec("125000"),
        })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

#[derive(Default)]
pub struct FakeChain {
    receipts: Mutex<HashMap<String, TransactionReceipt>>,
}

impl FakeChain {
    pub fn insert(&self, receipt: TransactionReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.digest.clone(), receipt);
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn get_transaction(&self, digest: &str) -> SuiResult<Option<TransactionReceipt>> {
        Ok(self.receipts.lock().unwrap().get(digest).cloned())
    }
}

/// Successful transfer crediting `recipient` with `mist`
pub fn transfer(digest: &str, recipient: &str, mist: i128) -> TransactionReceipt {
    TransactionReceipt {
        digest: digest.to_string(),
        status: ExecutionStatus::Success,
        balance_changes: vec![
            BalanceChange {
                owner: Some(wallet('c')),
                coin_type: SUI.to_string(),
                amount: -(mist + 2_000_000),
            },
            BalanceChange {
                owner: Some(recipient.to_string()),
                coin_type: SUI.to_string(),
                amount: mist,
            },
        ],
        move_calls: Vec::new(),
        events: Vec::new(),
        effect_events: Vec::new(),
        timestamp_ms: Some(1_700_000_000_000),
    }
}

pub fn contract_transfer(digest: &str, recipient: &str, mist: i128) -> TransactionReceipt {
    let mut receipt = transfer(digest, recipient, mist);
    receipt.move_calls.push(MoveCall {
        package: VerifierConfig::default().package_id,
        module: "payment_processor".to_string(),
        function: "process_payment".to_string(),
    });
    receipt
}

#[derive(Default)]
pub struct Outbox {
    pub emails: Mutex<Vec<EmailMessage>>,
    pub webhooks: Mutex<Vec<(String, WebhookPayload)>>,
}

pub struct OutboxEmail(pub Arc<Outbox>);

#[async_trait]
impl EmailTransport for OutboxEmail {
    async fn send(&self, message: &EmailMessage) -> NotificationResult<()> {
        self.0.emails.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "outbox"
    }
}

pub struct OutboxWebhooks(pub Arc<Outbox>);

#[async_trait]
impl WebhookSender for OutboxWebhooks {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> WebhookResult<()> {
        self.0
            .webhooks
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        Ok(())
    }
}

// ============================================================================
// App
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub chain: Arc<FakeChain>,
    pub outbox: Arc<Outbox>,
    pub merchant: Merchant,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_options(false).await
    }

    /// `smart_contract_enabled` for the seeded merchant
    pub async fn with_options(smart_contract_enabled: bool) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let chain = Arc::new(FakeChain::default());
        let outbox = Arc::new(Outbox::default());

        let merchant = MerchantStore::insert(
            store.as_ref(),
            NewMerchant {
                id: Uuid::new_v4(),
                email: "owner@ada.example".to_string(),
                business_name: "Ada Stores".to_string(),
                wallet_address: wallet('1'),
                sui_wallet_address: Some(wallet('2')),
                webhook_url: Some("https://ada.example/hooks".to_string()),
                smart_contract_enabled,
                api_key_hash: hash_api_key(API_KEY),
            },
        )
        .await
        .unwrap();

        let oracle = Arc::new(PriceOracle::new(
            Arc::new(FixedPrice(dec("2.00"))),
            PriceOracleConfig::default(),
        ));
        let rates = Arc::new(MerchantRateService::new(
            store.clone(),
            MerchantRateConfig::default(),
        ));
        let pricing = Arc::new(PricingService::new(oracle, rates, PricingConfig::default()));
        let notifications = Arc::new(NotificationService::new(
            Arc::new(OutboxEmail(outbox.clone())),
            "noreply@suiflow.test",
        ));
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            pricing.clone(),
            Arc::new(ChainVerifier::new(chain.clone(), VerifierConfig::default())),
            notifications.clone(),
            OrchestratorConfig {
                link_base_url: BASE_URL.to_string(),
                ..OrchestratorConfig::default()
            },
        ));
        let dispatcher = Arc::new(SideEffectDispatcher::new(
            Arc::new(OutboxWebhooks(outbox.clone())),
            notifications,
        ));

        let state = AppState {
            orchestrator,
            pricing,
            merchants: store.clone(),
            products: store.clone(),
            dispatcher,
            health: HealthChecker::default(),
            public_base_url: BASE_URL.to_string(),
        };

        Self {
            router: api::with_middleware(api::router(state), &[]),
            store,
            chain,
            outbox,
            merchant,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.request_with_key(method, uri, body, None).await
    }

    pub async fn request_with_key(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        api_key: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = api_key {
            builder = builder.header("authorization", format!("Bearer {}", key));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }

    // Same requests, signed with the seeded merchant's key

    pub async fn owner_get(&self, uri: &str) -> (StatusCode, Value) {
        self.request_with_key(Method::GET, uri, None, Some(API_KEY)).await
    }

    pub async fn owner_post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request_with_key(Method::POST, uri, Some(body), Some(API_KEY)).await
    }

    pub async fn owner_put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request_with_key(Method::PUT, uri, Some(body), Some(API_KEY)).await
    }

    pub async fn owner_delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request_with_key(Method::DELETE, uri, None, Some(API_KEY)).await
    }

    /// Wait for the background dispatch spawned by a verification
    pub async fn settle_outbox(&self, expected_emails: usize) {
        for _ in 0..100 {
            if self.outbox.emails.lock().unwrap().len() >= expected_emails {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }
}
