use crate::chains::sui::{
    config::SuiConfig,
    errors::{SuiError, SuiResult},
    types::{
        HealthStatus, JsonRpcRequest, JsonRpcResponse, SuiTransactionBlockResponse,
        TransactionBlockResponseOptions,
    },
};
use crate::chains::traits::{ChainClient, TransactionReceipt};
use crate::middleware::logging::log_external_call;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// JSON-RPC client for a Sui full node
#[derive(Debug, Clone)]
pub struct SuiClient {
    http_client: Client,
    config: SuiConfig,
}

impl SuiClient {
    pub fn new(config: SuiConfig) -> SuiResult<Self> {
        config
            .validate()
            .map_err(|e| SuiError::config_error(e.to_string()))?;

        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(20)
            .user_agent("SuiFlow-Backend/1.0")
            .build()
            .map_err(|e| SuiError::config_error(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            network = ?config.network,
            rpc_url = %config.rpc_url(),
            "Sui client initialized"
        );

        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &SuiConfig {
        &self.config
    }

    /// Issue one JSON-RPC call; `Ok(None)` when the node returns a null result
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> SuiResult<Option<T>> {
        let started = Instant::now();
        let request = JsonRpcRequest::new(method, params);

        let result = timeout(
            self.config.request_timeout,
            self.http_client
                .post(self.config.rpc_url())
                .json(&request)
                .send(),
        )
        .await;

        let response = match result {
            Ok(response) => response,
            Err(_) => {
                log_external_call("sui_rpc", method, started.elapsed(), false);
                return Err(SuiError::timeout_error(self.config.request_timeout.as_secs()));
            }
        };

        let response = response
            .and_then(|r| r.error_for_status())
            .inspect_err(|_| log_external_call("sui_rpc", method, started.elapsed(), false))?;

        let body: JsonRpcResponse<T> = response.json().await.map_err(|e| {
            SuiError::serialization_error(format!("Invalid JSON-RPC response: {}", e))
        })?;

        if let Some(rpc_error) = body.error {
            log_external_call("sui_rpc", method, started.elapsed(), false);
            return Err(SuiError::rpc_error(rpc_error.code, rpc_error.message));
        }

        log_external_call("sui_rpc", method, started.elapsed(), true);
        Ok(body.result)
    }

    /// `sui_getTransactionBlock` with input, effects, events and balance changes
    pub async fn get_transaction_block(
        &self,
        digest: &str,
    ) -> SuiResult<Option<SuiTransactionBlockResponse>> {
        debug!(digest = %digest, "Fetching transaction block");

        self.call(
            "sui_getTransactionBlock",
            json!([digest, TransactionBlockResponseOptions::for_verification()]),
        )
        .await
    }

    pub async fn health_check(&self) -> SuiResult<HealthStatus> {
        let start_time = Instant::now();
        let rpc_url = self.config.rpc_url().to_string();

        debug!(rpc_url = %rpc_url, "Performing Sui RPC health check");

        let health_timeout = std::cmp::max(self.config.request_timeout, Duration::from_secs(15));

        let result = timeout(
            health_timeout,
            self.call::<String>("sui_getLatestCheckpointSequenceNumber", json!([])),
        )
        .await;

        let response_time_ms = start_time.elapsed().as_millis() as u64;
        let last_check = chrono::Utc::now().to_rfc3339();

        let status = match result {
            Ok(Ok(checkpoint)) => {
                info!(response_time_ms, "Sui RPC health check passed");
                HealthStatus {
                    is_healthy: true,
                    rpc_url,
                    response_time_ms,
                    last_check,
                    checkpoint,
                    error_message: None,
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "Sui RPC health check failed");
                HealthStatus {
                    is_healthy: false,
                    rpc_url,
                    response_time_ms,
                    last_check,
                    checkpoint: None,
                    error_message: Some(e.to_string()),
                }
            }
            Err(_) => {
                let error_msg = format!("Health check timed out after {:?}", health_timeout);
                error!("Sui RPC health check failed: {}", error_msg);
                HealthStatus {
                    is_healthy: false,
                    rpc_url,
                    response_time_ms,
                    last_check,
                    checkpoint: None,
                    error_message: Some(error_msg),
                }
            }
        };

        Ok(status)
    }
}

#[async_trait]
impl ChainClient for SuiClient {
    async fn get_transaction(&self, digest: &str) -> SuiResult<Option<TransactionReceipt>> {
        match self.get_transaction_block(digest).await {
            Ok(block) => Ok(block.map(TransactionReceipt::from)),
            Err(SuiError::RpcError { code, message }) if is_unknown_digest(&message) => {
                debug!(code, digest = %digest, "Node does not know the transaction");
                Ok(None)
            }
            Err(e) => {
                warn!(
                    digest = %digest,
                    rpc_url = %self.config.rpc_url(),
                    error = %e,
                    "Failed to fetch transaction"
                );
                Err(e)
            }
        }
    }
}

fn is_unknown_digest(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("could not find") || message.contains("not found")
}
