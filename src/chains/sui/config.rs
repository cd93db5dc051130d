use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiNetwork {
    Mainnet,
    Testnet,
    Devnet,
}

impl SuiNetwork {
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            SuiNetwork::Mainnet => "https://fullnode.mainnet.sui.io:443",
            SuiNetwork::Testnet => "https://fullnode.testnet.sui.io:443",
            SuiNetwork::Devnet => "https://fullnode.devnet.sui.io:443",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mainnet" => Some(SuiNetwork::Mainnet),
            "testnet" => Some(SuiNetwork::Testnet),
            "devnet" => Some(SuiNetwork::Devnet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuiConfig {
    pub network: SuiNetwork,
    /// Overrides the network's public full node when set
    pub rpc_url: Option<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum SuiConfigError {
    #[error("Invalid SUI_NETWORK '{0}', expected mainnet, testnet or devnet")]
    InvalidNetwork(String),

    #[error("Invalid SUI_REQUEST_TIMEOUT '{0}'")]
    InvalidTimeout(String),

    #[error("SUI_RPC_URL must be an http(s) URL, got '{0}'")]
    InvalidRpcUrl(String),
}

impl Default for SuiConfig {
    fn default() -> Self {
        Self {
            network: SuiNetwork::Testnet,
            rpc_url: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl SuiConfig {
    pub fn from_env() -> Result<Self, SuiConfigError> {
        let network_name = env::var("SUI_NETWORK").unwrap_or_else(|_| "testnet".to_string());
        let network = SuiNetwork::from_name(&network_name)
            .ok_or(SuiConfigError::InvalidNetwork(network_name))?;

        let timeout_raw = env::var("SUI_REQUEST_TIMEOUT").unwrap_or_else(|_| "10".to_string());
        let request_timeout = timeout_raw
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| SuiConfigError::InvalidTimeout(timeout_raw))?;

        let config = Self {
            network,
            rpc_url: env::var("SUI_RPC_URL").ok().filter(|url| !url.is_empty()),
            request_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SuiConfigError> {
        if let Some(url) = &self.rpc_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(SuiConfigError::InvalidRpcUrl(url.clone()));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(SuiConfigError::InvalidTimeout("0".to_string()));
        }
        Ok(())
    }

    pub fn rpc_url(&self) -> &str {
        self.rpc_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_rpc_url())
    }
}
