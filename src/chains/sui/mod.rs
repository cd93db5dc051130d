pub mod client;
pub mod config;
pub mod errors;
pub mod types;

pub use client::SuiClient;
pub use config::{SuiConfig, SuiNetwork};
pub use errors::{SuiError, SuiResult};
