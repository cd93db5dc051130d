//! SuiFlow backend: NGN-priced payment links settled in SUI

pub mod api;
pub mod cache;
pub mod chains;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod services;
pub mod workers;
