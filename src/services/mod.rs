//! Services module for business logic and integrations

pub mod currency_converter;
pub mod live_price;
pub mod merchant_rate;
pub mod notification;
pub mod payment_orchestrator;
pub mod payment_verifier;
pub mod pricing;
pub mod validation;
pub mod webhook_dispatcher;

// Re-export orchestrator types
pub use crate::services::payment_orchestrator::{
    CreatePaymentRequest, CustomerInfo, OrchestratorConfig, OrchestratorError, OrchestratorResult,
    PaymentOrchestrator, PaymentTarget, SideEffect, VerificationReport,
};
pub use crate::services::webhook_dispatcher::{DispatchReport, SideEffectDispatcher};
