//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

use crate::cache::RedisPool;
use crate::chains::sui::SuiClient;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: &'static str,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    Up,
    Down,
    Warning,
    /// Not configured in this deployment
    Skipped,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }

    /// Ready to serve traffic: nothing critical is down
    pub fn is_ready(&self) -> bool {
        !matches!(self.status, HealthState::Unhealthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }

    pub fn skipped() -> Self {
        Self {
            status: ComponentState::Skipped,
            response_time_ms: None,
            details: Some("not configured".to_string()),
        }
    }
}

type CheckResult = Result<u128, Box<dyn std::error::Error + Send + Sync>>;

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    db_pool: Option<sqlx::PgPool>,
    cache_pool: Option<RedisPool>,
    sui_client: Option<SuiClient>,
    /// Responses slower than this are reported as warnings
    slow_threshold_ms: u128,
}

impl HealthChecker {
    pub fn new(
        db_pool: Option<sqlx::PgPool>,
        cache_pool: Option<RedisPool>,
        sui_client: Option<SuiClient>,
    ) -> Self {
        Self {
            db_pool,
            cache_pool,
            sui_client,
            slow_threshold_ms: 2_000,
        }
    }

    /// Perform comprehensive health check.
    ///
    /// Database or RPC failures make the service unhealthy; a cache failure
    /// only degrades it, since rate settings fall back to the database.
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        let database = match &self.db_pool {
            Some(pool) => {
                self.timed_check("database", Duration::from_secs(5), check_database_health(pool))
                    .await
            }
            None => ComponentHealth::skipped(),
        };
        let cache = match &self.cache_pool {
            Some(pool) => {
                self.timed_check("cache", Duration::from_secs(5), check_cache_health(pool))
                    .await
            }
            None => ComponentHealth::skipped(),
        };
        let sui_rpc = match &self.sui_client {
            Some(client) => {
                self.timed_check("sui_rpc", Duration::from_secs(10), check_sui_health(client))
                    .await
            }
            None => ComponentHealth::skipped(),
        };

        health_status.status = overall_state(&database, &cache, &sui_rpc);
        health_status.checks.insert("database".to_string(), database);
        health_status.checks.insert("cache".to_string(), cache);
        health_status.checks.insert("sui_rpc".to_string(), sui_rpc);
        health_status
    }

    async fn timed_check(
        &self,
        component: &str,
        limit: Duration,
        check: impl Future<Output = CheckResult>,
    ) -> ComponentHealth {
        match timeout(limit, check).await {
            Ok(Ok(response_time)) if response_time > self.slow_threshold_ms => {
                info!(component, response_time_ms = %response_time, "Health check slow");
                ComponentHealth::warning(Some(response_time), Some("Slow response".to_string()))
            }
            Ok(Ok(response_time)) => {
                info!(component, response_time_ms = %response_time, "Health check: OK");
                ComponentHealth::up(Some(response_time))
            }
            Ok(Err(e)) => {
                error!(component, error = %e, "Health check failed");
                ComponentHealth::down(Some(e.to_string()))
            }
            Err(_) => {
                error!(component, "Health check timed out");
                ComponentHealth::down(Some("Timeout".to_string()))
            }
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

fn overall_state(
    database: &ComponentHealth,
    cache: &ComponentHealth,
    sui_rpc: &ComponentHealth,
) -> HealthState {
    let down = |c: &ComponentHealth| c.status == ComponentState::Down;
    let warn = |c: &ComponentHealth| c.status == ComponentState::Warning;

    if down(database) || down(sui_rpc) {
        HealthState::Unhealthy
    } else if down(cache) || [database, cache, sui_rpc].into_iter().any(warn) {
        HealthState::Degraded
    } else {
        HealthState::Healthy
    }
}

pub async fn check_database_health(pool: &sqlx::PgPool) -> CheckResult {
    let start = Instant::now();
    crate::database::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}

pub async fn check_cache_health(pool: &RedisPool) -> CheckResult {
    let start = Instant::now();
    crate::cache::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}

pub async fn check_sui_health(client: &SuiClient) -> CheckResult {
    let status = client.health_check().await?;
    if status.is_healthy {
        Ok(status.response_time_ms as u128)
    } else {
        Err(status
            .error_message
            .unwrap_or_else(|| "Sui RPC unhealthy".to_string())
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_status_creation() {
        let health_status = HealthStatus::new();
        assert!(matches!(health_status.status, HealthState::Healthy));
        assert!(health_status.checks.is_empty());
        assert!(health_status.timestamp <= chrono::Utc::now());
    }

    #[test]
    fn test_component_health_states() {
        let up_health = ComponentHealth::up(Some(100));
        assert!(matches!(up_health.status, ComponentState::Up));
        assert_eq!(up_health.response_time_ms, Some(100));

        let down_health = ComponentHealth::down(Some("Test error".to_string()));
        assert!(matches!(down_health.status, ComponentState::Down));
        assert_eq!(down_health.details, Some("Test error".to_string()));

        let warning_health = ComponentHealth::warning(Some(500), Some("Slow response".to_string()));
        assert!(matches!(warning_health.status, ComponentState::Warning));
        assert_eq!(warning_health.response_time_ms, Some(500));
    }

    #[test]
    fn test_overall_state() {
        let up = ComponentHealth::up(Some(3));
        let skipped = ComponentHealth::skipped();
        let down = ComponentHealth::down(None);

        assert_eq!(overall_state(&up, &up, &up), HealthState::Healthy);
        assert_eq!(overall_state(&skipped, &skipped, &skipped), HealthState::Healthy);
        assert_eq!(overall_state(&up, &down, &up), HealthState::Degraded);
        assert_eq!(overall_state(&up, &up, &down), HealthState::Unhealthy);
        assert_eq!(overall_state(&down, &up, &up), HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn test_unconfigured_components_are_skipped() {
        let status = HealthChecker::default().check_health().await;
        assert!(status.is_healthy());
        assert!(status.is_ready());
        assert_eq!(status.checks["database"].status, ComponentState::Skipped);
        assert_eq!(status.checks["sui_rpc"].status, ComponentState::Skipped);

        let body = serde_json::to_value(&status).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["checks"]["cache"]["status"], "skipped");
    }
}
