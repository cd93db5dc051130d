use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use suiflow_backend::api::{self, AppState};
use suiflow_backend::cache::{init_cache_pool, CachePoolConfig, RedisCache, RedisPool};
use suiflow_backend::chains::sui::{SuiClient, SuiConfig};
use suiflow_backend::config::AppConfig;
use suiflow_backend::database::init_pool_from_config;
use suiflow_backend::database::memory::InMemoryStore;
use suiflow_backend::database::merchant_rate_repository::MerchantRateRepository;
use suiflow_backend::database::merchant_repository::MerchantRepository;
use suiflow_backend::database::payment_repository::PaymentRepository;
use suiflow_backend::database::product_repository::ProductRepository;
use suiflow_backend::database::repository::{
    MerchantRateStore, MerchantStore, PaymentStore, ProductStore,
};
use suiflow_backend::health::HealthChecker;
use suiflow_backend::logging::init_tracing_with;
use suiflow_backend::services::live_price::{
    BinanceConfig, BinancePriceProvider, PriceOracle, PriceOracleConfig,
};
use suiflow_backend::services::merchant_rate::{MerchantRateConfig, MerchantRateService};
use suiflow_backend::services::notification::{NotificationConfig, NotificationService};
use suiflow_backend::services::payment_verifier::{ChainVerifier, VerifierConfig};
use suiflow_backend::services::pricing::{PricingConfig, PricingService};
use suiflow_backend::services::webhook_dispatcher::WebhookClient;
use suiflow_backend::services::{OrchestratorConfig, PaymentOrchestrator, SideEffectDispatcher};
use suiflow_backend::workers::rate_refresh::{
    CoinGeckoRateSource, RateRefreshConfig, RateRefreshWorker,
};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

struct Stores {
    payments: Arc<dyn PaymentStore>,
    merchants: Arc<dyn MerchantStore>,
    products: Arc<dyn ProductStore>,
    rates: Arc<dyn MerchantRateStore>,
    db_pool: Option<sqlx::PgPool>,
    cache_pool: Option<RedisPool>,
}

async fn init_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    let Some(database) = &config.database else {
        info!("Skipping Postgres and Redis (SKIP_EXTERNALS=true), using in-memory stores");
        let store = Arc::new(InMemoryStore::new());
        return Ok(Stores {
            payments: store.clone(),
            merchants: store.clone(),
            products: store.clone(),
            rates: store,
            db_pool: None,
            cache_pool: None,
        });
    };

    info!("Initializing database connection pool...");
    let pool = init_pool_from_config(database).await.map_err(|e| {
        error!(error = %e, "Failed to initialize database pool");
        e
    })?;
    info!(
        max_connections = pool.options().get_max_connections(),
        "Database connection pool initialized"
    );

    let cache_pool = match &config.cache {
        Some(cache) => {
            info!("Initializing Redis cache connection pool...");
            let pool = init_cache_pool(CachePoolConfig::from(cache)).await.map_err(|e| {
                error!(error = %e, "Failed to initialize cache pool");
                e
            })?;
            info!("Cache connection pool initialized");
            Some(pool)
        }
        None => None,
    };

    Ok(Stores {
        payments: Arc::new(PaymentRepository::new(pool.clone())),
        merchants: Arc::new(MerchantRepository::new(pool.clone())),
        products: Arc::new(ProductRepository::new(pool.clone())),
        rates: Arc::new(MerchantRateRepository::new(pool.clone())),
        db_pool: Some(pool),
        cache_pool,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing_with(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "Starting SuiFlow backend service"
    );

    let stores = init_stores(&config).await?;

    // Chain
    let sui_config = SuiConfig::from_env()?;
    info!(
        network = ?sui_config.network,
        timeout_secs = sui_config.request_timeout.as_secs(),
        "Sui configuration loaded"
    );
    let sui_client = SuiClient::new(sui_config)?;
    match sui_client.health_check().await {
        Ok(status) if status.is_healthy => {
            info!(response_time_ms = status.response_time_ms, "Sui RPC is healthy")
        }
        Ok(status) => warn!(
            error = status.error_message.as_deref().unwrap_or("Unknown error"),
            "Sui RPC health check failed"
        ),
        Err(e) => warn!(error = %e, "Sui RPC health check failed"),
    }

    // Pricing
    let provider = Arc::new(BinancePriceProvider::new(BinanceConfig::from_env())?);
    let oracle = Arc::new(PriceOracle::new(provider, PriceOracleConfig::from_env()));
    let mut rate_service = MerchantRateService::new(stores.rates.clone(), MerchantRateConfig::from_env());
    if let Some(pool) = stores.cache_pool.clone() {
        rate_service = rate_service.with_cache(RedisCache::new(pool));
    }
    let pricing = Arc::new(PricingService::new(
        oracle,
        Arc::new(rate_service),
        PricingConfig::from_env(),
    ));

    // Payments
    let notifications = Arc::new(NotificationService::from_config(&NotificationConfig::from_env())?);
    let verifier = Arc::new(ChainVerifier::new(
        Arc::new(sui_client.clone()),
        VerifierConfig::from_env(),
    ));
    let orchestrator_config = OrchestratorConfig {
        link_base_url: config.server.public_base_url.clone(),
        ..OrchestratorConfig::from_env()
    };
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        stores.payments.clone(),
        stores.merchants.clone(),
        stores.products.clone(),
        pricing.clone(),
        verifier,
        notifications.clone(),
        orchestrator_config,
    ));
    let dispatcher = Arc::new(SideEffectDispatcher::new(
        Arc::new(WebhookClient::from_env()?),
        notifications,
    ));

    // Workers
    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let refresh_config = RateRefreshConfig::from_env();
    let refresh_handle = if refresh_config.enabled {
        info!(
            interval_secs = refresh_config.interval.as_secs(),
            "Starting SUI/NGN rate refresh worker"
        );
        let source = Arc::new(CoinGeckoRateSource::new(
            refresh_config.api_base_url.clone(),
            refresh_config.request_timeout,
        )?);
        let worker = RateRefreshWorker::new(source, pricing.clone(), refresh_config);
        Some(tokio::spawn(worker.run(worker_shutdown_rx)))
    } else {
        info!("Rate refresh worker disabled (RATE_AUTO_UPDATE=false)");
        None
    };

    let health_checker = HealthChecker::new(
        stores.db_pool.clone(),
        stores.cache_pool.clone(),
        Some(sui_client),
    );

    let state = AppState {
        orchestrator,
        pricing,
        merchants: stores.merchants,
        products: stores.products,
        dispatcher,
        health: health_checker,
        public_base_url: config.server.public_base_url.clone(),
    };
    let app = api::with_middleware(api::router(state), &config.server.cors_allowed_origins);
    info!("Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(address = %addr, error = %e, "Failed to bind");
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = refresh_handle {
        if let Err(e) = tokio::time::timeout(Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for rate refresh worker shutdown");
        }
    }

    info!("Server shutdown complete");

    Ok(())
}
