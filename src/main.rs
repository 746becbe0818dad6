use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::{web, App, HttpServer};
use std::io;
use std::sync::Arc;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;

use systempay_gateway::config::AppConfig;
use systempay_gateway::shop::{InMemoryOrderStore, OrderStore};
use systempay_gateway::storage::{InMemoryTransactionStore, TransactionStore};
use systempay_gateway::systempay::{self, SystemPayState};
use systempay_gateway::utils;

async fn transaction_store(config: &AppConfig) -> io::Result<Arc<dyn TransactionStore>> {
    #[cfg(feature = "sqlite")]
    {
        if let Some(database_url) = config.database_url.as_deref() {
            let store = systempay_gateway::storage::create_sqlite_transaction_store(database_url)
                .await
                .map_err(io::Error::other)?;
            tracing::info!("Recording SystemPay transactions in {database_url}");
            return Ok(Arc::new(store));
        }
    }
    let _ = config;
    tracing::info!("Recording SystemPay transactions in memory");
    Ok(Arc::new(InMemoryTransactionStore::new()))
}

/// Loads the environment file named by the first argument (default
/// `.env`), then serves the `/systempay/` namespace.
#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let env_file = utils::ensure_dotenv_loaded();
    tracing::info!("📦 Loading environment from {env_file}");

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load application configuration.");
        io::Error::other(e)
    })?;

    let transactions = transaction_store(&config).await?;
    let orders: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
    let state = SystemPayState::new(config.clone(), transactions, orders).map_err(io::Error::other)?;

    if config.systempay.sandbox_mode {
        tracing::info!("ℹ️ SystemPay sandbox mode (vads_ctx_mode=TEST).");
    }

    let governor_conf = GovernorConfigBuilder::default()
        .burst_size(config.governor_burst)
        .seconds_per_request(config.governor_per_second)
        .finish()
        .ok_or_else(|| io::Error::other("Failed to build governor config"))?;

    let server_port = config.server_port;
    tracing::info!("🚀 Server starting on http://127.0.0.1:{server_port}");
    tracing::info!("🔗 Test: http://127.0.0.1:{server_port}/systempay/health");

    HttpServer::new(move || {
        App::new()
            .wrap(Governor::new(&governor_conf))
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(systempay::configure)
    })
    .bind(("127.0.0.1", server_port))?
    .run()
    .await
}
