//! Folio API Server
//!
//! Authentication service for the Folio serialized-books platform.
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use folio_api::{auth::SessionManager, create_router, state::AppState};
use folio_core::config::{AppConfig, LoggingConfig, StoreBackend};
use folio_core::{AuthStore, MemoryAuthStore, PgAuthStore};
use std::sync::Arc;
use std::time::Duration;

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("folio_api={0},folio_core={0},audit=info,tower_http=debug", logging.level).into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("FOLIO_CONFIG") {
        Ok(path) => AppConfig::from_file(&path)
            .with_context(|| format!("failed to load config file {path}"))?
            .with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn AuthStore>> {
    match config.database.backend {
        StoreBackend::Postgres => {
            let store =
                PgAuthStore::connect(&config.database.url, config.database.max_connections)
                    .await
                    .context("failed to connect to PostgreSQL")?;
            store.migrate().await.context("failed to apply schema")?;
            tracing::info!("Using PostgreSQL auth store");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory auth store; accounts are lost on restart");
            Ok(Arc::new(MemoryAuthStore::new()))
        }
    }
}

/// Periodically delete expired refresh tokens
fn spawn_token_sweeper(sessions: Arc<SessionManager>, interval_secs: u64) {
    if interval_secs == 0 {
        tracing::info!("Expired token sweeper disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = sessions.purge_expired_tokens().await {
                tracing::warn!("Expired token sweep failed: {}", e);
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config errors are reported before logging is configured
    let config = load_config()?;
    init_tracing(&config.logging);

    if config.auth.uses_dev_secrets() {
        tracing::warn!("Using development signing secrets; set JWT_SECRET and JWT_REFRESH_SECRET");
    }

    let store = open_store(&config).await?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let purge_interval = config.auth.purge_interval_secs;

    let state = Arc::new(AppState::new(config, store).context("failed to build auth services")?);
    spawn_token_sweeper(Arc::clone(&state.sessions), purge_interval);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Folio API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI document at http://{}{}", addr, folio_api::openapi::OPENAPI_PATH);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
