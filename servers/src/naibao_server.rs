//! Infant-feeding tracker backend.
//!
//! Serves the REST surface under `/api`, the realtime channel at `/ws` and a
//! liveness check at `/health`. Storage is PostgreSQL when `DATABASE_URL` is
//! set and an in-process store otherwise.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use lib_naibao::auth::TokenService;
use lib_naibao::configs::{AppConfig, load_config};
use lib_naibao::connections::{MemoryStore, Store};
use lib_naibao::core::{EventPublisher, Hub};
use lib_naibao::loggers::{LoggingConfig, setup_logging};
use lib_naibao::services::{ServiceContext, Services};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod naibao_logic;
use naibao_logic::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _log_guard = setup_logging(&LoggingConfig {
        app_name: "naibao_server".to_string(),
        level: config.log_level.clone().unwrap_or_else(|| "info".to_string()),
        dir: config.log_dir.clone(),
        json: config.log_json.unwrap_or(false),
        keep_files: config.log_keep_files.unwrap_or(7),
    })?;

    let clock = config.civil_clock()?;
    let tokens = TokenService::new(config.jwt_secret()?.as_bytes(), config.token_ttl_hours.unwrap_or(24));
    let store = open_store(&config).await?;

    let shutdown = CancellationToken::new();
    let (hub, hub_task) = Hub::spawn(config.hub_config(), shutdown.clone());
    let ctx = ServiceContext::new(store, clock, EventPublisher::new(hub.clone()));
    let services = Services::new(ctx, config.admin_ids());
    let state = AppState::new(services, tokens, hub, config.session_config(), clock);

    let app = naibao_logic::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port()));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("naibao server listening on {} (timezone {})", addr, clock.tz().name());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    shutdown.cancel();
    if let Err(e) = hub_task.await {
        warn!("hub task ended abnormally: {}", e);
    }
    info!("Shutdown complete.");
    Ok(())
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    match config.database_url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => connect_database(url, config.db_max_connections.unwrap_or(10)).await,
        None => {
            warn!("DATABASE_URL not set; records are kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[cfg(feature = "postgres")]
async fn connect_database(url: &str, max_connections: u32) -> Result<Arc<dyn Store>> {
    use lib_naibao::connections::db_postgres::PgStore;

    let store = PgStore::connect(url, max_connections).await?;
    store.migrate().await?;
    info!("PostgreSQL store ready ({} connections max)", max_connections);
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn connect_database(_url: &str, _max_connections: u32) -> Result<Arc<dyn Store>> {
    anyhow::bail!("DATABASE_URL is set but this build has no postgres support")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, initiating shutdown."),
        _ = terminate => info!("SIGTERM received, initiating shutdown."),
    }
}
