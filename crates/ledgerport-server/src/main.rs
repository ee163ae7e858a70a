//! Ledgerport Server - Main entry point

use anyhow::Result;
use ledgerport_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ledgerport_server::{
    api::{self, AppState},
    config::Config,
    db::{self, imports::PgImportRepository},
    features::ImportsState,
    imports::{cancel_after, ImportServices},
    storage::{config::StorageConfig, Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::default()
        .with_file_prefix("ledgerport-server")
        .with_filter("ledgerport_server=debug,tower_http=debug,sqlx=info")
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting Ledgerport Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = db::create_pool(&config.database).await?;
    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let storage = Storage::new(StorageConfig::from_env());
    storage.ensure_container(&config.imports.container).await?;
    info!(container = %config.imports.container, "Import container ready");

    let services = ImportServices::new(
        Arc::new(PgImportRepository::new(db_pool.clone())),
        Arc::new(storage),
        config.imports.clone(),
    );

    let shutdown = CancellationToken::new();
    let state = AppState {
        db: db_pool,
        imports: ImportsState::new(services, shutdown.clone()),
    };

    let app = api::create_router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            shutdown,
            config.server.shutdown_timeout_secs,
        ))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM so axum stops accepting connections.
/// In-flight import work is cancelled only after the drain timeout.
async fn shutdown_signal(shutdown: CancellationToken, timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for in-flight requests", timeout_secs);
    cancel_after(shutdown, Duration::from_secs(timeout_secs));
}
