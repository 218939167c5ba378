//! # Khata Server
//!
//! REST API for the receivables ledger.
//!
//! ## Configuration
//! ```text
//! KHATA_BIND_ADDR           0.0.0.0:5000
//! KHATA_DB_PATH             ./khata.db   (":memory:" for a throwaway store)
//! KHATA_DB_MAX_CONNECTIONS  5
//! KHATA_REVERSAL_POLICY     exact | newest_first
//! RUST_LOG                  info,khata=debug,sqlx=warn
//! ```

use anyhow::Context;
use khata_db::Database;
use khata_server::{app, AppState, ServerConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Khata server...");

    // Load configuration
    let config = ServerConfig::load()?;
    info!(
        addr = %config.bind_addr,
        db_path = %config.db_path,
        reversal_policy = %config.reversal_policy,
        "Configuration loaded"
    );

    // Open database (runs migrations)
    let db = Database::new(config.db_config())
        .await
        .context("failed to open database")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, app(AppState::new(db.clone())))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,khata=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(?e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
