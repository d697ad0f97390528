//! Framegate proxy server - Entry Point
//!
//! Starts the rewriting proxy with graceful shutdown support.

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use framegate::api::ApiServer;
use framegate::config::LogConfig;
use framegate::{Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config.log);
    info!("Starting Framegate proxy server");

    let server = ApiServer::new(config.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run(shutdown_rx).await {
            error!("Proxy server error: {}", e);
        }
    });

    info!("Server started on {}", config.server_addr());

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = server_task.await;

    info!("Framegate proxy server stopped");
    Ok(())
}

/// Install the global subscriber; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("framegate={},tower_http=debug", log.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if log.format.eq_ignore_ascii_case("json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
