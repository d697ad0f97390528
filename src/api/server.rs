//! API server using Axum
//!
//! Serves `/proxy` and `/health` with graceful shutdown.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::middleware;
use axum::Router;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::Config;
use crate::error::{FramegateError, Result};
use crate::proxy::{ProxyHandler, ProxyHandlerConfig};

use super::middleware::{cors_layer, RequestLogging};
use super::routes;

/// Slack on top of the upstream budget before the whole request is cut off
const HANDLER_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub handler: ProxyHandler,
    pub started_at: Instant,
}

/// API server
pub struct ApiServer {
    config: Config,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: Config) -> Result<Self> {
        let handler = ProxyHandler::new(ProxyHandlerConfig {
            request_timeout: config.server.request_timeout(),
        })?;

        let state = AppState {
            config: config.clone(),
            handler,
            started_at: Instant::now(),
        };

        Ok(Self { config, state })
    }

    /// Build the router with all layers
    pub fn router(&self) -> Router {
        let timeout = self.config.server.request_timeout() + HANDLER_TIMEOUT_SLACK;

        routes::create_router(self.state.clone())
            .layer(middleware::from_fn(RequestLogging::log_request))
            .layer(TimeoutLayer::new(timeout))
            .layer(cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = self.config.server_addr().parse().map_err(|_| {
            FramegateError::InvalidConfig(format!(
                "invalid server address: {}",
                self.config.server_addr()
            ))
        })?;

        let router = self.router();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Proxy server listening on {}", addr);
        info!("Health check: http://{}/health", addr);
        info!("Proxy usage: http://{}/proxy?url=https://example.com", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| FramegateError::Internal(e.to_string()))?;

        info!("Proxy server shut down");
        Ok(())
    }
}
