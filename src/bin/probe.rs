//! Probe the configured relay providers and print the resulting status
//!
//! Restores a still-valid cached probe round when one exists, otherwise
//! probes every active provider. Prints the status report as JSON.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use framegate::repository::FileSnapshotStore;
use framegate::selection::{EngineConfig, HttpProviderClient, ProviderRegistry, SelectionEngine};
use framegate::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("framegate={}", config.log.level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let registry = ProviderRegistry::new(config.client.providers.clone())
        .context("invalid provider list")?;
    let client = HttpProviderClient::new(config.client.probe_timeout())
        .context("failed to build provider client")?;
    let store = FileSnapshotStore::new(&config.client.state_path);

    let engine = SelectionEngine::new(
        registry,
        EngineConfig::from(&config),
        Arc::new(client),
        Arc::new(store),
    );

    if engine.restore().await.context("failed to read saved state")? {
        info!("Using cached provider health from {}", config.client.state_path.display());
    }

    let status = engine.connect().await;
    info!("Connection status: {}", status);

    let report = engine.check_status();
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
