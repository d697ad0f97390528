//! Provider selection engine
//!
//! Probes the configured providers, keeps the working subset, and hands out
//! relay URLs while hiding provider churn from callers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::client::ProviderClient;
use super::notifier::{StatusCallback, StatusNotifier};
use super::registry::ProviderRegistry;
use super::target::{embed_video_url, encode_component, normalize_target};
use crate::config::Config;
use crate::error::{FramegateError, Result};
use crate::models::{ConnectionStatus, PersistedSnapshot, Provider, StatusReport};
use crate::repository::SnapshotStore;

/// Tunables for the selection engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Always-up URL fetched through each provider when probing
    pub probe_target: String,
    /// Budget for a single probe
    pub probe_timeout: Duration,
    /// How long a probe round stays valid
    pub health_ttl: Duration,
    /// Budget for fetching a document through a provider
    pub fetch_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_target: "https://httpbin.org/get".to_string(),
            probe_timeout: Duration::from_secs(5),
            health_ttl: Duration::from_secs(300),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            probe_target: config.client.probe_target.clone(),
            probe_timeout: config.client.probe_timeout(),
            health_ttl: config.client.health_ttl(),
            fetch_timeout: config.server.request_timeout(),
        }
    }
}

/// Result of one probe round
#[derive(Debug, Clone, Default)]
pub struct HealthSnapshot {
    /// Providers that passed, in configuration order
    pub working: Vec<Arc<Provider>>,
    /// Always a valid index into `working` when it is non-empty
    pub current_index: usize,
    pub probed_at: Option<DateTime<Utc>>,
    /// Sequence number of the round that produced this snapshot
    pub round: u64,
}

impl HealthSnapshot {
    pub fn current(&self) -> Option<&Arc<Provider>> {
        self.working.get(self.current_index)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.probed_at {
            Some(probed_at) => now.signed_duration_since(probed_at) < to_chrono(ttl),
            None => false,
        }
    }

    fn names(&self) -> Vec<String> {
        self.working.iter().map(|p| p.name.clone()).collect()
    }

    /// Status a successful connect lands in for this working set
    fn connected_status(&self) -> ConnectionStatus {
        if self.working.is_empty() {
            ConnectionStatus::Error
        } else if self.working.iter().all(|p| p.is_fallback()) {
            ConnectionStatus::Fallback
        } else {
            ConnectionStatus::Connected
        }
    }
}

#[derive(Debug, Clone, Default)]
struct EngineState {
    status: ConnectionStatus,
    connection_id: Option<String>,
    health: Arc<HealthSnapshot>,
}

impl EngineState {
    fn report(&self, now: DateTime<Utc>) -> StatusReport {
        let provider = self.health.current();
        StatusReport {
            connected: self.status.is_connected() && provider.is_some(),
            status: self.status,
            connection_id: self.connection_id.clone(),
            provider: provider.map(|p| p.name.clone()),
            provider_url: provider.map(|p| p.base_url_template.clone()),
            working_providers: self.health.working.len(),
            working_provider_names: self.health.names(),
            last_probe: self.health.probed_at,
            probe_age_secs: self
                .health
                .probed_at
                .map(|t| now.signed_duration_since(t).num_seconds()),
        }
    }

    fn persisted(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            working_providers: self.health.names(),
            current_index: self.health.current_index,
            last_probe: self.health.probed_at,
            status: self.status,
            connection_id: self.connection_id.clone(),
        }
    }
}

/// Client-side connection manager over a set of relay providers
pub struct SelectionEngine {
    registry: ProviderRegistry,
    config: EngineConfig,
    client: Arc<dyn ProviderClient>,
    store: Arc<dyn SnapshotStore>,
    state: ArcSwap<EngineState>,
    rounds: AtomicU64,
    notifier: StatusNotifier,
    persist_lock: Mutex<()>,
}

impl SelectionEngine {
    /// Create a disconnected engine; call `connect` to start probing
    pub fn new(
        registry: ProviderRegistry,
        config: EngineConfig,
        client: Arc<dyn ProviderClient>,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        let state = EngineState::default();
        let notifier = StatusNotifier::new(state.report(Utc::now()));

        Self {
            registry,
            config,
            client,
            store,
            state: ArcSwap::from_pointee(state),
            rounds: AtomicU64::new(0),
            notifier,
            persist_lock: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Probe one provider against `test_target`
    ///
    /// Every failure mode (network error, timeout, non-2xx, malformed wrapped
    /// body) maps to `false`.
    #[instrument(skip(self, provider), fields(provider = %provider.name))]
    pub async fn probe_provider(&self, provider: &Provider, test_target: &str) -> bool {
        let url = provider.relay_url(&encode_component(test_target));

        match timeout(self.config.probe_timeout, self.client.get(&url)).await {
            Ok(Ok(reply)) if reply.is_success() => {
                if provider.response_shape.extract_payload(&reply.body).is_some() {
                    debug!("Provider {} is working", provider.name);
                    true
                } else {
                    debug!(
                        "Provider {} returned an invalid {} body",
                        provider.name, provider.response_shape
                    );
                    false
                }
            }
            Ok(Ok(reply)) => {
                debug!(
                    "Provider {} failed with status {}",
                    provider.name, reply.status
                );
                false
            }
            Ok(Err(e)) => {
                debug!("Provider {} probe failed: {}", provider.name, e);
                false
            }
            Err(_) => {
                debug!(
                    "Provider {} probe timed out after {:?}",
                    provider.name, self.config.probe_timeout
                );
                false
            }
        }
    }

    /// Return the working set, probing every active provider when the cached
    /// round is stale, empty, or `force` is set
    pub async fn refresh_health(&self, force: bool) -> Vec<Arc<Provider>> {
        let current = self.state.load_full();
        if !force
            && !current.health.working.is_empty()
            && current.health.is_fresh(Utc::now(), self.config.health_ttl)
        {
            debug!(
                "Using cached health from round {} ({} working)",
                current.health.round,
                current.health.working.len()
            );
            return current.health.working.clone();
        }

        let round = self.rounds.fetch_add(1, Ordering::SeqCst) + 1;
        let candidates = self.registry.active();
        info!(round, "Probing {} providers", candidates.len());

        let target = self.config.probe_target.as_str();
        let results = join_all(candidates.iter().map(|provider| async move {
            let works = self.probe_provider(provider, target).await;
            (provider.clone(), works)
        }))
        .await;

        let working: Vec<Arc<Provider>> = results
            .into_iter()
            .filter_map(|(provider, works)| works.then_some(provider))
            .collect();

        info!(
            round,
            "Probe round complete: {} of {} providers working",
            working.len(),
            candidates.len()
        );

        let snapshot = Arc::new(HealthSnapshot {
            working,
            current_index: 0,
            probed_at: Some(Utc::now()),
            round,
        });

        if self.install_health(snapshot) {
            self.persist().await;
        } else {
            debug!(round, "Discarding result of superseded probe round");
        }

        self.state.load().health.working.clone()
    }

    /// Install a round result unless a newer round already landed
    fn install_health(&self, snapshot: Arc<HealthSnapshot>) -> bool {
        let mut installed = false;
        let mut status_changed = false;

        self.state.rcu(|state| {
            installed = state.health.round < snapshot.round;
            status_changed = false;
            if !installed {
                return Arc::clone(state);
            }

            let mut next = EngineState::clone(state);
            next.health = snapshot.clone();
            // Keep the connected states honest about the new working set.
            if state.status.is_connected() {
                next.status = snapshot.connected_status();
                if next.status == ConnectionStatus::Error {
                    next.connection_id = None;
                }
                status_changed = next.status != state.status;
            }
            Arc::new(next)
        });

        if status_changed {
            self.notifier.notify_status(&self.check_status());
        }
        installed
    }

    /// Establish a connection, reusing a valid cached probe round
    pub async fn connect(&self) -> ConnectionStatus {
        let current = self.state.load_full();
        if current.status.is_connected()
            && !current.health.working.is_empty()
            && current.health.is_fresh(Utc::now(), self.config.health_ttl)
        {
            debug!("Already connected through {} providers", current.health.working.len());
            return current.status;
        }

        self.establish(false).await
    }

    /// Re-probe every provider and reconnect
    pub async fn retry(&self) -> ConnectionStatus {
        info!("Retrying provider connection");
        self.establish(true).await
    }

    async fn establish(&self, force: bool) -> ConnectionStatus {
        self.transition(ConnectionStatus::Connecting);
        self.refresh_health(force).await;
        self.finish_connect().await
    }

    async fn finish_connect(&self) -> ConnectionStatus {
        self.state.rcu(|state| {
            let mut next = EngineState::clone(state);
            next.status = state.health.connected_status();
            next.connection_id = if next.status.is_connected() {
                Some(format!("proxy-{}", Uuid::new_v4()))
            } else {
                None
            };
            Arc::new(next)
        });

        let report = self.check_status();
        match report.status {
            ConnectionStatus::Error => {
                warn!("No working proxy providers found");
            }
            status => {
                info!(
                    "Connected ({}) through provider {}",
                    status,
                    report.provider.as_deref().unwrap_or("-")
                );
            }
        }

        self.notifier.notify_status(&report);
        if report.connected {
            self.notifier.notify_connected(&report);
        }
        self.persist().await;
        report.status
    }

    /// Stop handing out relay URLs until the next connect
    pub async fn disconnect(&self) -> ConnectionStatus {
        self.state.rcu(|state| {
            let mut next = EngineState::clone(state);
            next.status = ConnectionStatus::Disconnected;
            next.connection_id = None;
            Arc::new(next)
        });
        info!("Disconnected from proxy providers");

        self.notifier.notify_status(&self.check_status());
        self.persist().await;
        ConnectionStatus::Disconnected
    }

    fn transition(&self, status: ConnectionStatus) {
        let previous = self.state.rcu(|state| {
            let mut next = EngineState::clone(state);
            next.status = status;
            Arc::new(next)
        });

        if previous.status != status {
            self.notifier.notify_status(&self.check_status());
        }
    }

    /// Relay URL for `target`, or the normalized target itself when no
    /// provider is usable
    ///
    /// Returns `None` only for blank input.
    pub fn get_proxied_url(&self, target: &str) -> Option<String> {
        let normalized = normalize_target(target)?;

        let state = self.state.load();
        let provider = match state.health.current() {
            Some(provider) if state.status.is_connected() => provider,
            _ => {
                debug!("No working proxy providers, using direct URL");
                return Some(normalized);
            }
        };

        let target = embed_video_url(&normalized).unwrap_or(normalized);
        Some(provider.relay_url(&encode_component(&target)))
    }

    /// Rotate to the next working provider
    ///
    /// Returns `false` without changing anything when fewer than two
    /// providers are working.
    pub async fn switch_to_next_provider(&self) -> bool {
        let mut switched = false;

        self.state.rcu(|state| {
            let len = state.health.working.len();
            switched = len >= 2;
            if !switched {
                return Arc::clone(state);
            }

            let mut health = HealthSnapshot::clone(&state.health);
            health.current_index = (health.current_index + 1) % len;
            let mut next = EngineState::clone(state);
            next.health = Arc::new(health);
            Arc::new(next)
        });

        if switched {
            let report = self.check_status();
            info!(
                "Switched to proxy provider {}",
                report.provider.as_deref().unwrap_or("-")
            );
            self.notifier.notify_status(&report);
            self.persist().await;
        }
        switched
    }

    /// Fetch a document through the current provider, failing over to the
    /// other working providers
    ///
    /// Wrapped responses are unwrapped to their `contents`.
    #[instrument(skip(self))]
    pub async fn fetch_document(&self, target: &str) -> Result<String> {
        let normalized =
            normalize_target(target).ok_or_else(|| FramegateError::InvalidTarget {
                url: target.to_string(),
                reason: "empty URL".to_string(),
            })?;

        let state = self.state.load_full();
        if !state.status.is_connected() || state.health.working.is_empty() {
            return Err(FramegateError::NoProvidersAvailable);
        }

        let max_attempts = state.health.working.len();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            let Some(provider) = self.state.load().health.current().cloned() else {
                break;
            };
            let url = provider.relay_url(&encode_component(&normalized));

            let outcome = match timeout(self.config.fetch_timeout, self.client.get(&url)).await {
                Ok(Ok(reply)) if reply.is_success() => provider
                    .response_shape
                    .extract_payload(&reply.body)
                    .ok_or_else(|| format!("invalid {} body", provider.response_shape)),
                Ok(Ok(reply)) => Err(format!("status {}", reply.status)),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {:?}", self.config.fetch_timeout)),
            };

            match outcome {
                Ok(page) => return Ok(page),
                Err(details) => {
                    warn!(
                        "Fetch through {} failed: {} (attempt {}/{})",
                        provider.name, details, attempt, max_attempts
                    );
                    last_error = Some(FramegateError::ProviderFailed {
                        name: provider.name.clone(),
                        details,
                    });
                }
            }

            if attempt < max_attempts && !self.switch_to_next_provider().await {
                break;
            }
        }

        Err(last_error.unwrap_or(FramegateError::NoProvidersAvailable))
    }

    /// Snapshot of the current connection state
    pub fn check_status(&self) -> StatusReport {
        self.state.load().report(Utc::now())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.load().status
    }

    /// Register a listener; it is called right away with the current status
    pub fn on_status_change<F>(&self, callback: F)
    where
        F: Fn(&StatusReport) + Send + Sync + 'static,
    {
        let callback: StatusCallback = Arc::new(callback);
        self.notifier.register_status(callback, &self.check_status());
    }

    /// Register a listener for successful connects; called right away when
    /// already connected
    pub fn on_connect<F>(&self, callback: F)
    where
        F: Fn(&StatusReport) + Send + Sync + 'static,
    {
        let callback: StatusCallback = Arc::new(callback);
        self.notifier.register_connect(callback, &self.check_status());
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusReport> {
        self.notifier.subscribe()
    }

    /// Re-hydrate from the snapshot store when the stored probe is still
    /// valid. Returns whether state was restored.
    pub async fn restore(&self) -> Result<bool> {
        let Some(snapshot) = self.store.load().await? else {
            return Ok(false);
        };

        if !snapshot.is_fresh(Utc::now(), to_chrono(self.config.health_ttl)) {
            debug!("Stored provider health is stale, ignoring");
            return Ok(false);
        }

        let working: Vec<Arc<Provider>> = snapshot
            .working_providers
            .iter()
            .filter_map(|name| self.registry.find(name))
            .filter(|p| p.active)
            .collect();
        if working.is_empty() {
            return Ok(false);
        }

        let health = Arc::new(HealthSnapshot {
            current_index: snapshot.current_index.min(working.len() - 1),
            working,
            probed_at: snapshot.last_probe,
            round: 0,
        });
        let status = if snapshot.status.is_connected() {
            health.connected_status()
        } else {
            ConnectionStatus::Disconnected
        };

        let mut restored = false;
        self.state.rcu(|state| {
            // Never overwrite a live probe round.
            restored = state.health.probed_at.is_none();
            if !restored {
                return Arc::clone(state);
            }
            Arc::new(EngineState {
                status,
                connection_id: snapshot
                    .connection_id
                    .clone()
                    .filter(|_| status.is_connected()),
                health: health.clone(),
            })
        });

        if restored {
            info!(
                "Restored {} working proxy providers from cache",
                health.working.len()
            );
            self.notifier.notify_status(&self.check_status());
        }
        Ok(restored)
    }

    /// Saves are serialized and read the state under the lock, so the last
    /// write always carries the newest state.
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.state.load().persisted();
        if let Err(e) = self.store.save(&snapshot).await {
            warn!("Failed to persist proxy state: {}", e);
        }
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(365))
}
