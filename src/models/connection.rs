use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection state of the selection engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
    /// Connected, but only through fallback-tier providers
    Fallback,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Fallback => "fallback",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "disconnected" => Some(ConnectionStatus::Disconnected),
            "connecting" => Some(ConnectionStatus::Connecting),
            "connected" => Some(ConnectionStatus::Connected),
            "error" => Some(ConnectionStatus::Error),
            "fallback" => Some(ConnectionStatus::Fallback),
            _ => None,
        }
    }

    /// Whether proxied URLs can be handed out in this state
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Fallback)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of the engine handed to callers and listeners
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct StatusReport {
    pub connected: bool,
    pub status: ConnectionStatus,
    pub connection_id: Option<String>,
    pub provider: Option<String>,
    pub provider_url: Option<String>,
    pub working_providers: usize,
    pub working_provider_names: Vec<String>,
    pub last_probe: Option<DateTime<Utc>>,
    /// Seconds since the last probe round
    pub probe_age_secs: Option<i64>,
}

/// Serialized form of the engine state, kept between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub working_providers: Vec<String>,
    pub current_index: usize,
    pub last_probe: Option<DateTime<Utc>>,
    pub status: ConnectionStatus,
    #[serde(default)]
    pub connection_id: Option<String>,
}

impl PersistedSnapshot {
    /// Whether the stored probe is still inside the validity window
    pub fn is_fresh(&self, now: DateTime<Utc>, validity: chrono::Duration) -> bool {
        match self.last_probe {
            Some(probed_at) => now.signed_duration_since(probed_at) < validity,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_str_roundtrip() {
        for status in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Error,
            ConnectionStatus::Fallback,
        ] {
            assert_eq!(ConnectionStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ConnectionStatus::from_str("checking"), None);
    }

    #[test]
    fn test_only_connected_states_hand_out_urls() {
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(ConnectionStatus::Fallback.is_connected());
        assert!(!ConnectionStatus::Connecting.is_connected());
        assert!(!ConnectionStatus::Error.is_connected());
        assert!(!ConnectionStatus::Disconnected.is_connected());
    }

    #[test]
    fn test_snapshot_freshness() {
        let now = Utc::now();
        let mut snapshot = PersistedSnapshot {
            working_providers: vec!["A".to_string()],
            current_index: 0,
            last_probe: Some(now - chrono::Duration::minutes(4)),
            status: ConnectionStatus::Connected,
            connection_id: None,
        };
        assert!(snapshot.is_fresh(now, chrono::Duration::minutes(5)));

        snapshot.last_probe = Some(now - chrono::Duration::minutes(6));
        assert!(!snapshot.is_fresh(now, chrono::Duration::minutes(5)));

        snapshot.last_probe = None;
        assert!(!snapshot.is_fresh(now, chrono::Duration::minutes(5)));
    }
}
