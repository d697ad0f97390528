use crate::error::{FramegateError, Result};
use crate::models::{default_providers, Provider};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Rewriting proxy server configuration
    pub server: ServerConfig,
    /// Selection engine configuration
    pub client: ClientConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1)
    pub host: String,
    /// Port for the proxy server (default: 3000)
    pub port: u16,
    /// Public base URL used when rewriting links back through the proxy
    pub public_url: Option<Url>,
    /// Upstream fetch timeout in seconds
    pub request_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Candidate providers, in preference order
    pub providers: Vec<Provider>,
    /// Always-up URL fetched through each provider when probing
    pub probe_target: String,
    /// Per-probe timeout in seconds
    pub probe_timeout: u64,
    /// How long a probe round stays valid, in seconds
    pub health_ttl: u64,
    /// Where the engine snapshot is persisted
    pub state_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            server: ServerConfig {
                host: get_env_or("FRAMEGATE_HOST", "127.0.0.1"),
                port: get_env_or("FRAMEGATE_PORT", "3000").parse().map_err(|_| {
                    FramegateError::InvalidConfig(
                        "FRAMEGATE_PORT must be a valid port number".into(),
                    )
                })?,
                public_url: parse_public_url()?,
                request_timeout: parse_seconds("FRAMEGATE_REQUEST_TIMEOUT", "30")?,
            },
            client: ClientConfig {
                providers: parse_providers()?,
                probe_target: parse_probe_target()?,
                probe_timeout: parse_seconds("FRAMEGATE_PROBE_TIMEOUT", "5")?,
                health_ttl: parse_seconds("FRAMEGATE_HEALTH_TTL", "300")?,
                state_path: PathBuf::from(get_env_or(
                    "FRAMEGATE_STATE_PATH",
                    "framegate-state.json",
                )),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the proxy server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }
}

impl ClientConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout.max(1))
    }

    pub fn health_ttl(&self) -> Duration {
        Duration::from_secs(self.health_ttl)
    }
}

fn parse_seconds(key: &str, default: &str) -> Result<u64> {
    get_env_or(key, default).trim().parse().map_err(|_| {
        FramegateError::InvalidConfig(format!("{} must be a number of seconds", key))
    })
}

fn parse_public_url() -> Result<Option<Url>> {
    let raw = env::var("FRAMEGATE_PUBLIC_URL").unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let url = Url::parse(raw).map_err(|e| {
        FramegateError::InvalidConfig(format!("FRAMEGATE_PUBLIC_URL must be a valid URL: {}", e))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FramegateError::InvalidConfig(format!(
            "FRAMEGATE_PUBLIC_URL has unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(FramegateError::InvalidConfig(
            "FRAMEGATE_PUBLIC_URL must not include query/fragment".into(),
        ));
    }

    Ok(Some(url))
}

fn parse_providers() -> Result<Vec<Provider>> {
    let raw = env::var("FRAMEGATE_PROVIDERS").unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(default_providers());
    }

    let providers: Vec<Provider> = serde_json::from_str(raw).map_err(|e| {
        FramegateError::InvalidConfig(format!("FRAMEGATE_PROVIDERS must be a JSON array: {}", e))
    })?;

    if providers.is_empty() {
        return Err(FramegateError::InvalidConfig(
            "FRAMEGATE_PROVIDERS must list at least one provider".into(),
        ));
    }

    Ok(providers)
}

fn parse_probe_target() -> Result<String> {
    let raw = get_env_or("FRAMEGATE_PROBE_TARGET", "https://httpbin.org/get");
    Url::parse(&raw).map_err(|e| {
        FramegateError::InvalidConfig(format!(
            "FRAMEGATE_PROBE_TARGET must be an absolute URL: {}",
            e
        ))
    })?;
    Ok(raw)
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResponseShape;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "FRAMEGATE_HOST",
        "FRAMEGATE_PORT",
        "FRAMEGATE_PUBLIC_URL",
        "FRAMEGATE_REQUEST_TIMEOUT",
        "FRAMEGATE_PROVIDERS",
        "FRAMEGATE_PROBE_TARGET",
        "FRAMEGATE_PROBE_TIMEOUT",
        "FRAMEGATE_HEALTH_TTL",
        "FRAMEGATE_STATE_PATH",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert!(config.server.public_url.is_none());
        assert_eq!(config.server.request_timeout(), Duration::from_secs(30));

        assert_eq!(config.client.providers.len(), default_providers().len());
        assert_eq!(config.client.probe_target, "https://httpbin.org/get");
        assert_eq!(config.client.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.client.health_ttl(), Duration::from_secs(300));

        assert_eq!(config.log.format, "pretty");
        assert_eq!(config.server_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("FRAMEGATE_HOST", "0.0.0.0");
        env::set_var("FRAMEGATE_PORT", "8080");
        env::set_var("FRAMEGATE_PUBLIC_URL", "https://relay.example");
        env::set_var(
            "FRAMEGATE_PROVIDERS",
            r#"[{"name":"Local","base_url_template":"http://127.0.0.1:3000/proxy?url="},
                {"name":"Envelope","url":"https://wrap.example/get?url=","response_shape":"wrapped","tier":"fallback"}]"#,
        );
        env::set_var("FRAMEGATE_HEALTH_TTL", "60");

        let config = Config::from_env().unwrap();

        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert_eq!(
            config.server.public_url.as_ref().map(|u| u.as_str()),
            Some("https://relay.example/")
        );
        assert_eq!(config.client.providers.len(), 2);
        assert_eq!(
            config.client.providers[1].response_shape,
            ResponseShape::Wrapped
        );
        assert!(config.client.providers[1].is_fallback());
        assert_eq!(config.client.health_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_config_from_env_invalid_port() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("FRAMEGATE_PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, FramegateError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_invalid_durations() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        for key in [
            "FRAMEGATE_REQUEST_TIMEOUT",
            "FRAMEGATE_PROBE_TIMEOUT",
            "FRAMEGATE_HEALTH_TTL",
        ] {
            env::set_var(key, "soon");
            match Config::from_env() {
                Err(FramegateError::InvalidConfig(msg)) => assert!(msg.contains(key), "{}", msg),
                other => panic!("{} accepted: {:?}", key, other.map(|_| ())),
            }
            env::remove_var(key);
        }
    }

    #[test]
    fn test_config_from_env_invalid_providers() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("FRAMEGATE_PROVIDERS", "AllOrigins");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, FramegateError::InvalidConfig(_)));

        env::set_var("FRAMEGATE_PROVIDERS", "[]");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, FramegateError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_rejects_bad_public_url() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("FRAMEGATE_PUBLIC_URL", "ftp://relay.example");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, FramegateError::InvalidConfig(_)));

        env::set_var("FRAMEGATE_PUBLIC_URL", "https://relay.example/?x=1");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, FramegateError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_rejects_relative_probe_target() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("FRAMEGATE_PROBE_TARGET", "/get");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, FramegateError::InvalidConfig(_)));
    }
}
