//! Absolute URL of the `/proxy` endpoint as seen by the browser

use url::Url;

use crate::selection::encode_component;

/// Path of the rewriting endpoint
pub const PROXY_PATH: &str = "/proxy";

/// Absolute `/proxy` URL that rewritten links point back at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    base: String,
}

impl ProxyEndpoint {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// Pick the endpoint for a request
    ///
    /// A configured public URL wins, then the request's `Host` header, then
    /// the bind address.
    pub fn resolve(public_url: Option<&Url>, host_header: Option<&str>, bind_addr: &str) -> Self {
        if let Some(public) = public_url {
            let base = public.as_str().trim_end_matches('/');
            return Self::new(format!("{}{}", base, PROXY_PATH));
        }

        let host = host_header
            .map(str::trim)
            .filter(|h| !h.is_empty() && is_plausible_host(h))
            .unwrap_or(bind_addr);
        Self::new(format!("http://{}{}", host, PROXY_PATH))
    }

    pub fn as_str(&self) -> &str {
        &self.base
    }

    /// `{endpoint}?url={encoded}` for an absolute target URL
    pub fn proxied(&self, absolute: &str) -> String {
        format!("{}?url={}", self.base, encode_component(absolute))
    }

    /// Whether `candidate` already points at this endpoint
    pub fn is_proxied(&self, candidate: &str) -> bool {
        candidate.starts_with(&self.base) || candidate.starts_with("/proxy?url=")
    }
}

fn is_plausible_host(host: &str) -> bool {
    host.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
}
