use serde::{Deserialize, Serialize};

/// How a provider returns the relayed page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseShape {
    /// Body is the relayed page itself
    #[default]
    Direct,
    /// Body is a JSON envelope whose `contents` field holds the page
    #[serde(alias = "json")]
    Wrapped,
}

impl ResponseShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseShape::Direct => "direct",
            ResponseShape::Wrapped => "wrapped",
        }
    }

    /// Pull the page out of a provider response body.
    ///
    /// Returns `None` when a wrapped envelope is not valid JSON or carries an
    /// empty or missing `contents` field.
    pub fn extract_payload(&self, body: &str) -> Option<String> {
        match self {
            ResponseShape::Direct => Some(body.to_string()),
            ResponseShape::Wrapped => {
                let value: serde_json::Value = serde_json::from_str(body).ok()?;
                value
                    .get("contents")
                    .and_then(|c| c.as_str())
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
            }
        }
    }
}

impl std::fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider tier; a working set made only of fallback providers is degraded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTier {
    #[default]
    Primary,
    Fallback,
}

/// A candidate relay endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provider {
    pub name: String,
    /// Prefix to which the percent-encoded target URL is appended
    #[serde(alias = "url")]
    pub base_url_template: String,
    #[serde(default)]
    pub response_shape: ResponseShape,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub tier: ProviderTier,
}

fn default_active() -> bool {
    true
}

impl Provider {
    pub fn new(name: &str, base_url_template: &str, response_shape: ResponseShape) -> Self {
        Self {
            name: name.to_string(),
            base_url_template: base_url_template.to_string(),
            response_shape,
            active: true,
            tier: ProviderTier::Primary,
        }
    }

    pub fn fallback(mut self) -> Self {
        self.tier = ProviderTier::Fallback;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Build the relay URL for an already percent-encoded target
    pub fn relay_url(&self, encoded_target: &str) -> String {
        format!("{}{}", self.base_url_template, encoded_target)
    }

    pub fn is_fallback(&self) -> bool {
        self.tier == ProviderTier::Fallback
    }
}

/// Providers used when no provider list is configured
pub fn default_providers() -> Vec<Provider> {
    vec![
        Provider::new(
            "AllOrigins",
            "https://api.allorigins.win/get?url=",
            ResponseShape::Wrapped,
        ),
        Provider::new(
            "CorsAnywhere",
            "https://cors-anywhere.herokuapp.com/",
            ResponseShape::Direct,
        ),
        Provider::new("CorsProxy.io", "https://corsproxy.io/?", ResponseShape::Direct),
        Provider::new(
            "CodeTabs",
            "https://api.codetabs.com/v1/proxy?quest=",
            ResponseShape::Direct,
        ),
        Provider::new(
            "ThingProxy",
            "https://thingproxy.freeboard.io/fetch/",
            ResponseShape::Direct,
        )
        .fallback(),
        Provider::new("CrossOrigin", "https://crossorigin.me/", ResponseShape::Direct).fallback(),
        Provider::new(
            "YTProxy",
            "https://yt-proxy.vercel.app/proxy?url=",
            ResponseShape::Direct,
        )
        .fallback(),
        Provider::new(
            "ZeroProxy",
            "https://0proxy.vercel.app/api/proxy?url=",
            ResponseShape::Direct,
        )
        .fallback(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_extracts_contents() {
        let body = r#"{"contents":"<html>hi</html>","status":{"http_code":200}}"#;
        assert_eq!(
            ResponseShape::Wrapped.extract_payload(body),
            Some("<html>hi</html>".to_string())
        );
    }

    #[test]
    fn test_wrapped_rejects_malformed_or_empty() {
        assert_eq!(ResponseShape::Wrapped.extract_payload("<html>"), None);
        assert_eq!(ResponseShape::Wrapped.extract_payload(r#"{"contents":""}"#), None);
        assert_eq!(ResponseShape::Wrapped.extract_payload(r#"{"other":1}"#), None);
        assert_eq!(ResponseShape::Wrapped.extract_payload("null"), None);
    }

    #[test]
    fn test_direct_passes_body_through() {
        assert_eq!(
            ResponseShape::Direct.extract_payload("plain"),
            Some("plain".to_string())
        );
    }

    #[test]
    fn test_provider_deserialize_defaults() {
        let provider: Provider = serde_json::from_str(
            r#"{"name":"Local","url":"http://127.0.0.1:3000/proxy?url=","response_shape":"json"}"#,
        )
        .unwrap();

        assert_eq!(provider.base_url_template, "http://127.0.0.1:3000/proxy?url=");
        assert_eq!(provider.response_shape, ResponseShape::Wrapped);
        assert!(provider.active);
        assert_eq!(provider.tier, ProviderTier::Primary);
    }

    #[test]
    fn test_default_providers_unique_names() {
        let providers = default_providers();
        let mut names: Vec<_> = providers.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), providers.len());
        assert!(providers.iter().any(|p| p.is_fallback()));
    }
}
