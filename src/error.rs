use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Usage hint returned when the target parameter is missing
pub const PROXY_USAGE: &str = "GET /proxy?url=https://example.com";

/// Unified error type for Framegate
#[derive(Error, Debug)]
pub enum FramegateError {
    // Target validation errors
    #[error("URL parameter is required")]
    MissingTarget,

    #[error("Invalid URL provided: {url}")]
    InvalidTarget { url: String, reason: String },

    // Upstream errors
    #[error("Failed to proxy request to {url}: {details}")]
    UpstreamFetch { url: String, details: String },

    #[error("Upstream request to {url} timed out after {seconds}s")]
    UpstreamTimeout { url: String, seconds: u64 },

    // Provider errors
    #[error("No working proxy providers available")]
    NoProvidersAvailable,

    #[error("Provider {name} failed: {details}")]
    ProviderFailed { name: String, details: String },

    #[error("Duplicate provider name: {0}")]
    DuplicateProvider(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Persistence errors
    #[error("Snapshot storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Framegate operations
pub type Result<T> = std::result::Result<T, FramegateError>;

impl FramegateError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            FramegateError::MissingTarget | FramegateError::InvalidTarget { .. } => {
                StatusCode::BAD_REQUEST
            }

            // 503 Service Unavailable
            FramegateError::NoProvidersAvailable => StatusCode::SERVICE_UNAVAILABLE,

            // 502 Bad Gateway
            FramegateError::ProviderFailed { .. } => StatusCode::BAD_GATEWAY,

            // Upstream failures fail closed with a 500
            FramegateError::UpstreamFetch { .. }
            | FramegateError::UpstreamTimeout { .. }
            | FramegateError::DuplicateProvider(_)
            | FramegateError::InvalidConfig(_)
            | FramegateError::Storage(_)
            | FramegateError::Serialization(_)
            | FramegateError::Io(_)
            | FramegateError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for FramegateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            FramegateError::MissingTarget => json!({
                "error": self.to_string(),
                "usage": PROXY_USAGE,
            }),
            FramegateError::InvalidTarget { url, reason } => json!({
                "error": "Invalid URL provided",
                "url": url,
                "details": reason,
            }),
            FramegateError::UpstreamFetch { url, details } => json!({
                "error": "Failed to proxy request",
                "details": details,
                "url": url,
            }),
            FramegateError::UpstreamTimeout { url, .. } => json!({
                "error": "Failed to proxy request",
                "details": self.to_string(),
                "url": url,
            }),
            _ => json!({
                "error": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

impl From<url::ParseError> for FramegateError {
    fn from(err: url::ParseError) -> Self {
        FramegateError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_error_status_code_mapping() {
        assert_eq!(
            FramegateError::MissingTarget.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FramegateError::InvalidTarget {
                url: "nope".to_string(),
                reason: "relative URL without a base".to_string(),
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            FramegateError::UpstreamTimeout {
                url: "https://example.com".to_string(),
                seconds: 30,
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            FramegateError::NoProvidersAvailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_client_server_helpers() {
        assert!(FramegateError::MissingTarget.is_client_error());
        assert!(!FramegateError::MissingTarget.is_server_error());

        let upstream = FramegateError::UpstreamFetch {
            url: "https://example.com".to_string(),
            details: "connection refused".to_string(),
        };
        assert!(upstream.is_server_error());
        assert!(!upstream.is_client_error());
    }

    #[tokio::test]
    async fn test_missing_target_response_carries_usage() {
        let response = FramegateError::MissingTarget.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "URL parameter is required");
        assert_eq!(value["usage"], PROXY_USAGE);
    }

    #[tokio::test]
    async fn test_invalid_target_response_echoes_value() {
        let response = FramegateError::InvalidTarget {
            url: "not a url".to_string(),
            reason: "relative URL without a base".to_string(),
        }
        .into_response();

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "Invalid URL provided");
        assert_eq!(value["url"], "not a url");
    }
}
