//! HTTP access to relay providers

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use tracing::{debug, instrument};

use crate::error::{FramegateError, Result};

const PROBE_USER_AGENT: &str = "Mozilla/5.0 (compatible; framegate/0.1)";

/// Raw provider response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    pub status: u16,
    pub body: String,
}

impl ProviderReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport used by the selection engine to reach providers
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Issue a GET against a fully built relay URL
    async fn get(&self, url: &str) -> Result<ProviderReply>;
}

/// `ProviderClient` backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpProviderClient {
    http: reqwest::Client,
}

impl HttpProviderClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(PROBE_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FramegateError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    #[instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<ProviderReply> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        debug!(status, bytes = body.len(), "Provider replied");
        Ok(ProviderReply { status, body })
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> FramegateError {
    if err.is_timeout() {
        FramegateError::UpstreamTimeout {
            url: url.to_string(),
            seconds: 0,
        }
    } else {
        FramegateError::UpstreamFetch {
            url: url.to_string(),
            details: err.to_string(),
        }
    }
}
