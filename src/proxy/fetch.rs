//! Outbound fetches to target sites

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, REFERER};
use reqwest::{Method, StatusCode};
use tokio::time::timeout;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{FramegateError, Result};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// One request to a target site
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: Url,
    /// Client body, forwarded for methods other than GET and HEAD
    pub body: Option<Bytes>,
    pub content_type: Option<HeaderValue>,
}

impl UpstreamRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            body: None,
            content_type: None,
        }
    }
}

/// Fully buffered upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// URL the body was served from, after redirects
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Browser-like HTTP client for target sites
///
/// No `Accept-Encoding` is sent, so bodies always arrive in identity
/// encoding and can be rewritten.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert("dnt", HeaderValue::from_static("1"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(BROWSER_USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| FramegateError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            timeout: request_timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` and buffer the whole response within the timeout
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    pub async fn fetch(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let url = request.url.to_string();

        match timeout(self.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(FramegateError::UpstreamTimeout {
                url,
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse> {
        let url = request.url.to_string();
        let referer = format!("{}/", request.url.origin().ascii_serialization());

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone());
        if let Ok(referer) = HeaderValue::from_str(&referer) {
            builder = builder.header(REFERER, referer);
        }
        if request.method != Method::GET && request.method != Method::HEAD {
            if let Some(content_type) = request.content_type {
                builder = builder.header(CONTENT_TYPE, content_type);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }
        }

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_error(&url, e))?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_error(&url, e))?;

        debug!(
            status = status.as_u16(),
            bytes = body.len(),
            "Upstream responded from {}",
            final_url
        );

        Ok(UpstreamResponse {
            status,
            url: final_url,
            headers,
            body,
        })
    }

    fn map_error(&self, url: &str, err: reqwest::Error) -> FramegateError {
        if err.is_timeout() {
            FramegateError::UpstreamTimeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            FramegateError::UpstreamFetch {
                url: url.to_string(),
                details: err.to_string(),
            }
        }
    }
}
