//! Rewriting proxy request handler
//!
//! Validates the target, fetches it, rewrites the body according to its
//! content type, and builds a response that can be framed.

use std::time::{Duration, Instant};

use axum::http::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_ENCODING, CONTENT_LENGTH,
    CONTENT_TYPE,
    ETAG, EXPIRES, LAST_MODIFIED,
};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::endpoint::ProxyEndpoint;
use super::fetch::{UpstreamClient, UpstreamRequest, UpstreamResponse};
use super::rewrite::{rewrite_body, RewrittenBody};
use crate::error::{FramegateError, Result};
use crate::models::RewriteTarget;

pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS, HEAD";
pub const CORS_ALLOW_HEADERS: &str =
    "Content-Type, Authorization, X-Requested-With, Accept, Origin, User-Agent, Referer";

/// Configuration for the proxy handler
#[derive(Debug, Clone)]
pub struct ProxyHandlerConfig {
    /// Budget for one upstream fetch
    pub request_timeout: Duration,
}

impl Default for ProxyHandlerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Response produced by the proxy pipeline
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxiedResponse {
    fn json(status: StatusCode, body: serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        with_cors(&mut headers);

        Self {
            status,
            headers,
            body: Bytes::from(body.to_string()),
        }
    }
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// Rewriting proxy handler
#[derive(Debug, Clone)]
pub struct ProxyHandler {
    upstream: UpstreamClient,
}

impl ProxyHandler {
    pub fn new(config: ProxyHandlerConfig) -> Result<Self> {
        Ok(Self {
            upstream: UpstreamClient::new(config.request_timeout)?,
        })
    }

    /// Handle one proxy request
    ///
    /// Returns 400-class errors for a missing or invalid target and 500-class
    /// errors when the fetch fails or times out. Upstream non-2xx statuses are
    /// reported as a JSON body with the same status.
    #[instrument(skip(self, method, headers, body, endpoint), fields(method = %method))]
    pub async fn handle(
        &self,
        method: Method,
        target: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
        endpoint: &ProxyEndpoint,
    ) -> Result<ProxiedResponse> {
        let requested = validate_target(target)?;
        info!("Proxying {} request to {}", method, requested);

        let start = Instant::now();
        let request = UpstreamRequest {
            method: method.clone(),
            url: requested.clone(),
            body: (!body.is_empty()).then_some(body),
            content_type: headers.get(CONTENT_TYPE).cloned(),
        };

        let upstream = match self.upstream.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Proxy fetch for {} failed: {}", requested, e);
                return Err(e);
            }
        };

        if !upstream.status.is_success() {
            debug!(status = upstream.status.as_u16(), "Upstream returned an error status");
            return Ok(error_status_response(&upstream, &requested));
        }

        let target = RewriteTarget::new(requested, upstream.url.clone(), upstream.content_type());
        let response = build_response(&target, upstream, endpoint);

        debug!(
            kind = target.kind.as_str(),
            bytes = response.body.len(),
            "Proxied {} in {:?}",
            target.resolved,
            start.elapsed()
        );
        Ok(response)
    }
}

/// Parse the `url` query value; only absolute http(s) URLs are accepted
pub fn validate_target(raw: Option<&str>) -> Result<Url> {
    let raw = match raw.map(str::trim) {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Err(FramegateError::MissingTarget),
    };

    let url = Url::parse(raw).map_err(|e| FramegateError::InvalidTarget {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(FramegateError::InvalidTarget {
            url: raw.to_string(),
            reason: format!("unsupported scheme: {}", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(FramegateError::InvalidTarget {
            url: raw.to_string(),
            reason: "missing host".to_string(),
        });
    }

    Ok(url)
}

fn error_status_response(upstream: &UpstreamResponse, requested: &Url) -> ProxiedResponse {
    let status = upstream.status;
    ProxiedResponse::json(
        status,
        json!({
            "status": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Unknown Status"),
            "url": requested.as_str(),
        }),
    )
}

fn build_response(
    target: &RewriteTarget,
    upstream: UpstreamResponse,
    endpoint: &ProxyEndpoint,
) -> ProxiedResponse {
    let mut headers = HeaderMap::new();

    // Frame and content policy headers are never copied.
    for name in [CONTENT_DISPOSITION, CACHE_CONTROL, EXPIRES, LAST_MODIFIED, ETAG] {
        if let Some(value) = upstream.headers.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    match HeaderValue::from_str(&target.content_type) {
        Ok(value) => headers.insert(CONTENT_TYPE, value),
        Err(_) => headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html")),
    };

    // Encoded bodies can't be rewritten as text and go out as received.
    let encoded = upstream
        .headers
        .get(CONTENT_ENCODING)
        .is_some_and(|v| !v.as_bytes().eq_ignore_ascii_case(b"identity"));
    let body = if encoded {
        debug!("Passing through encoded {} body", target.kind.as_str());
        RewrittenBody::Unchanged(upstream.body)
    } else {
        rewrite_body(target, upstream.body, endpoint)
    };
    if !body.is_modified() {
        for name in [CONTENT_LENGTH, CONTENT_ENCODING] {
            if let Some(value) = upstream.headers.get(&name) {
                headers.insert(name, value.clone());
            }
        }
    }
    with_cors(&mut headers);

    ProxiedResponse {
        status: upstream.status,
        headers,
        body: body.into_bytes(),
    }
}

fn with_cors(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use axum::Router;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff, 0x10];
    const PACKED: &[u8] = &[0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0xb3, 0xc9];

    async fn spawn_upstream() -> std::net::SocketAddr {
        let app = Router::new()
            .route(
                "/page",
                get(|| async {
                    (
                        [
                            ("content-type", "text/html; charset=utf-8"),
                            ("x-frame-options", "DENY"),
                            ("content-security-policy", "frame-ancestors 'none'"),
                            ("etag", "\"v1\""),
                        ],
                        "<html><head><title>t</title></head><body>hi</body></html>",
                    )
                }),
            )
            .route(
                "/logo.png",
                get(|| async { ([("content-type", "image/png")], PNG) }),
            )
            .route(
                "/app.js",
                get(|| async {
                    (
                        [("content-type", "application/javascript")],
                        "if (top != self) { top.location = self.location; }",
                    )
                }),
            )
            .route(
                "/packed.html",
                get(|| async {
                    (
                        [("content-type", "text/html"), ("content-encoding", "gzip")],
                        PACKED,
                    )
                }),
            )
            .route(
                "/missing",
                get(|| async { (StatusCode::NOT_FOUND, "nope") }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    "late"
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn handler(timeout: Duration) -> ProxyHandler {
        ProxyHandler::new(ProxyHandlerConfig {
            request_timeout: timeout,
        })
        .unwrap()
    }

    fn endpoint() -> ProxyEndpoint {
        ProxyEndpoint::new("http://localhost:3000/proxy")
    }

    async fn get_target(handler: &ProxyHandler, target: &str) -> Result<ProxiedResponse> {
        handler
            .handle(Method::GET, Some(target), &HeaderMap::new(), Bytes::new(), &endpoint())
            .await
    }

    #[test]
    fn test_validate_target() {
        assert!(matches!(validate_target(None), Err(FramegateError::MissingTarget)));
        assert!(matches!(validate_target(Some("  ")), Err(FramegateError::MissingTarget)));
        assert!(matches!(
            validate_target(Some("not a url")),
            Err(FramegateError::InvalidTarget { .. })
        ));
        assert!(matches!(
            validate_target(Some("ftp://example.com/file")),
            Err(FramegateError::InvalidTarget { .. })
        ));
        assert_eq!(
            validate_target(Some("https://example.com/a?b=c")).unwrap().as_str(),
            "https://example.com/a?b=c"
        );
    }

    #[tokio::test]
    async fn test_html_is_rewritten_and_framable() {
        let addr = spawn_upstream().await;
        let response = get_target(&handler(Duration::from_secs(5)), &format!("http://{}/page", addr))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert!(response.headers.get("x-frame-options").is_none());
        assert!(response.headers.get("content-security-policy").is_none());
        assert!(response.headers.get(CONTENT_LENGTH).is_none());
        assert_eq!(response.headers.get(ETAG).unwrap(), "\"v1\"");
        assert_eq!(
            response.headers.get("access-control-allow-origin").unwrap(),
            "*"
        );

        let body = String::from_utf8(response.body.to_vec()).unwrap();
        assert!(body.contains(&format!(r#"<base href="http://{}">"#, addr)));
        assert!(body.contains(r#"<script data-framegate="protect">"#));
        assert!(body.contains("<body>hi</body>"));
    }

    #[tokio::test]
    async fn test_binary_passthrough_is_byte_identical() {
        let addr = spawn_upstream().await;
        let response =
            get_target(&handler(Duration::from_secs(5)), &format!("http://{}/logo.png", addr))
                .await
                .unwrap();

        assert_eq!(response.headers.get(CONTENT_TYPE).unwrap(), "image/png");
        assert_eq!(&response.body[..], PNG);
        assert_eq!(
            response.headers.get(CONTENT_LENGTH).unwrap().to_str().unwrap(),
            PNG.len().to_string()
        );
    }

    #[tokio::test]
    async fn test_encoded_body_keeps_its_encoding() {
        let addr = spawn_upstream().await;
        let response =
            get_target(&handler(Duration::from_secs(5)), &format!("http://{}/packed.html", addr))
                .await
                .unwrap();

        assert_eq!(&response.body[..], PACKED);
        assert_eq!(response.headers.get(CONTENT_ENCODING).unwrap(), "gzip");
        assert_eq!(response.headers.get(CONTENT_TYPE).unwrap(), "text/html");
    }

    #[tokio::test]
    async fn test_other_text_passes_through() {
        let addr = spawn_upstream().await;
        let response =
            get_target(&handler(Duration::from_secs(5)), &format!("http://{}/app.js", addr))
                .await
                .unwrap();

        assert_eq!(
            &response.body[..],
            b"if (top != self) { top.location = self.location; }"
        );
    }

    #[tokio::test]
    async fn test_upstream_error_status_is_reported() {
        let addr = spawn_upstream().await;
        let target = format!("http://{}/missing", addr);
        let response = get_target(&handler(Duration::from_secs(5)), &target)
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["status"], 404);
        assert_eq!(body["error"], "Not Found");
        assert_eq!(body["url"], target);
    }

    #[tokio::test]
    async fn test_slow_upstream_fails_within_budget() {
        let addr = spawn_upstream().await;
        let started = Instant::now();
        let err = get_target(&handler(Duration::from_millis(200)), &format!("http://{}/slow", addr))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_500() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = get_target(&handler(Duration::from_secs(2)), &format!("http://{}/", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, FramegateError::UpstreamFetch { .. }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
