//! `/proxy` endpoint

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::header::HOST;
use axum::http::{HeaderMap, Method};
use serde::Deserialize;

use crate::api::server::AppState;
use crate::error::FramegateError;
use crate::proxy::{ProxiedResponse, ProxyEndpoint};

/// Query parameters for the proxy endpoint
#[derive(Debug, Deserialize, Default)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// Fetch `?url=` and return the rewritten response
pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<ProxyQuery>,
    body: Bytes,
) -> Result<ProxiedResponse, FramegateError> {
    let endpoint = ProxyEndpoint::resolve(
        state.config.server.public_url.as_ref(),
        headers.get(HOST).and_then(|v| v.to_str().ok()),
        &state.config.server_addr(),
    );

    state
        .handler
        .handle(method, query.url.as_deref(), &headers, body, &endpoint)
        .await
}
