//! Rewriting proxy
//!
//! This module provides the server-side pipeline behind `/proxy`:
//! - target validation and browser-like upstream fetches
//! - HTML rewriting (frame policy removal, frame-busting neutralization,
//!   URL routing, `<base>` and protection script injection)
//! - CSS URL rewriting
//! - byte-identical passthrough for binary and other content

pub mod endpoint;
pub mod fetch;
pub mod handler;
pub mod rewrite;

pub use endpoint::{ProxyEndpoint, PROXY_PATH};
pub use fetch::{UpstreamClient, UpstreamRequest, UpstreamResponse};
pub use handler::{validate_target, ProxiedResponse, ProxyHandler, ProxyHandlerConfig};
pub use rewrite::{rewrite_body, RewrittenBody};
