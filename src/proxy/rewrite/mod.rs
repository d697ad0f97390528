//! Response body rewriting
//!
//! HTML and CSS bodies are rewritten so the document keeps working inside a
//! sandboxed frame and its subresources load back through the proxy. All
//! other content is returned untouched.

pub mod css;
pub mod html;
pub mod script;

use bytes::Bytes;
use tracing::debug;
use url::Url;

use super::endpoint::ProxyEndpoint;
use crate::models::{ContentKind, RewriteTarget};

pub use css::rewrite_css;
pub use html::rewrite_html;
pub use script::protection_script;

/// Schemes that never go through the proxy
const SKIPPED_SCHEMES: &[&str] = &["data:", "javascript:", "mailto:", "tel:", "blob:", "about:"];

/// Body produced by the rewrite stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewrittenBody {
    /// Upstream bytes, passed through as-is
    Unchanged(Bytes),
    /// Rewritten document, in the upstream encoding
    Rewritten(Bytes),
}

impl RewrittenBody {
    pub fn is_modified(&self) -> bool {
        matches!(self, RewrittenBody::Rewritten(_))
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            RewrittenBody::Unchanged(bytes) => bytes,
            RewrittenBody::Rewritten(bytes) => bytes,
        }
    }
}

/// Run the pipeline selected by the response content kind
pub fn rewrite_body(target: &RewriteTarget, body: Bytes, endpoint: &ProxyEndpoint) -> RewrittenBody {
    debug!(kind = target.kind.as_str(), bytes = body.len(), "Rewriting response body");

    match target.kind {
        ContentKind::Html => {
            RewrittenBody::Rewritten(rewrite_text(&body, |text| rewrite_html(text, target, endpoint)))
        }
        ContentKind::Css => RewrittenBody::Rewritten(rewrite_text(&body, |text| {
            rewrite_css(text, &target.resolved, endpoint)
        })),
        ContentKind::OtherText | ContentKind::Binary => RewrittenBody::Unchanged(body),
    }
}

/// Apply a text rewrite without disturbing bytes outside UTF-8
///
/// Bodies in another charset are widened one byte per char, rewritten, and
/// narrowed back, so the upstream `charset` still describes the result. The
/// rewrite patterns and everything they insert are ASCII.
fn rewrite_text(body: &[u8], rewrite: impl FnOnce(&str) -> String) -> Bytes {
    match std::str::from_utf8(body) {
        Ok(text) => Bytes::from(rewrite(text)),
        Err(_) => {
            let widened: String = body.iter().copied().map(char::from).collect();
            Bytes::from(narrow(&rewrite(&widened)))
        }
    }
}

fn narrow(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        match u8::try_from(c) {
            Ok(byte) => out.push(byte),
            Err(_) => out.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
        }
    }
    out
}

/// How references that are neither absolute nor protocol-relative are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelativeRefs {
    /// Resolve against the base URL and proxy the result
    Resolve,
    /// Leave alone; the injected `<base>` handles them
    Keep,
}

/// Proxied form of a URL reference, or `None` when it must stay as written
pub(crate) fn route_reference(
    raw: &str,
    base: &Url,
    endpoint: &ProxyEndpoint,
    relative: RelativeRefs,
) -> Option<String> {
    let reference = raw.trim();
    if reference.is_empty() || reference.starts_with('#') || endpoint.is_proxied(reference) {
        return None;
    }

    let lower = reference.to_ascii_lowercase();
    if SKIPPED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return None;
    }

    let absolute = if lower.starts_with("http://") || lower.starts_with("https://") {
        Url::parse(reference).ok()?;
        reference.to_string()
    } else if reference.starts_with("//") {
        let url = Url::parse(&format!("{}:{}", base.scheme(), reference)).ok()?;
        url.to_string()
    } else if relative == RelativeRefs::Resolve {
        let url = base.join(reference).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        url.to_string()
    } else {
        return None;
    };

    Some(endpoint.proxied(&absolute))
}
