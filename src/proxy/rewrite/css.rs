//! Stylesheet URL rewriting

use std::sync::OnceLock;

use regex::{Captures, Regex};
use url::Url;

use super::super::endpoint::ProxyEndpoint;
use super::{route_reference, RelativeRefs};

static CSS_URL_REGEX: OnceLock<Regex> = OnceLock::new();
static CSS_IMPORT_REGEX: OnceLock<Regex> = OnceLock::new();

/// `url(...)` with double, single, or no quotes
fn css_url_regex() -> &'static Regex {
    CSS_URL_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)\burl\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]+))\s*\)"#).unwrap()
    })
}

/// `@import "..."` without `url()`
fn css_import_regex() -> &'static Regex {
    CSS_IMPORT_REGEX
        .get_or_init(|| Regex::new(r#"(?i)@import\s+(?:"([^"]*)"|'([^']*)')"#).unwrap())
}

/// Route stylesheet references through the proxy
///
/// Relative references are resolved against `stylesheet` first, since the
/// stylesheet itself is served from the proxy origin.
pub fn rewrite_css(css: &str, stylesheet: &Url, endpoint: &ProxyEndpoint) -> String {
    rewrite_css_refs(css, stylesheet, endpoint, RelativeRefs::Resolve)
}

pub(crate) fn rewrite_css_refs(
    css: &str,
    base: &Url,
    endpoint: &ProxyEndpoint,
    relative: RelativeRefs,
) -> String {
    let css = css_url_regex().replace_all(css, |caps: &Captures| {
        let (raw, quote) = quoted_value(caps);
        match route_reference(raw, base, endpoint, relative) {
            Some(proxied) => format!("url({q}{}{q})", proxied, q = quote),
            None => caps[0].to_string(),
        }
    });

    css_import_regex()
        .replace_all(&css, |caps: &Captures| {
            let (raw, quote) = quoted_value(caps);
            match route_reference(raw, base, endpoint, relative) {
                Some(proxied) => format!("@import {q}{}{q}", proxied, q = quote),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn quoted_value<'a>(caps: &Captures<'a>) -> (&'a str, &'static str) {
    if let Some(m) = caps.get(1) {
        (m.as_str(), "\"")
    } else if let Some(m) = caps.get(2) {
        (m.as_str(), "'")
    } else {
        (caps.get(3).map_or("", |m| m.as_str()), "")
    }
}
