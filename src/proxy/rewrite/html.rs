//! HTML rewriting for framed documents

use std::sync::OnceLock;

use regex::{Captures, Regex};
use url::Url;

use super::super::endpoint::ProxyEndpoint;
use super::css::rewrite_css_refs;
use super::script::protection_script;
use super::{route_reference, RelativeRefs};
use crate::models::RewriteTarget;

static FRAME_META_REGEX: OnceLock<Regex> = OnceLock::new();
static FRAME_CHECK_REGEX: OnceLock<Regex> = OnceLock::new();
static LOCATION_CALL_REGEX: OnceLock<Regex> = OnceLock::new();
static LOCATION_ASSIGN_REGEX: OnceLock<Regex> = OnceLock::new();
static URL_ATTR_REGEX: OnceLock<Regex> = OnceLock::new();
static STYLE_BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();
static BASE_TAG_REGEX: OnceLock<Regex> = OnceLock::new();
static HEAD_OPEN_REGEX: OnceLock<Regex> = OnceLock::new();
static HEAD_CLOSE_REGEX: OnceLock<Regex> = OnceLock::new();
static HTML_OPEN_REGEX: OnceLock<Regex> = OnceLock::new();
static DOCTYPE_REGEX: OnceLock<Regex> = OnceLock::new();

/// `<meta http-equiv>` or `<meta name>` tags carrying frame or content policies
fn frame_meta_regex() -> &'static Regex {
    FRAME_META_REGEX.get_or_init(|| {
        Regex::new(
            r#"(?i)<meta\b[^>]*\b(?:http-equiv|name)\s*=\s*["']?\s*(?:x-frame-options|content-security-policy(?:-report-only)?)\b[^>]*>"#,
        )
        .unwrap()
    })
}

/// `if (top != self)` and its variations over top/self/parent/window
fn frame_check_regex() -> &'static Regex {
    FRAME_CHECK_REGEX.get_or_init(|| {
        let side = r"(?:(?:window|self)\.)?(?:top|self|parent|window)(?:\.location(?:\.href)?)?";
        Regex::new(&format!(r"(?i)\bif\s*\(\s*{side}\s*!==?\s*{side}\s*\)")).unwrap()
    })
}

/// `top.location.replace(` / `parent.location.assign(` calls
fn location_call_regex() -> &'static Regex {
    LOCATION_CALL_REGEX.get_or_init(|| {
        Regex::new(r"(?i)\b(?:window\.)?(?:top|parent)\.location\.(?:replace|assign)\s*\(").unwrap()
    })
}

/// Assignments to the top or parent location
fn location_assign_regex() -> &'static Regex {
    LOCATION_ASSIGN_REGEX.get_or_init(|| {
        Regex::new(r"(?i)\b((?:window\.)?(?:top|parent)\.location(?:\.href)?)\s*=([^=]|$)").unwrap()
    })
}

/// `href`, `src`, `action` and `srcset` attributes, quoted or not
fn url_attr_regex() -> &'static Regex {
    URL_ATTR_REGEX.get_or_init(|| {
        Regex::new(r#"(?i)\b(href|src|action|srcset)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .unwrap()
    })
}

fn style_block_regex() -> &'static Regex {
    STYLE_BLOCK_REGEX
        .get_or_init(|| Regex::new(r"(?is)(<style\b[^>]*>)(.*?)(</style\s*>)").unwrap())
}

fn base_tag_regex() -> &'static Regex {
    BASE_TAG_REGEX.get_or_init(|| Regex::new(r"(?i)<base\b").unwrap())
}

fn head_open_regex() -> &'static Regex {
    HEAD_OPEN_REGEX.get_or_init(|| Regex::new(r"(?i)<head\b[^>]*>").unwrap())
}

fn head_close_regex() -> &'static Regex {
    HEAD_CLOSE_REGEX.get_or_init(|| Regex::new(r"(?i)</head\s*>").unwrap())
}

fn html_open_regex() -> &'static Regex {
    HTML_OPEN_REGEX.get_or_init(|| Regex::new(r"(?i)<html\b[^>]*>").unwrap())
}

fn doctype_regex() -> &'static Regex {
    DOCTYPE_REGEX.get_or_init(|| Regex::new(r"(?i)^\s*<!doctype\b[^>]*>").unwrap())
}

/// Rewrite an HTML document so it renders inside a frame
///
/// Steps run in a fixed order: frame policy meta tags are removed,
/// frame-busting code is neutralized, URL attributes are routed through the
/// proxy, a `<base>` for the document origin is added, and the protection
/// script is injected at the end of `<head>`.
pub fn rewrite_html(html: &str, target: &RewriteTarget, endpoint: &ProxyEndpoint) -> String {
    let html = strip_frame_meta(html);
    let html = neutralize_frame_busting(&html);
    let html = rewrite_url_attributes(&html, &target.resolved, endpoint);
    let html = insert_base(&html, &target.origin());
    inject_script(&html, &protection_script(endpoint))
}

/// Drop X-Frame-Options and CSP `<meta>` tags
pub fn strip_frame_meta(html: &str) -> String {
    frame_meta_regex().replace_all(html, "").into_owned()
}

/// Disable common frame-busting idioms in inline scripts
pub fn neutralize_frame_busting(html: &str) -> String {
    let html = frame_check_regex().replace_all(html, "if(false)");
    let html = location_call_regex().replace_all(&html, "(function(){})(");
    location_assign_regex()
        .replace_all(&html, "/*${1}=*/${2}")
        .into_owned()
}

/// Route absolute and protocol-relative URL attributes through the proxy
///
/// Relative references are left for the injected `<base>` to resolve. The
/// document's own `<base href>` is kept as written so relative links still
/// resolve against the upstream origin.
pub fn rewrite_url_attributes(html: &str, document: &Url, endpoint: &ProxyEndpoint) -> String {
    let source = html;
    let html = url_attr_regex().replace_all(html, |caps: &Captures| {
        let name = &caps[1];
        if inside_base_tag(source, caps.get(0).map_or(0, |m| m.start())) {
            return caps[0].to_string();
        }

        let (value, quote) = if let Some(m) = caps.get(2) {
            (m.as_str(), "\"")
        } else if let Some(m) = caps.get(3) {
            (m.as_str(), "'")
        } else {
            // Proxied URLs contain no spaces or quotes, so plain double quotes are safe.
            (caps.get(4).map_or("", |m| m.as_str()), "\"")
        };

        let rewritten = if name.eq_ignore_ascii_case("srcset") {
            rewrite_srcset(value, document, endpoint)
        } else {
            route_reference(&decode_amp(value), document, endpoint, RelativeRefs::Keep)
        };

        match rewritten {
            Some(value) => format!("{}={q}{}{q}", name, value, q = quote),
            None => caps[0].to_string(),
        }
    });

    style_block_regex()
        .replace_all(&html, |caps: &Captures| {
            format!(
                "{}{}{}",
                &caps[1],
                rewrite_css_refs(&caps[2], document, endpoint, RelativeRefs::Keep),
                &caps[3]
            )
        })
        .into_owned()
}

/// Rewrite each candidate of a `srcset`; `None` when nothing changed
fn rewrite_srcset(value: &str, document: &Url, endpoint: &ProxyEndpoint) -> Option<String> {
    let mut changed = false;
    let candidates: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|candidate| {
            let (url, descriptor) = match candidate.split_once(char::is_whitespace) {
                Some((url, descriptor)) => (url, Some(descriptor.trim())),
                None => (candidate, None),
            };
            let url = match route_reference(&decode_amp(url), document, endpoint, RelativeRefs::Keep) {
                Some(proxied) => {
                    changed = true;
                    proxied
                }
                None => url.to_string(),
            };
            match descriptor {
                Some(descriptor) if !descriptor.is_empty() => format!("{} {}", url, descriptor),
                _ => url,
            }
        })
        .collect();

    changed.then(|| candidates.join(", "))
}

/// Whether the attribute at `at` belongs to a `<base>` tag
fn inside_base_tag(html: &str, at: usize) -> bool {
    html[..at]
        .rfind('<')
        .and_then(|open| base_tag_regex().find(&html[open..at]))
        .is_some_and(|tag| tag.start() == 0)
}

fn decode_amp(value: &str) -> String {
    value.replace("&amp;", "&")
}

/// Add `<base href="{origin}">` unless the document already has a base
pub fn insert_base(html: &str, origin: &str) -> String {
    if base_tag_regex().is_match(html) {
        return html.to_string();
    }

    let base = format!(r#"<base href="{}">"#, origin);
    if let Some(head) = head_open_regex().find(html) {
        splice(html, head.end(), &base)
    } else if let Some(root) = html_open_regex().find(html) {
        splice(html, root.end(), &format!("<head>{}</head>", base))
    } else if let Some(doctype) = doctype_regex().find(html) {
        splice(html, doctype.end(), &format!("<head>{}</head>", base))
    } else {
        format!("<head>{}</head>{}", base, html)
    }
}

/// Place `script` right before `</head>`
pub fn inject_script(html: &str, script: &str) -> String {
    if let Some(close) = head_close_regex().find(html) {
        splice(html, close.start(), script)
    } else if let Some(head) = head_open_regex().find(html) {
        splice(html, head.end(), script)
    } else {
        format!("{}{}", script, html)
    }
}

fn splice(html: &str, at: usize, insert: &str) -> String {
    let mut out = String::with_capacity(html.len() + insert.len());
    out.push_str(&html[..at]);
    out.push_str(insert);
    out.push_str(&html[at..]);
    out
}
