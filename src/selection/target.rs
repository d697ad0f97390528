//! Target URL normalization and encoding for provider relay URLs

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Characters left alone by JavaScript's `encodeURIComponent`
const COMPONENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const EMBED_BASE: &str = "https://www.youtube.com/embed/";

/// Percent-encode a full URL so it can travel as a single query value
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT_ENCODE_SET).to_string()
}

/// Trim the input and default the scheme to `https://`
///
/// Returns `None` for blank input.
pub fn normalize_target(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("https://{}", trimmed))
    }
}

/// Map a video watch page onto its embeddable player URL
///
/// Handles `youtube.com/watch?v=ID` (www and mobile hosts) and `youtu.be/ID`,
/// carrying a `t` offset over as `start`.
pub fn embed_video_url(target: &str) -> Option<String> {
    let url = Url::parse(target).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host);

    let id = match host {
        "youtube.com" if url.path() == "/watch" => url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())?,
        "youtu.be" => url.path_segments()?.next()?.to_string(),
        _ => return None,
    };

    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }

    let start = url
        .query_pairs()
        .find(|(k, _)| k == "t")
        .and_then(|(_, v)| parse_offset(&v));

    Some(match start {
        Some(seconds) if seconds > 0 => format!("{}{}?start={}", EMBED_BASE, id, seconds),
        _ => format!("{}{}", EMBED_BASE, id),
    })
}

/// Parse `90`, `90s` or `1h2m3s` style offsets into seconds
fn parse_offset(raw: &str) -> Option<u64> {
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(seconds);
    }

    let mut total = 0u64;
    let mut digits = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits.parse().ok()?;
        digits.clear();
        total += match c {
            'h' => value * 3600,
            'm' => value * 60,
            's' => value,
            _ => return None,
        };
    }

    digits.is_empty().then_some(total)
}
