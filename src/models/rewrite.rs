use url::Url;

/// Content-type assumed when upstream omits one
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// Rewrite pipeline selected for an upstream response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Css,
    OtherText,
    Binary,
}

impl ContentKind {
    /// Classify a `content-type` header value
    pub fn from_content_type(content_type: &str) -> Self {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if is_binary_mime(&mime) {
            ContentKind::Binary
        } else if mime == "text/html" || mime == "application/xhtml+xml" {
            ContentKind::Html
        } else if mime == "text/css" {
            ContentKind::Css
        } else {
            ContentKind::OtherText
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Html => "html-rewrite",
            ContentKind::Css => "css-rewrite",
            ContentKind::OtherText => "text-passthrough",
            ContentKind::Binary => "binary-passthrough",
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, ContentKind::Binary)
    }
}

fn is_binary_mime(mime: &str) -> bool {
    const PREFIXES: &[&str] = &["image/", "video/", "audio/", "font/"];
    const EXACT: &[&str] = &[
        "application/octet-stream",
        "application/pdf",
        "application/zip",
        "application/x-zip-compressed",
        "application/vnd.ms-fontobject",
        "application/wasm",
        "application/gzip",
        "application/x-gzip",
        "application/x-tar",
        "application/x-7z-compressed",
        "application/x-rar-compressed",
        "application/vnd.rar",
    ];

    PREFIXES.iter().any(|p| mime.starts_with(p))
        || EXACT.contains(&mime)
        || mime.starts_with("application/font-")
        || mime.starts_with("application/x-font-")
}

/// Per-request description of what was fetched
#[derive(Debug, Clone)]
pub struct RewriteTarget {
    /// URL the client asked for
    pub requested: Url,
    /// URL the response was actually served from (after redirects)
    pub resolved: Url,
    pub content_type: String,
    pub kind: ContentKind,
}

impl RewriteTarget {
    pub fn new(requested: Url, resolved: Url, content_type: Option<&str>) -> Self {
        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let kind = ContentKind::from_content_type(&content_type);

        Self {
            requested,
            resolved,
            content_type,
            kind,
        }
    }

    /// `scheme://host[:port]` of the served document
    pub fn origin(&self) -> String {
        self.resolved.origin().ascii_serialization()
    }
}
