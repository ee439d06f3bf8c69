//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Resolve a potentially relative href against a base URL.
///
/// Returns `None` for blank hrefs, fragments-only links and anything that does
/// not end up as an `http(s)` URL (`javascript:`, `mailto:`).
pub fn resolve_url(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    base.join(href)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

/// Second-to-last non-empty path segment: `/genre/horror/` gives `genre`.
pub fn parent_path_segment(url: &Url) -> Option<&str> {
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    segments.len().checked_sub(2).map(|i| segments[i])
}
