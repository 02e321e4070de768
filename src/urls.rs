//! Link normalisation and deduplication keys.
//!
//! [`normalize_link`] turns an `href` found on a page into an absolute URL on
//! the outlet's domain, or explains why the link was refused. It is a pure
//! function; the crawler decides what to do with the result.

use crate::errors::LinkRejection;
use crate::models::{Outlet, bare_host};
use url::Url;

/// Query parameters that only identify the referrer and never change content.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "share",
];

/// Extensions of resources that are never HTML pages.
const NON_HTML_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "ico", "pdf", "zip", "gz", "mp4", "mp3", "avi",
    "mov", "css", "js", "xml", "rss", "json", "woff", "woff2",
];

/// Resolve `raw` against the page it was found on and normalise it.
///
/// The result has no fragment, a lower-cased scheme and host, and no tracking
/// query parameters.
pub fn normalize_link(raw: &str, base: &Url, outlet: &Outlet) -> Result<Url, LinkRejection> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(LinkRejection::Malformed);
    }

    let mut url = base.join(raw).map_err(|_| LinkRejection::Malformed)?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(LinkRejection::UnsupportedScheme(other.to_string())),
    }

    let host = url.host_str().ok_or(LinkRejection::Malformed)?.to_string();
    if !outlet.owns_host(&host) {
        return Err(LinkRejection::OffDomain(host));
    }

    if is_non_html(&url) {
        return Err(LinkRejection::NonHtml);
    }

    url.set_fragment(None);
    strip_tracking_params(&mut url);
    Ok(url)
}

/// Key under which a URL is deduplicated within one crawl.
///
/// `http` and `https` variants of the same host and path share a key, as do
/// `www.` and bare hosts and paths differing only by a trailing slash.
pub fn dedup_key(url: &Url) -> String {
    let host = url.host_str().map(bare_host).unwrap_or_default();
    let mut key = host;
    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }

    let path = url.path();
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        "/"
    };
    key.push_str(path);

    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        key.push('?');
        key.push_str(query);
    }
    key
}

fn is_non_html(url: &Url) -> bool {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    match last.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => {
            let ext = ext.to_ascii_lowercase();
            NON_HTML_EXTENSIONS.contains(&ext.as_str())
        }
        _ => false,
    }
}

fn strip_tracking_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}
