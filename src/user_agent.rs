//! User-Agent and header presets for archive requests.

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/archive-fetcher";

/// Browser-like User-Agent sent with full page fetches through the proxy.
pub const PAGE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

/// Minimal User-Agent sent with embedded resource fetches.
pub const RESOURCE_USER_AGENT: &str = "Mozilla/5.0";

/// Accept header sent with full page fetches.
pub const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Default client User-Agent (identifies the tool) used when a request sets none.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("archive-fetcher/{version} (+{PROJECT_UA_URL})")
}

/// Headers for a full page fetch.
#[must_use]
pub fn page_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(PAGE_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static(PAGE_ACCEPT));
    headers
}

/// Headers for an embedded resource fetch.
#[must_use]
pub fn resource_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(RESOURCE_USER_AGENT));
    headers
}
