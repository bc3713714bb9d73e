//! Allow-list check for discovered resource URLs.

use url::Url;

/// Extensions worth downloading, matched as case-insensitive substrings.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".html", ".xml", ".txt",
];

/// Hosts whose URLs are always downloaded: the target site and the archive itself.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &["seedfinder.eu", "web.archive.org"];

/// Decides whether a discovered reference should be fetched.
///
/// Matching is intentionally loose: an extension anywhere in the URL (path,
/// query, even host) qualifies, and a domain matches when it is a substring
/// of the host. `https://x.com/app.json` matches `.js`.
#[derive(Debug, Clone)]
pub struct ResourceFilter {
    extensions: Vec<String>,
    domains: Vec<String>,
}

impl Default for ResourceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_DOMAINS.iter().map(|d| (*d).to_string()))
    }
}

impl ResourceFilter {
    /// Creates a filter with the default extension list and the given domains.
    #[must_use]
    pub fn new(domains: impl IntoIterator<Item = String>) -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect(),
            domains: domains.into_iter().collect(),
        }
    }

    /// Returns the allow-listed domains.
    #[must_use]
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Returns true if `url` should be downloaded.
    #[must_use]
    pub fn should_download(&self, url: &str) -> bool {
        let lowered = url.to_lowercase();
        if self.extensions.iter().any(|ext| lowered.contains(ext.as_str())) {
            return true;
        }

        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_string))
        else {
            return false;
        };
        self.domains.iter().any(|domain| host.contains(domain.as_str()))
    }
}
