//! Archive request URLs.

use std::fmt;

/// Public Wayback Machine endpoint.
pub const DEFAULT_ARCHIVE_BASE: &str = "https://web.archive.org";

/// Builds the archive URL serving `original_url` as captured at `timestamp`.
///
/// Both values are substituted verbatim: no escaping and no validation.
/// A malformed timestamp simply produces a request the archive will reject.
///
/// ```
/// use archive_fetcher::archive::build_archive_url;
///
/// assert_eq!(
///     build_archive_url("https://web.archive.org", "http://example.com/", "20200101000000"),
///     "https://web.archive.org/web/20200101000000/http://example.com/"
/// );
/// ```
#[must_use]
pub fn build_archive_url(base: &str, original_url: &str, timestamp: &str) -> String {
    let base = base.trim_end_matches('/');
    format!("{base}/web/{timestamp}/{original_url}")
}

/// One resolved archive request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    /// URL as originally published.
    pub original_url: String,
    /// Capture timestamp (`YYYYMMDDhhmmss` by convention, not enforced).
    pub timestamp: String,
    /// URL actually requested from the archive.
    pub archive_url: String,
}

impl ArchiveRequest {
    /// Builds the request for `original_url` at `timestamp` against `base`.
    #[must_use]
    pub fn new(base: &str, original_url: &str, timestamp: &str) -> Self {
        Self {
            original_url: original_url.to_string(),
            timestamp: timestamp.to_string(),
            archive_url: build_archive_url(base, original_url, timestamp),
        }
    }
}

impl fmt::Display for ArchiveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.original_url, self.timestamp)
    }
}
