//! Regex-based discovery of embedded resource references in HTML.
//!
//! Markup is never parsed: three independent patterns run over the raw text,
//! which keeps extraction tolerant of malformed pages (and keeps its false
//! positives, such as `href`s pointing at other pages).

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument, trace};
use url::Url;

/// `src="..."` and `src='...'` attribute values.
#[allow(clippy::expect_used)]
static SRC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"src=['"]([^'"]+)"#).expect("src regex is valid"));

/// `href="..."` and `href='...'` attribute values.
#[allow(clippy::expect_used)]
static HREF_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href=['"]([^'"]+)"#).expect("href regex is valid"));

/// CSS `url(...)` references, quoted or bare.
#[allow(clippy::expect_used)]
static CSS_URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url\(['"]?([^'")]+)"#).expect("css url regex is valid"));

/// A URL scheme prefix such as `http:`, `data:` or `mailto:`.
#[allow(clippy::expect_used)]
static SCHEME_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:").expect("scheme regex is valid")
});

/// A reference that could not be turned into an absolute URL.
#[derive(Debug, Error)]
#[error("cannot resolve reference {reference:?} against {base}: {reason}")]
pub struct ExtractionError {
    /// The raw reference text.
    pub reference: String,
    /// The base URL it was resolved against.
    pub base: String,
    /// Why resolution failed.
    pub reason: String,
}

/// Returns the raw reference strings found in `html`, in pattern order.
///
/// Duplicates are kept, both within and across patterns.
#[must_use]
pub fn find_references(html: &str) -> Vec<&str> {
    [&*SRC_PATTERN, &*HREF_PATTERN, &*CSS_URL_PATTERN]
        .into_iter()
        .flat_map(|pattern| {
            pattern
                .captures_iter(html)
                .filter_map(|captures| captures.get(1).map(|m| m.as_str()))
        })
        .collect()
}

/// Resolves one reference to an absolute URL string.
///
/// - References with a scheme are returned verbatim.
/// - Scheme-relative references (`//host/path`) get an `https:` prefix.
/// - Anything else is joined onto `base_url`.
///
/// # Errors
///
/// Returns [`ExtractionError`] when the base URL is unparseable or the join fails.
pub fn resolve_reference(reference: &str, base_url: &str) -> Result<String, ExtractionError> {
    if reference.starts_with("//") {
        return Ok(format!("https:{reference}"));
    }
    if SCHEME_PREFIX.is_match(reference) {
        return Ok(reference.to_string());
    }

    let error = |reason: String| ExtractionError {
        reference: reference.to_string(),
        base: base_url.to_string(),
        reason,
    };
    let base = Url::parse(base_url).map_err(|e| error(format!("invalid base URL: {e}")))?;
    base.join(reference)
        .map(String::from)
        .map_err(|e| error(e.to_string()))
}

/// Finds every embedded reference in `html` and resolves it against `base_url`.
///
/// Each element is resolved independently; a failure on one reference is
/// returned in place and does not affect the others.
#[instrument(skip(html), fields(html_len = html.len()))]
#[must_use]
pub fn extract_resource_urls(html: &str, base_url: &str) -> Vec<Result<String, ExtractionError>> {
    let references = find_references(html);
    debug!(count = references.len(), "found resource references");

    references
        .into_iter()
        .map(|reference| {
            let resolved = resolve_reference(reference, base_url);
            trace!(reference, ?resolved, "resolved reference");
            resolved
        })
        .collect()
}
