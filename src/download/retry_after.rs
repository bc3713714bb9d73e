//! `Retry-After` header parsing.
//!
//! The server's hint is honored as given. A missing or unreadable hint
//! falls back to [`DEFAULT_RETRY_AFTER`].

use std::time::{Duration, SystemTime};

use tracing::debug;

use super::constants::DEFAULT_RETRY_AFTER;

/// Reads a `Retry-After` value: delta-seconds or an HTTP-date.
///
/// A date in the past means "retry now". Anything else (negative numbers,
/// fractions, free text) is `None`.
///
/// ```
/// use std::time::Duration;
/// use archive_fetcher::download::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("7200"), Some(Duration::from_secs(7200)));
/// assert_eq!(parse_retry_after("soon"), None);
/// ```
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value.parse().ok().map(Duration::from_secs);
    }
    let until = httpdate::parse_http_date(value).ok()?;
    Some(
        until
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO),
    )
}

/// Delay to wait after a 429 carrying `header` (if any).
#[must_use]
pub fn retry_after_delay(header: Option<&str>) -> Duration {
    match header.and_then(parse_retry_after) {
        Some(delay) => delay,
        None => {
            debug!(
                header,
                default_secs = DEFAULT_RETRY_AFTER.as_secs(),
                "no usable Retry-After, using default"
            );
            DEFAULT_RETRY_AFTER
        }
    }
}
