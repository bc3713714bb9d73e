//! Error types for the fetch layer.
//!
//! Every variant carries the URL that failed so log lines stay actionable
//! without the caller re-attaching context.

use thiserror::Error;

/// Errors that can occur while fetching a single archived resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure (DNS, connection refused, proxy unreachable, TLS).
    #[error("transport error fetching {url}: {source}")]
    Transport {
        /// The URL that failed.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete within its timeout.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The server answered with a status other than 200 or 429.
    #[error("HTTP {status} fetching {url}")]
    UnexpectedStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server kept answering 429 until the retry budget ran out.
    #[error("rate limited fetching {url}: gave up after {attempts} backoff cycles")]
    RateLimitExhausted {
        /// The URL that stayed rate limited.
        url: String,
        /// Number of backoff cycles performed.
        attempts: u32,
    },

    /// The request URL could not be built into a request.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },
}

impl FetchError {
    /// Creates a transport error, promoting client timeouts to [`FetchError::Timeout`].
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else if source.is_builder() {
            Self::InvalidUrl { url }
        } else {
            Self::Transport { url, source }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an unexpected-status error.
    pub fn unexpected_status(url: impl Into<String>, status: u16) -> Self {
        Self::UnexpectedStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a rate-limit-exhausted error.
    pub fn rate_limit_exhausted(url: impl Into<String>, attempts: u32) -> Self {
        Self::RateLimitExhausted {
            url: url.into(),
            attempts,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::RateLimitExhausted { .. } => Some(429),
            _ => None,
        }
    }
}
