//! Constants for the fetch layer (timeouts, backoff defaults).

use std::time::Duration;

/// Connect timeout applied to every client (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Per-request timeout for full page fetches.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-request timeout for embedded resource fetches.
pub const RESOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Backoff used when a 429 carries no usable Retry-After header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
