//! HTTP fetching of archived snapshots.
//!
//! This module provides the single-attempt [`HttpClient`] (behind the
//! [`Fetch`] trait) and the [`RetryingFetcher`] that applies the
//! retry-only-on-429 policy on top of it.
//!
//! # Features
//!
//! - Direct or proxied transport (SOCKS via `socks5h://` URLs)
//! - Per-request timeouts (60s pages, 30s resources)
//! - `Retry-After` support, both delta-seconds and HTTP-date
//! - Explicit [`RetryPolicy`] table mapping outcomes to actions
//!
//! # Example
//!
//! ```no_run
//! use archive_fetcher::download::{Fetch, FetchOptions, FetchOutcome, HttpClient, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(Transport::Direct)?;
//! match client.fetch("https://web.archive.org/web/2020/http://example.com/", &FetchOptions::page()).await {
//!     FetchOutcome::Success(page) => println!("{} bytes", page.body.len()),
//!     FetchOutcome::RateLimited { retry_after } => println!("wait {retry_after:?}"),
//!     FetchOutcome::Failed(error) => println!("failed: {error}"),
//! }
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
mod retry;
mod retry_after;

pub use client::{
    DEFAULT_PROXY_URL, Fetch, FetchOptions, FetchOutcome, FetchResult, HttpClient, Transport,
};
pub use error::FetchError;
pub use retry::{DEFAULT_MAX_RETRIES, RetryAction, RetryPolicy, RetryingFetcher};
pub use retry_after::{parse_retry_after, retry_after_delay};
