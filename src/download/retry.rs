//! Bounded retry on rate limiting.
//!
//! The policy is deliberately asymmetric: only HTTP 429 is retried, after
//! sleeping for the server's `Retry-After` hint. Every other failure aborts
//! on the first attempt.
//!
//! | Outcome | Action |
//! |---------|--------|
//! | 200 | [`RetryAction::Accept`] |
//! | 429 | [`RetryAction::Backoff`] for `Retry-After` (60s default) |
//! | other status | [`RetryAction::Abort`] |
//! | transport error / timeout | [`RetryAction::Abort`] |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use archive_fetcher::download::{
//!     FetchOptions, HttpClient, RetryPolicy, RetryingFetcher, Transport,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(HttpClient::new(Transport::Direct)?);
//! let fetcher = RetryingFetcher::new(client, RetryPolicy::default());
//! let page = fetcher
//!     .fetch("https://web.archive.org/web/2020/http://example.com/", &FetchOptions::page())
//!     .await?;
//! println!("{} bytes", page.body.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::client::{Fetch, FetchOptions, FetchOutcome, FetchResult};
use super::error::FetchError;

/// Default number of rate-limit backoff cycles before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// What the retry loop does with one attempt's outcome.
#[derive(Debug)]
pub enum RetryAction {
    /// Return the response to the caller.
    Accept(FetchResult),
    /// Sleep for the given duration, then try again.
    Backoff(Duration),
    /// Return the failure to the caller without retrying.
    Abort(FetchError),
}

/// Retry configuration: how many rate-limit cycles are tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` backoff cycles (minimum 1).
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.max(1),
        }
    }

    /// Returns the configured number of backoff cycles.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Maps one attempt's outcome to the action the retry loop takes.
    #[must_use]
    pub fn decide(&self, outcome: FetchOutcome) -> RetryAction {
        match outcome {
            FetchOutcome::Success(result) => RetryAction::Accept(result),
            FetchOutcome::RateLimited { retry_after } => RetryAction::Backoff(retry_after),
            FetchOutcome::Failed(error) => RetryAction::Abort(error),
        }
    }
}

/// Wraps a [`Fetch`] implementation with the rate-limit retry policy.
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    fetcher: Arc<dyn Fetch>,
    policy: RetryPolicy,
    backoffs: Arc<AtomicUsize>,
}

impl RetryingFetcher {
    /// Creates a retrying fetcher around `fetcher`.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetch>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            policy,
            backoffs: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the retry policy in use.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns the underlying single-attempt fetcher.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Fetch> {
        &self.fetcher
    }

    /// Total number of backoff sleeps performed by this fetcher (and its clones).
    #[must_use]
    pub fn backoff_count(&self) -> usize {
        self.backoffs.load(Ordering::SeqCst)
    }

    /// Fetches `url`, sleeping and retrying while the server answers 429.
    ///
    /// # Errors
    ///
    /// Returns the first non-429 failure unchanged, or
    /// [`FetchError::RateLimitExhausted`] after `max_retries` backoff cycles.
    #[instrument(skip(self, options), fields(url = %url, max_retries = self.policy.max_retries))]
    pub async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
    ) -> Result<FetchResult, FetchError> {
        let mut cycles = 0u32;

        while cycles < self.policy.max_retries {
            let outcome = self.fetcher.fetch(url, options).await;
            match self.policy.decide(outcome) {
                RetryAction::Accept(result) => return Ok(result),
                RetryAction::Backoff(delay) => {
                    cycles += 1;
                    info!(
                        url = %url,
                        cycle = cycles,
                        max_retries = self.policy.max_retries,
                        delay_secs = delay.as_secs(),
                        "rate limited, backing off"
                    );
                    self.backoffs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                }
                RetryAction::Abort(error) => {
                    debug!(url = %url, error = %error, "not retrying");
                    return Err(error);
                }
            }
        }

        warn!(url = %url, cycles, "rate limit persisted, giving up");
        Err(FetchError::rate_limit_exhausted(url, cycles))
    }
}
