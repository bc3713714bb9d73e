//! Single-attempt HTTP fetching through a direct or proxied transport.
//!
//! [`HttpClient`] issues exactly one GET per call and classifies the response
//! into a [`FetchOutcome`]. Retrying is the job of
//! [`RetryingFetcher`](super::RetryingFetcher).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, Proxy};
use tracing::{debug, info, instrument, warn};

use super::constants::{CONNECT_TIMEOUT_SECS, PAGE_TIMEOUT, RESOURCE_TIMEOUT};
use super::error::FetchError;
use super::retry_after::retry_after_delay;
use crate::user_agent;

/// Default SOCKS endpoint of a local Tor daemon (`socks5h` resolves DNS through the proxy).
pub const DEFAULT_PROXY_URL: &str = "socks5h://127.0.0.1:9050";

/// How requests leave the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Connect straight to the archive, ignoring system proxy settings.
    Direct,
    /// Route every request through the given proxy URL.
    Proxy(String),
}

impl Transport {
    /// Returns true when requests go through a proxy.
    #[must_use]
    pub fn is_proxied(&self) -> bool {
        matches!(self, Self::Proxy(_))
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Proxy(url) => write!(f, "proxy {url}"),
        }
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Whole-request timeout. `None` falls back to the client default.
    pub timeout: Option<Duration>,
    /// Extra headers sent with the request.
    pub headers: HeaderMap,
}

impl FetchOptions {
    /// Options for a full page fetch: browser headers, 60 second timeout.
    #[must_use]
    pub fn page() -> Self {
        Self {
            timeout: Some(PAGE_TIMEOUT),
            headers: user_agent::page_headers(),
        }
    }

    /// Options for an embedded resource fetch: minimal headers, 30 second timeout.
    #[must_use]
    pub fn resource() -> Self {
        Self {
            timeout: Some(RESOURCE_TIMEOUT),
            headers: user_agent::resource_headers(),
        }
    }

    /// Options for a sequential-mode snapshot fetch: client default headers, 60 second timeout.
    #[must_use]
    pub fn snapshot() -> Self {
        Self {
            timeout: Some(PAGE_TIMEOUT),
            headers: HeaderMap::new(),
        }
    }
}

/// A successful (HTTP 200) response with its body fully read.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// HTTP status code (always 200).
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
    /// The `Content-Type` header, when present and valid UTF-8.
    pub content_type: Option<String>,
}

impl FetchResult {
    /// Returns the body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Classification of one fetch attempt.
#[derive(Debug)]
pub enum FetchOutcome {
    /// HTTP 200.
    Success(FetchResult),
    /// HTTP 429, with the server's backoff hint (60 seconds when absent).
    RateLimited {
        /// How long the server asked us to wait.
        retry_after: Duration,
    },
    /// Any other status, or a transport failure.
    Failed(FetchError),
}

/// A single-attempt fetcher.
///
/// The trait seam lets the retry loop and the coordinator run against
/// scripted fetchers in tests.
#[async_trait]
pub trait Fetch: Send + Sync + fmt::Debug {
    /// Performs one GET and classifies the response. Never retries.
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchOutcome;
}

/// HTTP client bound to one [`Transport`].
///
/// Created once and shared by all workers to reuse pooled connections.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    transport: Transport,
}

impl HttpClient {
    /// Builds a client for the given transport.
    ///
    /// # Errors
    ///
    /// Returns the client builder error when the proxy URL is invalid or the
    /// TLS backend cannot be initialized.
    #[instrument(level = "debug")]
    pub fn new(transport: Transport) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .gzip(true)
            .user_agent(user_agent::default_user_agent());
        builder = match &transport {
            Transport::Direct => builder.no_proxy(),
            Transport::Proxy(url) => builder.proxy(Proxy::all(url.as_str())?),
        };
        let client = builder.build()?;
        debug!(%transport, "HTTP client ready");
        Ok(Self { client, transport })
    }

    /// Returns the transport this client routes through.
    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}

#[async_trait]
impl Fetch for HttpClient {
    #[instrument(skip(self, options), fields(url = %url))]
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchOutcome {
        let mut request = self.client.get(url).headers(options.headers.clone());
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => {
                let error = FetchError::transport(url, source);
                warn!(url = %url, error = %error, "fetch attempt failed");
                return FetchOutcome::Failed(error);
            }
        };

        let status = response.status().as_u16();
        match status {
            429 => {
                let retry_after = retry_after_delay(
                    response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|value| value.to_str().ok()),
                );
                // The caller decides what a 429 means and logs it.
                debug!(
                    url = %url,
                    status,
                    retry_after_secs = retry_after.as_secs(),
                    "fetch attempt rate limited"
                );
                FetchOutcome::RateLimited { retry_after }
            }
            200 => {
                let headers = response.headers().clone();
                let content_type = headers
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                match response.bytes().await {
                    Ok(body) => {
                        info!(url = %url, status, bytes = body.len(), "fetch attempt succeeded");
                        FetchOutcome::Success(FetchResult {
                            status,
                            headers,
                            body: body.to_vec(),
                            content_type,
                        })
                    }
                    Err(source) => {
                        let error = FetchError::transport(url, source);
                        warn!(url = %url, error = %error, "fetch attempt failed reading body");
                        FetchOutcome::Failed(error)
                    }
                }
            }
            _ => {
                warn!(url = %url, status, "fetch attempt returned unexpected status");
                FetchOutcome::Failed(FetchError::unexpected_status(url, status))
            }
        }
    }
}
