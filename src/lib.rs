//! Archive Fetcher Library
//!
//! Retrieves archived captures from a Wayback-style web archive and mirrors
//! them to disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`archive`] - Archive URL construction
//! - [`crawl`] - Resource reference extraction and the download allow-list
//! - [`download`] - Single-attempt HTTP fetching and rate-limit retry
//! - [`coordinator`] - Per-entry orchestration and run-wide de-duplication
//! - [`identity`] - Proxy identity rotation over the Tor control port
//! - [`input`] - Entry list loading
//! - [`persist`] - Snapshot, flat and provenance file writing
//! - [`pipeline`] - Sequential and bounded-concurrent runs

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod coordinator;
pub mod crawl;
pub mod download;
pub mod identity;
pub mod input;
pub mod persist;
pub mod pipeline;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use archive::{ArchiveRequest, build_archive_url};
pub use coordinator::{DEFAULT_ROTATE_EVERY, DownloadCoordinator, EntryError};
pub use download::{
    DEFAULT_MAX_RETRIES, Fetch, FetchError, FetchOutcome, HttpClient, RetryPolicy,
    RetryingFetcher, Transport,
};
pub use input::{Entry, InputError, load_entries, parse_entries};
pub use persist::{OutputLayout, PersistError};
pub use pipeline::{DEFAULT_CONCURRENCY, Pipeline, PipelineError, RunMode, RunStats, RunSummary};
