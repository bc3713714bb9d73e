//! Runs a whole entry list through the coordinator.
//!
//! Sequential mode awaits entries one at a time in input order. Concurrent
//! mode uses a semaphore-bounded pool of spawned tasks; completion order is
//! unspecified. In both modes a failed entry is logged and counted, never
//! propagated.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use archive_fetcher::download::{HttpClient, RetryPolicy, RetryingFetcher, Transport};
//! use archive_fetcher::{DownloadCoordinator, OutputLayout, Pipeline, RunMode, load_entries};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(HttpClient::new(Transport::Direct)?);
//! let fetcher = RetryingFetcher::new(client, RetryPolicy::default());
//! let coordinator = Arc::new(DownloadCoordinator::new(fetcher, OutputLayout::new(".")));
//! let pipeline = Pipeline::new(coordinator, RunMode::Sequential, 1)?;
//! let entries = load_entries("metadata.json".as_ref()).await?;
//! let summary = pipeline.run(entries).await?;
//! println!("{} saved, {} failed", summary.completed, summary.failed);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::coordinator::DownloadCoordinator;
use crate::input::Entry;
use crate::persist::PersistError;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
const MAX_CONCURRENCY: usize = 100;

/// Default worker count in concurrent mode.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// How entries are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// One entry at a time, saved as a content-typed snapshot.
    Sequential,
    /// Bounded worker pool with resource crawl and provenance sidecars.
    #[default]
    Concurrent,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::Concurrent => write!(f, "concurrent"),
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            other => Err(format!(
                "unknown mode '{other}' (expected 'sequential' or 'concurrent')"
            )),
        }
    }
}

/// Errors that stop a run before or while scheduling entries.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Output directories could not be created.
    #[error("cannot prepare output directories: {0}")]
    Prepare(#[from] PersistError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Live counters for a run, safe to read from another task.
#[derive(Debug, Default)]
pub struct RunStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

impl RunStats {
    /// Creates a stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries saved so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Entries that failed so far.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Entries finished so far (completed + failed).
    #[must_use]
    pub fn done(&self) -> usize {
        self.completed() + self.failed()
    }

    fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Final counts for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Entries in the input list.
    pub total: usize,
    /// Entries saved.
    pub completed: usize,
    /// Entries that failed.
    pub failed: usize,
    /// Embedded resources saved.
    pub resources_saved: usize,
    /// Embedded resources that failed.
    pub resources_failed: usize,
    /// Rate-limit backoff sleeps taken.
    pub backoffs: usize,
}

/// Drives a list of entries through a [`DownloadCoordinator`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    coordinator: Arc<DownloadCoordinator>,
    mode: RunMode,
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    stats: Arc<RunStats>,
}

impl Pipeline {
    /// Creates a pipeline. `concurrency` is validated in both modes but only
    /// used by [`RunMode::Concurrent`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConcurrency`] when `concurrency` is
    /// outside `1..=100`.
    pub fn new(
        coordinator: Arc<DownloadCoordinator>,
        mode: RunMode,
        concurrency: usize,
    ) -> Result<Self, PipelineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(PipelineError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            coordinator,
            mode,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            stats: Arc::new(RunStats::new()),
        })
    }

    /// The run mode.
    #[must_use]
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// The configured worker count.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Live counters, for progress reporting.
    #[must_use]
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Processes every entry and returns the final counts.
    ///
    /// Individual entry failures do NOT cause this method to error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Prepare`] when the concurrent-mode output
    /// directories cannot be created, or [`PipelineError::SemaphoreClosed`].
    #[instrument(skip(self, entries), fields(mode = %self.mode, entries = entries.len()))]
    pub async fn run(&self, entries: Vec<Entry>) -> Result<RunSummary, PipelineError> {
        let total = entries.len();
        info!(total, concurrency = self.concurrency, "starting run");

        match self.mode {
            RunMode::Sequential => self.run_sequential(entries).await,
            RunMode::Concurrent => self.run_concurrent(entries).await?,
        }

        let summary = RunSummary {
            total,
            completed: self.stats.completed(),
            failed: self.stats.failed(),
            resources_saved: self.coordinator.resources_saved(),
            resources_failed: self.coordinator.resources_failed(),
            backoffs: self.coordinator.fetcher().backoff_count(),
        };
        info!(
            total,
            completed = summary.completed,
            failed = summary.failed,
            resources_saved = summary.resources_saved,
            resources_failed = summary.resources_failed,
            backoffs = summary.backoffs,
            "run complete"
        );
        Ok(summary)
    }

    async fn run_sequential(&self, entries: Vec<Entry>) {
        for entry in entries {
            info!(
                index = entry.index,
                url = %entry.original_url,
                timestamp = %entry.timestamp,
                content_type = %entry.content_type,
                "processing entry"
            );
            let result = self.coordinator.download_snapshot(&entry).await;
            record_outcome(&self.stats, &entry, result);
        }
    }

    async fn run_concurrent(&self, entries: Vec<Entry>) -> Result<(), PipelineError> {
        self.coordinator.layout().prepare().await?;
        let mut handles = Vec::with_capacity(entries.len());

        for entry in entries {
            // Blocks while `concurrency` entries are in flight.
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::SemaphoreClosed)?;

            let coordinator = Arc::clone(&self.coordinator);
            let stats = Arc::clone(&self.stats);

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                debug!(index = entry.index, url = %entry.original_url, "worker picked entry");
                let result = coordinator.download_full_page(&entry).await;
                record_outcome(&stats, &entry, result);
            }));
        }

        debug!(task_count = handles.len(), "waiting for workers to finish");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked");
                self.stats.increment_failed();
            }
        }
        Ok(())
    }
}

fn record_outcome<E: fmt::Display>(
    stats: &RunStats,
    entry: &Entry,
    result: Result<std::path::PathBuf, E>,
) {
    match result {
        Ok(path) => {
            info!(index = entry.index, path = %path.display(), "entry saved");
            stats.increment_completed();
        }
        Err(e) => {
            warn!(
                index = entry.index,
                url = %entry.original_url,
                error = %e,
                "entry failed, skipping"
            );
            stats.increment_failed();
        }
    }
}
