//! Per-entry orchestration: page fetch, resource fan-out, persistence and
//! identity rotation.
//!
//! One [`DownloadCoordinator`] lives for one run and is shared by every
//! worker. It owns the run-scoped dedup set, so a resource URL discovered by
//! several pages is fetched at most once.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashSet;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::archive::{ArchiveRequest, DEFAULT_ARCHIVE_BASE, build_archive_url};
use crate::crawl::{ResourceFilter, extract_resource_urls};
use crate::download::{FetchError, FetchOptions, FetchOutcome, RetryingFetcher};
use crate::identity::{IdentityRotator, NoRotation};
use crate::input::Entry;
use crate::persist::{
    OutputLayout, PersistError, Provenance, flat_file_name, save_flat, save_snapshot,
    write_provenance,
};

/// Basename used for pages whose URL path ends in `/`.
const PAGE_PLACEHOLDER: &str = "index";
/// Basename used for resources whose URL path ends in `/`.
const RESOURCE_PLACEHOLDER: &str = "resource";

/// Default number of successful pages between identity rotations.
pub const DEFAULT_ROTATE_EVERY: u32 = 1;

/// Why one entry could not be saved.
#[derive(Debug, Error)]
pub enum EntryError {
    /// The page fetch failed (after retries where they apply).
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The page was fetched but could not be written.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Orchestrates downloads for a whole run.
#[derive(Debug)]
pub struct DownloadCoordinator {
    fetcher: RetryingFetcher,
    archive_base: String,
    filter: ResourceFilter,
    layout: OutputLayout,
    rotator: Arc<dyn IdentityRotator>,
    rotate_every: u32,
    downloaded: DashSet<String>,
    pages_saved: AtomicUsize,
    resources_saved: AtomicUsize,
    resources_failed: AtomicUsize,
}

impl DownloadCoordinator {
    /// Creates a coordinator with the default archive, filter and no rotation.
    #[must_use]
    pub fn new(fetcher: RetryingFetcher, layout: OutputLayout) -> Self {
        Self {
            fetcher,
            archive_base: DEFAULT_ARCHIVE_BASE.to_string(),
            filter: ResourceFilter::default(),
            layout,
            rotator: Arc::new(NoRotation),
            rotate_every: DEFAULT_ROTATE_EVERY,
            downloaded: DashSet::new(),
            pages_saved: AtomicUsize::new(0),
            resources_saved: AtomicUsize::new(0),
            resources_failed: AtomicUsize::new(0),
        }
    }

    /// Points archive URLs at `base` instead of the public archive.
    #[must_use]
    pub fn with_archive_base(mut self, base: impl Into<String>) -> Self {
        self.archive_base = base.into();
        self
    }

    /// Replaces the resource allow-list.
    #[must_use]
    pub fn with_filter(mut self, filter: ResourceFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Rotates identity through `rotator` after every `rotate_every`-th
    /// successful page. `rotate_every == 0` disables rotation.
    #[must_use]
    pub fn with_rotator(mut self, rotator: Arc<dyn IdentityRotator>, rotate_every: u32) -> Self {
        self.rotator = rotator;
        self.rotate_every = rotate_every;
        self
    }

    /// The output layout in use.
    #[must_use]
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// The retrying fetcher in use.
    #[must_use]
    pub fn fetcher(&self) -> &RetryingFetcher {
        &self.fetcher
    }

    /// Number of resources written during this run.
    #[must_use]
    pub fn resources_saved(&self) -> usize {
        self.resources_saved.load(Ordering::SeqCst)
    }

    /// Number of claimed resources that could not be fetched or written.
    #[must_use]
    pub fn resources_failed(&self) -> usize {
        self.resources_failed.load(Ordering::SeqCst)
    }

    /// Atomically marks `url` as downloaded. Returns `false` if another
    /// worker claimed it first. Claims are never released.
    pub fn claim(&self, url: &str) -> bool {
        self.downloaded.insert(url.to_string())
    }

    /// Number of resource URLs claimed so far.
    #[must_use]
    pub fn claimed_count(&self) -> usize {
        self.downloaded.len()
    }

    /// Concurrent-mode download of one page with its embedded resources.
    ///
    /// Resource failures are logged and skipped. The page body is written to
    /// `downloads/`, a provenance sidecar to `downloads/metadata/`, and the
    /// identity is rotated on schedule.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::Fetch`] when the page cannot be fetched and
    /// [`EntryError::Persist`] when it cannot be written.
    #[instrument(skip(self, entry), fields(index = entry.index, url = %entry.original_url))]
    pub async fn download_full_page(&self, entry: &Entry) -> Result<PathBuf, EntryError> {
        let request = ArchiveRequest::new(&self.archive_base, &entry.original_url, &entry.timestamp);
        let page = self
            .fetcher
            .fetch(&request.archive_url, &FetchOptions::page())
            .await?;

        self.download_resources(&page.text(), entry).await;

        let file_name = flat_file_name(&entry.timestamp, &entry.original_url, PAGE_PLACEHOLDER);
        let path = save_flat(&self.layout.downloads_dir(), &file_name, &page.body).await?;
        let provenance = Provenance::new(
            &entry.original_url,
            &request.archive_url,
            &entry.timestamp,
            &path,
        );
        write_provenance(&self.layout.metadata_dir(), &file_name, &provenance).await?;
        info!(path = %path.display(), bytes = page.body.len(), "page saved");

        self.after_page_saved().await;
        Ok(path)
    }

    /// Sequential-mode download of one snapshot, stored by declared content type.
    ///
    /// # Errors
    ///
    /// Returns [`EntryError::Fetch`] when the snapshot cannot be fetched and
    /// [`EntryError::Persist`] when it cannot be written.
    #[instrument(skip(self, entry), fields(index = entry.index, url = %entry.original_url))]
    pub async fn download_snapshot(&self, entry: &Entry) -> Result<PathBuf, EntryError> {
        let request = ArchiveRequest::new(&self.archive_base, &entry.original_url, &entry.timestamp);
        let snapshot = self
            .fetcher
            .fetch(&request.archive_url, &FetchOptions::snapshot())
            .await?;

        let path = save_snapshot(
            &self.layout.snapshot_root(),
            &entry.original_url,
            &entry.content_type,
            &snapshot.body,
        )
        .await?;
        info!(path = %path.display(), content_type = %entry.content_type, "snapshot saved");
        Ok(path)
    }

    /// Fetches one embedded resource if it is allow-listed and unclaimed.
    ///
    /// Single attempt, no retry. Returns the saved path, or `None` when the
    /// resource was skipped or failed.
    pub async fn download_resource(&self, url: &str, timestamp: &str) -> Option<PathBuf> {
        if !self.filter.should_download(url) {
            return None;
        }
        if !self.claim(url) {
            debug!(url = %url, "resource already claimed");
            return None;
        }

        let archive_url = build_archive_url(&self.archive_base, url, timestamp);
        let result = match self
            .fetcher
            .inner()
            .fetch(&archive_url, &FetchOptions::resource())
            .await
        {
            FetchOutcome::Success(result) => result,
            FetchOutcome::RateLimited { retry_after } => {
                warn!(
                    url = %url,
                    retry_after_secs = retry_after.as_secs(),
                    "resource rate limited, skipping"
                );
                self.resources_failed.fetch_add(1, Ordering::SeqCst);
                return None;
            }
            FetchOutcome::Failed(error) => {
                warn!(url = %url, error = %error, "resource download failed");
                self.resources_failed.fetch_add(1, Ordering::SeqCst);
                return None;
            }
        };

        let file_name = flat_file_name(timestamp, url, RESOURCE_PLACEHOLDER);
        match save_flat(&self.layout.resources_dir(), &file_name, &result.body).await {
            Ok(path) => {
                info!(url = %url, file = %file_name, "resource saved");
                self.resources_saved.fetch_add(1, Ordering::SeqCst);
                Some(path)
            }
            Err(error) => {
                warn!(url = %url, error = %error, "resource could not be written");
                self.resources_failed.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    async fn download_resources(&self, html: &str, entry: &Entry) {
        for resolved in extract_resource_urls(html, &entry.original_url) {
            match resolved {
                Ok(url) => {
                    self.download_resource(&url, &entry.timestamp).await;
                }
                Err(error) => warn!(error = %error, "skipping unresolvable reference"),
            }
        }
    }

    async fn after_page_saved(&self) {
        let saved = self.pages_saved.fetch_add(1, Ordering::SeqCst) + 1;
        if self.rotate_every == 0 {
            return;
        }
        if saved % self.rotate_every as usize == 0 {
            self.rotator.rotate().await;
        }
    }
}
