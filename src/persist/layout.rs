//! Directory layout and file naming for saved captures.

use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;

use super::PersistError;

/// Root of the sequential-mode snapshot tree.
const SNAPSHOT_DIR: &str = "downloaded_data";
/// Root of the concurrent-mode flat layout.
const DOWNLOADS_DIR: &str = "downloads";
const RESOURCES_DIR: &str = "resources";
const METADATA_DIR: &str = "metadata";

/// Output directories derived from a single root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Creates a layout rooted at `root`. Nothing is created on disk.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The configured output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/downloaded_data`
    #[must_use]
    pub fn snapshot_root(&self) -> PathBuf {
        self.root.join(SNAPSHOT_DIR)
    }

    /// `<root>/downloads`
    #[must_use]
    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join(DOWNLOADS_DIR)
    }

    /// `<root>/downloads/resources`
    #[must_use]
    pub fn resources_dir(&self) -> PathBuf {
        self.downloads_dir().join(RESOURCES_DIR)
    }

    /// `<root>/downloads/metadata`
    #[must_use]
    pub fn metadata_dir(&self) -> PathBuf {
        self.downloads_dir().join(METADATA_DIR)
    }

    /// Creates the flat-layout directories used in concurrent mode.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Io`] naming the directory that could not be created.
    pub async fn prepare(&self) -> Result<(), PersistError> {
        for dir in [self.resources_dir(), self.metadata_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| PersistError::io(&dir, e))?;
        }
        debug!(root = %self.root.display(), "output directories ready");
        Ok(())
    }
}

/// How a snapshot body is stored, chosen from its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// `text/html*` → `index.html`
    Html,
    /// `application/json*` → `data.json`
    Json,
    /// `image/<subtype>` → `image.<subtype>`
    Image(String),
    /// Anything else → `content.txt`
    Raw,
}

impl SnapshotFormat {
    /// Classifies a declared content type. Matching is by prefix, so
    /// `text/html; charset=utf-8` is still HTML.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        let content_type = content_type.trim();
        if content_type.starts_with("text/html") {
            return Self::Html;
        }
        if content_type.starts_with("application/json") {
            return Self::Json;
        }
        if let Some(subtype) = content_type.strip_prefix("image/") {
            let subtype = subtype.split(';').next().unwrap_or_default().trim();
            if !subtype.is_empty() {
                return Self::Image(subtype.to_string());
            }
        }
        Self::Raw
    }

    /// File name used inside the snapshot directory.
    #[must_use]
    pub fn file_name(&self) -> String {
        match self {
            Self::Html => "index.html".to_string(),
            Self::Json => "data.json".to_string(),
            Self::Image(subtype) => format!("image.{subtype}"),
            Self::Raw => "content.txt".to_string(),
        }
    }
}

/// Directory for a snapshot: `root/<host[:port]>/<path trimmed of '/'>`.
///
/// # Errors
///
/// Returns [`PersistError::MissingHost`] when the URL does not parse or has no host.
pub fn snapshot_dir(root: &Path, original_url: &str) -> Result<PathBuf, PersistError> {
    let parsed = Url::parse(original_url).map_err(|_| PersistError::missing_host(original_url))?;
    let Some(host) = parsed.host_str() else {
        return Err(PersistError::missing_host(original_url));
    };
    let netloc = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let mut dir = root.join(netloc);
    let path = parsed.path().trim_matches('/');
    if !path.is_empty() {
        dir.push(path);
    }
    Ok(dir)
}

/// File name for the flat layout: `<timestamp>_<basename>`.
///
/// The basename is the last segment of the URL path; `placeholder` is used
/// when the path ends in `/` or the URL does not parse.
#[must_use]
pub fn flat_file_name(timestamp: &str, url: &str, placeholder: &str) -> String {
    let basename = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path()
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| placeholder.to_string());
    format!("{timestamp}_{basename}")
}
