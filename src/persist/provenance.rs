//! JSON provenance sidecars written next to flat-layout pages.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument};

use super::PersistError;

/// Where a saved page came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// URL as originally published.
    pub original_url: String,
    /// Archive URL the body was fetched from.
    pub wayback_url: String,
    /// Capture timestamp.
    pub timestamp: String,
    /// Path of the saved page on disk.
    pub filepath: String,
}

impl Provenance {
    /// Creates a provenance record for a page saved at `filepath`.
    #[must_use]
    pub fn new(
        original_url: impl Into<String>,
        wayback_url: impl Into<String>,
        timestamp: impl Into<String>,
        filepath: &Path,
    ) -> Self {
        Self {
            original_url: original_url.into(),
            wayback_url: wayback_url.into(),
            timestamp: timestamp.into(),
            filepath: filepath.display().to_string(),
        }
    }
}

/// Writes `metadata_dir/<file_name>.json` as pretty-printed JSON.
///
/// An existing sidecar for the same file name is overwritten.
///
/// # Errors
///
/// Returns [`PersistError::Io`] when the directory or file cannot be written.
#[instrument(skip(provenance), fields(url = %provenance.original_url))]
pub async fn write_provenance(
    metadata_dir: &Path,
    file_name: &str,
    provenance: &Provenance,
) -> Result<PathBuf, PersistError> {
    tokio::fs::create_dir_all(metadata_dir)
        .await
        .map_err(|e| PersistError::io(metadata_dir, e))?;

    let path = metadata_dir.join(format!("{file_name}.json"));
    let json = serde_json::to_vec_pretty(provenance)
        .map_err(|e| PersistError::invalid_json(&provenance.original_url, e))?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| PersistError::io(&path, e))?;

    debug!(path = %path.display(), "provenance written");
    Ok(path)
}
