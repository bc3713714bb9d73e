//! Writing fetched captures to disk.
//!
//! Two layouts are produced:
//!
//! - **Snapshot** (sequential mode): `downloaded_data/<host>/<path>/<name>`
//!   where `<name>` is chosen from the declared content type.
//! - **Flat** (concurrent mode): `downloads/<ts>_<basename>` for pages,
//!   `downloads/resources/<ts>_<basename>` for resources and
//!   `downloads/metadata/<file>.json` provenance sidecars.

mod error;
mod layout;
mod provenance;

pub use error::PersistError;
pub use layout::{OutputLayout, SnapshotFormat, flat_file_name, snapshot_dir};
pub use provenance::{Provenance, write_provenance};

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument};

/// Saves a sequential-mode capture under `root/<host>/<path>/`.
///
/// The file name and encoding follow the declared `content_type`:
/// HTML is written as decoded text, JSON is re-serialized with 4-space
/// indentation, images keep their bytes under `image.<subtype>`, and anything
/// else is written raw to `content.txt`.
///
/// # Errors
///
/// Returns [`PersistError`] when the URL has no host, a JSON body does not
/// parse, or the filesystem rejects a write.
#[instrument(skip(body), fields(bytes = body.len()))]
pub async fn save_snapshot(
    root: &Path,
    original_url: &str,
    content_type: &str,
    body: &[u8],
) -> Result<PathBuf, PersistError> {
    let dir = snapshot_dir(root, original_url)?;
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| PersistError::io(&dir, e))?;

    let format = SnapshotFormat::from_content_type(content_type);
    let path = dir.join(format.file_name());
    let contents = match format {
        SnapshotFormat::Html => String::from_utf8_lossy(body).into_owned().into_bytes(),
        SnapshotFormat::Json => reformat_json(original_url, body)?,
        SnapshotFormat::Image(_) | SnapshotFormat::Raw => body.to_vec(),
    };

    tokio::fs::write(&path, contents)
        .await
        .map_err(|e| PersistError::io(&path, e))?;
    debug!(path = %path.display(), ?format, "snapshot saved");
    Ok(path)
}

/// Writes `body` to `dir/file_name`, creating `dir` if needed.
///
/// # Errors
///
/// Returns [`PersistError::Io`] when the directory or file cannot be written.
pub async fn save_flat(dir: &Path, file_name: &str, body: &[u8]) -> Result<PathBuf, PersistError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| PersistError::io(dir, e))?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| PersistError::io(&path, e))?;
    Ok(path)
}

fn reformat_json(original_url: &str, body: &[u8]) -> Result<Vec<u8>, PersistError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| PersistError::invalid_json(original_url, e))?;
    let mut out = Vec::with_capacity(body.len());
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| PersistError::invalid_json(original_url, e))?;
    Ok(out)
}
