//! Error types for persistence.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while writing captures to disk.
#[derive(Debug, Error)]
pub enum PersistError {
    /// File system error (create directory, write file).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A capture declared as JSON could not be parsed or re-serialized.
    #[error("invalid JSON body for {url}: {source}")]
    InvalidJson {
        /// The original URL of the capture.
        url: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The URL has no host to derive a directory from.
    #[error("cannot derive a directory from URL without host: {url}")]
    MissingHost {
        /// The rejected URL.
        url: String,
    },
}

impl PersistError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid JSON error.
    pub fn invalid_json(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::InvalidJson {
            url: url.into(),
            source,
        }
    }

    /// Creates a missing-host error.
    pub fn missing_host(url: impl Into<String>) -> Self {
        Self::MissingHost { url: url.into() }
    }
}
