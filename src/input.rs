//! Entry list loading.
//!
//! The input is a JSON array of rows, each row an array
//! `[id, timestamp, url, content_type]`. The id is carried along but never
//! interpreted; extra trailing elements are ignored.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors produced while loading the entry list.
#[derive(Debug, Error)]
pub enum InputError {
    /// The input file could not be read.
    #[error("cannot read entry list {path}: {source}")]
    Io {
        /// Path of the input file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The input is not valid JSON.
    #[error("entry list is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The top-level JSON value is not an array.
    #[error("entry list must be a JSON array of rows")]
    NotAnArray,

    /// A row does not have the expected shape.
    #[error("row {index}: {reason}")]
    InvalidRow {
        /// Zero-based row position.
        index: usize,
        /// What is wrong with the row.
        reason: String,
    },
}

/// One archived capture to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Zero-based position in the input list.
    pub index: usize,
    /// Element 0 of the input row, opaque.
    pub id: Value,
    /// Capture timestamp.
    pub timestamp: String,
    /// URL as originally published.
    pub original_url: String,
    /// Declared content type of the capture.
    pub content_type: String,
}

impl Entry {
    /// Creates an entry directly (mostly useful in tests).
    #[must_use]
    pub fn new(
        index: usize,
        timestamp: impl Into<String>,
        original_url: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            index,
            id: Value::from(index),
            timestamp: timestamp.into(),
            original_url: original_url.into(),
            content_type: content_type.into(),
        }
    }

    /// Converts one input row into an entry.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidRow`] when the row is not an array of at
    /// least four elements or a field has the wrong type.
    pub fn from_row(index: usize, row: &Value) -> Result<Self, InputError> {
        let invalid = |reason: String| InputError::InvalidRow { index, reason };

        let Some(fields) = row.as_array() else {
            return Err(invalid("expected an array".to_string()));
        };
        if fields.len() < 4 {
            return Err(invalid(format!(
                "expected 4 elements [id, timestamp, url, content_type], got {}",
                fields.len()
            )));
        }

        let timestamp = match &fields[1] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => return Err(invalid(format!("timestamp must be a string, got {other}"))),
        };
        let string_field = |position: usize, name: &str| {
            fields[position]
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("{name} must be a string")))
        };

        Ok(Self {
            index,
            id: fields[0].clone(),
            timestamp,
            original_url: string_field(2, "url")?,
            content_type: string_field(3, "content_type")?,
        })
    }
}

/// Parses an entry list from JSON text.
///
/// # Errors
///
/// Returns [`InputError`] for invalid JSON, a non-array document, or the
/// first malformed row.
pub fn parse_entries(raw: &str) -> Result<Vec<Entry>, InputError> {
    let document: Value = serde_json::from_str(raw)?;
    let Value::Array(rows) = document else {
        return Err(InputError::NotAnArray);
    };
    rows.iter()
        .enumerate()
        .map(|(index, row)| Entry::from_row(index, row))
        .collect()
}

/// Reads and parses the entry list at `path`.
///
/// # Errors
///
/// Returns [`InputError::Io`] when the file cannot be read, otherwise the
/// errors of [`parse_entries`].
#[instrument(fields(path = %path.display()))]
pub async fn load_entries(path: &Path) -> Result<Vec<Entry>, InputError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let entries = parse_entries(&raw)?;
    debug!(count = entries.len(), "loaded entry list");
    Ok(entries)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_entries_reads_rows_in_order() {
        let raw = r#"[
            [0, "20200101000000", "http://example.com/", "text/html"],
            ["abc", "20210101000000", "http://example.com/data", "application/json"]
        ]"#;
        let entries = parse_entries(raw).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].index, 0);
        assert_eq!(entries[0].timestamp, "20200101000000");
        assert_eq!(entries[0].original_url, "http://example.com/");
        assert_eq!(entries[0].content_type, "text/html");
        assert_eq!(entries[1].index, 1);
        assert_eq!(entries[1].id, Value::from("abc"));
    }

    #[test]
    fn test_numeric_timestamp_is_accepted() {
        let entries = parse_entries(r#"[[1, 20200101000000, "http://a/", "text/html"]]"#).unwrap();
        assert_eq!(entries[0].timestamp, "20200101000000");
    }

    #[test]
    fn test_extra_elements_are_ignored() {
        let entries =
            parse_entries(r#"[[1, "2020", "http://a/", "text/html", 200, "extra"]]"#).unwrap();
        assert_eq!(entries[0].content_type, "text/html");
    }

    #[test]
    fn test_short_row_is_rejected_with_index() {
        let err = parse_entries(r#"[[1, "2020", "http://a/", "text/html"], [2, "2020"]]"#)
            .unwrap_err();
        match err {
            InputError::InvalidRow { index, reason } => {
                assert_eq!(index, 1);
                assert!(reason.contains("4 elements"), "unexpected reason: {reason}");
            }
            other => panic!("Expected InvalidRow, got: {other:?}"),
        }
    }

    #[test]
    fn test_non_string_url_is_rejected() {
        let err = parse_entries(r#"[[1, "2020", 42, "text/html"]]"#).unwrap_err();
        assert!(err.to_string().contains("url must be a string"));
    }

    #[test]
    fn test_object_document_is_rejected() {
        assert!(matches!(
            parse_entries(r#"{"rows": []}"#),
            Err(InputError::NotAnArray)
        ));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(matches!(parse_entries("[[1,"), Err(InputError::Json(_))));
    }

    #[test]
    fn test_empty_list_is_valid() {
        assert!(parse_entries("[]").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_entries_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metadata.json");
        std::fs::write(&path, r#"[[0, "1", "http://a/", "image/png"]]"#).unwrap();

        let entries = load_entries(&path).await.unwrap();
        assert_eq!(entries, vec![Entry::new(0, "1", "http://a/", "image/png")]);
    }

    #[tokio::test]
    async fn test_load_entries_missing_file_reports_path() {
        let err = load_entries(Path::new("/definitely/not/here.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, InputError::Io { .. }));
        assert!(err.to_string().contains("/definitely/not/here.json"));
    }
}
