//! DataLens Store
//!
//! Durable storage contracts and filesystem implementations for the DataLens
//! platform: the [`DatasetStore`] trait persists raw uploaded dataset blobs plus
//! their parsed-shape metadata, and the [`HistoryStore`] trait persists the
//! append-only per-session conversation log.
//!
//! Persistence is plain files: one blob per dataset addressed by filename,
//! and one JSON array per session. There are no durability guarantees beyond
//! that.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

use datalens_frame::{FileKind, FrameError};

pub mod dataset;
pub mod history;

pub use dataset::FsDatasetStore;
pub use history::{FsHistoryStore, HistoryEntry, HistoryStore};

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// The named dataset does not exist
    #[error("File {0} not found")]
    NotFound(String),

    /// Filename or session id would escape the storage directory
    #[error("Invalid name {0:?}: names must not contain path separators")]
    InvalidName(String),

    /// Extension outside csv/xlsx/xls
    #[error("File {0} is not a supported format. Only CSV and Excel files are allowed.")]
    UnsupportedExtension(String),

    /// Uploaded bytes could not be parsed; nothing was kept
    #[error("Error reading file {filename}: {source}")]
    Parse {
        /// Dataset the parse was attempted for
        filename: String,
        /// Underlying parse failure
        #[source]
        source: FrameError,
    },

    /// Disk read/write failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Upload-facing summary of one stored dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub filename: String,
    /// Byte size of the stored blob
    pub size: u64,
    pub row_count: usize,
    pub columns: Vec<String>,
}

/// Full parsed-shape metadata of one stored dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub filename: String,
    /// Source format
    pub kind: FileKind,
    pub size: u64,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    /// Session that uploaded the file, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl DatasetMeta {
    /// Collapse to the upload-facing summary shape
    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            filename: self.filename.clone(),
            size: self.size,
            row_count: self.row_count,
            columns: self.columns.clone(),
        }
    }
}

/// Contract for persisting raw dataset blobs and their parsed-shape metadata.
///
/// Columns and row count are immutable once a given file's bytes are written;
/// re-uploading under the same name overwrites the blob and resets metadata.
#[async_trait]
pub trait DatasetStore: Send + Sync + Debug {
    /// Validate, persist and parse an uploaded dataset.
    ///
    /// Nothing survives a failed upload: an unsupported extension writes no
    /// bytes, and a parse failure deletes the just-written blob before the
    /// error is returned.
    async fn upload(
        &self,
        filename: &str,
        bytes: &[u8],
        session_id: Option<&str>,
    ) -> StoreResult<DatasetSummary>;

    /// Raw bytes of a stored dataset
    async fn read_bytes(&self, filename: &str) -> StoreResult<Vec<u8>>;

    /// Parsed-shape metadata of a stored dataset
    async fn metadata(&self, filename: &str) -> StoreResult<DatasetMeta>;

    /// Record the parsed shape of a dataset after a (re-)parse.
    ///
    /// Also used for files that appeared in the data directory without going
    /// through [`DatasetStore::upload`].
    async fn record_shape(
        &self,
        filename: &str,
        columns: &[String],
        row_count: usize,
        size: u64,
    ) -> StoreResult<()>;

    /// Update last-accessed metadata without re-parsing
    async fn touch(&self, filename: &str) -> StoreResult<()>;

    /// Remove the blob and all derived metadata
    async fn delete(&self, filename: &str) -> StoreResult<()>;

    /// Enumerate stored datasets by re-deriving metadata from the backing
    /// files, so files placed by any path are reflected
    async fn list(&self) -> StoreResult<Vec<DatasetSummary>>;
}

/// Reject names that could escape the storage directory
pub(crate) fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}
