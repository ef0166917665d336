//! Filesystem implementation of the dataset store
//!
//! One blob per dataset at `<dir>/<filename>`; parsed-shape metadata is kept in
//! a concurrent in-memory map and re-derived from the backing files on
//! [`DatasetStore::list`], so the directory stays the source of truth.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use datalens_frame::{parse_bytes, FileKind};

use crate::{
    validate_name, DatasetMeta, DatasetStore, DatasetSummary, StoreError, StoreResult,
};

/// Filesystem-backed dataset store
#[derive(Debug)]
pub struct FsDatasetStore {
    dir: PathBuf,
    metadata: DashMap<String, DatasetMeta>,
}

impl FsDatasetStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            metadata: DashMap::new(),
        })
    }

    /// Directory holding the dataset blobs
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    fn kind_for(filename: &str) -> StoreResult<FileKind> {
        FileKind::from_filename(filename)
            .ok_or_else(|| StoreError::UnsupportedExtension(filename.to_string()))
    }
}

#[async_trait]
impl DatasetStore for FsDatasetStore {
    async fn upload(
        &self,
        filename: &str,
        bytes: &[u8],
        session_id: Option<&str>,
    ) -> StoreResult<DatasetSummary> {
        validate_name(filename)?;
        let kind = Self::kind_for(filename)?;

        let path = self.path_for(filename);
        tokio::fs::write(&path, bytes).await?;

        // Parse to validate and derive the shape; a failed parse must leave
        // no partial state behind.
        let frame = match parse_bytes(filename, bytes) {
            Ok(frame) => frame,
            Err(err) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    warn!(%filename, ?remove_err, "Failed to remove unparseable upload");
                }
                self.metadata.remove(filename);
                return Err(StoreError::Parse {
                    filename: filename.to_string(),
                    source: err,
                });
            }
        };

        let now = Utc::now();
        let meta = DatasetMeta {
            filename: filename.to_string(),
            kind,
            size: bytes.len() as u64,
            row_count: frame.row_count(),
            columns: frame.columns().to_vec(),
            uploaded_at: now,
            last_accessed: now,
            session_id: session_id.map(str::to_string),
        };
        let summary = meta.summary();
        self.metadata.insert(filename.to_string(), meta);

        debug!(%filename, rows = summary.row_count, "Stored dataset");
        Ok(summary)
    }

    async fn read_bytes(&self, filename: &str) -> StoreResult<Vec<u8>> {
        validate_name(filename)?;
        match tokio::fs::read(self.path_for(filename)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(filename.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn metadata(&self, filename: &str) -> StoreResult<DatasetMeta> {
        validate_name(filename)?;
        self.metadata
            .get(filename)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(filename.to_string()))
    }

    async fn record_shape(
        &self,
        filename: &str,
        columns: &[String],
        row_count: usize,
        size: u64,
    ) -> StoreResult<()> {
        validate_name(filename)?;
        let kind = Self::kind_for(filename)?;
        let now = Utc::now();
        match self.metadata.entry(filename.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                let meta = occupied.get_mut();
                meta.columns = columns.to_vec();
                meta.row_count = row_count;
                meta.size = size;
                meta.last_accessed = now;
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                // File appeared without going through upload
                vacant.insert(DatasetMeta {
                    filename: filename.to_string(),
                    kind,
                    size,
                    row_count,
                    columns: columns.to_vec(),
                    uploaded_at: now,
                    last_accessed: now,
                    session_id: None,
                });
            }
        }
        Ok(())
    }

    async fn touch(&self, filename: &str) -> StoreResult<()> {
        validate_name(filename)?;
        if let Some(mut entry) = self.metadata.get_mut(filename) {
            entry.last_accessed = Utc::now();
        }
        Ok(())
    }

    async fn delete(&self, filename: &str) -> StoreResult<()> {
        validate_name(filename)?;
        match tokio::fs::remove_file(self.path_for(filename)).await {
            Ok(()) => {
                self.metadata.remove(filename);
                debug!(%filename, "Deleted dataset");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(filename.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> StoreResult<Vec<DatasetSummary>> {
        let mut summaries = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if FileKind::from_filename(&name).is_none() {
                continue;
            }
            let bytes = match tokio::fs::read(entry.path()).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(filename = %name, ?err, "Skipping unreadable dataset");
                    continue;
                }
            };
            let frame = match parse_bytes(&name, &bytes) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(filename = %name, ?err, "Skipping unparseable dataset");
                    continue;
                }
            };
            self.record_shape(&name, frame.columns(), frame.row_count(), bytes.len() as u64)
                .await?;
            summaries.push(DatasetSummary {
                filename: name,
                size: bytes.len() as u64,
                row_count: frame.row_count(),
                columns: frame.columns().to_vec(),
            });
        }
        summaries.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(summaries)
    }
}
