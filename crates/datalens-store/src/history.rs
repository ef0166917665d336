//! Session history store
//!
//! Append-only conversation log, one JSON array per session id. The whole file
//! is rewritten on append; per-session operations are serialized through a
//! per-key async lock so append order always matches read-back order, while
//! different sessions proceed independently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{validate_name, StoreError, StoreResult};

/// One question/answer/provenance triple in a session's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub response: String,
    /// Provenance reference attached to the answer
    #[serde(default)]
    pub source_info: serde_json::Value,
}

/// Contract for the durable per-session conversation log
#[async_trait]
pub trait HistoryStore: Send + Sync + Debug {
    /// Append one entry to a session's log
    async fn append(&self, session_id: &str, entry: HistoryEntry) -> StoreResult<()>;

    /// Load a session's log in insertion order; unknown sessions are empty,
    /// not an error
    async fn load(&self, session_id: &str) -> StoreResult<Vec<HistoryEntry>>;

    /// Destroy a session's log; clearing an unknown session is a no-op
    async fn clear(&self, session_id: &str) -> StoreResult<()>;
}

/// Filesystem-backed history store
#[derive(Debug)]
pub struct FsHistoryStore {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FsHistoryStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            locks: DashMap::new(),
        })
    }

    /// Directory holding the session logs
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_entries(&self, path: &Path) -> StoreResult<Vec<HistoryEntry>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl HistoryStore for FsHistoryStore {
    async fn append(&self, session_id: &str, entry: HistoryEntry) -> StoreResult<()> {
        validate_name(session_id)?;
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        let path = self.path_for(session_id);
        let mut entries = self.read_entries(&path).await?;
        entries.push(entry);
        tokio::fs::write(&path, serde_json::to_vec_pretty(&entries)?).await?;

        debug!(%session_id, total = entries.len(), "Appended history entry");
        Ok(())
    }

    async fn load(&self, session_id: &str) -> StoreResult<Vec<HistoryEntry>> {
        validate_name(session_id)?;
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        self.read_entries(&self.path_for(session_id)).await
    }

    async fn clear(&self, session_id: &str) -> StoreResult<()> {
        validate_name(session_id)?;
        let lock = self.session_lock(session_id);
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
