//! Freshness cache
//!
//! Holds at most one parsed snapshot per filename with a time-to-live and
//! mediates every read of dataset content. Check-then-reload for a given
//! filename is serialized through a per-key async lock so two concurrent reads
//! never parse the same file twice inside one TTL window; reads of different
//! filenames do not block each other.
//!
//! Eviction is purely lazy: a stale entry is dropped on the next access, never
//! by a background sweep. A dataset that is never re-read after going stale
//! keeps its entry in memory until an explicit delete.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use datalens_frame::{parse_bytes, Frame};
use datalens_store::DatasetStore;

use crate::error::ServerResult;

/// A parsed snapshot handed out by the cache.
///
/// The frame is shared read-only; `parsed_at` identifies the parse that
/// produced it, so two reads inside one TTL window return equal stamps.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub frame: Arc<Frame>,
    pub parsed_at: Instant,
}

struct CacheEntry {
    frame: Arc<Frame>,
    cached_at: Instant,
    last_accessed: Instant,
}

/// TTL cache of parsed dataset snapshots
pub struct FreshnessCache {
    store: Arc<dyn DatasetStore>,
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    reloads: AtomicU64,
}

impl std::fmt::Debug for FreshnessCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreshnessCache")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.len())
            .field("reloads", &self.reloads.load(Ordering::Relaxed))
            .finish()
    }
}

impl FreshnessCache {
    /// Create a cache over a dataset store
    pub fn new(store: Arc<dyn DatasetStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: DashMap::new(),
            locks: DashMap::new(),
            reloads: AtomicU64::new(0),
        }
    }

    fn key_lock(&self, filename: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(filename.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Read a dataset through the cache.
    ///
    /// Fresh hit: returns the cached snapshot and updates last-accessed
    /// metadata without re-parsing. Stale hit: evicts, then reloads. Miss:
    /// loads bytes from the store, parses, caches, and records the parsed
    /// shape back onto the dataset metadata. A parse failure propagates and
    /// leaves no cache entry behind.
    pub async fn read(&self, filename: &str) -> ServerResult<Snapshot> {
        let lock = self.key_lock(filename);
        let _guard = lock.lock().await;

        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(filename) {
            if now.duration_since(entry.cached_at) < self.ttl {
                entry.last_accessed = now;
                let snapshot = Snapshot {
                    frame: entry.frame.clone(),
                    parsed_at: entry.cached_at,
                };
                drop(entry);
                debug!(%filename, "Cache hit");
                self.store.touch(filename).await?;
                return Ok(snapshot);
            }
            debug!(%filename, "Cache entry stale, evicting");
        }
        self.entries.remove(filename);

        let bytes = self.store.read_bytes(filename).await?;
        let frame = Arc::new(parse_bytes(filename, &bytes)?);
        self.store
            .record_shape(filename, frame.columns(), frame.row_count(), bytes.len() as u64)
            .await?;

        let parsed_at = Instant::now();
        self.entries.insert(
            filename.to_string(),
            CacheEntry {
                frame: frame.clone(),
                cached_at: parsed_at,
                last_accessed: parsed_at,
            },
        );
        self.reloads.fetch_add(1, Ordering::Relaxed);
        debug!(%filename, rows = frame.row_count(), "Parsed and cached dataset");

        Ok(Snapshot { frame, parsed_at })
    }

    /// Drop the cached snapshot for a filename, if any.
    ///
    /// Used when an upload overwrites the backing bytes: metadata resets, so
    /// the old snapshot must not serve out its remaining TTL.
    pub async fn evict(&self, filename: &str) {
        let lock = self.key_lock(filename);
        let _guard = lock.lock().await;
        if self.entries.remove(filename).is_some() {
            debug!(%filename, "Evicted cache entry");
        }
    }

    /// Delete the dataset and its cache entry as one step.
    ///
    /// Runs the store delete under the same per-key lock as reads, so from the
    /// caller's point of view the entry and the backing bytes vanish together.
    pub async fn remove(&self, filename: &str) -> ServerResult<()> {
        let lock = self.key_lock(filename);
        let _guard = lock.lock().await;
        self.entries.remove(filename);
        self.store.delete(filename).await?;
        Ok(())
    }

    /// Number of reloads performed since startup
    pub fn reload_count(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }

    /// Number of cached snapshots currently held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Instant a filename's snapshot was last accessed, if cached
    pub fn last_accessed(&self, filename: &str) -> Option<Instant> {
        self.entries.get(filename).map(|e| e.last_accessed)
    }
}
