//! Provenance tracker
//!
//! Records, per query, which file/columns/operation produced which result
//! shape, addressable later by the query id. Ids are caller-supplied when the
//! front-end wants to correlate an upload→query→history chain, or generated
//! otherwise. Reusing an id for a different file is rejected rather than
//! silently overwritten.
//!
//! Records are retained up to a configured capacity; beyond it the oldest
//! records are evicted in insertion order so provenance cannot grow without
//! bound over the process lifetime.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use datalens_store::DatasetMeta;

use crate::error::{ServerError, ServerResult};

/// Shape summary attached to a record once its query completes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub result_type: String,
    /// Serialized size of the result, in bytes
    pub result_size: usize,
}

/// One tracked query
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    pub query_id: String,
    pub timestamp: DateTime<Utc>,
    pub filename: String,
    pub operation: String,
    pub columns_used: Vec<String>,
    /// Dataset metadata as of query start, when the dataset was known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetMeta>,
    /// Filled in once at query completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<ResultSummary>,
}

/// Capacity-bounded map of query records
pub struct ProvenanceTracker {
    records: DashMap<String, QueryRecord>,
    /// Insertion order of ids, for count-based eviction
    order: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl std::fmt::Debug for ProvenanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvenanceTracker")
            .field("records", &self.records.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl ProvenanceTracker {
    /// Create a tracker retaining at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        Self {
            records: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Register a query at its start.
    ///
    /// Re-recording the same id for the same file replaces the record (a
    /// resubmitted query); the same id for a different file is a logic error
    /// upstream and is rejected.
    pub async fn record(&self, record: QueryRecord) -> ServerResult<()> {
        let query_id = record.query_id.clone();
        let is_new = match self.records.entry(query_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().filename != record.filename {
                    warn!(
                        %query_id,
                        existing = %occupied.get().filename,
                        requested = %record.filename,
                        "Rejected query id reuse across files"
                    );
                    return Err(ServerError::Validation(format!(
                        "Query id {} is already bound to file {}",
                        query_id,
                        occupied.get().filename
                    )));
                }
                occupied.insert(record);
                false
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(record);
                true
            }
        };

        if is_new {
            let mut order = self.order.lock().await;
            order.push_back(query_id.clone());
            while order.len() > self.capacity {
                if let Some(evicted) = order.pop_front() {
                    self.records.remove(&evicted);
                    debug!(query_id = %evicted, "Evicted provenance record at capacity");
                }
            }
        }
        Ok(())
    }

    /// Attach the result shape to a record at query completion.
    ///
    /// The columns actually referenced become known only during execution, so
    /// the single completion update carries them too.
    pub fn finalize(
        &self,
        query_id: &str,
        result_type: &str,
        result_size: usize,
        columns_used: Vec<String>,
    ) {
        if let Some(mut record) = self.records.get_mut(query_id) {
            record.result_summary = Some(ResultSummary {
                result_type: result_type.to_string(),
                result_size,
            });
            if !columns_used.is_empty() {
                record.columns_used = columns_used;
            }
        }
    }

    /// Fetch a record by query id
    pub fn lookup(&self, query_id: &str) -> Option<QueryRecord> {
        self.records.get(query_id).map(|r| r.value().clone())
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are retained
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
