//! Main DataLens Server implementation
//!
//! Ties the dataset store, freshness cache, query engine, provenance tracker
//! and history store together behind the operations the HTTP surface exposes.
//! No cross-component transaction spans these stores; each write commits
//! independently, so provenance or history can briefly lag the dataset after
//! a crash.

use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use chrono::Utc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;

use datalens_store::{DatasetStore, DatasetSummary, HistoryEntry, HistoryStore};

use crate::cache::FreshnessCache;
use crate::config::ServerConfig;
use crate::engine::{QueryEngine, QueryRequest};
use crate::error::{ServerError, ServerResult};
use crate::provenance::{ProvenanceTracker, QueryRecord};

/// Response of one `query_data` call
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub query_id: String,
    pub result: serde_json::Value,
    pub source_info: serde_json::Value,
}

/// Main server implementation
pub struct DataLensServer {
    /// Configuration
    pub config: ServerConfig,

    /// Dataset blob + metadata store
    store: Arc<dyn DatasetStore>,

    /// Per-session chat history store
    history: Arc<dyn HistoryStore>,

    /// Snapshot cache mediating all dataset reads
    cache: Arc<FreshnessCache>,

    /// Operation executor
    engine: QueryEngine,

    /// Query provenance map
    provenance: ProvenanceTracker,
}

impl std::fmt::Debug for DataLensServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLensServer")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("provenance", &self.provenance)
            .finish()
    }
}

impl DataLensServer {
    /// Create a new DataLensServer
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn DatasetStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let cache = Arc::new(FreshnessCache::new(store.clone(), config.cache_ttl()));
        let engine = QueryEngine::new(cache.clone(), config.query_timeout());
        let provenance = ProvenanceTracker::new(config.provenance_capacity);
        Self {
            config,
            store,
            history,
            cache,
            engine,
            provenance,
        }
    }

    /// Run the server
    pub async fn run(self: Arc<Self>) -> ServerResult<()> {
        info!("Starting DataLens Server");

        let app = crate::api::build_router(self.clone());

        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| ServerError::Validation(format!("Invalid bind address: {}", e)))?;
        let listener = TcpListener::bind(addr).await?;
        info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Io(e.to_string()))?;

        Ok(())
    }

    /// Upload a batch of files for a session.
    ///
    /// Files are committed one at a time; the first failure stops the batch
    /// and propagates, leaving earlier files stored and the failing file fully
    /// rolled back.
    pub async fn upload_files(
        &self,
        session_id: Option<&str>,
        files: Vec<(String, Vec<u8>)>,
    ) -> ServerResult<Vec<DatasetSummary>> {
        if files.is_empty() {
            return Err(ServerError::Validation("No files provided".to_string()));
        }

        let mut uploaded = Vec::with_capacity(files.len());
        for (filename, bytes) in files {
            let summary = self.store.upload(&filename, &bytes, session_id).await?;
            // A re-upload resets metadata; the old snapshot must not outlive it
            self.cache.evict(&filename).await;
            info!(%filename, rows = summary.row_count, "Uploaded dataset");
            uploaded.push(summary);
        }
        Ok(uploaded)
    }

    /// Enumerate stored datasets from the backing directory
    pub async fn list_files(&self) -> ServerResult<Vec<DatasetSummary>> {
        Ok(self.store.list().await?)
    }

    /// Ordered column names of a dataset
    pub async fn get_columns(&self, filename: &str) -> ServerResult<Vec<String>> {
        let snapshot = self.cache.read(filename).await?;
        Ok(snapshot.frame.columns().to_vec())
    }

    /// Row/column counts plus per-column dtype and non-null count
    pub async fn describe_file(&self, filename: &str) -> ServerResult<serde_json::Value> {
        let snapshot = self.cache.read(filename).await?;
        let frame = &snapshot.frame;

        let columns_info: Vec<serde_json::Value> = frame
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                json!({
                    "name": name,
                    "dtype": frame.column_type_name(idx),
                    "non_null_count": frame.non_null_count(idx),
                })
            })
            .collect();

        Ok(json!({
            "row_count": frame.row_count(),
            "column_count": frame.columns().len(),
            "columns": columns_info,
        }))
    }

    /// Execute a query with provenance tracking and optional history append
    pub async fn query(&self, request: QueryRequest) -> ServerResult<QueryResponse> {
        let query_id = request
            .query_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // Metadata snapshot as of query start; a dataset seen for the first
        // time through a direct file drop may not have one yet.
        let dataset = self.store.metadata(&request.filename).await.ok();

        self.provenance
            .record(QueryRecord {
                query_id: query_id.clone(),
                timestamp: Utc::now(),
                filename: request.filename.clone(),
                operation: request.operation.clone(),
                columns_used: request.column.iter().cloned().collect(),
                dataset,
                result_summary: None,
            })
            .await?;

        let outcome = self.engine.execute(&request).await?;

        let result_size = serde_json::to_string(&outcome.result)
            .map(|s| s.len())
            .unwrap_or(0);
        self.provenance.finalize(
            &query_id,
            &outcome.result_type,
            result_size,
            outcome.columns_used.clone(),
        );

        let source_info = json!({
            "query_id": query_id,
            "filename": request.filename,
            "operation": request.operation,
            "columns_used": outcome.columns_used,
            "result_summary": {
                "result_type": outcome.result_type,
                "result_size": result_size,
            },
            "timestamp": Utc::now().to_rfc3339(),
        });

        // A failed history write must not fail the query
        if let (Some(session_id), Some(question)) = (&request.session_id, &request.question) {
            let entry = HistoryEntry {
                timestamp: Utc::now(),
                question: question.clone(),
                response: outcome.result.to_string(),
                source_info: source_info.clone(),
            };
            if let Err(err) = self.history.append(session_id, entry).await {
                error!(%session_id, ?err, "Failed to persist chat history entry");
            }
        }

        Ok(QueryResponse {
            query_id,
            result: outcome.result,
            source_info,
        })
    }

    /// Detailed source information for a tracked query
    pub fn source_info(&self, query_id: &str) -> ServerResult<QueryRecord> {
        self.provenance
            .lookup(query_id)
            .ok_or_else(|| ServerError::NotFound(format!("Source information for query {}", query_id)))
    }

    /// Ordered chat history of a session
    pub async fn chat_history(&self, session_id: &str) -> ServerResult<Vec<HistoryEntry>> {
        Ok(self.history.load(session_id).await?)
    }

    /// Destroy a session's chat history
    pub async fn clear_history(&self, session_id: &str) -> ServerResult<()> {
        self.history.clear(session_id).await?;
        info!(%session_id, "Cleared chat history");
        Ok(())
    }

    /// Delete a dataset together with its cache entry and metadata
    pub async fn delete_file(&self, filename: &str) -> ServerResult<()> {
        self.cache.remove(filename).await?;
        info!(%filename, "Deleted dataset");
        Ok(())
    }

    /// Resource listing with metadata, one entry per stored dataset
    pub async fn list_resources(&self) -> ServerResult<Vec<serde_json::Value>> {
        let summaries = self.store.list().await?;
        let mut resources = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let metadata = self.store.metadata(&summary.filename).await.ok();
            resources.push(json!({
                "uri": format!("file://{}", summary.filename),
                "name": summary.filename,
                "description": format!("CSV/Excel file: {}", summary.filename),
                "mimeType": "application/octet-stream",
                "metadata": {
                    "file_size": summary.size,
                    "row_count": summary.row_count,
                    "columns": summary.columns,
                    "upload_time": metadata.map(|m| m.uploaded_at.to_rfc3339()),
                },
            }));
        }
        Ok(resources)
    }

    /// Full-file JSON records dump for one resource
    pub async fn read_resource(&self, filename: &str) -> ServerResult<serde_json::Value> {
        let snapshot = self.cache.read(filename).await?;
        let records = snapshot.frame.records(None);
        let metadata = self.store.metadata(filename).await.ok();
        Ok(json!({
            "contents": [{
                "uri": format!("file://{}", filename),
                "mimeType": "application/json",
                "text": serde_json::Value::Array(
                    records.into_iter().map(serde_json::Value::Object).collect(),
                ).to_string(),
            }],
            "metadata": metadata,
        }))
    }

    /// Cache statistics for health reporting
    pub fn cache_stats(&self) -> (usize, u64) {
        (self.cache.len(), self.cache.reload_count())
    }

    /// Number of retained provenance records
    pub fn provenance_len(&self) -> usize {
        self.provenance.len()
    }

    /// The snapshot cache, for tests that assert freshness behavior
    pub fn cache(&self) -> &Arc<FreshnessCache> {
        &self.cache
    }

    /// Warn-level visibility for datasets whose provenance refers to deleted
    /// files; lookups still succeed, the caller just cannot re-run the query.
    pub async fn verify_provenance_target(&self, query_id: &str) -> ServerResult<bool> {
        let record = self.source_info(query_id)?;
        match self.store.metadata(&record.filename).await {
            Ok(_) => Ok(true),
            Err(_) => {
                warn!(%query_id, filename = %record.filename, "Provenance refers to a deleted dataset");
                Ok(false)
            }
        }
    }
}
