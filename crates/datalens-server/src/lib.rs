//!
//! DataLens Server - query server for uploaded tabular datasets
//!
//! This module exports all the components of the DataLens Server: the
//! freshness cache mediating dataset reads, the query engine, the provenance
//! tracker, the session history plumbing and the HTTP API over all of them.

// External dependencies
use std::sync::Arc;

/// API module
pub mod api;

/// Freshness cache module
pub mod cache;

/// Configuration module
pub mod config;

/// Query engine module
pub mod engine;

/// Error module
pub mod error;

/// Provenance tracker module
pub mod provenance;

/// Server module
pub mod server;

// Re-export key types
pub use cache::{FreshnessCache, Snapshot};
pub use config::ServerConfig;
pub use engine::{QueryEngine, QueryRequest};
pub use error::{ServerError, ServerResult};
pub use provenance::{ProvenanceTracker, QueryRecord};
pub use server::DataLensServer;

use datalens_store::{DatasetStore, FsDatasetStore, FsHistoryStore, HistoryStore};

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    // Initialize logging
    init_logging(&config);

    // Create dependencies
    let store = create_dataset_store(&config).await?;
    let history = create_history_store(&config).await?;

    // Create and run server
    let server = Arc::new(DataLensServer::new(config, store, history));
    server.run().await
}

/// Initialize logging
fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    // Create filter based on config
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Initialize subscriber
    fmt().with_env_filter(filter).with_target(true).init();
}

/// Create the dataset store
pub async fn create_dataset_store(config: &ServerConfig) -> ServerResult<Arc<dyn DatasetStore>> {
    tracing::info!(dir = %config.data_dir, "Using filesystem dataset store");
    let store = FsDatasetStore::new(&config.data_dir).await?;
    Ok(Arc::new(store))
}

/// Create the session history store
pub async fn create_history_store(config: &ServerConfig) -> ServerResult<Arc<dyn HistoryStore>> {
    tracing::info!(dir = %config.history_dir, "Using filesystem history store");
    let store = FsHistoryStore::new(&config.history_dir).await?;
    Ok(Arc::new(store))
}
