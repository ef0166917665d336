//! Health check endpoint for the DataLens Server
//!
//! This module contains the health check handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::server::DataLensServer;

/// Health check handler
///
/// Reports liveness plus the state of the two durable directories and basic
/// cache/provenance counters.
pub async fn health_check(State(server): State<Arc<DataLensServer>>) -> impl IntoResponse {
    let data_dir_ok = tokio::fs::metadata(&server.config.data_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    let history_dir_ok = tokio::fs::metadata(&server.config.history_dir)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    let (cache_entries, cache_reloads) = server.cache_stats();

    let status = if data_dir_ok && history_dir_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if status == StatusCode::OK { "UP" } else { "DOWN" },
        "version": env!("CARGO_PKG_VERSION"),
        "cache": {
            "entries": cache_entries,
            "reloads": cache_reloads,
        },
        "provenance": {
            "records": server.provenance_len(),
        },
        "dependencies": {
            "datasetStore": { "status": if data_dir_ok { "UP" } else { "DOWN" } },
            "historyStore": { "status": if history_dir_ok { "UP" } else { "DOWN" } },
        },
    });

    (status, Json(body))
}
