//! API module for the DataLens Server
//!
//! This module contains the API routes and handlers. Wire shapes are part of
//! the contract with the front-end and the planner: every tool response is
//! `{content: [{type: "text", text}], source_info?}` and every error is
//! `{error: <string>}`.

use axum::{
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;
use uuid::Uuid;

pub mod errors;
pub mod health;

use crate::engine::QueryRequest;
use crate::error::{ServerError, ServerResult};
use crate::server::DataLensServer;

/// Build the router for API endpoints
pub fn build_router(server: Arc<DataLensServer>) -> Router {
    Router::new()
        // Service banner and tool catalog
        .route("/", get(handle_root))
        .route("/tools", get(handle_list_tools))
        // Uploads and tool calls
        .route("/upload", post(handle_upload))
        .route("/tools/:tool_name", post(handle_call_tool))
        // Chat history
        .route(
            "/chat_history/:session_id",
            get(handle_get_history).delete(handle_clear_history),
        )
        // Provenance
        .route("/source/:query_id", get(handle_source_info))
        // File management
        .route("/files/:filename", delete(handle_delete_file))
        // Resources
        .route("/resources", get(handle_list_resources))
        .route("/resources/*uri", get(handle_read_resource))
        // Health check
        .route("/health", get(health::health_check))
        // Middleware and shared state
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

/// One text block of a tool response
#[derive(Debug, Serialize)]
struct ToolContent {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

/// Envelope every tool call answers with
#[derive(Debug, Serialize)]
struct ToolResponse {
    content: Vec<ToolContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_info: Option<serde_json::Value>,
}

fn tool_response(result: &serde_json::Value, source_info: Option<serde_json::Value>) -> Json<ToolResponse> {
    Json(ToolResponse {
        content: vec![ToolContent {
            kind: "text",
            text: result.to_string(),
        }],
        source_info,
    })
}

/// Service banner
async fn handle_root() -> impl IntoResponse {
    Json(json!({
        "message": "DataLens Server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Tool catalog with JSON-schema-shaped input descriptors
async fn handle_list_tools() -> impl IntoResponse {
    Json(json!({
        "tools": [
            {
                "name": "list_files",
                "description": "List all uploaded CSV/Excel files with their columns.",
                "inputSchema": {"type": "object", "properties": {}}
            },
            {
                "name": "get_columns",
                "description": "Return all column names for a given file.",
                "inputSchema": {
                    "type": "object",
                    "properties": {"filename": {"type": "string"}},
                    "required": ["filename"]
                }
            },
            {
                "name": "describe_file",
                "description": "Provide basic statistics (row count, column count, data types) for a given file.",
                "inputSchema": {
                    "type": "object",
                    "properties": {"filename": {"type": "string"}},
                    "required": ["filename"]
                }
            },
            {
                "name": "query_data",
                "description": "Run a named operation (head, average, sum, count, describe, execute) against a file, optionally after a row filter. The execute operation takes a pipeline expression such as filter(revenue > 100) | sort(revenue, desc) | head(5).",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "filename": {"type": "string"},
                        "operation": {"type": "string"},
                        "column": {"type": "string"},
                        "n": {"type": "integer"},
                        "filter": {"type": "string"},
                        "code": {"type": "string"},
                        "query_id": {"type": "string"},
                        "session_id": {"type": "string"},
                        "question": {"type": "string"}
                    },
                    "required": ["filename", "operation"]
                }
            },
            {
                "name": "get_chat_history",
                "description": "Get chat history for a specific session.",
                "inputSchema": {
                    "type": "object",
                    "properties": {"session_id": {"type": "string"}},
                    "required": ["session_id"]
                }
            }
        ]
    }))
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    #[serde(default)]
    session_id: Option<String>,
}

/// Handler for multipart dataset uploads
async fn handle_upload(
    State(server): State<Arc<DataLensServer>>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::Validation(format!("Invalid multipart body: {}", e)))?;
        files.push((filename, bytes.to_vec()));
    }

    let uploaded = server
        .upload_files(params.session_id.as_deref(), files)
        .await?;

    Ok(Json(json!({
        "message": format!("Successfully uploaded {} files", uploaded.len()),
        "uploaded_files": uploaded,
    })))
}

/// Dispatcher for POST /tools/{tool_name}
async fn handle_call_tool(
    State(server): State<Arc<DataLensServer>>,
    Path(tool_name): Path<String>,
    Json(arguments): Json<serde_json::Value>,
) -> ServerResult<axum::response::Response> {
    debug!(%tool_name, "Tool call");
    match tool_name.as_str() {
        "list_files" => {
            let files = server.list_files().await?;
            let files_info: Vec<serde_json::Value> = files
                .iter()
                .map(|f| {
                    json!({
                        "filename": f.filename,
                        "columns": f.columns,
                        "row_count": f.row_count,
                        "file_size": f.size,
                    })
                })
                .collect();
            let source_info = json!({
                "query_id": Uuid::new_v4().to_string(),
                "operation": "list_files",
                "files_found": files_info.len(),
            });
            Ok(tool_response(&serde_json::Value::Array(files_info), Some(source_info)).into_response())
        }
        "get_columns" => {
            let filename = require_str(&arguments, "filename")?;
            let columns = server.get_columns(&filename).await?;
            let result = json!({
                "columns": columns,
                "column_count": columns.len(),
            });
            let source_info = json!({
                "query_id": Uuid::new_v4().to_string(),
                "filename": filename,
                "operation": "get_columns",
                "columns_returned": columns,
            });
            Ok(tool_response(&result, Some(source_info)).into_response())
        }
        "describe_file" => {
            let filename = require_str(&arguments, "filename")?;
            let result = server.describe_file(&filename).await?;
            let source_info = json!({
                "query_id": Uuid::new_v4().to_string(),
                "filename": filename,
                "operation": "describe_file",
                "row_count": result.get("row_count"),
                "column_count": result.get("column_count"),
            });
            Ok(tool_response(&result, Some(source_info)).into_response())
        }
        "query_data" => {
            let request: QueryRequest = serde_json::from_value(arguments)
                .map_err(|e| ServerError::Validation(format!("Invalid query arguments: {}", e)))?;
            let response = server.query(request).await?;
            Ok(tool_response(&response.result, Some(response.source_info)).into_response())
        }
        "get_chat_history" => {
            let session_id = require_str(&arguments, "session_id")?;
            let history = server.chat_history(&session_id).await?;
            Ok(tool_response(&serde_json::to_value(history)?, None).into_response())
        }
        other => Err(ServerError::NotFound(format!("Tool {}", other))),
    }
}

/// Handler for loading a session's chat history
async fn handle_get_history(
    State(server): State<Arc<DataLensServer>>,
    Path(session_id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let history = server.chat_history(&session_id).await?;
    Ok(Json(json!({
        "session_id": session_id,
        "history": history,
    })))
}

/// Handler for clearing a session's chat history
async fn handle_clear_history(
    State(server): State<Arc<DataLensServer>>,
    Path(session_id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    server.clear_history(&session_id).await?;
    Ok(Json(json!({
        "message": format!("Chat history cleared for session {}", session_id),
    })))
}

/// Handler for provenance lookups
async fn handle_source_info(
    State(server): State<Arc<DataLensServer>>,
    Path(query_id): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let record = server.source_info(&query_id)?;
    // Provenance outlives datasets; say so instead of pretending otherwise
    let dataset_available = server.verify_provenance_target(&query_id).await?;
    let mut source_info = serde_json::to_value(record)?;
    if let Some(obj) = source_info.as_object_mut() {
        obj.insert("dataset_available".to_string(), json!(dataset_available));
    }
    Ok(Json(json!({
        "query_id": query_id,
        "source_info": source_info,
    })))
}

/// Handler for deleting a dataset
async fn handle_delete_file(
    State(server): State<Arc<DataLensServer>>,
    Path(filename): Path<String>,
) -> ServerResult<impl IntoResponse> {
    server.delete_file(&filename).await?;
    Ok(Json(json!({
        "message": format!("File {} deleted successfully", filename),
    })))
}

/// Handler for the resource listing
async fn handle_list_resources(
    State(server): State<Arc<DataLensServer>>,
) -> ServerResult<impl IntoResponse> {
    let resources = server.list_resources().await?;
    Ok(Json(json!({ "resources": resources })))
}

/// Handler for reading one resource as JSON records
async fn handle_read_resource(
    State(server): State<Arc<DataLensServer>>,
    Path(uri): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let filename = uri
        .strip_prefix("file://")
        .ok_or_else(|| ServerError::NotFound(format!("Resource {}", uri)))?;
    Ok(Json(server.read_resource(filename).await?))
}

/// Extract a required string argument from a tool call body
fn require_str(arguments: &serde_json::Value, key: &str) -> ServerResult<String> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| ServerError::Validation(format!("{} is required", key)))
}
