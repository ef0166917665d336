//! Query engine
//!
//! Executes one of a closed set of named operations against a cached dataset
//! snapshot, optionally after a row filter. The open-ended `execute` operation
//! interprets the whitelisted pipeline grammar from `datalens-frame` under an
//! enforced timeout; query text is untrusted input regardless of which planner
//! produced it, and is never evaluated as code.

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use datalens_frame::expr::{self, EvalOutput};
use datalens_frame::{stats, Frame, Value};

use crate::cache::FreshnessCache;
use crate::error::{ServerError, ServerResult};

/// Default row count for `head`
const DEFAULT_HEAD_ROWS: usize = 5;

/// Arguments of one `query_data` call
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub filename: String,
    pub operation: String,
    /// Column for `average`/`sum`
    #[serde(default)]
    pub column: Option<String>,
    /// Row count for `head`
    #[serde(default)]
    pub n: Option<usize>,
    /// Optional row filter applied before the operation
    #[serde(default)]
    pub filter: Option<String>,
    /// Pipeline expression for the `execute` operation
    #[serde(default)]
    pub code: Option<String>,
    /// Caller-supplied provenance id
    #[serde(default)]
    pub query_id: Option<String>,
    /// Session to append the answer to
    #[serde(default)]
    pub session_id: Option<String>,
    /// Question text for the history entry
    #[serde(default)]
    pub question: Option<String>,
}

/// Normalized result of one executed operation
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// JSON-shaped result, deterministic and order-preserving for rows
    pub result: serde_json::Value,
    /// Type tag recorded in provenance ("records", "mapping", "number", ...)
    pub result_type: String,
    /// Columns the operation touched
    pub columns_used: Vec<String>,
}

/// Executes operations against snapshots obtained from the freshness cache
pub struct QueryEngine {
    cache: Arc<FreshnessCache>,
    timeout: Duration,
}

impl QueryEngine {
    /// Create an engine over a cache with an expression evaluation budget
    pub fn new(cache: Arc<FreshnessCache>, timeout: Duration) -> Self {
        Self { cache, timeout }
    }

    /// Execute one operation, applying the row filter first when present
    pub async fn execute(&self, request: &QueryRequest) -> ServerResult<QueryOutcome> {
        let snapshot = self.cache.read(&request.filename).await?;

        // An invalid predicate is rejected whole; it is never applied partially.
        let filtered = match &request.filter {
            Some(filter) => {
                let predicate = expr::parse_predicate(filter)
                    .map_err(|e| ServerError::Execution(format!("Invalid filter expression: {}", e)))?;
                Some(expr::eval_predicate(&predicate, &snapshot.frame)?)
            }
            None => None,
        };
        let frame: &Frame = filtered.as_ref().unwrap_or_else(|| snapshot.frame.as_ref());

        debug!(
            filename = %request.filename,
            operation = %request.operation,
            rows = frame.row_count(),
            "Executing query"
        );

        match request.operation.as_str() {
            "head" => {
                let n = request.n.unwrap_or(DEFAULT_HEAD_ROWS);
                let records = frame.records(Some(n));
                Ok(QueryOutcome {
                    result: serde_json::Value::Array(
                        records.into_iter().map(serde_json::Value::Object).collect(),
                    ),
                    result_type: "records".to_string(),
                    columns_used: frame.columns().to_vec(),
                })
            }
            "average" => {
                let column = require_column(request, "average")?;
                let mean = frame.mean(&column)?;
                Ok(scalar_outcome(Value::Float(mean), vec![column]))
            }
            "sum" => {
                let column = require_column(request, "sum")?;
                let sum = frame.sum(&column)?;
                Ok(scalar_outcome(Value::Float(sum), vec![column]))
            }
            "count" => Ok(scalar_outcome(
                Value::Int(frame.row_count() as i64),
                Vec::new(),
            )),
            "describe" => Ok(QueryOutcome {
                result: serde_json::Value::Object(stats::describe(frame)),
                result_type: "mapping".to_string(),
                columns_used: frame.columns().to_vec(),
            }),
            "execute" => {
                let code = request.code.as_deref().ok_or_else(|| {
                    ServerError::Validation("code is required for execute operation".to_string())
                })?;
                let pipeline = expr::parse_pipeline(code)
                    .map_err(|e| ServerError::Execution(format!("Error executing code: {}", e)))?;
                let columns_used = pipeline.referenced_columns();

                // Evaluation runs on the blocking pool under the configured budget
                let work_frame = frame.clone();
                let evaluated = tokio::time::timeout(
                    self.timeout,
                    tokio::task::spawn_blocking(move || expr::eval_pipeline(&pipeline, &work_frame)),
                )
                .await
                .map_err(|_| ServerError::Timeout(self.timeout.as_millis() as u64))?
                .map_err(|e| ServerError::Execution(format!("Expression task failed: {}", e)))?
                .map_err(|e| ServerError::Execution(format!("Error executing code: {}", e)))?;

                Ok(normalize(evaluated, columns_used))
            }
            other => Err(ServerError::Validation(format!(
                "Unsupported operation: {}",
                other
            ))),
        }
    }
}

fn require_column(request: &QueryRequest, operation: &str) -> ServerResult<String> {
    request.column.clone().ok_or_else(|| {
        ServerError::Validation(format!("column is required for {} operation", operation))
    })
}

fn scalar_outcome(value: Value, columns_used: Vec<String>) -> QueryOutcome {
    let result_type = json_type_name(&value).to_string();
    QueryOutcome {
        result: value.to_json(),
        result_type,
        columns_used,
    }
}

/// Normalize a pipeline result: rows become ordered records, describe output
/// becomes a mapping, anything else is the raw scalar
fn normalize(output: EvalOutput, columns_used: Vec<String>) -> QueryOutcome {
    match output {
        EvalOutput::Rows(frame) => QueryOutcome {
            result: serde_json::Value::Array(
                frame
                    .records(None)
                    .into_iter()
                    .map(serde_json::Value::Object)
                    .collect(),
            ),
            result_type: "records".to_string(),
            columns_used,
        },
        EvalOutput::Scalar(value) => {
            let result_type = json_type_name(&value).to_string();
            QueryOutcome {
                result: value.to_json(),
                result_type,
                columns_used,
            }
        }
        EvalOutput::Mapping(map) => QueryOutcome {
            result: serde_json::Value::Object(map),
            result_type: "mapping".to_string(),
            columns_used,
        },
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) | Value::Float(_) => "number",
        Value::Str(_) => "string",
    }
}
