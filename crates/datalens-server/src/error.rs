//! Error types for the DataLens Server
//!
//! The five-way taxonomy every request resolves to: absent resources, bad
//! client input, failed filter/expression/parse work, expression timeouts, and
//! disk failures. Everything except `Io` is recoverable at the request
//! boundary; no variant is fatal to the serving process.

use thiserror::Error;

use datalens_frame::FrameError;
use datalens_store::StoreError;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    /// Resource (file, session, query id, tool) not found
    #[error("{0} not found")]
    NotFound(String),

    /// Client-side validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filter/expression evaluation error or parse failure on read
    #[error("Execution error: {0}")]
    Execution(String),

    /// Expression evaluation exceeded its budget
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Disk read/write failure
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(filename) => ServerError::NotFound(format!("File {}", filename)),
            StoreError::InvalidName(_) | StoreError::UnsupportedExtension(_) => {
                ServerError::Validation(err.to_string())
            }
            StoreError::Parse { .. } => ServerError::Execution(err.to_string()),
            StoreError::Io(_) | StoreError::Serialization(_) => ServerError::Io(err.to_string()),
        }
    }
}

impl From<FrameError> for ServerError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::UnknownColumn(_) | FrameError::UnsupportedExtension(_) => {
                ServerError::Validation(err.to_string())
            }
            FrameError::Parse { .. } | FrameError::Syntax(_) | FrameError::Eval(_) => {
                ServerError::Execution(err.to_string())
            }
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Validation(format!("JSON error: {}", err))
    }
}

impl ServerError {
    /// Check if the error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServerError::Timeout(_))
    }

    /// Check if the error should be retried by the caller as-is
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::NotFound(_) | ServerError::Validation(_) | ServerError::Execution(_)
        )
    }
}
