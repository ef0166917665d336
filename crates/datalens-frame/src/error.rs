//! Error types for frame parsing and expression evaluation

use thiserror::Error;

/// Errors produced while parsing dataset bytes or evaluating expressions
#[derive(Error, Debug)]
pub enum FrameError {
    /// File extension is not one of csv/xlsx/xls
    #[error("Unsupported file extension for {0}: only .csv, .xlsx and .xls are allowed")]
    UnsupportedExtension(String),

    /// The raw bytes could not be parsed into a tabular snapshot
    #[error("Failed to parse {kind} data: {message}")]
    Parse {
        /// Source format ("csv" or "excel")
        kind: &'static str,
        /// Backing parser message
        message: String,
    },

    /// A referenced column does not exist in the frame
    #[error("Column {0} not found")]
    UnknownColumn(String),

    /// The expression text is not valid under the closed grammar
    #[error("Expression syntax error: {0}")]
    Syntax(String),

    /// The expression parsed but could not be evaluated against the data
    #[error("Expression evaluation error: {0}")]
    Eval(String),
}

impl FrameError {
    /// Shorthand for a parse failure
    pub fn parse(kind: &'static str, message: impl Into<String>) -> Self {
        FrameError::Parse {
            kind,
            message: message.into(),
        }
    }
}
