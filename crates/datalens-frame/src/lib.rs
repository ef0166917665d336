//! DataLens Frame
//!
//! Tabular snapshot model for the DataLens platform. A [`Frame`] is an in-memory
//! parsed representation of one dataset's rows and columns at a point in time;
//! this crate owns parsing uploaded CSV/Excel bytes into frames, per-column summary
//! statistics, and the closed expression language used for row filters and
//! engine-interpreted query pipelines.
//!
//! The crate is deliberately synchronous and free of I/O side effects: callers hand
//! it byte buffers and expression strings and get values back.

pub mod error;
pub mod expr;
pub mod frame;
pub mod parse;
pub mod stats;
pub mod value;

pub use error::FrameError;
pub use frame::{Frame, JsonMap};
pub use parse::{parse_bytes, FileKind};
pub use value::Value;

/// Result type for frame operations
pub type FrameResult<T> = Result<T, FrameError>;
