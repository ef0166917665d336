//! Dataset parsing
//!
//! Turns uploaded CSV/Excel bytes into a [`Frame`]. The first row is always the
//! header; data types are inferred per cell (CSV) or taken from the native cell
//! type (Excel). Parsing never touches the filesystem: stores hand in bytes.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::frame::Frame;
use crate::value::Value;
use crate::FrameResult;

/// Supported dataset formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    /// Comma-separated values (.csv)
    Csv,
    /// Excel workbook (.xlsx / .xls)
    Excel,
}

impl FileKind {
    /// Classify a filename by extension, case-insensitively
    pub fn from_filename(filename: &str) -> Option<FileKind> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".csv") {
            Some(FileKind::Csv)
        } else if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            Some(FileKind::Excel)
        } else {
            None
        }
    }

    /// Wire name of the format
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Excel => "excel",
        }
    }
}

/// Parse dataset bytes into a frame, dispatching on the filename extension
pub fn parse_bytes(filename: &str, bytes: &[u8]) -> FrameResult<Frame> {
    match FileKind::from_filename(filename) {
        Some(FileKind::Csv) => parse_csv(bytes),
        Some(FileKind::Excel) => parse_excel(bytes),
        None => Err(FrameError::UnsupportedExtension(filename.to_string())),
    }
}

fn parse_csv(bytes: &[u8]) -> FrameResult<Frame> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| FrameError::parse("csv", e.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(FrameError::parse("csv", "missing header row"));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| FrameError::parse("csv", e.to_string()))?;
        rows.push(record.iter().map(Value::infer).collect());
    }

    Ok(Frame::new(headers, rows))
}

fn parse_excel(bytes: &[u8]) -> FrameResult<Frame> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| FrameError::parse("excel", e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| FrameError::parse("excel", "workbook has no sheets"))?
        .map_err(|e| FrameError::parse("excel", e.to_string()))?;

    let mut row_iter = range.rows();
    let header_row = row_iter
        .next()
        .ok_or_else(|| FrameError::parse("excel", "missing header row"))?;

    let columns: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Data::Empty => format!("column_{}", i),
            other => other.to_string(),
        })
        .collect();

    let rows = row_iter
        .map(|row| row.iter().map(cell_value).collect())
        .collect();

    Ok(Frame::new(columns, rows))
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::Str(s.clone()),
        Data::Float(f) => Value::Float(*f),
        Data::Int(i) => Value::Int(*i),
        Data::Bool(b) => Value::Bool(*b),
        // Error cells (#DIV/0! etc.) carry no usable value
        Data::Error(_) => Value::Null,
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Value::Str(naive.to_string()),
            None => Value::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) => Value::Str(s.clone()),
        Data::DurationIso(s) => Value::Str(s.clone()),
    }
}
