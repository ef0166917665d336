//! Tabular snapshot
//!
//! A [`Frame`] holds the parsed rows and ordered column names of one dataset.
//! Frames are immutable once built; every transforming operation returns a new
//! frame so a cached snapshot can be shared read-only across concurrent queries.

use crate::error::FrameError;
use crate::value::Value;
use crate::FrameResult;

/// JSON object preserving key insertion order
pub type JsonMap = serde_json::Map<String, serde_json::Value>;

/// In-memory parsed representation of a dataset at a point in time
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Build a frame from ordered column names and rows.
    ///
    /// Rows are normalized to the column width: short rows are padded with
    /// nulls, long rows are truncated. Ragged input therefore never panics.
    pub fn new(columns: Vec<String>, mut rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        for row in rows.iter_mut() {
            row.resize(width, Value::Null);
        }
        Self { columns, rows }
    }

    /// Ordered column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows, in insertion order
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of data rows (header excluded)
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> FrameResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| FrameError::UnknownColumn(name.to_string()))
    }

    /// First `limit` rows (or all rows) as ordered column→value records
    pub fn records(&self, limit: Option<usize>) -> Vec<JsonMap> {
        let take = limit.unwrap_or(self.rows.len());
        self.rows
            .iter()
            .take(take)
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect()
            })
            .collect()
    }

    /// New frame containing only the named columns, in the requested order
    pub fn select(&self, names: &[String]) -> FrameResult<Frame> {
        let indices = names
            .iter()
            .map(|name| self.column_index(name))
            .collect::<FrameResult<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Frame::new(names.to_vec(), rows))
    }

    /// New frame with rows ordered by one column (stable sort, nulls first)
    pub fn sort_by(&self, column: &str, descending: bool) -> FrameResult<Frame> {
        let idx = self.column_index(column)?;
        let mut rows = self.rows.clone();
        rows.sort_by(|a, b| a[idx].sort_cmp(&b[idx]));
        if descending {
            rows.reverse();
        }
        Ok(Frame::new(self.columns.clone(), rows))
    }

    /// New frame restricted to the first `n` rows
    pub fn limit(&self, n: usize) -> Frame {
        Frame::new(
            self.columns.clone(),
            self.rows.iter().take(n).cloned().collect(),
        )
    }

    /// Numeric view of one column, nulls skipped.
    ///
    /// Any non-null, non-numeric cell is an evaluation error.
    pub fn numeric_column(&self, column: &str) -> FrameResult<Vec<f64>> {
        let idx = self.column_index(column)?;
        let mut out = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            match &row[idx] {
                Value::Null => {}
                v => match v.as_f64() {
                    Some(f) => out.push(f),
                    None => {
                        return Err(FrameError::Eval(format!(
                            "column {} contains non-numeric value {:?}",
                            column, v
                        )))
                    }
                },
            }
        }
        Ok(out)
    }

    /// Arithmetic sum of one numeric column (0.0 for an empty column)
    pub fn sum(&self, column: &str) -> FrameResult<f64> {
        Ok(self.numeric_column(column)?.iter().sum())
    }

    /// Arithmetic mean of one numeric column
    pub fn mean(&self, column: &str) -> FrameResult<f64> {
        let values = self.numeric_column(column)?;
        if values.is_empty() {
            return Err(FrameError::Eval(format!(
                "column {} has no numeric values to average",
                column
            )));
        }
        Ok(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Smallest non-null value of one column (null for an empty column)
    pub fn min(&self, column: &str) -> FrameResult<Value> {
        self.extremum(column, std::cmp::Ordering::Less)
    }

    /// Largest non-null value of one column (null for an empty column)
    pub fn max(&self, column: &str) -> FrameResult<Value> {
        self.extremum(column, std::cmp::Ordering::Greater)
    }

    fn extremum(&self, column: &str, keep: std::cmp::Ordering) -> FrameResult<Value> {
        let idx = self.column_index(column)?;
        let mut best: Option<&Value> = None;
        for row in &self.rows {
            let v = &row[idx];
            if v.is_null() {
                continue;
            }
            best = match best {
                None => Some(v),
                Some(b) => {
                    if v.sort_cmp(b) == keep {
                        Some(v)
                    } else {
                        Some(b)
                    }
                }
            };
        }
        Ok(best.cloned().unwrap_or(Value::Null))
    }

    /// Inferred type tag of one column: the single non-null value type, or
    /// "mixed" when several types are present, or "null" for an empty column.
    pub fn column_type_name(&self, index: usize) -> &'static str {
        let mut seen: Option<&'static str> = None;
        let mut has_float = false;
        let mut numeric_only = true;
        for row in &self.rows {
            let v = &row[index];
            if v.is_null() {
                continue;
            }
            if let Value::Float(_) = v {
                has_float = true;
            }
            if v.as_f64().is_none() {
                numeric_only = false;
            }
            match seen {
                None => seen = Some(v.type_name()),
                Some(t) if t == v.type_name() => {}
                Some(_) => {
                    // Int and Float mix to "float"; anything else is "mixed"
                    if numeric_only {
                        seen = Some("float");
                    } else {
                        return "mixed";
                    }
                }
            }
        }
        match seen {
            None => "null",
            Some("int") if has_float => "float",
            Some(t) => t,
        }
    }

    /// Number of non-null cells in one column
    pub fn non_null_count(&self, index: usize) -> usize {
        self.rows.iter().filter(|row| !row[index].is_null()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Frame {
        Frame::new(
            vec!["name".into(), "score".into()],
            vec![
                vec![Value::Str("ana".into()), Value::Int(3)],
                vec![Value::Str("bo".into()), Value::Int(1)],
                vec![Value::Str("cy".into()), Value::Float(2.5)],
            ],
        )
    }

    #[test]
    fn pads_ragged_rows_with_nulls() {
        let frame = Frame::new(
            vec!["a".into(), "b".into()],
            vec![vec![Value::Int(1)], vec![Value::Int(2), Value::Int(3)]],
        );
        assert_eq!(frame.rows()[0], vec![Value::Int(1), Value::Null]);
    }

    #[test]
    fn records_preserve_column_order() {
        let records = sample().records(Some(1));
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, vec!["name", "score"]);
    }

    #[test]
    fn select_reorders_columns() {
        let selected = sample().select(&["score".into(), "name".into()]).unwrap();
        assert_eq!(selected.columns(), &["score".to_string(), "name".to_string()]);
        assert_eq!(selected.rows()[0][0], Value::Int(3));
    }

    #[test]
    fn select_unknown_column_errors() {
        let err = sample().select(&["missing".into()]).unwrap_err();
        assert!(matches!(err, FrameError::UnknownColumn(c) if c == "missing"));
    }

    #[test]
    fn sorts_numerically_across_int_and_float() {
        let sorted = sample().sort_by("score", false).unwrap();
        assert_eq!(sorted.rows()[0][1], Value::Int(1));
        assert_eq!(sorted.rows()[1][1], Value::Float(2.5));
        assert_eq!(sorted.rows()[2][1], Value::Int(3));
    }

    #[test]
    fn aggregates_skip_nulls_and_reject_text() {
        let frame = Frame::new(
            vec!["x".into()],
            vec![
                vec![Value::Int(1)],
                vec![Value::Null],
                vec![Value::Float(2.0)],
            ],
        );
        assert_eq!(frame.sum("x").unwrap(), 3.0);
        assert_eq!(frame.mean("x").unwrap(), 1.5);

        let dirty = Frame::new(
            vec!["x".into()],
            vec![vec![Value::Int(1)], vec![Value::Str("oops".into())]],
        );
        assert!(matches!(dirty.sum("x"), Err(FrameError::Eval(_))));
    }

    #[test]
    fn column_type_names() {
        let frame = Frame::new(
            vec!["i".into(), "f".into(), "m".into(), "e".into()],
            vec![
                vec![
                    Value::Int(1),
                    Value::Float(1.0),
                    Value::Int(1),
                    Value::Null,
                ],
                vec![
                    Value::Int(2),
                    Value::Int(2),
                    Value::Str("x".into()),
                    Value::Null,
                ],
            ],
        );
        assert_eq!(frame.column_type_name(0), "int");
        assert_eq!(frame.column_type_name(1), "float");
        assert_eq!(frame.column_type_name(2), "mixed");
        assert_eq!(frame.column_type_name(3), "null");
    }
}
