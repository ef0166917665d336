//! Cell values
//!
//! A [`Value`] is one cell of a parsed dataset. Values are inferred from the raw
//! text on CSV import (and from the native cell types on Excel import) and keep
//! their inferred type through filtering, sorting and aggregation.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// One cell of a tabular snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Empty cell
    Null,
    /// Boolean cell
    Bool(bool),
    /// Integer cell
    Int(i64),
    /// Floating point cell
    Float(f64),
    /// Text cell
    Str(String),
}

impl Value {
    /// Infer a value from one raw CSV field
    pub fn infer(field: &str) -> Value {
        if field.is_empty() {
            return Value::Null;
        }
        match field {
            "true" | "True" | "TRUE" => return Value::Bool(true),
            "false" | "False" | "FALSE" => return Value::Bool(false),
            _ => {}
        }
        if let Ok(i) = field.parse::<i64>() {
            return Value::Int(i);
        }
        // Only treat numeric-looking fields as floats so "NaN", "inf" and
        // version-like strings stay textual.
        if field
            .chars()
            .next()
            .map(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.')
            .unwrap_or(false)
        {
            if let Ok(f) = field.parse::<f64>() {
                if f.is_finite() {
                    return Value::Float(f);
                }
            }
        }
        Value::Str(field.to_string())
    }

    /// True for the empty cell
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Type tag used in error messages and result summaries
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
        }
    }

    /// JSON rendering of the value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => {
                // JSON has no NaN/Infinity; fall back to the string rendering
                // rather than erroring.
                serde_json::Number::from_f64(*f)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| serde_json::Value::String(f.to_string()))
            }
            Value::Str(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Ordering comparison between two values of compatible types.
    ///
    /// Numbers compare numerically across Int/Float. Returns `None` when the
    /// types cannot be ordered against each other, or when either side is null.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
        }
    }

    /// Total ordering used for sorting: nulls first, then by type group
    /// (bool, numeric, text), then by value.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        fn rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::Str(_) => 3,
            }
        }
        match self.compare(other) {
            Some(ord) => ord,
            None => rank(self).cmp(&rank(other)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}
