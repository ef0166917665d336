//! Per-column summary statistics
//!
//! Numeric columns get count/mean/std/min/quartiles/max; other columns get
//! count/unique/top/freq. The output is a column→(statistic→value) mapping with
//! column order preserved.

use std::collections::HashMap;

use crate::frame::{Frame, JsonMap};
use crate::value::Value;

/// Describe every column of a frame
pub fn describe(frame: &Frame) -> JsonMap {
    let mut out = JsonMap::new();
    for (idx, name) in frame.columns().iter().enumerate() {
        let stats = match frame.numeric_column(name) {
            Ok(values) if !values.is_empty() => numeric_stats(&values),
            _ => categorical_stats(frame, idx),
        };
        out.insert(name.clone(), serde_json::Value::Object(stats));
    }
    out
}

fn numeric_stats(values: &[f64]) -> JsonMap {
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    // Sample standard deviation (ddof = 1); undefined for a single value
    let std = if count > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        Some(var.sqrt())
    } else {
        None
    };

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut stats = JsonMap::new();
    stats.insert("count".into(), json_number(count as f64));
    stats.insert("mean".into(), json_number(mean));
    stats.insert(
        "std".into(),
        std.map(json_number).unwrap_or(serde_json::Value::Null),
    );
    stats.insert("min".into(), json_number(sorted[0]));
    stats.insert("25%".into(), json_number(percentile(&sorted, 0.25)));
    stats.insert("50%".into(), json_number(percentile(&sorted, 0.5)));
    stats.insert("75%".into(), json_number(percentile(&sorted, 0.75)));
    stats.insert("max".into(), json_number(sorted[count - 1]));
    stats
}

fn categorical_stats(frame: &Frame, index: usize) -> JsonMap {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();
    let mut total = 0usize;
    for row in frame.rows() {
        let v = &row[index];
        if v.is_null() {
            continue;
        }
        total += 1;
        let key = v.to_string();
        if !counts.contains_key(&key) {
            first_seen.push(key.clone());
        }
        *counts.entry(key).or_insert(0) += 1;
    }

    // Most frequent value; earlier first occurrence wins ties so the result
    // is deterministic.
    let top = first_seen
        .iter()
        .max_by_key(|key| counts.get(*key).copied().unwrap_or(0))
        .cloned();
    let freq = top.as_ref().and_then(|key| counts.get(key)).copied();

    let mut stats = JsonMap::new();
    stats.insert("count".into(), json_number(total as f64));
    stats.insert("unique".into(), json_number(counts.len() as f64));
    stats.insert(
        "top".into(),
        top.map(serde_json::Value::String)
            .unwrap_or(serde_json::Value::Null),
    );
    stats.insert(
        "freq".into(),
        freq.map(|f| json_number(f as f64))
            .unwrap_or(serde_json::Value::Null),
    );
    stats
}

/// Linear-interpolated percentile over a sorted slice
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = pos - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

fn json_number(value: f64) -> serde_json::Value {
    Value::Float(value).to_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn frame() -> Frame {
        Frame::new(
            vec!["score".into(), "region".into()],
            vec![
                vec![Value::Int(1), Value::Str("eu".into())],
                vec![Value::Int(2), Value::Str("us".into())],
                vec![Value::Int(3), Value::Str("eu".into())],
                vec![Value::Int(4), Value::Null],
            ],
        )
    }

    #[test]
    fn numeric_columns_get_quartiles() {
        let stats = describe(&frame());
        let score = stats["score"].as_object().unwrap();
        assert_eq!(score["count"], serde_json::json!(4.0));
        assert_eq!(score["mean"], serde_json::json!(2.5));
        assert_eq!(score["min"], serde_json::json!(1.0));
        assert_eq!(score["50%"], serde_json::json!(2.5));
        assert_eq!(score["max"], serde_json::json!(4.0));
    }

    #[test]
    fn text_columns_get_frequency_stats() {
        let stats = describe(&frame());
        let region = stats["region"].as_object().unwrap();
        assert_eq!(region["count"], serde_json::json!(3.0));
        assert_eq!(region["unique"], serde_json::json!(2.0));
        assert_eq!(region["top"], serde_json::json!("eu"));
        assert_eq!(region["freq"], serde_json::json!(2.0));
    }

    #[test]
    fn column_order_is_preserved() {
        let stats = describe(&frame());
        let keys: Vec<&String> = stats.keys().collect();
        assert_eq!(keys, vec!["score", "region"]);
    }
}
