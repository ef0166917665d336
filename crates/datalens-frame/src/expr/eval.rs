//! Interpreter for predicates and pipelines
//!
//! Evaluation is row-at-a-time over an immutable frame. Nulls propagate through
//! arithmetic and comparisons (a row whose predicate evaluates to null is
//! dropped, matching the usual tabular semantics), and type mismatches are
//! reported as evaluation errors rather than coerced.

use super::{BinaryOp, Expr, Pipeline, Stage, UnaryOp};
use crate::error::FrameError;
use crate::frame::{Frame, JsonMap};
use crate::stats;
use crate::value::Value;
use crate::FrameResult;

/// Result of evaluating a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutput {
    /// Row-shaped result
    Rows(Frame),
    /// Single scalar result
    Scalar(Value),
    /// Mapping-shaped result (describe)
    Mapping(JsonMap),
}

/// Filter a frame down to the rows matching a predicate
pub fn eval_predicate(expr: &Expr, frame: &Frame) -> FrameResult<Frame> {
    let mut rows = Vec::new();
    for row in frame.rows() {
        match eval_expr(expr, frame, row)? {
            Value::Bool(true) => rows.push(row.clone()),
            Value::Bool(false) | Value::Null => {}
            other => {
                return Err(FrameError::Eval(format!(
                    "filter predicate must evaluate to a boolean, got {}",
                    other.type_name()
                )))
            }
        }
    }
    Ok(Frame::new(frame.columns().to_vec(), rows))
}

/// Run a pipeline against a frame
pub fn eval_pipeline(pipeline: &Pipeline, frame: &Frame) -> FrameResult<EvalOutput> {
    let mut current = frame.clone();
    for stage in &pipeline.stages {
        match stage {
            Stage::Select(cols) => current = current.select(cols)?,
            Stage::Filter(expr) => current = eval_predicate(expr, &current)?,
            Stage::Sort { column, descending } => {
                current = current.sort_by(column, *descending)?
            }
            Stage::Limit(n) => current = current.limit(*n),
            Stage::Sum(col) => return Ok(EvalOutput::Scalar(Value::Float(current.sum(col)?))),
            Stage::Avg(col) => return Ok(EvalOutput::Scalar(Value::Float(current.mean(col)?))),
            Stage::Min(col) => return Ok(EvalOutput::Scalar(current.min(col)?)),
            Stage::Max(col) => return Ok(EvalOutput::Scalar(current.max(col)?)),
            Stage::Count => {
                return Ok(EvalOutput::Scalar(Value::Int(current.row_count() as i64)))
            }
            Stage::Describe => return Ok(EvalOutput::Mapping(stats::describe(&current))),
        }
    }
    Ok(EvalOutput::Rows(current))
}

fn eval_expr(expr: &Expr, frame: &Frame, row: &[Value]) -> FrameResult<Value> {
    match expr {
        Expr::Column(name) => {
            let idx = frame.column_index(name)?;
            Ok(row.get(idx).cloned().unwrap_or(Value::Null))
        }
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Unary { op, expr } => {
            let value = eval_expr(expr, frame, row)?;
            apply_unary(*op, value)
        }
        Expr::Binary { op, lhs, rhs } => match op {
            // Short-circuiting boolean operators
            BinaryOp::And => {
                match eval_expr(lhs, frame, row)? {
                    Value::Bool(false) => return Ok(Value::Bool(false)),
                    Value::Bool(true) => {}
                    Value::Null => {
                        // null and false is still false
                        return match eval_expr(rhs, frame, row)? {
                            Value::Bool(false) => Ok(Value::Bool(false)),
                            Value::Bool(true) | Value::Null => Ok(Value::Null),
                            other => Err(bool_expected("and", &other)),
                        };
                    }
                    other => return Err(bool_expected("and", &other)),
                }
                match eval_expr(rhs, frame, row)? {
                    v @ (Value::Bool(_) | Value::Null) => Ok(v),
                    other => Err(bool_expected("and", &other)),
                }
            }
            BinaryOp::Or => {
                match eval_expr(lhs, frame, row)? {
                    Value::Bool(true) => return Ok(Value::Bool(true)),
                    Value::Bool(false) => {}
                    Value::Null => {
                        return match eval_expr(rhs, frame, row)? {
                            Value::Bool(true) => Ok(Value::Bool(true)),
                            Value::Bool(false) | Value::Null => Ok(Value::Null),
                            other => Err(bool_expected("or", &other)),
                        };
                    }
                    other => return Err(bool_expected("or", &other)),
                }
                match eval_expr(rhs, frame, row)? {
                    v @ (Value::Bool(_) | Value::Null) => Ok(v),
                    other => Err(bool_expected("or", &other)),
                }
            }
            _ => {
                let a = eval_expr(lhs, frame, row)?;
                let b = eval_expr(rhs, frame, row)?;
                apply_binary(*op, a, b)
            }
        },
    }
}

fn apply_unary(op: UnaryOp, value: Value) -> FrameResult<Value> {
    match (op, value) {
        (_, Value::Null) => Ok(Value::Null),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Not, other) => Err(bool_expected("not", &other)),
        (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(-i)),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, other) => Err(FrameError::Eval(format!(
            "cannot negate a {} value",
            other.type_name()
        ))),
    }
}

fn apply_binary(op: BinaryOp, a: Value, b: Value) -> FrameResult<Value> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => arithmetic(op, a, b),
        BinaryOp::Eq => Ok(equality(&a, &b).map(Value::Bool).unwrap_or(Value::Null)),
        BinaryOp::Ne => Ok(equality(&a, &b)
            .map(|eq| Value::Bool(!eq))
            .unwrap_or(Value::Null)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if a.is_null() || b.is_null() {
                return Ok(Value::Null);
            }
            match a.compare(&b) {
                Some(ord) => {
                    let result = match op {
                        BinaryOp::Lt => ord.is_lt(),
                        BinaryOp::Le => ord.is_le(),
                        BinaryOp::Gt => ord.is_gt(),
                        BinaryOp::Ge => ord.is_ge(),
                        _ => unreachable!(),
                    };
                    Ok(Value::Bool(result))
                }
                None => Err(FrameError::Eval(format!(
                    "cannot compare {} with {}",
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("handled in eval_expr"),
    }
}

/// Equality across values; null against anything is unknown
fn equality(a: &Value, b: &Value) -> Option<bool> {
    if a.is_null() || b.is_null() {
        return None;
    }
    match a.compare(b) {
        Some(ord) => Some(ord.is_eq()),
        // Incomparable types are simply unequal
        None => Some(false),
    }
}

fn arithmetic(op: BinaryOp, a: Value, b: Value) -> FrameResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }

    // Integer arithmetic stays integral while it fits; division is always float
    if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
        match op {
            BinaryOp::Add => {
                if let Some(v) = x.checked_add(*y) {
                    return Ok(Value::Int(v));
                }
            }
            BinaryOp::Sub => {
                if let Some(v) = x.checked_sub(*y) {
                    return Ok(Value::Int(v));
                }
            }
            BinaryOp::Mul => {
                if let Some(v) = x.checked_mul(*y) {
                    return Ok(Value::Int(v));
                }
            }
            BinaryOp::Div => {}
            _ => unreachable!(),
        }
    }

    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(FrameError::Eval(format!(
                "arithmetic requires numeric operands, got {} and {}",
                a.type_name(),
                b.type_name()
            )))
        }
    };
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(FrameError::Eval("division by zero".to_string()));
            }
            x / y
        }
        _ => unreachable!(),
    };
    Ok(Value::Float(result))
}

fn bool_expected(op: &str, got: &Value) -> FrameError {
    FrameError::Eval(format!(
        "'{}' requires boolean operands, got {}",
        op,
        got.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{parse_pipeline, parse_predicate};

    fn sales() -> Frame {
        Frame::new(
            vec!["region".into(), "revenue".into()],
            vec![
                vec![Value::Str("EU".into()), Value::Int(100)],
                vec![Value::Str("US".into()), Value::Int(250)],
                vec![Value::Str("EU".into()), Value::Int(50)],
                vec![Value::Str("APAC".into()), Value::Null],
            ],
        )
    }

    #[test]
    fn filters_rows_with_predicate() {
        let expr = parse_predicate("revenue > 75 and region == \"EU\"").unwrap();
        let filtered = eval_predicate(&expr, &sales()).unwrap();
        assert_eq!(filtered.row_count(), 1);
        assert_eq!(filtered.rows()[0][0], Value::Str("EU".into()));
    }

    #[test]
    fn null_rows_are_dropped_by_comparisons() {
        let expr = parse_predicate("revenue > 0").unwrap();
        let filtered = eval_predicate(&expr, &sales()).unwrap();
        // The APAC row has a null revenue and must not match
        assert_eq!(filtered.row_count(), 3);
    }

    #[test]
    fn arithmetic_in_predicates() {
        let expr = parse_predicate("revenue * 2 >= 200").unwrap();
        let filtered = eval_predicate(&expr, &sales()).unwrap();
        assert_eq!(filtered.row_count(), 2);
    }

    #[test]
    fn non_boolean_predicate_is_an_error() {
        let expr = parse_predicate("revenue + 1").unwrap();
        assert!(matches!(
            eval_predicate(&expr, &sales()),
            Err(FrameError::Eval(_))
        ));
    }

    #[test]
    fn unknown_column_in_predicate_errors() {
        let expr = parse_predicate("missing > 1").unwrap();
        assert!(matches!(
            eval_predicate(&expr, &sales()),
            Err(FrameError::UnknownColumn(_))
        ));
    }

    #[test]
    fn pipeline_filter_sort_head() {
        let pipeline =
            parse_pipeline("filter(revenue >= 50) | sort(revenue, desc) | head(2)").unwrap();
        match eval_pipeline(&pipeline, &sales()).unwrap() {
            EvalOutput::Rows(frame) => {
                assert_eq!(frame.row_count(), 2);
                assert_eq!(frame.rows()[0][1], Value::Int(250));
                assert_eq!(frame.rows()[1][1], Value::Int(100));
            }
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[test]
    fn pipeline_terminal_aggregates() {
        let sum = parse_pipeline("sum(revenue)").unwrap();
        assert_eq!(
            eval_pipeline(&sum, &sales()).unwrap(),
            EvalOutput::Scalar(Value::Float(400.0))
        );

        let count = parse_pipeline("filter(region == \"EU\") | count()").unwrap();
        assert_eq!(
            eval_pipeline(&count, &sales()).unwrap(),
            EvalOutput::Scalar(Value::Int(2))
        );
    }

    #[test]
    fn pipeline_select_projects_columns() {
        let pipeline = parse_pipeline("select(revenue) | head(1)").unwrap();
        match eval_pipeline(&pipeline, &sales()).unwrap() {
            EvalOutput::Rows(frame) => {
                assert_eq!(frame.columns(), &["revenue".to_string()]);
            }
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[test]
    fn division_by_zero_is_an_eval_error() {
        let expr = parse_predicate("revenue / 0 > 1").unwrap();
        assert!(matches!(
            eval_predicate(&expr, &sales()),
            Err(FrameError::Eval(_))
        ));
    }

    #[test]
    fn string_equality_and_incomparable_types() {
        let eq = parse_predicate("region == \"EU\"").unwrap();
        assert_eq!(eval_predicate(&eq, &sales()).unwrap().row_count(), 2);

        // Comparing a string column against a number is unequal, not an error
        let cross = parse_predicate("region == 7").unwrap();
        assert_eq!(eval_predicate(&cross, &sales()).unwrap().row_count(), 0);

        // ...but ordering across types is an error
        let ord = parse_predicate("region > 7").unwrap();
        assert!(matches!(
            eval_predicate(&ord, &sales()),
            Err(FrameError::Eval(_))
        ));
    }
}
