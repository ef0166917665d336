//! Recursive-descent parser for predicates and pipelines
//!
//! Precedence, loosest to tightest: or, and, not, comparison, additive,
//! multiplicative, unary minus. Comparisons do not chain (`a < b < c` is a
//! syntax error rather than a surprise).

use super::lexer::{tokenize, Token};
use super::{BinaryOp, Expr, Pipeline, Stage, UnaryOp};
use crate::error::FrameError;
use crate::value::Value;
use crate::FrameResult;

/// Default row count for `head` with no argument
const DEFAULT_HEAD: usize = 5;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> FrameResult<Self> {
        if input.trim().is_empty() {
            return Err(FrameError::Syntax("empty expression".to_string()));
        }
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    /// Parse the whole input as a boolean row filter
    pub fn parse_predicate(mut self) -> FrameResult<Expr> {
        let expr = self.parse_or()?;
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse the whole input as a `|`-chained pipeline
    pub fn parse_pipeline(mut self) -> FrameResult<Pipeline> {
        let mut stages = vec![self.parse_stage()?];
        while self.eat(&Token::Pipe) {
            stages.push(self.parse_stage()?);
        }
        self.expect_end()?;

        // Terminal stages produce a scalar/mapping and cannot feed later stages
        for (i, stage) in stages.iter().enumerate() {
            if stage.is_terminal() && i + 1 != stages.len() {
                return Err(FrameError::Syntax(format!(
                    "aggregation stage must be the last stage of the pipeline (stage {})",
                    i + 1
                )));
            }
        }

        Ok(Pipeline { stages })
    }

    fn parse_stage(&mut self) -> FrameResult<Stage> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            other => {
                return Err(FrameError::Syntax(format!(
                    "expected a pipeline stage name, found {:?}",
                    other
                )))
            }
        };
        self.expect(Token::LParen)?;

        let stage = match name.to_ascii_lowercase().as_str() {
            "select" => {
                let mut cols = vec![self.expect_ident()?];
                while self.eat(&Token::Comma) {
                    cols.push(self.expect_ident()?);
                }
                Stage::Select(cols)
            }
            "filter" => Stage::Filter(self.parse_or()?),
            "sort" => {
                let column = self.expect_ident()?;
                let descending = if self.eat(&Token::Comma) {
                    match self.next() {
                        Some(Token::Asc) => false,
                        Some(Token::Desc) => true,
                        other => {
                            return Err(FrameError::Syntax(format!(
                                "expected asc or desc in sort(), found {:?}",
                                other
                            )))
                        }
                    }
                } else {
                    false
                };
                Stage::Sort { column, descending }
            }
            "limit" => Stage::Limit(self.expect_count("limit")?),
            "head" => {
                if self.peek() == Some(&Token::RParen) {
                    Stage::Limit(DEFAULT_HEAD)
                } else {
                    Stage::Limit(self.expect_count("head")?)
                }
            }
            "sum" => Stage::Sum(self.expect_ident()?),
            "avg" | "mean" | "average" => Stage::Avg(self.expect_ident()?),
            "min" => Stage::Min(self.expect_ident()?),
            "max" => Stage::Max(self.expect_ident()?),
            "count" => Stage::Count,
            "describe" => Stage::Describe,
            other => {
                return Err(FrameError::Syntax(format!(
                    "unknown pipeline stage '{}'",
                    other
                )))
            }
        };

        self.expect(Token::RParen)?;
        Ok(stage)
    }

    fn parse_or(&mut self) -> FrameResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> FrameResult<Expr> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> FrameResult<Expr> {
        if self.eat(&Token::Not) {
            let expr = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> FrameResult<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::EqEq) => Some(BinaryOp::Eq),
            Some(Token::NotEq) => Some(BinaryOp::Ne),
            Some(Token::Lt) => Some(BinaryOp::Lt),
            Some(Token::Le) => Some(BinaryOp::Le),
            Some(Token::Gt) => Some(BinaryOp::Gt),
            Some(Token::Ge) => Some(BinaryOp::Ge),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let rhs = self.parse_additive()?;
                Ok(binary(op, lhs, rhs))
            }
            None => Ok(lhs),
        }
    }

    fn parse_additive(&mut self) -> FrameResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> FrameResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> FrameResult<Expr> {
        if self.eat(&Token::Minus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> FrameResult<Expr> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Column(name)),
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            other => Err(FrameError::Syntax(format!(
                "expected a value, column or '(', found {:?}",
                other
            ))),
        }
    }

    fn expect_ident(&mut self) -> FrameResult<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(FrameError::Syntax(format!(
                "expected a column name, found {:?}",
                other
            ))),
        }
    }

    fn expect_count(&mut self, stage: &str) -> FrameResult<usize> {
        match self.next() {
            Some(Token::Int(i)) if i >= 0 => Ok(i as usize),
            other => Err(FrameError::Syntax(format!(
                "{}() takes a non-negative row count, found {:?}",
                stage, other
            ))),
        }
    }

    fn expect(&mut self, token: Token) -> FrameResult<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(FrameError::Syntax(format!(
                "expected {:?}, found {:?}",
                token,
                self.peek()
            )))
        }
    }

    fn expect_end(&self) -> FrameResult<()> {
        match self.peek() {
            None => Ok(()),
            Some(tok) => Err(FrameError::Syntax(format!(
                "unexpected trailing input at {:?}",
                tok
            ))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
