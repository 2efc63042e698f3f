//! Coil Expressions
//!
//! The typed expression layer of the Coil template engine:
//! structural shapes, the expression lexer and parser, the static shape
//! checker, compiled expression units and the runtime evaluator.
//!
//! # Examples
//!
//! ```
//! use std::collections::BTreeMap;
//! use coil_expr::{Expr, Shape, Value};
//!
//! let symbols: BTreeMap<String, Shape> = BTreeMap::new();
//! let expr = Expr::interpolated("Hello, ${name}!", &symbols).unwrap();
//! assert_eq!(expr.shape, Shape::Any);
//!
//! let mut env = BTreeMap::new();
//! env.insert("name".to_string(), Value::from("Ada"));
//! assert_eq!(expr.eval(&env).unwrap(), Value::from("Hello, Ada!"));
//! ```

pub mod ast;
pub mod checker;
pub mod compile;
pub mod eval;
pub mod expr_lexer;
pub mod expr_parser;
pub mod shape;
pub mod value;

pub use ast::{Expression, ExprKind};
pub use checker::Symbols;
pub use compile::{parse_shape_literal, CondOutcome, Expr, Matcher};
pub use eval::Env;
pub use expr_lexer::ExprLexerError;
pub use shape::Shape;
pub use value::{Html, Value};

/// Compile-time expression error with an offset into the expression text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Expression error at position {offset}: {message}")]
pub struct ExprError {
    pub message: String,
    pub offset: usize,
}

impl ExprError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

impl From<ExprLexerError> for ExprError {
    fn from(err: ExprLexerError) -> Self {
        Self {
            message: err.message,
            offset: err.span.start,
        }
    }
}

/// Runtime evaluation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("Type error: {0}")]
    Type(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Cannot decode as {shape}: {message}")]
    Decode { shape: String, message: String },

    #[error("Invalid argument to {function}: {message}")]
    Argument { function: String, message: String },
}

/// Format a number the way templates print it: integers without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}
