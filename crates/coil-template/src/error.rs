//! Error types for parsing, importing and rendering.

use std::fmt;

use coil_expr::EvalError;
use coil_lexer::{LexerError, Span};

/// Parse error with position information.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn at(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }
}

impl From<LexerError> for ParseError {
    fn from(e: LexerError) -> Self {
        Self {
            message: e.message,
            line: e.line,
            column: e.column,
        }
    }
}

/// All errors found while parsing one template, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseErrors(pub Vec<ParseError>);

impl ParseErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ParseError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ParseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseErrors {}

impl From<ParseError> for ParseErrors {
    fn from(e: ParseError) -> Self {
        Self(vec![e])
    }
}

/// Component lookup failure.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ImportError {
    #[error("Component not found: {0}")]
    NotFound(String),
}

/// Render-time error. Positions refer to the template the failing node is in.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("Type error at line {line}, column {column}: {message}")]
    Type {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Evaluation error at line {line}, column {column}: {error}")]
    Eval {
        error: EvalError,
        line: usize,
        column: usize,
    },

    #[error("Decode error at line {line}, column {column}: cannot decode as {shape}: {message}")]
    Decode {
        shape: String,
        message: String,
        line: usize,
        column: usize,
    },

    /// An error raised inside an imported component, with the import site.
    #[error("In component {name} at line {line}, column {column}: {inner}")]
    Component {
        name: String,
        line: usize,
        column: usize,
        inner: Box<RenderError>,
    },

    #[error("{}", join_lines(.0))]
    Multiple(Vec<RenderError>),
}

impl RenderError {
    /// Attach a source position to an evaluation error.
    pub fn eval(error: EvalError, span: Span) -> Self {
        let (line, column) = (span.line, span.column);
        match error {
            EvalError::Type(message) => RenderError::Type {
                message,
                line,
                column,
            },
            EvalError::Decode { shape, message } => RenderError::Decode {
                shape,
                message,
                line,
                column,
            },
            error => RenderError::Eval {
                error,
                line,
                column,
            },
        }
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        RenderError::Type {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }

    /// Collapse accumulated errors: `None` when empty, the error itself when single.
    pub fn collect(mut errors: Vec<RenderError>) -> Option<RenderError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(RenderError::Multiple(errors)),
        }
    }
}

fn join_lines(errors: &[RenderError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn span(line: usize, column: usize) -> Span {
        Span::new(0, 0, line, column)
    }

    #[test]
    fn test_parse_errors_display_one_per_line() {
        let errors = ParseErrors(vec![
            ParseError::at("first", span(1, 2)),
            ParseError::at("second", span(3, 4)),
        ]);
        assert_eq!(
            errors.to_string(),
            "Parse error at line 1, column 2: first\nParse error at line 3, column 4: second"
        );
    }

    #[test]
    fn test_eval_error_classification() {
        let err = RenderError::eval(EvalError::Type("bad".into()), span(2, 5));
        assert!(matches!(err, RenderError::Type { line: 2, column: 5, .. }));

        let err = RenderError::eval(EvalError::UnknownFunction("f".into()), span(1, 1));
        assert!(matches!(err, RenderError::Eval { .. }));
    }

    #[test]
    fn test_component_error_keeps_inner_location() {
        let inner = RenderError::type_error("not a list", span(7, 3));
        let err = RenderError::Component {
            name: "ui:card".into(),
            line: 1,
            column: 1,
            inner: Box::new(inner),
        };
        assert!(err.to_string().contains("line 7, column 3"));
    }

    #[test]
    fn test_collect() {
        assert_eq!(RenderError::collect(vec![]), None);
        let one = RenderError::type_error("x", span(1, 1));
        assert_eq!(RenderError::collect(vec![one.clone()]), Some(one.clone()));
        assert!(matches!(
            RenderError::collect(vec![one.clone(), one]),
            Some(RenderError::Multiple(_))
        ));
    }
}
