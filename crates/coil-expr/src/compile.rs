//! Compiled expression units.
//!
//! An `Expr` bundles the source text of an attribute or placeholder with its
//! parsed program and the statically inferred shape. Three front doors:
//!
//! - `Expr::compile` for plain expressions (directive values),
//! - `Expr::interpolated` for text with `${ }` placeholders,
//! - `Expr::condition` for `c:if` values, which may end in
//!   `is SHAPE [as name]`.

use std::collections::BTreeMap;

use crate::ast::{ExprKind, ExprSpan, Expression};
use crate::checker::{self, Symbols};
use crate::eval::{self, Env};
use crate::expr_parser::ExprParser;
use crate::shape::Shape;
use crate::value::Value;
use crate::{EvalError, ExprError};

/// A compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub source: String,
    /// `None` for literal text.
    pub program: Option<Expression>,
    pub shape: Shape,
    /// Set for pattern conditions (`x is SHAPE`).
    pub matcher: Option<Matcher>,
}

/// The `is SHAPE [as name]` part of a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Matcher {
    pub shape: Shape,
    pub bind: Option<String>,
}

/// Result of evaluating a condition.
#[derive(Debug, Clone, PartialEq)]
pub struct CondOutcome {
    pub passed: bool,
    /// The matched value and the name it binds to, for the branch only.
    pub binding: Option<(String, Value)>,
}

impl Expr {
    /// Literal text: no program, shape `string`.
    pub fn literal(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            program: None,
            shape: Shape::String,
            matcher: None,
        }
    }

    /// Compile a plain expression.
    pub fn compile(source: &str, symbols: &dyn Symbols) -> Result<Self, ExprError> {
        let (program, shape) = prepare(source, symbols)?;
        Ok(Self {
            source: source.to_string(),
            program: Some(program),
            shape,
            matcher: None,
        })
    }

    /// Compile text containing `${ }` placeholders into a `concat` call.
    ///
    /// Text without placeholders stays literal. `\${` is a literal `${`.
    pub fn interpolated(source: &str, symbols: &dyn Symbols) -> Result<Self, ExprError> {
        let fragments = split_interpolated(source)?;
        if !fragments.iter().any(|f| matches!(f, Fragment::Code { .. })) {
            let text: String = fragments
                .into_iter()
                .filter_map(|f| match f {
                    Fragment::Text(text) => Some(text),
                    Fragment::Code { .. } => None,
                })
                .collect();
            return Ok(Self::literal(text));
        }

        let mut arguments = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            match fragment {
                Fragment::Text(text) => {
                    arguments.push(Expression::new(ExprKind::String(text), ExprSpan::default()))
                }
                Fragment::Code { code, offset } => {
                    let (expr, _) = prepare(&code, symbols).map_err(|e| shifted(e, offset))?;
                    arguments.push(expr);
                }
            }
        }

        let program = Expression::new(
            ExprKind::Call {
                callee: Box::new(Expression::new(
                    ExprKind::Identifier("concat".to_string()),
                    ExprSpan::default(),
                )),
                arguments,
            },
            ExprSpan::new(0, source.chars().count()),
        );
        let shape = checker::infer(&program, symbols)?;

        Ok(Self {
            source: source.to_string(),
            program: Some(program),
            shape,
            matcher: None,
        })
    }

    /// Compile a condition, splitting off an `is SHAPE [as name]` suffix.
    ///
    /// Without `as`, a bare identifier on the left binds under its own name.
    pub fn condition(source: &str, symbols: &dyn Symbols) -> Result<Self, ExprError> {
        let chars: Vec<char> = source.chars().collect();
        let Some(is_at) = find_keyword(&chars, "is", 0) else {
            return Self::compile(source, symbols);
        };

        let shape_start = is_at + 2;
        let (shape_end, bind) = match find_keyword(&chars, "as", shape_start) {
            Some(as_at) => {
                let name: String = chars[as_at + 2..].iter().collect();
                let name = name.trim();
                if !is_identifier(name) {
                    return Err(ExprError::new(
                        format!("invalid bind name '{name}'"),
                        as_at + 2,
                    ));
                }
                (as_at, Some(name.to_string()))
            }
            None => (chars.len(), None),
        };

        let shape_source: String = chars[shape_start..shape_end].iter().collect();
        let shape = parse_shape_literal(&shape_source).map_err(|e| shifted(e, shape_start))?;

        let left: String = chars[..is_at].iter().collect();
        let (program, _) = prepare(&left, symbols)?;
        let bind = bind.or_else(|| program.as_identifier().map(str::to_string));

        Ok(Self {
            source: source.to_string(),
            program: Some(program),
            shape: Shape::Bool,
            matcher: Some(Matcher { shape, bind }),
        })
    }

    pub fn is_literal(&self) -> bool {
        self.program.is_none()
    }

    /// Evaluate against `env`. Literal text evaluates to itself.
    pub fn eval(&self, env: &dyn Env) -> Result<Value, EvalError> {
        match &self.program {
            Some(program) => eval::evaluate(program, env),
            None => Ok(Value::String(self.source.clone())),
        }
    }

    /// Evaluate as a condition.
    ///
    /// Pattern conditions pass when the value conforms to the shape. Plain
    /// conditions must produce a bool; null counts as false.
    pub fn eval_condition(&self, env: &dyn Env) -> Result<CondOutcome, EvalError> {
        let value = self.eval(env)?;

        if let Some(matcher) = &self.matcher {
            let passed = matcher.shape.matches(&value);
            let binding = match (&matcher.bind, passed) {
                (Some(name), true) => Some((name.clone(), value)),
                _ => None,
            };
            return Ok(CondOutcome { passed, binding });
        }

        let passed = match value {
            Value::Bool(b) => b,
            Value::Null => false,
            other => {
                return Err(EvalError::Type(format!(
                    "condition '{}' must be bool, got {}",
                    self.source,
                    other.kind_name()
                )))
            }
        };
        Ok(CondOutcome {
            passed,
            binding: None,
        })
    }
}

/// Parse a shape literal: `any`, `bool`, `string`, `number`, `html`,
/// `[T]` or `{name: T, ...}`.
pub fn parse_shape_literal(source: &str) -> Result<Shape, ExprError> {
    let expr = ExprParser::parse(source)?;
    shape_of(&expr)
}

fn shape_of(expr: &Expression) -> Result<Shape, ExprError> {
    match &expr.kind {
        ExprKind::Identifier(name) => match name.as_str() {
            "any" => Ok(Shape::Any),
            "bool" => Ok(Shape::Bool),
            "string" => Ok(Shape::String),
            "number" => Ok(Shape::Number),
            "html" => Ok(Shape::Html),
            other => Err(ExprError::new(
                format!("unknown shape '{other}'"),
                expr.span.start,
            )),
        },
        ExprKind::Array(items) => match items.as_slice() {
            [element] => Ok(Shape::array(shape_of(element)?)),
            _ => Err(ExprError::new(
                "array shape takes exactly one element shape",
                expr.span.start,
            )),
        },
        ExprKind::Object(properties) => {
            let mut fields = BTreeMap::new();
            for property in properties {
                let key = match property.key.literal() {
                    Some(key) if !property.shorthand => key,
                    _ => {
                        return Err(ExprError::new(
                            "object shape fields need a literal name and a shape",
                            property.value.span.start,
                        ))
                    }
                };
                fields.insert(key.to_string(), shape_of(&property.value)?);
            }
            Ok(Shape::object(fields))
        }
        _ => Err(ExprError::new("invalid shape literal", expr.span.start)),
    }
}

/// Parse, rewrite `cast` targets and infer.
fn prepare(source: &str, symbols: &dyn Symbols) -> Result<(Expression, Shape), ExprError> {
    let mut program = ExprParser::parse(source)?;
    rewrite_casts(&mut program)?;
    let shape = checker::infer(&program, symbols)?;
    Ok((program, shape))
}

/// Replace the shape literal in `cast(x, SHAPE)` with an embedded shape constant.
fn rewrite_casts(expr: &mut Expression) -> Result<(), ExprError> {
    match &mut expr.kind {
        ExprKind::Call { callee, arguments } => {
            if callee.as_identifier() == Some("cast") {
                let [value, target] = arguments.as_mut_slice() else {
                    return Err(ExprError::new(
                        "cast expects a value and a shape",
                        expr.span.start,
                    ));
                };
                rewrite_casts(value)?;
                if !matches!(target.kind, ExprKind::Shape(_)) {
                    let shape = shape_of(target)?;
                    target.kind = ExprKind::Shape(shape);
                }
                return Ok(());
            }
            for argument in arguments {
                rewrite_casts(argument)?;
            }
        }
        ExprKind::Binary { left, right, .. } => {
            rewrite_casts(left)?;
            rewrite_casts(right)?;
        }
        ExprKind::Unary { operand, .. } => rewrite_casts(operand)?,
        ExprKind::Member {
            object, property, ..
        } => {
            rewrite_casts(object)?;
            rewrite_casts(property)?;
        }
        ExprKind::Ternary {
            condition,
            consequent,
            alternate,
        } => {
            rewrite_casts(condition)?;
            rewrite_casts(consequent)?;
            rewrite_casts(alternate)?;
        }
        ExprKind::Array(items) => {
            for item in items {
                rewrite_casts(item)?;
            }
        }
        ExprKind::Object(properties) => {
            for property in properties {
                if let crate::ast::PropertyKey::Computed(key) = &mut property.key {
                    rewrite_casts(key)?;
                }
                rewrite_casts(&mut property.value)?;
            }
        }
        ExprKind::Number(_)
        | ExprKind::String(_)
        | ExprKind::Boolean(_)
        | ExprKind::Null
        | ExprKind::Identifier(_)
        | ExprKind::Shape(_) => {}
    }
    Ok(())
}

// --- Interpolation ---

#[derive(Debug, PartialEq)]
enum Fragment {
    Text(String),
    /// Placeholder body and its character offset in the source.
    Code { code: String, offset: usize },
}

/// Split text into literal runs and `${ }` bodies.
///
/// Inside a placeholder, braces nest and quoted strings are skipped so that
/// `}` in a string does not close it. A backslash before `${` escapes it.
fn split_interpolated(source: &str) -> Result<Vec<Fragment>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut fragments = Vec::new();
    let mut text = String::new();
    let mut pos = 0;

    while pos < chars.len() {
        let escaped = chars[pos] == '\\'
            && chars.get(pos + 1) == Some(&'$')
            && chars.get(pos + 2) == Some(&'{');
        if escaped {
            text.push_str("${");
            pos += 3;
            continue;
        }
        if chars[pos] != '$' || chars.get(pos + 1) != Some(&'{') {
            text.push(chars[pos]);
            pos += 1;
            continue;
        }

        let open = pos;
        pos += 2;
        let start = pos;
        let mut depth = 1;
        let mut quote: Option<char> = None;

        while pos < chars.len() {
            let c = chars[pos];
            match quote {
                Some(_) if c == '\\' => pos += 1,
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None => match c {
                    '\'' | '"' | '`' => quote = Some(c),
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                },
            }
            pos += 1;
        }

        if depth != 0 {
            return Err(ExprError::new("Unterminated interpolation", open));
        }

        if !text.is_empty() {
            fragments.push(Fragment::Text(std::mem::take(&mut text)));
        }
        fragments.push(Fragment::Code {
            code: chars[start..pos].iter().collect(),
            offset: start,
        });
        pos += 1; // skip }
    }

    if !text.is_empty() {
        fragments.push(Fragment::Text(text));
    }
    Ok(fragments)
}

// --- Helpers ---

fn shifted(err: ExprError, offset: usize) -> ExprError {
    ExprError::new(err.message, err.offset + offset)
}

/// Find `word` as a standalone keyword outside strings and brackets.
fn find_keyword(chars: &[char], word: &str, from: usize) -> Option<usize> {
    let word: Vec<char> = word.chars().collect();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut pos = from;

    while pos < chars.len() {
        let c = chars[pos];
        match quote {
            Some(_) if c == '\\' => pos += 1,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                _ if depth == 0 && chars[pos..].starts_with(&word) => {
                    let before = pos.checked_sub(1).map(|i| chars[i]);
                    let after = chars.get(pos + word.len()).copied();
                    let standalone = !before.is_some_and(|b| is_ident_char(b) || b == '.')
                        && !after.is_some_and(is_ident_char);
                    if standalone {
                        return Some(pos);
                    }
                }
                _ => {}
            },
        }
        pos += 1;
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Whether `name` can be bound as a variable.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(is_ident_char)
        && !matches!(
            name,
            "true" | "false" | "null" | "undefined" | "nil" | "is" | "as" | "in"
        )
}
