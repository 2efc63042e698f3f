//! Static shape inference.
//!
//! Infers the `Shape` an expression will produce without evaluating it.
//! Unknown names infer to `Any`; the only errors are member access on a
//! value that can never have members and calls to functions that do not exist.

use std::collections::{BTreeMap, HashMap};

use crate::ast::{BinaryOp, ExprKind, Expression, UnaryOp};
use crate::shape::Shape;
use crate::ExprError;

/// Built-in functions callable from expressions.
pub const BUILTINS: &[&str] = &["cast", "concat", "duration", "len", "typeof"];

/// Read access to the shapes bound at a parse position.
pub trait Symbols {
    fn lookup(&self, name: &str) -> Option<Shape>;
}

impl Symbols for BTreeMap<String, Shape> {
    fn lookup(&self, name: &str) -> Option<Shape> {
        self.get(name).cloned()
    }
}

impl Symbols for HashMap<String, Shape> {
    fn lookup(&self, name: &str) -> Option<Shape> {
        self.get(name).cloned()
    }
}

/// Infer the result shape of `expr` against `symbols`.
pub fn infer(expr: &Expression, symbols: &dyn Symbols) -> Result<Shape, ExprError> {
    match &expr.kind {
        ExprKind::Number(_) => Ok(Shape::Number),
        ExprKind::String(_) => Ok(Shape::String),
        ExprKind::Boolean(_) => Ok(Shape::Bool),
        ExprKind::Null | ExprKind::Shape(_) => Ok(Shape::Any),
        ExprKind::Identifier(name) => Ok(symbols.lookup(name).unwrap_or_default()),

        ExprKind::Member {
            object,
            property,
            computed,
        } => {
            let base = infer(object, symbols)?;
            let key = if *computed {
                infer(property, symbols)?;
                match &property.kind {
                    ExprKind::String(key) => Some(key.as_str()),
                    _ => None,
                }
            } else {
                property.as_identifier()
            };

            match &base {
                Shape::Any => Ok(Shape::Any),
                Shape::Object(fields) => Ok(key
                    .and_then(|key| fields.get(key).cloned())
                    .unwrap_or_default()),
                Shape::Array(element) if *computed => Ok((**element).clone()),
                other => Err(ExprError::new(
                    format!("member access on non-object ({other})"),
                    property.span.start,
                )),
            }
        }

        ExprKind::Call { callee, arguments } => infer_call(expr, callee, arguments, symbols),

        ExprKind::Binary { left, op, right } => {
            let left = infer(left, symbols)?;
            let right = infer(right, symbols)?;
            Ok(match op {
                BinaryOp::Eq
                | BinaryOp::Neq
                | BinaryOp::StrictEq
                | BinaryOp::StrictNeq
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Lte
                | BinaryOp::Gte
                | BinaryOp::And
                | BinaryOp::Or => Shape::Bool,
                BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => Shape::Number,
                BinaryOp::Add => match (&left, &right) {
                    (Shape::String, _) | (_, Shape::String) => Shape::String,
                    (Shape::Number, Shape::Number) => Shape::Number,
                    _ => Shape::Any,
                },
                BinaryOp::NullishCoalescing => Shape::Any,
            })
        }

        ExprKind::Unary { op, operand } => {
            infer(operand, symbols)?;
            Ok(match op {
                UnaryOp::Not => Shape::Bool,
                UnaryOp::Neg => Shape::Number,
            })
        }

        ExprKind::Ternary {
            condition,
            consequent,
            alternate,
        } => {
            infer(condition, symbols)?;
            let consequent = infer(consequent, symbols)?;
            let alternate = infer(alternate, symbols)?;
            Ok(consequent.merge(&alternate))
        }

        ExprKind::Array(items) => {
            let mut element = Shape::Any;
            for item in items {
                element = element.merge(&infer(item, symbols)?);
            }
            Ok(Shape::array(element))
        }

        ExprKind::Object(properties) => {
            let mut fields = BTreeMap::new();
            let mut literal = true;
            for property in properties {
                let shape = infer(&property.value, symbols)?;
                match property.key.literal() {
                    Some(key) => {
                        fields.insert(key.to_string(), shape);
                    }
                    None => literal = false,
                }
            }
            if literal {
                Ok(Shape::object(fields))
            } else {
                Ok(Shape::Any)
            }
        }
    }
}

fn infer_call(
    call: &Expression,
    callee: &Expression,
    arguments: &[Expression],
    symbols: &dyn Symbols,
) -> Result<Shape, ExprError> {
    let Some(name) = callee.as_identifier() else {
        return Err(ExprError::new(
            "only built-in functions can be called",
            callee.span.start,
        ));
    };

    let shapes = arguments
        .iter()
        .map(|argument| infer(argument, symbols))
        .collect::<Result<Vec<_>, _>>()?;

    match name {
        "cast" => Ok(match arguments.get(1).map(|a| &a.kind) {
            Some(ExprKind::Shape(shape)) => shape.clone(),
            _ => Shape::Any,
        }),
        "typeof" => Ok(shapes.into_iter().next().unwrap_or_default()),
        "duration" | "len" => Ok(Shape::Number),
        "concat" => {
            if shapes.iter().all(|s| *s == Shape::String) {
                Ok(Shape::String)
            } else {
                Ok(Shape::Any)
            }
        }
        other => Err(ExprError::new(
            format!("unknown function '{other}'"),
            call.span.start,
        )),
    }
}
