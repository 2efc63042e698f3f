//! Expression evaluator.
//!
//! Walks an `Expression` against an environment and produces a `Value`.
//! Evaluation has no side effects; unknown names read as null.

use std::collections::{BTreeMap, HashMap};

use crate::ast::{BinaryOp, ExprKind, Expression, PropertyKey, UnaryOp};
use crate::value::Value;
use crate::EvalError;

/// Variable lookup during evaluation.
pub trait Env {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Env for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl Env for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Evaluate `expr` against `env`.
pub fn evaluate(expr: &Expression, env: &dyn Env) -> Result<Value, EvalError> {
    match &expr.kind {
        ExprKind::Number(n) => Ok(Value::Number(*n)),
        ExprKind::String(s) => Ok(Value::String(s.clone())),
        ExprKind::Boolean(b) => Ok(Value::Bool(*b)),
        ExprKind::Null | ExprKind::Shape(_) => Ok(Value::Null),
        ExprKind::Identifier(name) => Ok(env.lookup(name).unwrap_or_default()),

        ExprKind::Member {
            object,
            property,
            computed,
        } => {
            let base = evaluate(object, env)?;
            let key = if *computed {
                evaluate(property, env)?
            } else {
                Value::String(property.as_identifier().unwrap_or_default().to_string())
            };
            member(base, &key)
        }

        ExprKind::Call { callee, arguments } => {
            let name = callee.as_identifier().unwrap_or_default();
            call(name, arguments, env)
        }

        ExprKind::Binary { left, op, right } => binary(left, *op, right, env),

        ExprKind::Unary { op, operand } => {
            let value = evaluate(operand, env)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                UnaryOp::Neg => match value {
                    Value::Number(n) => Ok(Value::Number(-n)),
                    other => Err(EvalError::Type(format!(
                        "cannot negate {}",
                        other.kind_name()
                    ))),
                },
            }
        }

        ExprKind::Ternary {
            condition,
            consequent,
            alternate,
        } => {
            if evaluate(condition, env)?.truthy() {
                evaluate(consequent, env)
            } else {
                evaluate(alternate, env)
            }
        }

        ExprKind::Array(items) => items
            .iter()
            .map(|item| evaluate(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),

        ExprKind::Object(properties) => {
            let mut map = BTreeMap::new();
            for property in properties {
                let key = match &property.key {
                    PropertyKey::Identifier(key) | PropertyKey::String(key) => key.clone(),
                    PropertyKey::Computed(key) => evaluate(key, env)?.to_text(),
                };
                map.insert(key, evaluate(&property.value, env)?);
            }
            Ok(Value::Map(map))
        }
    }
}

fn member(base: Value, key: &Value) -> Result<Value, EvalError> {
    match (base, key) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::Map(mut map), key) => Ok(map.remove(&key.to_text()).unwrap_or_default()),
        (Value::Array(mut items), Value::Number(n)) => {
            if *n < 0.0 || n.fract() != 0.0 || *n as usize >= items.len() {
                return Ok(Value::Null);
            }
            Ok(items.swap_remove(*n as usize))
        }
        (base, key) => Err(EvalError::Type(format!(
            "cannot read '{}' of {}",
            key.to_text(),
            base.kind_name()
        ))),
    }
}

fn binary(
    left: &Expression,
    op: BinaryOp,
    right: &Expression,
    env: &dyn Env,
) -> Result<Value, EvalError> {
    // Short-circuiting operators evaluate the right side lazily.
    match op {
        BinaryOp::And => {
            let result = evaluate(left, env)?.truthy() && evaluate(right, env)?.truthy();
            return Ok(Value::Bool(result));
        }
        BinaryOp::Or => {
            let result = evaluate(left, env)?.truthy() || evaluate(right, env)?.truthy();
            return Ok(Value::Bool(result));
        }
        BinaryOp::NullishCoalescing => {
            let value = evaluate(left, env)?;
            return if value.is_null() {
                evaluate(right, env)
            } else {
                Ok(value)
            };
        }
        _ => {}
    }

    let left = evaluate(left, env)?;
    let right = evaluate(right, env)?;

    match op {
        BinaryOp::Eq | BinaryOp::StrictEq => Ok(Value::Bool(left == right)),
        BinaryOp::Neq | BinaryOp::StrictNeq => Ok(Value::Bool(left != right)),

        BinaryOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (left @ Value::Html(_), right) | (left, right @ Value::Html(_)) => {
                Ok(left.concat(right))
            }
            (left @ Value::String(_), right) | (left, right @ Value::String(_)) => {
                Ok(Value::String(left.to_text() + &right.to_text()))
            }
            (left, right) => Err(mismatch("add", &left, &right)),
        },

        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let (Value::Number(a), Value::Number(b)) = (&left, &right) else {
                return Err(mismatch("apply arithmetic to", &left, &right));
            };
            Ok(Value::Number(match op {
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            }))
        }

        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte => {
            let ordering = match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => return Err(mismatch("compare", &left, &right)),
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Gt => ordering.is_gt(),
                BinaryOp::Lte => ordering.is_le(),
                _ => ordering.is_ge(),
            }))
        }

        BinaryOp::And | BinaryOp::Or | BinaryOp::NullishCoalescing => Ok(Value::Null),
    }
}

fn mismatch(action: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::Type(format!(
        "cannot {action} {} and {}",
        left.kind_name(),
        right.kind_name()
    ))
}

fn call(name: &str, arguments: &[Expression], env: &dyn Env) -> Result<Value, EvalError> {
    match name {
        "cast" => {
            let [value, target] = arguments else {
                return Err(argument("cast", "expected a value and a shape"));
            };
            let ExprKind::Shape(shape) = &target.kind else {
                return Err(argument("cast", "second argument must be a shape literal"));
            };
            shape.decode(evaluate(value, env)?)
        }
        "typeof" => match arguments {
            [value] => evaluate(value, env),
            _ => Err(argument("typeof", "expected one argument")),
        },
        "concat" => {
            let mut result = Value::Null;
            for argument in arguments {
                result = result.concat(evaluate(argument, env)?);
            }
            Ok(result)
        }
        "len" => {
            let [value] = arguments else {
                return Err(argument("len", "expected one argument"));
            };
            match evaluate(value, env)? {
                Value::Null => Ok(Value::Number(0.0)),
                Value::String(s) => Ok(Value::Number(s.chars().count() as f64)),
                Value::Array(items) => Ok(Value::Number(items.len() as f64)),
                Value::Map(map) => Ok(Value::Number(map.len() as f64)),
                other => Err(argument("len", &format!("no length for {}", other.kind_name()))),
            }
        }
        "duration" => {
            let [value] = arguments else {
                return Err(argument("duration", "expected one argument"));
            };
            match evaluate(value, env)? {
                Value::Number(n) => Ok(Value::Number(n)),
                Value::String(s) => parse_duration(&s)
                    .map(Value::Number)
                    .map_err(|message| argument("duration", &message)),
                other => Err(argument(
                    "duration",
                    &format!("expected a string, got {}", other.kind_name()),
                )),
            }
        }
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

fn argument(function: &str, message: &str) -> EvalError {
    EvalError::Argument {
        function: function.to_string(),
        message: message.to_string(),
    }
}

/// Parse a duration such as `1h30m`, `250ms` or `1.5s` into seconds.
pub fn parse_duration(text: &str) -> Result<f64, String> {
    let text = text.trim();
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, text.strip_prefix('+').unwrap_or(text)),
    };

    if body == "0" {
        return Ok(0.0);
    }
    if body.is_empty() {
        return Err(format!("invalid duration '{text}'"));
    }

    let chars: Vec<char> = body.chars().collect();
    let mut pos = 0;
    let mut total = 0.0;

    while pos < chars.len() {
        let start = pos;
        while pos < chars.len() && (chars[pos].is_ascii_digit() || chars[pos] == '.') {
            pos += 1;
        }
        let number: String = chars[start..pos].iter().collect();
        let amount: f64 = number
            .parse()
            .map_err(|_| format!("invalid duration '{text}'"))?;

        let unit_start = pos;
        while pos < chars.len() && !(chars[pos].is_ascii_digit() || chars[pos] == '.') {
            pos += 1;
        }
        let unit: String = chars[unit_start..pos].iter().collect();
        let scale = match unit.as_str() {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("missing unit in duration '{text}'")),
            other => return Err(format!("unknown unit '{other}' in duration '{text}'")),
        };
        total += amount * scale;
    }

    Ok(sign * total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Expr;
    use crate::shape::Shape;
    use pretty_assertions::assert_eq;

    fn env() -> BTreeMap<String, Value> {
        let value: Value = serde_json::from_str(
            r#"{"user": {"name": "Ada", "age": 36}, "tags": ["a", "b"], "n": 2, "flag": true}"#,
        )
        .unwrap();
        match value {
            Value::Map(map) => map,
            _ => unreachable!(),
        }
    }

    fn eval(source: &str) -> Result<Value, EvalError> {
        let symbols: BTreeMap<String, Shape> = BTreeMap::new();
        Expr::compile(source, &symbols).unwrap().eval(&env())
    }

    fn value(source: &str) -> Value {
        eval(source).unwrap()
    }

    // =========================================================================
    // Basics
    // =========================================================================

    #[test]
    fn test_arithmetic() {
        assert_eq!(value("n * 3 + 1"), Value::Number(7.0));
        assert_eq!(value("7 % n"), Value::Number(1.0));
        assert_eq!(value("-n"), Value::Number(-2.0));
    }

    #[test]
    fn test_string_addition() {
        assert_eq!(value("'n=' + n"), Value::from("n=2"));
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(value("n > 1 && flag"), Value::Bool(true));
        assert_eq!(value("n < 1 || !flag"), Value::Bool(false));
        assert_eq!(value("'a' < 'b'"), Value::Bool(true));
        assert_eq!(value("user.name == 'Ada'"), Value::Bool(true));
    }

    #[test]
    fn test_nullish() {
        assert_eq!(value("missing ?? 'fallback'"), Value::from("fallback"));
        assert_eq!(value("n ?? 5"), Value::Number(2.0));
    }

    #[test]
    fn test_member_and_index() {
        assert_eq!(value("user.name"), Value::from("Ada"));
        assert_eq!(value("tags[1]"), Value::from("b"));
        assert_eq!(value("tags[5]"), Value::Null);
        assert_eq!(value("missing.deep.path"), Value::Null);
    }

    #[test]
    fn test_member_on_number_is_error() {
        assert!(matches!(eval("n[0]"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_type_errors() {
        assert!(matches!(eval("flag - 1"), Err(EvalError::Type(_))));
        assert!(matches!(eval("flag < 1"), Err(EvalError::Type(_))));
    }

    #[test]
    fn test_collections() {
        assert_eq!(value("[n, 'x']"), Value::Array(vec![2.0.into(), "x".into()]));
        match value("{a: n, [user.name]: 1}") {
            Value::Map(map) => {
                assert_eq!(map.get("a"), Some(&Value::Number(2.0)));
                assert_eq!(map.get("Ada"), Some(&Value::Number(1.0)));
            }
            other => panic!("Expected map, got {other:?}"),
        }
    }

    // =========================================================================
    // Built-ins
    // =========================================================================

    #[test]
    fn test_len() {
        assert_eq!(value("len(tags)"), Value::Number(2.0));
        assert_eq!(value("len('héllo')"), Value::Number(5.0));
        assert_eq!(value("len(missing)"), Value::Number(0.0));
    }

    #[test]
    fn test_typeof_is_identity() {
        assert_eq!(value("typeof(n)"), Value::Number(2.0));
    }

    #[test]
    fn test_concat() {
        assert_eq!(value("concat('a', n, 'b')"), Value::from("a2b"));
        assert_eq!(value("concat(missing)"), Value::Null);
    }

    #[test]
    fn test_cast_decodes() {
        assert_eq!(value("cast('42', number)"), Value::Number(42.0));
        match value("cast(user, {name: string, email: string})") {
            Value::Map(map) => {
                assert_eq!(map.get("email"), Some(&Value::from("")));
                assert_eq!(map.get("age"), Some(&Value::Number(36.0)));
            }
            other => panic!("Expected map, got {other:?}"),
        }
        assert!(matches!(eval("cast(tags, number)"), Err(EvalError::Decode { .. })));
    }

    #[test]
    fn test_duration() {
        assert_eq!(value("duration('1m30s')"), Value::Number(90.0));
        assert_eq!(value("duration('250ms')"), Value::Number(0.25));
        assert!(matches!(
            eval("duration('5 parsecs')"),
            Err(EvalError::Argument { .. })
        ));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1h"), Ok(3600.0));
        assert_eq!(parse_duration("-1.5s"), Ok(-1.5));
        assert_eq!(parse_duration("0"), Ok(0.0));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("12").is_err());
    }
}
