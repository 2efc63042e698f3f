//! Structural shapes.
//!
//! A `Shape` is the static type of a value: the primitives, homogeneous arrays,
//! objects with named fields, and rendered markup. Shapes are built once during
//! parse-time inference and shared read-only afterwards; compound payloads sit
//! behind `Arc` so cloning is cheap.
//!
//! Missing information is always `Any`, never an error.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::value::{Html, Value};
use crate::EvalError;

/// The structural type of a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Shape {
    #[default]
    Any,
    Bool,
    String,
    Number,
    Array(Arc<Shape>),
    /// Fields are kept sorted, so equality and display are order-independent.
    Object(Arc<BTreeMap<String, Shape>>),
    Html,
}

impl Shape {
    pub fn array(element: Shape) -> Self {
        Shape::Array(Arc::new(element))
    }

    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Shape)>,
    {
        Shape::Object(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn empty_object() -> Self {
        Shape::Object(Arc::new(BTreeMap::new()))
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Shape::Any)
    }

    /// Field shape of an object, `None` for missing fields and non-objects.
    pub fn field(&self, name: &str) -> Option<&Shape> {
        match self {
            Shape::Object(fields) => fields.get(name),
            _ => None,
        }
    }

    /// Lowercase kind name used in messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Any => "any",
            Shape::Bool => "bool",
            Shape::String => "string",
            Shape::Number => "number",
            Shape::Array(_) => "array",
            Shape::Object(_) => "object",
            Shape::Html => "html",
        }
    }

    /// Combine two shapes into one that describes both. Never fails.
    ///
    /// `Any` is the identity; differing arrays widen to `[any]`; objects union their
    /// fields; any other mismatch is `html` when markup is involved, else `any`.
    pub fn merge(&self, other: &Shape) -> Shape {
        if self == other {
            return self.clone();
        }

        match (self, other) {
            (Shape::Any, x) | (x, Shape::Any) => x.clone(),
            (Shape::Array(_), Shape::Array(_)) => Shape::array(Shape::Any),
            (Shape::Object(a), Shape::Object(b)) => {
                let mut fields = (**a).clone();
                for (name, shape) in b.iter() {
                    let merged = match fields.get(name) {
                        Some(existing) => existing.merge(shape),
                        None => shape.clone(),
                    };
                    fields.insert(name.clone(), merged);
                }
                Shape::Object(Arc::new(fields))
            }
            (Shape::Html, _) | (_, Shape::Html) => Shape::Html,
            _ => Shape::Any,
        }
    }

    /// The zero value a variable of this shape takes when its source is empty.
    pub fn default_value(&self) -> Value {
        match self {
            Shape::Any => Value::Null,
            Shape::Bool => Value::Bool(false),
            Shape::String => Value::String(String::new()),
            Shape::Number => Value::Number(0.0),
            Shape::Array(_) => Value::Array(Vec::new()),
            Shape::Object(fields) => Value::Map(
                fields
                    .iter()
                    .map(|(name, shape)| (name.clone(), shape.default_value()))
                    .collect(),
            ),
            Shape::Html => Value::Html(Html::Document(Vec::new())),
        }
    }

    /// Runtime conformance test for pattern conditions.
    ///
    /// Null never matches, not even `any`. Object shapes require each declared
    /// field to be present; extra fields are allowed.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => false,
            (Shape::Any, _) => true,
            (Shape::Bool, Value::Bool(_)) => true,
            (Shape::String, Value::String(_)) => true,
            (Shape::Number, Value::Number(_)) => true,
            (Shape::Html, Value::Html(_)) => true,
            (Shape::Array(element), Value::Array(items)) => items
                .iter()
                .all(|item| element.is_any() || element.matches(item)),
            (Shape::Object(fields), Value::Map(map)) => fields.iter().all(|(name, shape)| {
                map.get(name)
                    .is_some_and(|v| shape.is_any() || shape.matches(v))
            }),
            _ => false,
        }
    }

    /// Convert a runtime value into this shape.
    ///
    /// Null decodes to the default value; text converts to numbers, booleans and
    /// markup where it parses; object fields missing from a map are defaulted.
    pub fn decode(&self, value: Value) -> Result<Value, EvalError> {
        match (self, value) {
            (shape, Value::Null) => Ok(shape.default_value()),
            (Shape::Any, value) => Ok(value),

            (Shape::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (Shape::Bool, Value::String(s)) => match s.trim() {
                "" | "false" => Ok(Value::Bool(false)),
                "true" => Ok(Value::Bool(true)),
                other => Err(self.decode_error(format!("'{other}' is not a bool"))),
            },

            (Shape::Number, Value::Number(n)) => Ok(Value::Number(n)),
            (Shape::Number, Value::String(s)) => {
                let text = s.trim();
                if text.is_empty() {
                    return Ok(Value::Number(0.0));
                }
                text.parse::<f64>()
                    .map(Value::Number)
                    .map_err(|_| self.decode_error(format!("'{text}' is not a number")))
            }

            (Shape::String, v @ (Value::String(_) | Value::Number(_) | Value::Bool(_) | Value::Html(_))) => {
                Ok(Value::String(v.to_text()))
            }

            (Shape::Html, Value::Html(html)) => Ok(Value::Html(html)),
            (Shape::Html, v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => {
                Ok(Value::Html(Html::Text(v.to_text())))
            }

            (Shape::Array(element), Value::Array(items)) => items
                .into_iter()
                .map(|item| element.decode(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),

            (Shape::Object(fields), Value::Map(mut map)) => {
                for (name, shape) in fields.iter() {
                    let raw = map.remove(name).unwrap_or(Value::Null);
                    let decoded = shape.decode(raw).map_err(|e| match e {
                        EvalError::Decode { shape, message } => EvalError::Decode {
                            shape,
                            message: format!("field '{name}': {message}"),
                        },
                        other => other,
                    })?;
                    map.insert(name.clone(), decoded);
                }
                Ok(Value::Map(map))
            }
            (Shape::Object(_), Value::String(s)) if s.trim().is_empty() => Ok(self.default_value()),

            (_, value) => Err(self.decode_error(format!("got {}", value.kind_name()))),
        }
    }

    fn decode_error(&self, message: String) -> EvalError {
        EvalError::Decode {
            shape: self.to_string(),
            message,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Array(element) => write!(f, "[{element}]"),
            Shape::Object(fields) => {
                f.write_str("{")?;
                for (i, (name, shape)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {shape}")?;
                }
                f.write_str("}")
            }
            other => f.write_str(other.kind_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user() -> Shape {
        Shape::object([("name", Shape::String), ("age", Shape::Number)])
    }

    // =========================================================================
    // Equality
    // =========================================================================

    #[test]
    fn test_equal_is_structural_and_order_independent() {
        let a = Shape::object([("name", Shape::String), ("age", Shape::Number)]);
        let b = Shape::object([("age", Shape::Number), ("name", Shape::String)]);
        assert_eq!(a, b);
        assert_eq!(b, a);
        assert_eq!(a, a.clone());
        assert_ne!(a, Shape::object([("name", Shape::String)]));
        assert_ne!(Shape::array(Shape::String), Shape::array(Shape::Number));
    }

    // =========================================================================
    // Merge
    // =========================================================================

    #[test]
    fn test_merge_any_is_identity() {
        for shape in [Shape::Bool, Shape::Html, user(), Shape::array(Shape::Number)] {
            assert_eq!(Shape::Any.merge(&shape), shape);
            assert_eq!(shape.merge(&Shape::Any), shape);
        }
    }

    #[test]
    fn test_merge_idempotent() {
        for shape in [Shape::String, user(), Shape::array(user())] {
            assert_eq!(shape.merge(&shape), shape);
        }
    }

    #[test]
    fn test_merge_html_absorbs() {
        assert_eq!(Shape::Html.merge(&Shape::String), Shape::Html);
        assert_eq!(Shape::Number.merge(&Shape::Html), Shape::Html);
        assert_eq!(Shape::Html.merge(&user()), Shape::Html);
    }

    #[test]
    fn test_merge_mismatch_is_any() {
        assert_eq!(Shape::String.merge(&Shape::Number), Shape::Any);
        assert_eq!(Shape::Bool.merge(&user()), Shape::Any);
    }

    #[test]
    fn test_merge_arrays() {
        let merged = Shape::array(Shape::String).merge(&Shape::array(Shape::Number));
        assert_eq!(merged, Shape::array(Shape::Any));
    }

    #[test]
    fn test_merge_objects_union() {
        let a = Shape::object([("name", Shape::String), ("tag", Shape::String)]);
        let b = Shape::object([("age", Shape::Number), ("tag", Shape::Number)]);
        let expected = Shape::object([
            ("name", Shape::String),
            ("age", Shape::Number),
            ("tag", Shape::Any),
        ]);
        assert_eq!(a.merge(&b), expected);
        assert_eq!(b.merge(&a), expected);
    }

    // =========================================================================
    // Display
    // =========================================================================

    #[test]
    fn test_display_sorted() {
        let shape = Shape::object([
            ("z", Shape::array(Shape::Bool)),
            ("a", Shape::empty_object()),
        ]);
        assert_eq!(shape.to_string(), "{a: {}, z: [bool]}");
        assert_eq!(Shape::Html.to_string(), "html");
    }

    // =========================================================================
    // Runtime conformance
    // =========================================================================

    #[test]
    fn test_null_never_matches() {
        assert!(!Shape::Any.matches(&Value::Null));
        assert!(!Shape::String.matches(&Value::Null));
    }

    #[test]
    fn test_matches_primitives() {
        assert!(Shape::String.matches(&Value::String("x".into())));
        assert!(!Shape::String.matches(&Value::Number(1.0)));
        assert!(Shape::Any.matches(&Value::Number(1.0)));
    }

    #[test]
    fn test_matches_object_requires_fields() {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::String("Ada".into()));
        assert!(!user().matches(&Value::Map(map.clone())));
        map.insert("age".to_string(), Value::Number(36.0));
        map.insert("extra".to_string(), Value::Bool(true));
        assert!(user().matches(&Value::Map(map)));
    }

    // =========================================================================
    // Decode
    // =========================================================================

    #[test]
    fn test_decode_null_gives_defaults() {
        let decoded = user().decode(Value::Null).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert("age".to_string(), Value::Number(0.0));
        expected.insert("name".to_string(), Value::String(String::new()));
        assert_eq!(decoded, Value::Map(expected));
    }

    #[test]
    fn test_decode_text_to_number() {
        assert_eq!(
            Shape::Number.decode(Value::String(" 42 ".into())).unwrap(),
            Value::Number(42.0)
        );
        assert!(Shape::Number.decode(Value::String("abc".into())).is_err());
    }

    #[test]
    fn test_decode_fills_missing_fields() {
        let mut map = BTreeMap::new();
        map.insert("name".to_string(), Value::String("Ada".into()));
        let decoded = user().decode(Value::Map(map)).unwrap();
        match decoded {
            Value::Map(m) => assert_eq!(m.get("age"), Some(&Value::Number(0.0))),
            other => panic!("Expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_field_error_names_field() {
        let mut map = BTreeMap::new();
        map.insert("age".to_string(), Value::String("old".into()));
        let err = user().decode(Value::Map(map)).unwrap_err();
        assert!(err.to_string().contains("field 'age'"));
    }
}
