//! Runtime values.
//!
//! `Value` is the closed set of things an expression can produce while
//! rendering. `Html` is rendered markup; it is a value like any other so that
//! components and variables can pass fragments around.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::format_number;

/// A runtime value.
///
/// Hosts usually build these from their own data with `serde_json::from_value`
/// or `Value::deserialize`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    #[serde(skip_deserializing)]
    Html(Html),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Lowercase kind name used in messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Html(_) => "html",
        }
    }

    /// Truthiness used by `!`, `&&`, `||` and ternaries.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Map(_) | Value::Html(_) => true,
        }
    }

    /// Stringify a value for text output.
    ///
    /// Precedence: numbers use native numeric formatting, markup marshals
    /// itself as text, collections serialize as JSON, the rest fall back to
    /// default formatting.
    pub fn to_text(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Html(html) => html.to_string(),
            Value::Array(_) | Value::Map(_) => serde_json::to_string(self).unwrap_or_default(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
        }
    }

    /// Concatenate two values.
    ///
    /// Null is the identity. Markup on either side makes the result markup,
    /// coalescing adjacent text. Two strings join; anything else stringifies.
    pub fn concat(self, other: Value) -> Value {
        match (self, other) {
            (Value::Null, v) | (v, Value::Null) => v,
            (Value::Html(left), right) => Value::Html(left.join(right.into_html())),
            (left, Value::Html(right)) => Value::Html(left.into_html().join(right)),
            (Value::String(mut a), Value::String(b)) => {
                a.push_str(&b);
                Value::String(a)
            }
            (left, right) => {
                let mut text = left.to_text();
                text.push_str(&right.to_text());
                Value::String(text)
            }
        }
    }

    /// Convert into markup: markup stays as is, everything else becomes a text node.
    pub fn into_html(self) -> Html {
        match self {
            Value::Html(html) => html,
            Value::Null => Html::Document(Vec::new()),
            other => Html::Text(other.to_text()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Html> for Value {
    fn from(html: Html) -> Self {
        Value::Html(html)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

/// Rendered markup.
#[derive(Debug, Clone, PartialEq)]
pub enum Html {
    /// A fragment with no wrapping element.
    Document(Vec<Html>),
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
        children: Vec<Html>,
    },
    /// Text content, escaped on output.
    Text(String),
    Comment(String),
    /// Markup emitted verbatim (doctype, script and style bodies).
    Raw(String),
}

impl Html {
    pub fn element(tag: impl Into<String>, children: Vec<Html>) -> Self {
        Html::Element {
            tag: tag.into(),
            attributes: Vec::new(),
            children,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Html::Text(text.into())
    }

    /// Append `other` after `self` under a document, coalescing adjacent text.
    pub fn join(self, other: Html) -> Html {
        let mut children = match self {
            Html::Document(children) => children,
            single => vec![single],
        };
        match other {
            Html::Document(more) => {
                for child in more {
                    push_coalesced(&mut children, child);
                }
            }
            single => push_coalesced(&mut children, single),
        }
        Html::Document(children)
    }

    /// Whether this fragment renders to nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Html::Document(children) => children.iter().all(Html::is_empty),
            Html::Text(text) | Html::Raw(text) => text.is_empty(),
            Html::Element { .. } | Html::Comment(_) => false,
        }
    }
}

fn push_coalesced(children: &mut Vec<Html>, node: Html) {
    if let (Some(Html::Text(last)), Html::Text(text)) = (children.last_mut(), &node) {
        last.push_str(text);
        return;
    }
    children.push(node);
}

impl fmt::Display for Html {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Html::Document(children) => {
                for child in children {
                    write!(f, "{child}")?;
                }
                Ok(())
            }
            Html::Element {
                tag,
                attributes,
                children,
            } => {
                write!(f, "<{tag}")?;
                for (name, value) in attributes {
                    write!(f, " {name}=\"{}\"", escape(value, true))?;
                }
                f.write_str(">")?;
                if coil_lexer::is_void_element(tag) {
                    return Ok(());
                }
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, "</{tag}>")
            }
            Html::Text(text) => f.write_str(&escape(text, false)),
            Html::Comment(text) => write!(f, "<!--{text}-->"),
            Html::Raw(text) => f.write_str(text),
        }
    }
}

impl Serialize for Html {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
