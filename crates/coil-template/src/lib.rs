//! Coil Templates
//!
//! Parses Coil markup into a typed document tree and renders it against
//! live data. Directives drive the structure:
//!
//! - `c:if` / `c:else-if` / `c:else`: conditional chains, with
//!   `expr is SHAPE [as name]` pattern conditions
//! - `c:for="item[, index] in expr"`: loops over arrays and maps
//! - `<c c:var="name [SHAPE]">`: typed variables
//! - `<ns:name ...>`: imported components; `<c:attrs>` is built in
//!
//! ```text
//! source → Parser → Document (tree + shapes) → render(Scope) → Value
//! ```
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use coil_template::{Scope, Template, Value};
//!
//! let template = Template::parse("<ul><li c:for=\"x in xs\">${x}</li></ul>").unwrap();
//! let mut vars = BTreeMap::new();
//! vars.insert("xs".to_string(), Value::from(vec!["a", "b"]));
//!
//! let html = template.render_to_string(&Scope::new(vars)).unwrap();
//! assert_eq!(html, "<ul><li>a</li><li>b</li></ul>");
//! ```

pub mod component;
pub mod directive;
pub mod error;
pub mod parser;
pub mod render;
pub mod scope;
pub mod symbols;
pub mod template;
pub mod tree;

use serde::Deserialize;

pub use coil_expr::{Html, Shape, Value};
pub use component::{
    attrs_name, AttrsComponent, Component, Importer, Instance, MapImporter, NoImports,
    WithBuiltins,
};
pub use error::{ImportError, ParseError, ParseErrors, RenderError};
pub use parser::{Document, Parser};
pub use render::RenderState;
pub use scope::Scope;
pub use template::{Template, TemplateInstance};
pub use tree::{NodeId, NodeKind, Tree};

/// Parser settings. Hosts can load these from their own config files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Directive prefix: `c` gives `c:if`, `c:for` and the `<c>` wrapper.
    pub prefix: String,
    /// Keep comments in the tree and the output.
    pub keep_comments: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            prefix: "c".to_string(),
            keep_comments: true,
        }
    }
}
