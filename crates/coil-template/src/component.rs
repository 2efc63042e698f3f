//! Component and importer contracts.
//!
//! A `Component` is a definition: it declares the shape of the arguments it
//! accepts and of the value it renders, and creates `Instance`s. An instance
//! keeps whatever state it needs between renders and is disposed exactly once.
//!
//! An `Importer` resolves `<ns:name>` tags to components while a template is
//! parsed.

use std::collections::HashMap;
use std::sync::Arc;

use coil_expr::{Shape, Value};

use crate::error::{ImportError, RenderError};
use crate::scope::Scope;

/// Name of the built-in attribute-capture component for a directive prefix.
pub fn attrs_name(prefix: &str) -> String {
    format!("{prefix}:attrs")
}

pub trait Component: Send + Sync {
    /// Shape of the arguments. An object shape lists the accepted names;
    /// `Any` accepts every name.
    fn input_shape(&self) -> Shape;

    /// Shape of the rendered value.
    fn output_shape(&self) -> Shape;

    fn instantiate(&self) -> Box<dyn Instance>;
}

pub trait Instance: Send {
    /// Render against `scope`, which holds the arguments.
    fn render(&mut self, scope: &Scope) -> Result<Value, RenderError>;

    /// Release anything held between renders.
    fn dispose(&mut self) {}
}

pub trait Importer: Send + Sync {
    fn import(&self, name: &str) -> Result<Arc<dyn Component>, ImportError>;
}

/// Resolves nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoImports;

impl Importer for NoImports {
    fn import(&self, name: &str) -> Result<Arc<dyn Component>, ImportError> {
        Err(ImportError::NotFound(name.to_string()))
    }
}

/// In-memory component registry.
#[derive(Default, Clone)]
pub struct MapImporter {
    components: HashMap<String, Arc<dyn Component>>,
}

impl MapImporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, component: Arc<dyn Component>) {
        self.components.insert(name.into(), component);
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: impl Into<String>, component: impl Component + 'static) -> Self {
        self.insert(name, Arc::new(component));
        self
    }
}

impl Importer for MapImporter {
    fn import(&self, name: &str) -> Result<Arc<dyn Component>, ImportError> {
        self.components
            .get(name)
            .cloned()
            .ok_or_else(|| ImportError::NotFound(name.to_string()))
    }
}

/// Adds the built-in components in front of another importer.
///
/// Built-ins are named with the directive prefix, so a parser using the `x`
/// prefix needs `WithBuiltins::with_prefix(inner, "x")` to get `<x:attrs>`.
#[derive(Debug, Clone)]
pub struct WithBuiltins<I> {
    inner: I,
    attrs: String,
}

impl<I: Importer> WithBuiltins<I> {
    /// Built-ins for the default `c` prefix.
    pub fn new(inner: I) -> Self {
        Self::with_prefix(inner, "c")
    }

    pub fn with_prefix(inner: I, prefix: &str) -> Self {
        Self {
            inner,
            attrs: attrs_name(prefix),
        }
    }
}

impl<I: Importer> Importer for WithBuiltins<I> {
    fn import(&self, name: &str) -> Result<Arc<dyn Component>, ImportError> {
        if name == self.attrs {
            return Ok(Arc::new(AttrsComponent));
        }
        self.inner.import(name)
    }
}

/// `<c:attrs ...>`: renders its arguments as a map.
#[derive(Debug, Default, Clone, Copy)]
pub struct AttrsComponent;

impl Component for AttrsComponent {
    fn input_shape(&self) -> Shape {
        Shape::Any
    }

    fn output_shape(&self) -> Shape {
        Shape::Any
    }

    fn instantiate(&self) -> Box<dyn Instance> {
        Box::new(AttrsComponent)
    }
}

impl Instance for AttrsComponent {
    fn render(&mut self, scope: &Scope) -> Result<Value, RenderError> {
        Ok(Value::Map(scope.vars().clone()))
    }
}

/// Whether `component` accepts an argument called `name`.
pub fn accepts(component: &dyn Component, name: &str) -> bool {
    match component.input_shape() {
        Shape::Any => true,
        Shape::Object(fields) => fields.contains_key(name),
        _ => false,
    }
}
