//! Parsed templates as components.

use std::sync::Arc;

use coil_expr::{Shape, Value};

use crate::component::{Component, Importer, Instance, NoImports, WithBuiltins};
use crate::error::{ParseErrors, RenderError};
use crate::parser::{Document, Parser};
use crate::render::{self, RenderState};
use crate::scope::Scope;
use crate::ParserOptions;

/// A parsed template. Cheap to clone; clones share the document.
#[derive(Debug, Clone)]
pub struct Template {
    document: Arc<Document>,
}

impl Template {
    /// Parse with default options, an `any` input shape and only the built-in imports.
    pub fn parse(source: &str) -> Result<Self, ParseErrors> {
        Self::parse_with(
            source,
            &ParserOptions::default(),
            Shape::Any,
            &WithBuiltins::new(NoImports),
        )
    }

    pub fn parse_with(
        source: &str,
        options: &ParserOptions,
        input: Shape,
        importer: &dyn Importer,
    ) -> Result<Self, ParseErrors> {
        let document = Parser::parse(source, options, input, importer)?;
        Ok(Self {
            document: Arc::new(document),
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn instance(&self) -> TemplateInstance {
        TemplateInstance {
            document: self.document.clone(),
            state: RenderState::new(),
        }
    }

    /// Render once into markup and dispose everything the render created.
    pub fn render_to_string(&self, scope: &Scope) -> Result<String, RenderError> {
        let mut instance = self.instance();
        let result = instance.render(scope);
        instance.dispose();
        Ok(result?.into_html().to_string())
    }
}

impl Component for Template {
    fn input_shape(&self) -> Shape {
        self.document.input_shape.clone()
    }

    fn output_shape(&self) -> Shape {
        self.document.shape().clone()
    }

    fn instantiate(&self) -> Box<dyn Instance> {
        Box::new(self.instance())
    }
}

/// A template with the state it keeps between renders.
pub struct TemplateInstance {
    document: Arc<Document>,
    state: RenderState,
}

impl TemplateInstance {
    pub fn state(&self) -> &RenderState {
        &self.state
    }
}

impl Instance for TemplateInstance {
    fn render(&mut self, scope: &Scope) -> Result<Value, RenderError> {
        render::render(&self.document.tree, scope, &mut self.state)
    }

    fn dispose(&mut self) {
        self.state.dispose();
    }
}
