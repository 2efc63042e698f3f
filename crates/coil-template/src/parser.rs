//! Template parser.
//!
//! Builds a `Tree` from the token stream of `coil-lexer`, following the shape
//! of HTML5 tree construction: an open-element stack, a small set of
//! insertion modes and the implicit end-tag rules for `p`, `li`, `dt`/`dd`,
//! `option`, `tr` and `td`/`th`.
//!
//! While building, directive attributes are compiled against a shadowed
//! symbol table so every expression and node gets a statically inferred shape:
//!
//! ```text
//! <ul>
//!   <li c:for="item, i in items">${i}: ${item.name}</li>
//! </ul>
//! <p c:if="user is {name: string}">Hi ${user.name}</p>
//! <p c:else>Who are you?</p>
//! <c c:var="title string">Welcome</c>
//! <ui:card heading="${title}"></ui:card>
//! ```
//!
//! Errors in one element do not stop the parse; they are collected and
//! returned together. Only tokenizer errors are fatal.

use std::collections::BTreeMap;

use coil_expr::{Expr, ExprError, Shape};
use coil_lexer::token::{is_escapable_raw_text_element, is_raw_text_element};
use coil_lexer::{is_void_element, Attribute, Scanner, Span, Tag, Token, TokenKind};
use tracing::{debug, trace};

use crate::component::{accepts, Importer};
use crate::directive::{parse_loop_header, parse_var_declaration};
use crate::error::{ParseError, ParseErrors};
use crate::symbols::SymbolTable;
use crate::tree::{Attr, Cond, CondKind, ImportRef, Loop, Node, NodeId, NodeKind, Tree, VarDecl};
use crate::ParserOptions;

/// Elements whose start tag closes an open `p`.
const CLOSES_P: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "main", "menu", "nav", "ol", "p", "pre", "section", "table", "ul",
];

/// Elements an implicit close never reaches past.
const SCOPE_BOUNDARIES: &[&str] = &["button", "caption", "html", "table", "td", "template", "th"];

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Document {
    pub tree: Tree,
    /// Declared shape of the template's arguments.
    pub input_shape: Shape,
    /// Names bound at the end of the document, with their shapes.
    pub symbols: BTreeMap<String, Shape>,
}

impl Document {
    /// Shape of the rendered document.
    pub fn shape(&self) -> &Shape {
        &self.tree[self.tree.root()].shape
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertionMode {
    Initial,
    InBody,
    /// Inside a raw-text element such as `<script>`.
    Text,
}

/// Coil template parser.
pub struct Parser<'a> {
    options: &'a ParserOptions,
    importer: &'a dyn Importer,
    /// `c:` for the default prefix.
    directive: String,
    tree: Tree,
    open: Vec<NodeId>,
    mode: InsertionMode,
    original_mode: InsertionMode,
    symbols: SymbolTable,
    /// Adjacent text runs, merged before compiling.
    pending_text: Option<(String, Span)>,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    pub fn new(options: &'a ParserOptions, importer: &'a dyn Importer, input: &Shape) -> Self {
        let tree = Tree::new();
        let root = tree.root();
        Self {
            options,
            importer,
            directive: format!("{}:", options.prefix),
            tree,
            open: vec![root],
            mode: InsertionMode::Initial,
            original_mode: InsertionMode::InBody,
            symbols: SymbolTable::from_input(input),
            pending_text: None,
            errors: Vec::new(),
        }
    }

    /// Parse `source` into a document.
    pub fn parse(
        source: &str,
        options: &ParserOptions,
        input: Shape,
        importer: &dyn Importer,
    ) -> Result<Document, ParseErrors> {
        let tokens = Scanner::tokenize(source).map_err(ParseError::from)?;

        let mut parser = Parser::new(options, importer, &input);
        for token in tokens {
            parser.process(token);
        }
        parser.finish(input)
    }

    fn process(&mut self, token: Token) {
        match self.mode {
            InsertionMode::Initial => self.process_initial(token),
            InsertionMode::InBody => self.process_in_body(token),
            InsertionMode::Text => self.process_text(token),
        }
    }

    fn process_initial(&mut self, token: Token) {
        match token.kind {
            TokenKind::Doctype(text) => {
                let node = raw_node(format!("<!DOCTYPE {text}>"), token.span);
                self.tree.append(self.tree.root(), node);
            }
            TokenKind::Comment(text) => self.insert_comment(text, token.span),
            TokenKind::Text(text) if text.trim().is_empty() => {}
            _ => {
                self.mode = InsertionMode::InBody;
                self.process(token);
            }
        }
    }

    fn process_in_body(&mut self, token: Token) {
        match token.kind {
            TokenKind::Text(text) => match &mut self.pending_text {
                Some((pending, _)) => pending.push_str(&text),
                None => self.pending_text = Some((text, token.span)),
            },
            TokenKind::Comment(text) => {
                // Dropped comments do not split the text around them.
                if self.options.keep_comments {
                    self.flush_text();
                    self.insert_comment(text, token.span);
                }
            }
            TokenKind::Doctype(_) => {
                self.error("Unexpected doctype", token.span);
            }
            TokenKind::StartTag(tag) => {
                self.flush_text();
                self.start_tag(tag, token.span);
            }
            TokenKind::EndTag(name) => {
                self.flush_text();
                self.end_tag(&name, token.span);
            }
            TokenKind::Eof => self.flush_text(),
        }
    }

    fn process_text(&mut self, token: Token) {
        match token.kind {
            TokenKind::Text(text) => {
                let parent = self.current();
                // Escapable raw text still interpolates.
                if is_escapable_raw_text_element(&self.tree[parent].data) {
                    self.pending_text = Some((text, token.span));
                    self.flush_text();
                } else {
                    self.tree.append(parent, raw_node(text, token.span));
                }
            }
            TokenKind::EndTag(name) => {
                self.mode = self.original_mode;
                self.end_tag(&name, token.span);
            }
            TokenKind::Eof => {
                let name = self.tree[self.current()].data.clone();
                self.error(format!("Unexpected end of input inside <{name}>"), token.span);
                self.mode = self.original_mode;
            }
            _ => {}
        }
    }

    /// Close everything still open and assemble the document.
    fn finish(mut self, input: Shape) -> Result<Document, ParseErrors> {
        self.flush_text();
        self.close_through(1);

        let root = self.tree.root();
        self.tree[root].shape = self.merge_children(root);

        debug!(
            nodes = self.tree.len(),
            errors = self.errors.len(),
            "template parsed"
        );

        if !self.errors.is_empty() {
            return Err(ParseErrors(self.errors));
        }

        Ok(Document {
            tree: self.tree,
            input_shape: input,
            symbols: self.symbols.snapshot(),
        })
    }

    // =========================================================================
    // Start tags
    // =========================================================================

    fn start_tag(&mut self, tag: Tag, span: Span) {
        let kind = if tag.name == self.options.prefix {
            NodeKind::Wrapper
        } else if tag.name.contains(':') {
            NodeKind::Import
        } else {
            NodeKind::Element
        };

        let name = match kind {
            NodeKind::Element => tag.name.to_ascii_lowercase(),
            _ => tag.name,
        };

        if kind == NodeKind::Element {
            self.close_implied(&name);
        }

        let mut node = Node::new(kind, name.clone(), span);
        self.symbols.push_frame();
        self.extract_directives(&mut node, tag.attributes);

        let parent = self.current();
        let id = self.tree.append(parent, node);
        trace!(tag = %name, id = id.index(), "open");

        if tag.self_closing || (kind == NodeKind::Element && is_void_element(&name)) {
            self.close_node(id);
            return;
        }

        self.open.push(id);
        if kind == NodeKind::Element && is_raw_text_element(&name) {
            self.original_mode = self.mode;
            self.mode = InsertionMode::Text;
        }
    }

    /// Compile directive and ordinary attributes onto `node`, in fixed order:
    /// conditional, loop, variable declaration, the rest.
    fn extract_directives(&mut self, node: &mut Node, attributes: Vec<Attribute>) {
        let mut conds = Vec::new();
        let mut each = None;
        let mut var = None;
        let mut plain = Vec::new();

        for attr in attributes {
            let directive = attr.name.strip_prefix(self.directive.as_str());
            match directive {
                Some("if") => conds.push((CondKind::If, attr)),
                Some("else-if") => conds.push((CondKind::ElseIf, attr)),
                Some("else") => conds.push((CondKind::Else, attr)),
                Some("for") if each.is_some() => self.error("Duplicate loop directive", attr.span),
                Some("for") => each = Some(attr),
                Some("var") if var.is_some() => {
                    self.error("Duplicate variable declaration", attr.span)
                }
                Some("var") => var = Some(attr),
                Some(other) => {
                    self.error(format!("Unknown directive '{}{other}'", self.directive), attr.span)
                }
                None => plain.push(attr),
            }
        }

        if let Some((_, extra)) = conds.get(1) {
            self.error(
                format!("Conflicting conditional directive '{}'", extra.name),
                extra.span,
            );
        }
        if let Some((kind, attr)) = conds.into_iter().next() {
            node.cond = Some(self.compile_cond(kind, &attr));
        }

        if let Some(attr) = each {
            node.each = self.compile_loop(&attr);
        }

        if let Some(attr) = var {
            if node.kind == NodeKind::Wrapper {
                node.var = self.compile_var(&attr);
            } else {
                self.error(
                    format!("{} is only valid on <{}>", attr.name, self.options.prefix),
                    attr.span,
                );
            }
        }

        if node.kind == NodeKind::Wrapper && !plain.is_empty() {
            self.error(
                format!("<{}> accepts only directives", self.options.prefix),
                plain[0].span,
            );
            return;
        }

        for attr in plain {
            let value = match &attr.value {
                Some(source) => match Expr::interpolated(source, &self.symbols) {
                    Ok(expr) => expr,
                    Err(e) => {
                        self.expr_error(&attr, e);
                        continue;
                    }
                },
                None => Expr::literal(""),
            };
            node.attributes.push(Attr {
                name: attr.name,
                value,
                span: attr.span,
            });
        }
    }

    fn compile_cond(&mut self, kind: CondKind, attr: &Attribute) -> Cond {
        if kind == CondKind::Else {
            if attr.value.as_deref().is_some_and(|v| !v.trim().is_empty()) {
                self.error(format!("{} takes no value", attr.name), attr.span);
            }
            return Cond { kind, expr: None };
        }

        let Some(source) = attr.value.as_deref() else {
            self.error(format!("{} requires a condition", attr.name), attr.span);
            return Cond { kind, expr: None };
        };

        match Expr::condition(source, &self.symbols) {
            Ok(expr) => {
                // The matched value is visible to this element's attributes and children.
                if let Some(matcher) = &expr.matcher {
                    if let Some(bind) = &matcher.bind {
                        self.symbols.bind(bind, matcher.shape.clone());
                    }
                }
                Cond {
                    kind,
                    expr: Some(expr),
                }
            }
            Err(e) => {
                self.expr_error(attr, e);
                Cond { kind, expr: None }
            }
        }
    }

    fn compile_loop(&mut self, attr: &Attribute) -> Option<Loop> {
        let Some(source) = attr.value.as_deref() else {
            self.error(format!("{} requires 'item in collection'", attr.name), attr.span);
            return None;
        };

        let header = match parse_loop_header(source) {
            Ok(header) => header,
            Err(e) => {
                self.expr_error(attr, e);
                return None;
            }
        };

        let collection = match Expr::compile(&header.collection, &self.symbols) {
            Ok(expr) => expr,
            Err(e) => {
                let offset = e.offset + header.collection_offset;
                self.expr_error(attr, ExprError::new(e.message, offset));
                return None;
            }
        };

        let (item_shape, index_shape) = match loop_shapes(&collection.shape) {
            Ok(shapes) => shapes,
            Err(message) => {
                self.error(message, attr.span);
                return None;
            }
        };

        // Bound before the remaining attributes compile, so they can use the loop variables.
        self.symbols.bind(&header.item, item_shape);
        if let Some(index) = &header.index {
            self.symbols.bind(index, index_shape);
        }

        Some(Loop {
            item: header.item,
            index: header.index,
            collection,
        })
    }

    fn compile_var(&mut self, attr: &Attribute) -> Option<VarDecl> {
        let source = attr.value.as_deref().unwrap_or_default();
        match parse_var_declaration(source) {
            Ok((name, annotation)) => Some(VarDecl { name, annotation }),
            Err(e) => {
                self.expr_error(attr, e);
                None
            }
        }
    }

    // =========================================================================
    // End tags and implicit closing
    // =========================================================================

    fn end_tag(&mut self, name: &str, span: Span) {
        let matches = |node: &Node| match node.kind {
            NodeKind::Element => node.data.eq_ignore_ascii_case(name),
            NodeKind::Import | NodeKind::Wrapper => node.data == name,
            _ => false,
        };

        let position = self
            .open
            .iter()
            .rposition(|id| *id != self.tree.root() && matches(&self.tree[*id]));

        match position {
            Some(index) => self.close_through(index),
            None if is_void_element(name) => {}
            None => self.error(format!("Unexpected end tag </{name}>"), span),
        }
    }

    /// Apply the implicit end-tag rules for a start tag named `name`.
    fn close_implied(&mut self, name: &str) {
        if CLOSES_P.contains(&name) {
            self.close_in_scope(&["p"], &[]);
        }
        match name {
            "li" => self.close_in_scope(&["li"], &["ol", "ul"]),
            "dt" | "dd" => self.close_in_scope(&["dt", "dd"], &["dl"]),
            "option" => {
                let current = &self.tree[self.current()];
                if current.kind == NodeKind::Element && current.data == "option" {
                    self.close_through(self.open.len() - 1);
                }
            }
            "tr" => self.close_in_scope(&["tr"], &["tbody", "tfoot", "thead"]),
            "td" | "th" => self.close_in_scope(&["td", "th"], &["tr"]),
            _ => {}
        }
    }

    /// Close the nearest open element named in `targets`, unless a boundary comes first.
    fn close_in_scope(&mut self, targets: &[&str], boundaries: &[&str]) {
        for index in (1..self.open.len()).rev() {
            let node = &self.tree[self.open[index]];
            if node.kind != NodeKind::Element {
                return;
            }
            let tag = node.data.as_str();
            if targets.contains(&tag) {
                self.close_through(index);
                return;
            }
            if boundaries.contains(&tag) || SCOPE_BOUNDARIES.contains(&tag) {
                return;
            }
        }
    }

    /// Close every open element from the top of the stack down to `index`.
    fn close_through(&mut self, index: usize) {
        while self.open.len() > index.max(1) {
            if let Some(id) = self.open.pop() {
                self.close_node(id);
            }
        }
    }

    /// Finish a node: restore the symbol table, link conditional chains,
    /// compute the render shape and resolve imports.
    fn close_node(&mut self, id: NodeId) {
        self.symbols.pop_frame();
        self.link_chain(id);

        match self.tree[id].kind {
            NodeKind::Element => self.tree[id].shape = Shape::Html,
            NodeKind::Wrapper => {
                let shape = self.merge_children(id);
                let node = &mut self.tree[id];
                match &node.var {
                    Some(var) => {
                        let declared = var.annotation.clone().unwrap_or(shape);
                        node.shape = declared.clone();
                        let name = var.name.clone();
                        trace!(var = %name, shape = %declared, "declare");
                        self.symbols.bind(&name, declared);
                    }
                    None => node.shape = shape,
                }
            }
            NodeKind::Import => self.resolve_import(id),
            _ => {}
        }
    }

    /// Attach `c:else-if` / `c:else` to the conditional sibling before it.
    fn link_chain(&mut self, id: NodeId) {
        let Some(cond) = &self.tree[id].cond else {
            return;
        };
        if cond.kind == CondKind::If {
            return;
        }
        let directive = match cond.kind {
            CondKind::ElseIf => "else-if",
            _ => "else",
        };

        let mut previous = self.tree.prev_sibling(id);
        while let Some(sibling) = previous {
            if self.tree[sibling].kind != NodeKind::Comment {
                break;
            }
            previous = self.tree.prev_sibling(sibling);
        }

        let head = previous.filter(|p| {
            let node = &self.tree[*p];
            node.next_cond.is_none()
                && node
                    .cond
                    .as_ref()
                    .is_some_and(|c| c.kind != CondKind::Else)
        });

        match head {
            Some(head) => {
                self.tree[head].next_cond = Some(id);
                self.tree[id].prev_cond = Some(head);
            }
            None => {
                let span = self.tree[id].span;
                self.error(
                    format!(
                        "{}{directive} without a preceding {}if",
                        self.directive, self.directive
                    ),
                    span,
                );
            }
        }
    }

    /// Resolve an import and check every argument it is given.
    fn resolve_import(&mut self, id: NodeId) {
        let name = self.tree[id].data.clone();
        let span = self.tree[id].span;

        let component = match self.importer.import(&name) {
            Ok(component) => component,
            Err(e) => {
                self.error(e.to_string(), span);
                return;
            }
        };

        let node = &self.tree[id];
        let mut supplied: Vec<(String, Span)> = node
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.span))
            .collect();
        let mut looped = Vec::new();
        let mut has_content = false;
        for child in &node.children {
            let child = &self.tree[*child];
            match &child.var {
                Some(var) if child.kind == NodeKind::Wrapper => {
                    // One argument takes one value.
                    if child.each.is_some() {
                        looped.push((var.name.clone(), child.span));
                    }
                    supplied.push((var.name.clone(), child.span))
                }
                _ if child.kind == NodeKind::Comment => {}
                _ => has_content = true,
            }
        }
        if has_content {
            supplied.push(("children".to_string(), span));
        }

        for (argument, at) in looped {
            self.error(
                format!("{}for is not allowed on argument '{argument}'", self.directive),
                at,
            );
        }
        for (argument, at) in supplied {
            if !accepts(component.as_ref(), &argument) {
                self.error(format!("<{name}> has no argument '{argument}'"), at);
            }
        }

        debug!(component = %name, "import resolved");
        let node = &mut self.tree[id];
        node.shape = component.output_shape();
        node.import = Some(ImportRef { name, component });
    }

    // =========================================================================
    // Text and comments
    // =========================================================================

    /// Compile buffered text into a text node. Whitespace-only runs are dropped.
    fn flush_text(&mut self) {
        let Some((text, span)) = self.pending_text.take() else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        match Expr::interpolated(&text, &self.symbols) {
            Ok(expr) => {
                let mut node = Node::new(NodeKind::Text, text, span);
                node.shape = expr.shape.clone();
                node.content = Some(expr);
                let parent = self.current();
                self.tree.append(parent, node);
            }
            Err(e) => self.error(e.message, span),
        }
    }

    fn insert_comment(&mut self, text: String, span: Span) {
        if !self.options.keep_comments {
            return;
        }
        let parent = self.current();
        self.tree
            .append(parent, Node::new(NodeKind::Comment, text, span));
    }

    // --- Helpers ---

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or(self.tree.root())
    }

    /// Merge the shapes of the children that render output.
    fn merge_children(&self, id: NodeId) -> Shape {
        self.tree[id]
            .children
            .iter()
            .map(|child| &self.tree[*child])
            .filter(|child| child.kind != NodeKind::Comment && !child.is_var())
            .fold(Shape::Any, |shape, child| shape.merge(&child.shape))
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(ParseError::at(message, span));
    }

    fn expr_error(&mut self, attr: &Attribute, e: ExprError) {
        self.error(
            format!("{} (in {} at offset {})", e.message, attr.name, e.offset),
            attr.span,
        );
    }
}

fn raw_node(text: String, span: Span) -> Node {
    let mut node = Node::new(NodeKind::Raw, text, span);
    node.shape = Shape::Html;
    node
}

/// Item and index shapes for iterating over a collection of `shape`.
fn loop_shapes(shape: &Shape) -> Result<(Shape, Shape), String> {
    match shape {
        Shape::Array(element) => Ok(((**element).clone(), Shape::Number)),
        Shape::Object(fields) => {
            let mut values = fields.values();
            let item = match values.next() {
                Some(first) if values.all(|s| s == first) => first.clone(),
                _ => Shape::Any,
            };
            Ok((item, Shape::String))
        }
        Shape::Any => Ok((Shape::Any, Shape::Any)),
        other => Err(format!("Cannot iterate over {other}")),
    }
}
