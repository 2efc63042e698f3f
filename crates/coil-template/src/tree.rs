//! Parsed document tree.
//!
//! Nodes live in an arena and refer to each other by `NodeId`. The tree is
//! built once by the parser and is read-only afterwards, so one tree can back
//! any number of concurrent renders.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use coil_expr::{Expr, Shape};
use coil_lexer::Span;

use crate::component::Component;

/// Index of a node in its `Tree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element,
    Text,
    Comment,
    /// Markup copied through untouched: doctypes and raw-text element bodies.
    Raw,
    /// `<ns:name>`: a sub-component.
    Import,
    /// `<c>`: renders only its children, or declares a variable with `c:var`.
    Wrapper,
}

/// An attribute whose value is evaluated at render time.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondKind {
    If,
    ElseIf,
    Else,
}

/// A conditional directive. `expr` is `None` for `c:else`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cond {
    pub kind: CondKind,
    pub expr: Option<Expr>,
}

/// `c:for="item, index in collection"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    pub item: String,
    pub index: Option<String>,
    pub collection: Expr,
}

/// `c:var="name SHAPE"`.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub annotation: Option<Shape>,
}

/// A resolved import.
#[derive(Clone)]
pub struct ImportRef {
    pub name: String,
    pub component: Arc<dyn Component>,
}

impl fmt::Debug for ImportRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportRef")
            .field("name", &self.name)
            .field("input", &self.component.input_shape())
            .field("output", &self.component.output_shape())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Tag name for elements and imports, text for comments and raw nodes.
    pub data: String,
    pub attributes: Vec<Attr>,
    /// Compiled content of a text node.
    pub content: Option<Expr>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Shape of the value this node renders to.
    pub shape: Shape,
    pub cond: Option<Cond>,
    pub prev_cond: Option<NodeId>,
    pub next_cond: Option<NodeId>,
    pub each: Option<Loop>,
    pub var: Option<VarDecl>,
    pub import: Option<ImportRef>,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, data: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            data: data.into(),
            attributes: Vec::new(),
            content: None,
            parent: None,
            children: Vec::new(),
            shape: Shape::Any,
            cond: None,
            prev_cond: None,
            next_cond: None,
            each: None,
            var: None,
            import: None,
            span,
        }
    }

    /// Whether this node is a `<c c:var>` declaration.
    pub fn is_var(&self) -> bool {
        self.kind == NodeKind::Wrapper && self.var.is_some()
    }
}

/// Arena of nodes. `NodeId` 0 is the document.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Document, "", Span::default())],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Add `node` as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        self.nodes.push(node);
        if let Some(parent) = self.nodes.get_mut(parent.0) {
            parent.children.push(id);
        }
        id
    }

    /// The sibling before `id`, if any.
    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.get(self.get(id)?.parent?)?;
        let position = parent.children.iter().position(|c| *c == id)?;
        position.checked_sub(1).map(|i| parent.children[i])
    }

    /// Whether `id` is `ancestor` or lies beneath it.
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.get(node).and_then(|n| n.parent);
        }
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }
}

impl IndexMut<NodeId> for Tree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }
}
