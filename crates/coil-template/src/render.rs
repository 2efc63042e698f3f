//! Render engine.
//!
//! Walks a parsed `Tree` against a `Scope`. Each node goes through the same
//! steps in order: conditional, loop, attributes, children, and for imports
//! the component call.
//!
//! Loop iterations and imports own child scopes that persist between renders
//! in a `RenderState`, keyed by `(node, iteration)`. Re-rendering the same
//! collection reuses them; a shrinking collection disposes the tail.
//!
//! ```text
//! RenderState
//!  ├─ hidden / expanded         (reset every pass)
//!  └─ children[(node, i)]  ──→  Child { scope, state, instance }
//! ```

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use coil_expr::{Html, Shape, Value};
use tracing::debug;

use crate::component::Instance;
use crate::error::RenderError;
use crate::scope::Scope;
use crate::tree::{Loop, NodeId, NodeKind, Tree};

/// Per-instance render state.
#[derive(Default)]
pub struct RenderState {
    /// Conditional branches suppressed in the current pass.
    hidden: HashSet<NodeId>,
    /// Loops already expanded in the current pass.
    expanded: HashSet<NodeId>,
    children: BTreeMap<(NodeId, usize), Child>,
}

struct Child {
    scope: Scope,
    /// Id of the scope this child was spawned from.
    parent_id: u64,
    state: RenderState,
    instance: Option<Box<dyn Instance>>,
}

impl Child {
    fn new(scope: Scope, parent_id: u64) -> Self {
        Self {
            scope,
            parent_id,
            state: RenderState::default(),
            instance: None,
        }
    }

    fn dispose(&mut self) {
        self.state.dispose();
        if let Some(mut instance) = self.instance.take() {
            instance.dispose();
        }
        self.scope.close();
    }
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the per-pass markers before a new render.
    pub fn reset_pass(&mut self) {
        self.hidden.clear();
        self.expanded.clear();
    }

    /// Dispose every tracked child, recursively. Disposing twice is a no-op.
    pub fn dispose(&mut self) {
        let children = std::mem::take(&mut self.children);
        if children.is_empty() {
            return;
        }
        debug!(count = children.len(), "children disposed");
        for (_, mut child) in children {
            child.dispose();
        }
    }

    /// Keys of the tracked children, in order.
    pub fn keys(&self) -> Vec<(NodeId, usize)> {
        self.children.keys().copied().collect()
    }

    /// Scope of the child at `key`.
    pub fn scope(&self, key: (NodeId, usize)) -> Option<&Scope> {
        self.children.get(&key).map(|c| &c.scope)
    }

    /// Dispose the children created for `root` or anything beneath it.
    fn dispose_within(&mut self, tree: &Tree, root: NodeId) {
        let keys: Vec<_> = self
            .children
            .keys()
            .filter(|(id, _)| tree.is_within(*id, root))
            .copied()
            .collect();
        self.remove(keys);
    }

    /// Dispose the iterations of `id` from `len` on.
    fn truncate(&mut self, id: NodeId, len: usize) {
        let keys: Vec<_> = self
            .children
            .range((id, len)..=(id, usize::MAX))
            .map(|(key, _)| *key)
            .collect();
        self.remove(keys);
    }

    fn remove(&mut self, keys: Vec<(NodeId, usize)>) {
        if keys.is_empty() {
            return;
        }
        debug!(count = keys.len(), "children disposed");
        for key in keys {
            if let Some(mut child) = self.children.remove(&key) {
                child.dispose();
            }
        }
    }

    /// The child at `key`, spawned from `scope` with `spawn`. A child spawned
    /// from a different scope is disposed and replaced. Returns whether it was reused.
    fn child(
        &mut self,
        key: (NodeId, usize),
        scope: &Scope,
        spawn: impl FnOnce(&Scope) -> Scope,
    ) -> (&mut Child, bool) {
        let stale = self
            .children
            .get(&key)
            .is_some_and(|c| c.parent_id != scope.id());
        if stale {
            self.remove(vec![key]);
        }

        match self.children.entry(key) {
            Entry::Occupied(entry) => (entry.into_mut(), true),
            Entry::Vacant(entry) => (entry.insert(Child::new(spawn(scope), scope.id())), false),
        }
    }
}

/// Render the children of the root of `tree`.
///
/// Errors do not stop the pass: the failing subtree renders as null and the
/// error is returned after every sibling has been rendered.
pub fn render(tree: &Tree, scope: &Scope, state: &mut RenderState) -> Result<Value, RenderError> {
    state.reset_pass();
    let mut renderer = Renderer {
        tree,
        errors: Vec::new(),
    };
    let value = renderer.render_children(tree.root(), scope, state);
    match RenderError::collect(renderer.errors) {
        Some(error) => Err(error),
        None => Ok(value),
    }
}

/// Outcome of a node's conditional step.
enum Branch {
    Hidden,
    /// Shown, with the pattern binding if the condition had one.
    Shown(Option<(String, Value)>),
}

struct Renderer<'t> {
    tree: &'t Tree,
    errors: Vec<RenderError>,
}

impl<'t> Renderer<'t> {
    fn render_children(&mut self, id: NodeId, scope: &Scope, state: &mut RenderState) -> Value {
        let tree = self.tree;
        tree[id]
            .children
            .iter()
            .fold(Value::Null, |out, child| {
                out.concat(self.render_node(*child, scope, state))
            })
    }

    /// Render the children of `id`. Variables declared by its var wrappers
    /// go out of scope once the children are done, as they do for the parser.
    fn render_scoped_children(
        &mut self,
        id: NodeId,
        scope: &Scope,
        state: &mut RenderState,
    ) -> Value {
        let tree = self.tree;
        let declared: Vec<(String, Option<Value>)> = tree[id]
            .children
            .iter()
            .map(|child| &tree[*child])
            .filter(|child| child.kind == NodeKind::Wrapper)
            .filter_map(|child| child.var.as_ref())
            .map(|var| (var.name.clone(), scope.vars().get(&var.name).cloned()))
            .collect();

        let value = self.render_children(id, scope, state);
        for (name, previous) in declared.into_iter().rev() {
            unset(scope, name, previous);
        }
        value
    }

    /// Render one node, recording any error.
    fn render_node(&mut self, id: NodeId, scope: &Scope, state: &mut RenderState) -> Value {
        match self.try_render_node(id, scope, state) {
            Ok(value) => value,
            Err(error) => {
                self.errors.push(error);
                Value::Null
            }
        }
    }

    fn try_render_node(
        &mut self,
        id: NodeId,
        scope: &Scope,
        state: &mut RenderState,
    ) -> Result<Value, RenderError> {
        let tree = self.tree;
        let node = &tree[id];

        // 1. Conditional.
        let Branch::Shown(binding) = self.enter_branch(id, scope, state)? else {
            return Ok(Value::Null);
        };

        // The matched value is visible to this branch only.
        let restore = binding.map(|(name, value)| {
            let previous = scope.set(name.clone(), value);
            (name, previous)
        });

        // 2. Loop.
        let result = match &node.each {
            Some(each) => self.expand_loop(id, each, scope, state),
            None => self.render_body(id, scope, state),
        };

        if let Some((name, previous)) = restore {
            unset(scope, name, previous);
        }

        result
    }

    /// Evaluate the node's conditional. A passing branch hides the rest of
    /// its chain for this pass.
    fn enter_branch(
        &mut self,
        id: NodeId,
        scope: &Scope,
        state: &mut RenderState,
    ) -> Result<Branch, RenderError> {
        let tree = self.tree;
        let node = &tree[id];

        if state.hidden.contains(&id) {
            state.dispose_within(tree, id);
            return Ok(Branch::Hidden);
        }

        let Some(cond) = &node.cond else {
            return Ok(Branch::Shown(None));
        };

        let mut binding = None;
        if let Some(expr) = &cond.expr {
            let outcome = expr
                .eval_condition(scope)
                .map_err(|e| RenderError::eval(e, node.span))?;
            if !outcome.passed {
                state.hidden.insert(id);
                state.dispose_within(tree, id);
                return Ok(Branch::Hidden);
            }
            binding = outcome.binding;
        }

        let mut next = node.next_cond;
        while let Some(sibling) = next {
            state.hidden.insert(sibling);
            next = tree[sibling].next_cond;
        }
        Ok(Branch::Shown(binding))
    }

    fn expand_loop(
        &mut self,
        id: NodeId,
        each: &Loop,
        scope: &Scope,
        state: &mut RenderState,
    ) -> Result<Value, RenderError> {
        if !state.expanded.insert(id) {
            return Ok(Value::Null);
        }

        let span = self.tree[id].span;
        let collection = each
            .collection
            .eval(scope)
            .map_err(|e| RenderError::eval(e, span))?;

        let items: Vec<(Value, Value)> = match collection {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::Number(i as f64), item))
                .collect(),
            Value::Map(map) => map
                .into_iter()
                .map(|(key, item)| (Value::String(key), item))
                .collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(RenderError::type_error(
                    format!(
                        "cannot iterate over {} in '{}'",
                        other.kind_name(),
                        each.collection.source
                    ),
                    span,
                ))
            }
        };

        let len = items.len();
        let mut reused = 0;
        let mut out = Value::Null;

        for (i, (index, item)) in items.into_iter().enumerate() {
            let (child, was_reused) = state.child((id, i), scope, |s| s.spawn(BTreeMap::new()));
            if was_reused {
                reused += 1;
            }

            {
                let mut vars = child.scope.vars();
                vars.insert(each.item.clone(), item);
                if let Some(name) = &each.index {
                    vars.insert(name.clone(), index);
                }
            }
            child.state.reset_pass();

            let child_scope = child.scope.clone();
            let value = self.render_node_body(id, &child_scope, &mut child.state);
            out = out.concat(value);
        }

        state.truncate(id, len);
        debug!(
            node = id.index(),
            len,
            reused,
            spawned = len - reused,
            "loop expanded"
        );

        Ok(out)
    }

    /// Render one loop iteration, recording any error.
    fn render_node_body(&mut self, id: NodeId, scope: &Scope, state: &mut RenderState) -> Value {
        match self.render_body(id, scope, state) {
            Ok(value) => value,
            Err(error) => {
                self.errors.push(error);
                Value::Null
            }
        }
    }

    /// Steps 3 to 5: attributes, children, component call.
    fn render_body(
        &mut self,
        id: NodeId,
        scope: &Scope,
        state: &mut RenderState,
    ) -> Result<Value, RenderError> {
        let tree = self.tree;
        let node = &tree[id];

        match node.kind {
            NodeKind::Element => {
                let mut attributes = Vec::with_capacity(node.attributes.len());
                for attr in &node.attributes {
                    let value = attr
                        .value
                        .eval(scope)
                        .map_err(|e| RenderError::eval(e, attr.span))?;
                    attributes.push((attr.name.clone(), value.to_text()));
                }

                let children = match self.render_scoped_children(id, scope, state).into_html() {
                    Html::Document(children) => children,
                    single => vec![single],
                };

                Ok(Value::Html(Html::Element {
                    tag: node.data.clone(),
                    attributes,
                    children,
                }))
            }

            NodeKind::Wrapper => match &node.var {
                Some(var) => {
                    let value = self.render_scoped_children(id, scope, state);
                    let value = decode(var.annotation.as_ref(), value)
                        .map_err(|e| RenderError::eval(e, node.span))?;
                    scope.set(var.name.clone(), value);
                    Ok(Value::Null)
                }
                None => Ok(self.render_scoped_children(id, scope, state)),
            },

            NodeKind::Text => {
                let Some(content) = &node.content else {
                    return Ok(Value::Null);
                };
                let value = content
                    .eval(scope)
                    .map_err(|e| RenderError::eval(e, node.span))?;
                Ok(match value {
                    Value::String(text) => Value::String(text.trim().to_string()),
                    Value::Html(html) => Value::Html(html),
                    Value::Null => Value::Null,
                    other => Value::String(other.to_text()),
                })
            }

            NodeKind::Comment => Ok(Value::Html(Html::Comment(node.data.clone()))),
            NodeKind::Raw => Ok(Value::Html(Html::Raw(node.data.clone()))),
            NodeKind::Document => Ok(self.render_children(id, scope, state)),
            NodeKind::Import => self.render_import(id, scope, state),
        }
    }

    fn render_import(
        &mut self,
        id: NodeId,
        scope: &Scope,
        state: &mut RenderState,
    ) -> Result<Value, RenderError> {
        let tree = self.tree;
        let node = &tree[id];
        let Some(import) = &node.import else {
            return Err(RenderError::type_error(
                format!("<{}> was not resolved", node.data),
                node.span,
            ));
        };

        let mut args = BTreeMap::new();
        for attr in &node.attributes {
            let value = attr
                .value
                .eval(scope)
                .map_err(|e| RenderError::eval(e, attr.span))?;
            args.insert(attr.name.clone(), value);
        }

        let mut content = Value::Null;
        for child in &node.children {
            let child_node = &tree[*child];
            match &child_node.var {
                Some(var) if child_node.kind == NodeKind::Wrapper => {
                    // A hidden branch supplies no argument.
                    let binding = match self.enter_branch(*child, scope, state) {
                        Ok(Branch::Shown(binding)) => binding,
                        Ok(Branch::Hidden) => continue,
                        Err(error) => {
                            self.errors.push(error);
                            continue;
                        }
                    };
                    let restore = binding.map(|(name, value)| {
                        let previous = scope.set(name.clone(), value);
                        (name, previous)
                    });
                    let value = self.render_scoped_children(*child, scope, state);
                    if let Some((name, previous)) = restore {
                        unset(scope, name, previous);
                    }

                    let value = decode(var.annotation.as_ref(), value)
                        .map_err(|e| RenderError::eval(e, child_node.span))?;
                    args.insert(var.name.clone(), value);
                }
                _ => content = content.concat(self.render_node(*child, scope, state)),
            }
        }
        if !content.is_null() {
            args.insert("children".to_string(), content);
        }

        if let Shape::Object(fields) = import.component.input_shape() {
            args.retain(|name, _| fields.contains_key(name));
        }

        if scope.dry_run() {
            return Ok(Value::Null);
        }

        let (child, _) = state.child((id, 0), scope, |s| s.spawn_isolated(BTreeMap::new()));
        *child.scope.vars() = args;
        let instance = child
            .instance
            .get_or_insert_with(|| import.component.instantiate());
        let result = instance.render(&child.scope);

        let meta = child.scope.meta().clone();
        if !meta.is_empty() {
            scope.meta().extend(meta);
        }

        result.map_err(|inner| RenderError::Component {
            name: import.name.clone(),
            line: node.span.line,
            column: node.span.column,
            inner: Box::new(inner),
        })
    }
}

/// Put a scope variable back to the value it had before a binding.
fn unset(scope: &Scope, name: String, previous: Option<Value>) {
    let mut vars = scope.vars();
    match previous {
        Some(value) => vars.insert(name, value),
        None => vars.remove(&name),
    };
}

fn decode(annotation: Option<&Shape>, value: Value) -> Result<Value, coil_expr::EvalError> {
    match annotation {
        Some(shape) => shape.decode(value),
        None => Ok(value),
    }
}
