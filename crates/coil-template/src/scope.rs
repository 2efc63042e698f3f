//! Render-time variable scopes.
//!
//! Scopes form a tree. A child sees its parent's variables unless it was
//! spawned isolated (component arguments). Every scope in a tree shares the
//! root's touch signal; closing a scope closes all of its live descendants.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use coil_expr::{Env, Value};
use tokio::sync::{watch, Notify};
use tracing::trace;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A handle to a scope. Clones refer to the same scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    id: u64,
    /// Lookup parent; `None` for roots and isolated scopes.
    parent: Option<Scope>,
    vars: Mutex<BTreeMap<String, Value>>,
    meta: Mutex<BTreeMap<String, Value>>,
    children: Mutex<Vec<Weak<ScopeInner>>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    dry_run: bool,
    touch: Arc<Notify>,
}

impl Scope {
    /// A root scope holding `vars`.
    pub fn new(vars: BTreeMap<String, Value>) -> Self {
        Self::root(vars, false)
    }

    /// A root scope for validation-only renders: imports are not instantiated.
    pub fn dry(vars: BTreeMap<String, Value>) -> Self {
        Self::root(vars, true)
    }

    fn root(vars: BTreeMap<String, Value>, dry_run: bool) -> Self {
        Self::build(None, vars, dry_run, Arc::new(Notify::new()), false)
    }

    fn build(
        parent: Option<Scope>,
        vars: BTreeMap<String, Value>,
        dry_run: bool,
        touch: Arc<Notify>,
        closed: bool,
    ) -> Self {
        let (closed_tx, _) = watch::channel(closed);
        Self {
            inner: Arc::new(ScopeInner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                parent,
                vars: Mutex::new(vars),
                meta: Mutex::new(BTreeMap::new()),
                children: Mutex::new(Vec::new()),
                closed: AtomicBool::new(closed),
                closed_tx,
                dry_run,
                touch,
            }),
        }
    }

    /// A child scope that can read this scope's variables.
    pub fn spawn(&self, vars: BTreeMap<String, Value>) -> Scope {
        self.spawn_child(Some(self.clone()), vars)
    }

    /// A child scope that sees only `vars`. It still closes with this scope.
    pub fn spawn_isolated(&self, vars: BTreeMap<String, Value>) -> Scope {
        self.spawn_child(None, vars)
    }

    fn spawn_child(&self, parent: Option<Scope>, vars: BTreeMap<String, Value>) -> Scope {
        let child = Self::build(
            parent,
            vars,
            self.inner.dry_run,
            self.inner.touch.clone(),
            self.is_closed(),
        );
        let mut children = lock(&self.inner.children);
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(&child.inner));
        child
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Id of the scope this one reads through to, if any.
    pub fn parent_id(&self) -> Option<u64> {
        self.inner.parent.as_ref().map(Scope::id)
    }

    /// This scope's own variables.
    pub fn vars(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        lock(&self.inner.vars)
    }

    /// Look a name up here, then in each parent.
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = lock(&self.inner.vars).get(name) {
            return Some(value.clone());
        }
        self.inner.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        lock(&self.inner.vars).insert(name.into(), value)
    }

    /// Side-channel metadata. Imported components' metadata is merged into
    /// the importing scope after each render.
    pub fn meta(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        lock(&self.inner.meta)
    }

    pub fn dry_run(&self) -> bool {
        self.inner.dry_run
    }

    /// Signal that data in this scope tree changed. Never blocks; repeated
    /// touches before anyone waits collapse into one.
    pub fn touch(&self) {
        self.inner.touch.notify_one();
    }

    /// Wait for the next touch anywhere in this scope tree.
    pub async fn touched(&self) {
        self.inner.touch.notified().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close this scope and every live descendant. Idempotent.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.closed_tx.send_replace(true);
        trace!(scope = self.inner.id, "scope closed");

        let children = std::mem::take(&mut *lock(&self.inner.children));
        for child in children.iter().filter_map(Weak::upgrade) {
            Scope { inner: child }.close();
        }
    }

    /// Resolves once this scope is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_tx.subscribe();
        // The sender lives as long as `self`, so this only fails if it was dropped.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Close this scope when `signal` resolves.
    pub async fn close_when<F>(&self, signal: F)
    where
        F: Future<Output = ()>,
    {
        signal.await;
        self.close();
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("parent", &self.parent_id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Env for Scope {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn vars(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    // =========================================================================
    // Variables
    // =========================================================================

    #[test]
    fn test_child_reads_through_parent() {
        let root = Scope::new(vars(&[("a", 1.0.into())]));
        let child = root.spawn(vars(&[("b", 2.0.into())]));
        assert_eq!(child.get("a"), Some(Value::Number(1.0)));
        assert_eq!(child.get("b"), Some(Value::Number(2.0)));
        assert_eq!(root.get("b"), None);
        assert_eq!(child.parent_id(), Some(root.id()));
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = Scope::new(vars(&[("a", 1.0.into())]));
        let child = root.spawn(BTreeMap::new());
        child.set("a", "x".into());
        assert_eq!(child.get("a"), Some(Value::from("x")));
        assert_eq!(root.get("a"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_isolated_sees_only_own_vars() {
        let root = Scope::new(vars(&[("secret", "s".into())]));
        let isolated = root.spawn_isolated(vars(&[("arg", 1.0.into())]));
        assert_eq!(isolated.get("secret"), None);
        assert_eq!(isolated.get("arg"), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_dry_run_is_inherited() {
        let root = Scope::dry(BTreeMap::new());
        assert!(root.spawn(BTreeMap::new()).dry_run());
        assert!(!Scope::default().dry_run());
    }

    // =========================================================================
    // Closing
    // =========================================================================

    #[test]
    fn test_close_cascades_once() {
        let root = Scope::default();
        let child = root.spawn(BTreeMap::new());
        let grandchild = child.spawn_isolated(BTreeMap::new());

        root.close();
        assert!(child.is_closed());
        assert!(grandchild.is_closed());

        // Second close is a no-op.
        root.close();
        assert!(root.is_closed());
    }

    #[test]
    fn test_closing_child_leaves_parent_open() {
        let root = Scope::default();
        let child = root.spawn(BTreeMap::new());
        child.close();
        assert!(!root.is_closed());
    }

    #[test]
    fn test_spawn_from_closed_scope_is_closed() {
        let root = Scope::default();
        root.close();
        assert!(root.spawn(BTreeMap::new()).is_closed());
    }

    #[tokio::test]
    async fn test_closed_resolves_after_close() {
        let root = Scope::default();
        let child = root.spawn(BTreeMap::new());
        let waiter = child.clone();
        let handle = tokio::spawn(async move { waiter.closed().await });
        root.close();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_when_signal() {
        let root = Scope::default();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let observer = root.clone();
        let handle = tokio::spawn(async move {
            observer
                .close_when(async move {
                    let _ = rx.await;
                })
                .await
        });

        assert!(!root.is_closed());
        tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(root.is_closed());
    }

    // =========================================================================
    // Touch
    // =========================================================================

    #[tokio::test]
    async fn test_touch_coalesces_and_never_blocks() {
        let root = Scope::default();
        let child = root.spawn(BTreeMap::new());
        child.touch();
        child.touch();
        child.touch();

        // One stored permit wakes the first waiter immediately.
        tokio::time::timeout(Duration::from_secs(1), root.touched())
            .await
            .unwrap();
        // The rest were coalesced.
        let second = tokio::time::timeout(Duration::from_millis(20), root.touched()).await;
        assert!(second.is_err());
    }
}
