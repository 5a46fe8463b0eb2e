//! Scopes
//!
//! A [`Scope`] is the context every watch function reads from and every
//! listener writes to. It owns:
//!
//! - caller state, an [`Object`] the engine never interprets;
//! - the watcher registry and its last-dirty marker;
//! - the async, coalesced-apply and post-digest queues;
//! - the current [`Phase`].
//!
//! # Lifecycle of a Change
//!
//! 1. Callers register watchers with [`Scope::watch`].
//! 2. Something triggers a digest: [`Scope::digest`] directly, [`Scope::apply`],
//!    or a timer scheduled by [`Scope::eval_async`] / [`Scope::apply_async`].
//! 3. The digest scans watchers until none is dirty and no async work
//!    remains, invoking listeners as it goes.
//! 4. Post-digest callbacks run once the scope is idle again.
//!
//! # Re-entrancy
//!
//! No engine lock is held while user code runs. Watch functions, listeners
//! and queued tasks may call any scope method, including registering or
//! removing watchers mid-scan. Starting a second digest or apply while one is
//! active fails with [`ScopeError::PhaseInProgress`](crate::ScopeError).

mod digest;
mod phase;
mod queue;
mod watcher;

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::DigestConfig;
use crate::error::{CallbackResult, Result};
use crate::timer::Timer;
use crate::value::{Object, Value};

pub use phase::Phase;
pub use watcher::{WatchHandle, WatcherId};

use queue::TaskQueues;
use watcher::Registry;

/// Handle to a digest context. Clones address the same scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    state: Object,
    config: DigestConfig,
    timer: Arc<dyn Timer>,
    registry: Mutex<Registry>,
    phase: Mutex<Phase>,
    queues: TaskQueues,
}

/// Non-owning scope reference held by timer callbacks and watch handles.
#[derive(Clone)]
pub(crate) struct WeakScope(Weak<ScopeInner>);

impl WeakScope {
    pub(crate) fn upgrade(&self) -> Option<Scope> {
        self.0.upgrade().map(|inner| Scope { inner })
    }
}

impl Scope {
    /// Create an empty scope with the default config.
    pub fn new(timer: Arc<dyn Timer>) -> Self {
        Self::build(timer, DigestConfig::default())
    }

    /// Create an empty scope with a custom config.
    pub fn with_config(timer: Arc<dyn Timer>, config: DigestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(timer, config))
    }

    fn build(timer: Arc<dyn Timer>, config: DigestConfig) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                state: Object::new(),
                config,
                timer,
                registry: Mutex::new(Registry::default()),
                phase: Mutex::new(Phase::Idle),
                queues: TaskQueues::default(),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakScope {
        WeakScope(Arc::downgrade(&self.inner))
    }

    pub fn config(&self) -> &DigestConfig {
        &self.inner.config
    }

    /// The phase this scope is in right now.
    pub fn phase(&self) -> Phase {
        *self.inner.phase.lock()
    }

    /// True when both handles address the same scope.
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ------------------------------------------------------------------
    // Caller state
    // ------------------------------------------------------------------

    /// Read a state key. Missing keys read as `Undefined`.
    pub fn get(&self, key: &str) -> Value {
        self.inner.state.get(key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.state.insert(key, value);
    }

    /// Replace a state key with `f(current)`.
    pub fn update<F, V>(&self, key: &str, f: F)
    where
        F: FnOnce(Value) -> V,
        V: Into<Value>,
    {
        self.inner.state.update(key, f);
    }

    /// The whole state object.
    pub fn state(&self) -> &Object {
        &self.inner.state
    }

    // ------------------------------------------------------------------
    // Watchers
    // ------------------------------------------------------------------

    /// Register a watcher.
    ///
    /// `watch_fn` computes the watched value from the scope. When that value
    /// differs from the previous scan's (by reference, or structurally when
    /// `deep` is set), `listener_fn` is called with `(new, old, scope)`. On
    /// the first call `old` is `new`.
    ///
    /// The watcher stays registered until [`WatchHandle::remove`] is called.
    pub fn watch<W, L>(&self, watch_fn: W, listener_fn: L, deep: bool) -> WatchHandle
    where
        W: Fn(&Scope) -> CallbackResult<Value> + Send + Sync + 'static,
        L: Fn(&Value, &Value, &Scope) -> CallbackResult + Send + Sync + 'static,
    {
        let id = self
            .inner
            .registry
            .lock()
            .insert(Box::new(watch_fn), Box::new(listener_fn), deep);
        tracing::trace!(watcher = %id, deep, "watcher registered");
        WatchHandle::new(self.downgrade(), id)
    }

    /// Register a reference watcher with no listener.
    pub fn watch_only<W>(&self, watch_fn: W) -> WatchHandle
    where
        W: Fn(&Scope) -> CallbackResult<Value> + Send + Sync + 'static,
    {
        self.watch(watch_fn, |_, _, _| Ok(()), false)
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Run `expr` against this scope right now. No phase change, no digest.
    pub fn eval<F, R>(&self, expr: F, locals: Option<&Value>) -> R
    where
        F: FnOnce(&Scope, Option<&Value>) -> R,
    {
        expr(self, locals)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("phase", &self.phase())
            .field("watchers", &self.watcher_count())
            .field("state", &self.inner.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualTimer;

    fn scope() -> Scope {
        Scope::new(Arc::new(ManualTimer::new()))
    }

    #[test]
    fn scope_holds_arbitrary_state() {
        let scope = scope();
        assert!(scope.get("example").is_undefined());

        scope.set("example", 1);
        assert_eq!(scope.get("example"), Value::from(1));

        scope.update("example", |v| v.as_f64().unwrap_or(0.0) * 10.0);
        assert_eq!(scope.get("example"), Value::from(10));
        assert_eq!(scope.state().len(), 1);
    }

    #[test]
    fn fresh_scope_is_idle_and_empty() {
        let scope = scope();
        assert_eq!(scope.phase(), Phase::Idle);
        assert_eq!(scope.watcher_count(), 0);
        assert_eq!(scope.config().max_iterations, 10);
    }

    #[test]
    fn clones_share_one_scope() {
        let a = scope();
        let b = a.clone();
        b.set("x", "shared");

        assert!(a.ptr_eq(&b));
        assert_eq!(a.get("x").as_str(), Some("shared"));
        assert!(!a.ptr_eq(&scope()));
    }

    #[test]
    fn with_config_validates() {
        let timer = Arc::new(ManualTimer::new());
        let err = Scope::with_config(timer.clone(), DigestConfig::default().with_max_iterations(0))
            .err()
            .unwrap();
        assert!(matches!(err, crate::ScopeError::Config(_)));

        let scope = Scope::with_config(timer, DigestConfig::default().with_max_iterations(3)).unwrap();
        assert_eq!(scope.config().max_iterations, 3);
    }

    #[test]
    fn eval_passes_scope_and_locals() {
        let scope = scope();
        scope.set("aValue", 42);

        let result = scope.eval(|s, _| s.get("aValue"), None);
        assert_eq!(result, Value::from(42));

        let locals = Value::from(2);
        let sum = scope.eval(
            |s, locals| s.get("aValue").as_f64().unwrap() + locals.and_then(Value::as_f64).unwrap(),
            Some(&locals),
        );
        assert_eq!(sum, 44.0);
    }

    #[test]
    fn watch_handle_removal_is_idempotent() {
        let scope = scope();
        let handle = scope.watch_only(|s| Ok(s.get("a")));
        let other = scope.watch_only(|s| Ok(s.get("b")));
        assert_eq!(scope.watcher_count(), 2);

        assert!(handle.remove());
        assert!(!handle.remove());
        assert!(!handle.clone().remove());
        assert_eq!(scope.watcher_count(), 1);

        // Dropping a handle does not deregister
        drop(other);
        assert_eq!(scope.watcher_count(), 1);
    }

    #[test]
    fn removal_after_scope_drop_is_a_noop() {
        let scope = scope();
        let handle = scope.watch_only(|_| Ok(Value::Null));
        drop(scope);
        assert!(!handle.remove());
    }
}
