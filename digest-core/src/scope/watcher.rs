//! Watcher Registry
//!
//! The registry owns a scope's watchers in registration order, plus the
//! last-dirty marker the digest uses to cut scans short.
//!
//! # Iterating While Mutating
//!
//! Listeners run in the middle of a scan and may add or remove watchers. The
//! scan therefore never holds an iterator. It keeps a cursor (the id of the
//! watcher it visited last) and asks for "the next watcher after the cursor"
//! under the lock each step. Ids grow monotonically and the list stays sorted
//! by id, so:
//!
//! - removing any watcher, visited or not, never causes a skip or a
//!   second visit of another one;
//! - a watcher added mid-scan sorts after everything present and is reached
//!   later in the same pass.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::CallbackResult;
use crate::value::Value;

use super::{Scope, WeakScope};

pub(crate) type WatchFn = Box<dyn Fn(&Scope) -> CallbackResult<Value> + Send + Sync>;
pub(crate) type ListenerFn = Box<dyn Fn(&Value, &Value, &Scope) -> CallbackResult + Send + Sync>;

/// Identity of a registered watcher.
///
/// Allocated from a process-wide counter, so later registrations always get
/// larger ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w{}", self.0)
    }
}

/// A watch function, its listener, the comparison policy, and the value
/// seen on the last scan.
pub(crate) struct Watcher {
    id: WatcherId,
    watch_fn: WatchFn,
    listener_fn: ListenerFn,
    deep: bool,
    /// `None` until the first scan evaluates this watcher.
    last: Mutex<Option<Value>>,
}

impl Watcher {
    pub(crate) fn id(&self) -> WatcherId {
        self.id
    }

    pub(crate) fn is_deep(&self) -> bool {
        self.deep
    }

    pub(crate) fn evaluate(&self, scope: &Scope) -> CallbackResult<Value> {
        (self.watch_fn)(scope)
    }

    pub(crate) fn notify(&self, new_value: &Value, old_value: &Value, scope: &Scope) -> CallbackResult {
        (self.listener_fn)(new_value, old_value, scope)
    }

    pub(crate) fn last(&self) -> Option<Value> {
        self.last.lock().clone()
    }

    /// Record `value` as last seen. Deep watchers keep a detached copy so
    /// later in-place mutation of `value` stays detectable.
    pub(crate) fn store_last(&self, value: &Value) {
        let stored = if self.deep {
            value.deep_clone()
        } else {
            value.clone()
        };
        *self.last.lock() = Some(stored);
    }
}

/// Ordered watcher storage and the last-dirty marker.
#[derive(Default)]
pub(crate) struct Registry {
    watchers: Vec<Arc<Watcher>>,
    last_dirty: Option<WatcherId>,
}

impl Registry {
    /// Append a watcher and reset the marker.
    pub(crate) fn insert(&mut self, watch_fn: WatchFn, listener_fn: ListenerFn, deep: bool) -> WatcherId {
        // Allocated under the registry lock so ids stay sorted in the list.
        let id = WatcherId::next();
        self.watchers.push(Arc::new(Watcher {
            id,
            watch_fn,
            listener_fn,
            deep,
            last: Mutex::new(None),
        }));
        self.last_dirty = None;
        id
    }

    /// Remove a watcher by identity. Resets the marker when something was
    /// removed.
    pub(crate) fn remove(&mut self, id: WatcherId) -> bool {
        match self.watchers.binary_search_by_key(&id, |w| w.id) {
            Ok(index) => {
                self.watchers.remove(index);
                self.last_dirty = None;
                true
            }
            Err(_) => false,
        }
    }

    /// First watcher registered after `cursor`, or the first one overall.
    pub(crate) fn next_after(&self, cursor: Option<WatcherId>) -> Option<Arc<Watcher>> {
        let start = match cursor {
            Some(id) => self.watchers.partition_point(|w| w.id <= id),
            None => 0,
        };
        self.watchers.get(start).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.watchers.len()
    }

    pub(crate) fn last_dirty(&self) -> Option<WatcherId> {
        self.last_dirty
    }

    pub(crate) fn set_last_dirty(&mut self, id: WatcherId) {
        self.last_dirty = Some(id);
    }

    pub(crate) fn reset_last_dirty(&mut self) {
        self.last_dirty = None;
    }
}

/// Removes its watcher on [`remove`](Self::remove).
///
/// Dropping the handle leaves the watcher registered. Clones remove the same
/// watcher, and removal is safe from inside a listener.
#[derive(Clone)]
pub struct WatchHandle {
    scope: WeakScope,
    id: WatcherId,
}

impl WatchHandle {
    pub(crate) fn new(scope: WeakScope, id: WatcherId) -> Self {
        Self { scope, id }
    }

    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Deregister the watcher. Returns `false` if it was already gone or the
    /// scope has been dropped.
    pub fn remove(&self) -> bool {
        match self.scope.upgrade() {
            Some(scope) => scope.inner.registry.lock().remove(self.id),
            None => false,
        }
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle").field("id", &self.id).finish()
    }
}
