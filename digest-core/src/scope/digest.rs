//! Digest Loop
//!
//! A digest runs scans until the scope settles.
//!
//! # Algorithm
//!
//! 1. Enter [`Phase::Digesting`] and clear the last-dirty marker.
//! 2. If a coalesced apply is pending, cancel its timer and flush it inline.
//! 3. While the last scan was dirty or async tasks are queued:
//!    a. drain the async queue (tasks may queue more tasks);
//!    b. fail with [`ScopeError::Convergence`] if the iteration budget is
//!       spent;
//!    c. run one scan.
//! 4. Leave the phase, then drain the post-digest queue.
//!
//! # Short-Circuiting
//!
//! Each dirty watcher becomes the last-dirty marker. When a scan reaches the
//! marker and finds it clean, every watcher since the marker's last change is
//! known to be clean too, so the scan stops there instead of walking the
//! rest of the list. A settled digest over `n` watchers with one change
//! costs about `n` evaluations plus the distance to the changed watcher.

use tracing::{debug, error, trace, warn};

use crate::error::{Result, ScopeError};
use crate::value::is_dirty;

use super::phase::{Phase, PhaseGuard};
use super::Scope;

impl Scope {
    /// Run watchers until nothing changes.
    ///
    /// Fails with [`ScopeError::PhaseInProgress`] when called while another
    /// digest or apply is active (for example from inside a listener), and
    /// with [`ScopeError::Convergence`] when the watchers keep changing past
    /// the configured iteration limit.
    pub fn digest(&self) -> Result<()> {
        let span = tracing::debug_span!("digest", watchers = self.watcher_count());
        let _enter = span.enter();

        let phase = PhaseGuard::enter(&self.inner.phase, Phase::Digesting)?;
        self.inner.registry.lock().reset_last_dirty();

        self.absorb_pending_apply_async();

        let max_iterations = self.inner.config.max_iterations;
        let mut remaining = max_iterations;
        let mut dirty = true;

        while dirty || self.has_pending_async() {
            self.drain_async_queue();

            if remaining == 0 {
                drop(phase);
                warn!(iterations = max_iterations, "digest did not converge");
                return Err(ScopeError::Convergence {
                    iterations: max_iterations,
                });
            }
            remaining -= 1;
            dirty = self.digest_once();
        }

        drop(phase);
        debug!(iterations = max_iterations - remaining, "digest settled");

        self.drain_post_digest();
        Ok(())
    }

    /// One scan over the watchers. Returns whether any of them was dirty.
    fn digest_once(&self) -> bool {
        let mut dirty = false;
        let mut cursor = None;

        loop {
            // Lock only long enough to find the next watcher.
            let next = self.inner.registry.lock().next_after(cursor);
            let Some(watcher) = next else {
                break;
            };
            cursor = Some(watcher.id());

            let new_value = match watcher.evaluate(self) {
                Ok(value) => value,
                Err(error) => {
                    error!(watcher = %watcher.id(), %error, "watch function failed");
                    continue;
                }
            };
            let last = watcher.last();

            if is_dirty(&new_value, last.as_ref(), watcher.is_deep()) {
                self.inner.registry.lock().set_last_dirty(watcher.id());
                watcher.store_last(&new_value);

                // First sighting reports the new value as the old one.
                let old_value = last.unwrap_or_else(|| new_value.clone());

                trace!(watcher = %watcher.id(), new = ?new_value, old = ?old_value, "watcher dirty");
                if let Err(error) = watcher.notify(&new_value, &old_value, self) {
                    error!(watcher = %watcher.id(), %error, "listener failed");
                }
                dirty = true;
            } else if self.inner.registry.lock().last_dirty() == Some(watcher.id()) {
                break;
            }
        }

        dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::timer::ManualTimer;
    use crate::value::Value;

    fn scope() -> Scope {
        Scope::new(Arc::new(ManualTimer::new()))
    }

    #[test]
    fn listener_fires_on_first_digest_and_on_change() {
        let scope = scope();
        scope.set("someValue", "a");
        scope.set("counter", 0);

        scope.watch(
            |s| Ok(s.get("someValue")),
            |_, _, s| {
                s.update("counter", |c| c.as_f64().unwrap_or(0.0) + 1.0);
                Ok(())
            },
            false,
        );

        assert_eq!(scope.get("counter"), Value::from(0));
        scope.digest().unwrap();
        assert_eq!(scope.get("counter"), Value::from(1));
        scope.digest().unwrap();
        assert_eq!(scope.get("counter"), Value::from(1));

        scope.set("someValue", "b");
        scope.digest().unwrap();
        assert_eq!(scope.get("counter"), Value::from(2));
    }

    #[test]
    fn nested_digest_from_listener_is_rejected() {
        let scope = scope();
        let rejected = Arc::new(AtomicUsize::new(0));
        let rejected_clone = rejected.clone();

        scope.watch(
            |_| Ok(Value::from(1)),
            move |_, _, s| {
                if s.digest().err().is_some_and(|e| e.is_phase_violation()) {
                    rejected_clone.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            },
            false,
        );

        scope.digest().unwrap();
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
        assert_eq!(scope.phase(), Phase::Idle);
    }

    #[test]
    fn failing_watch_function_does_not_stop_the_scan() {
        let scope = scope();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        scope.watch_only(|_| Err("boom".into()));
        scope.watch(
            |_| Ok(Value::from("ok")),
            move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            false,
        );

        scope.digest().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_listener_does_not_stop_the_scan() {
        let scope = scope();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        scope.watch(|_| Ok(Value::from(1)), |_, _, _| Err("listener broke".into()), false);
        scope.watch(
            |_| Ok(Value::from(2)),
            move |_, _, _| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            false,
        );

        scope.digest().unwrap();
        scope.digest().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn custom_iteration_limit_is_honored() {
        let scope = Scope::with_config(
            Arc::new(ManualTimer::new()),
            crate::DigestConfig::default().with_max_iterations(3),
        )
        .unwrap();
        let scans = Arc::new(AtomicUsize::new(0));
        let scans_clone = scans.clone();

        // Always dirty: a fresh value every evaluation
        scope.watch_only(move |_| Ok(Value::from(scans_clone.fetch_add(1, Ordering::SeqCst))));

        let err = scope.digest().unwrap_err();
        assert!(matches!(err, ScopeError::Convergence { iterations: 3 }));
        assert_eq!(scans.load(Ordering::SeqCst), 3);
        assert_eq!(scope.phase(), Phase::Idle);
    }
}
