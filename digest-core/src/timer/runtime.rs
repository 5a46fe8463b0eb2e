//! Tokio-backed timer.
//!
//! Each callback becomes a spawned task that yields once before running, so
//! it never fires inside the synchronous stretch that scheduled it. Scopes
//! are not meant to be digested from two threads at once; pair this timer
//! with a current-thread runtime (or a `LocalSet`-style single driver) when
//! the scope is also used outside the timer.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::AbortHandle;

use super::{Timer, TimerCallback, TimerHandle};

/// A [`Timer`] that runs callbacks as tokio tasks.
#[derive(Clone)]
pub struct TokioTimer {
    runtime: Handle,
    tasks: Arc<Mutex<HashMap<TimerHandle, AbortHandle>>>,
}

impl TokioTimer {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build a timer on the runtime the caller is running in.
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }

    /// Callbacks scheduled but not yet run or cancelled.
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Timer for TokioTimer {
    fn schedule_soon(&self, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::next();
        let tasks = Arc::clone(&self.tasks);

        // Hold the map while spawning so the task cannot look itself up
        // before it has been recorded.
        let mut pending = self.tasks.lock();
        let task = self.runtime.spawn(async move {
            tokio::task::yield_now().await;
            let still_scheduled = tasks.lock().remove(&handle).is_some();
            if still_scheduled {
                callback();
            }
        });
        pending.insert(handle, task.abort_handle());

        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        let task = self.tasks.lock().remove(&handle);
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl std::fmt::Debug for TokioTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioTimer")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn fires_after_the_caller_yields() {
        let timer = TokioTimer::try_current().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();

        timer.schedule_soon(Box::new(move || {
            let _ = tx.send(());
        }));
        assert_eq!(timer.pending(), 1);

        tokio::time::timeout(Duration::from_secs(1), rx)
            .await
            .expect("callback did not fire")
            .unwrap();
        assert_eq!(timer.pending(), 0);
    }

    #[tokio::test]
    async fn cancel_prevents_firing() {
        let timer = TokioTimer::try_current().unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = fired.clone();

        let handle = timer.schedule_soon(Box::new(move || {
            fired_clone.store(true, Ordering::SeqCst);
        }));
        timer.cancel(handle);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn try_current_fails_outside_a_runtime() {
        assert!(TokioTimer::try_current().is_err());
    }
}
