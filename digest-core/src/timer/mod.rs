//! Timer Service
//!
//! The engine never sleeps or spins a loop of its own. When it needs to run
//! something "soon" (the lazily scheduled digest behind `eval_async`, the
//! coalescing timer behind `apply_async`) it asks an injected [`Timer`].
//!
//! Two implementations ship with the crate:
//!
//! - [`ManualTimer`] queues callbacks until the embedder calls
//!   [`ManualTimer::run_pending`]. Deterministic, used throughout the tests.
//! - [`TokioTimer`] spawns each callback onto a tokio runtime.

mod manual;
mod runtime;

use std::sync::atomic::{AtomicU64, Ordering};

pub use self::manual::ManualTimer;
pub use self::runtime::TokioTimer;

/// Callback handed to a [`Timer`].
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Opaque identifier of a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Allocate a fresh handle.
    ///
    /// Uses an atomic counter so handles stay unique across timers and
    /// threads.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// "Run this after the current synchronous work, with minimal delay."
pub trait Timer: Send + Sync {
    /// Schedule `callback`. Implementations must not run it before returning.
    fn schedule_soon(&self, callback: TimerCallback) -> TimerHandle;

    /// Prevent a scheduled callback from running. No-op if it already ran or
    /// was cancelled.
    fn cancel(&self, handle: TimerHandle);
}
