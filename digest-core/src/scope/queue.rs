//! Deferred Work
//!
//! Three queues sit around the digest loop:
//!
//! | Queue         | Filled by          | Drained                          |
//! |---------------|--------------------|----------------------------------|
//! | async         | [`Scope::eval_async`]  | before every scan of a digest    |
//! | apply-async   | [`Scope::apply_async`] | one `apply` per timer, or inline by the next digest |
//! | post-digest   | [`Scope::post_digest`] | once, after a digest settles     |
//!
//! All three are FIFO and isolate failures: a task that returns an error is
//! logged and the rest of the queue still runs.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::error::{CallbackResult, Result, ScopeError};
use crate::timer::TimerHandle;
use crate::value::Value;

use super::phase::{Phase, PhaseGuard};
use super::{Scope, WeakScope};

type Expression = Box<dyn FnOnce(&Scope, Option<&Value>) -> CallbackResult + Send>;
type ApplyTask = Box<dyn FnOnce(&Scope) -> CallbackResult + Send>;
type PostDigestTask = Box<dyn FnOnce() -> CallbackResult + Send>;

/// An expression queued by `eval_async`, with the scope it runs against.
struct AsyncTask {
    scope: WeakScope,
    expression: Expression,
}

/// Coalesced `apply_async` work. One timer serves the whole batch.
#[derive(Default)]
struct ApplyAsyncBatch {
    tasks: VecDeque<ApplyTask>,
    /// Set from scheduling until the flush that empties `tasks`.
    timer: Option<TimerHandle>,
}

#[derive(Default)]
pub(super) struct TaskQueues {
    async_queue: Mutex<VecDeque<AsyncTask>>,
    apply_async: Mutex<ApplyAsyncBatch>,
    post_digest: Mutex<VecDeque<PostDigestTask>>,
}

impl Scope {
    /// Queue `expr` to run during the current digest, or a digest that will
    /// be scheduled for it.
    ///
    /// Inside a digest the task runs before that digest's next scan. Outside
    /// one, the first task of an idle burst schedules a digest on the timer;
    /// that digest only runs if the queue is still non-empty when it fires.
    pub fn eval_async<F>(&self, expr: F)
    where
        F: FnOnce(&Scope, Option<&Value>) -> CallbackResult + Send + 'static,
    {
        let idle = self.phase() == Phase::Idle;
        let schedule = {
            let mut queue = self.inner.queues.async_queue.lock();
            let was_empty = queue.is_empty();
            queue.push_back(AsyncTask {
                scope: self.downgrade(),
                expression: Box::new(expr),
            });
            idle && was_empty
        };

        if schedule {
            let weak = self.downgrade();
            self.inner.timer.schedule_soon(Box::new(move || {
                let Some(scope) = weak.upgrade() else {
                    return;
                };
                if scope.has_pending_async() {
                    if let Err(error) = scope.digest() {
                        warn!(%error, "scheduled digest failed");
                    }
                }
            }));
        }
    }

    /// Queue `expr` for a coalesced apply.
    ///
    /// Every call made before the timer fires joins the same batch, and the
    /// batch is run by a single `apply`, so it costs one digest. An explicit
    /// [`digest`](Self::digest) before then runs the batch inline and cancels
    /// the timer.
    pub fn apply_async<F>(&self, expr: F)
    where
        F: FnOnce(&Scope, Option<&Value>) -> CallbackResult + Send + 'static,
    {
        let mut batch = self.inner.queues.apply_async.lock();
        batch
            .tasks
            .push_back(Box::new(move |scope: &Scope| scope.eval(expr, None)));

        if batch.timer.is_none() {
            let weak = self.downgrade();
            let handle = self.inner.timer.schedule_soon(Box::new(move || {
                if let Some(scope) = weak.upgrade() {
                    scope.fire_apply_async();
                }
            }));
            batch.timer = Some(handle);
        }
    }

    /// Evaluate `expr` in the [`Phase::Applying`] phase, then digest.
    ///
    /// The digest runs whether or not `expr` succeeds. The expression's value
    /// is returned once the digest is done; its error comes back as
    /// [`ScopeError::Callback`]. A digest failure wins over an expression
    /// failure, which is then only logged.
    pub fn apply<F, R>(&self, expr: F, locals: Option<&Value>) -> Result<R>
    where
        F: FnOnce(&Scope, Option<&Value>) -> CallbackResult<R>,
    {
        let outcome = {
            let _phase = PhaseGuard::enter(&self.inner.phase, Phase::Applying)?;
            self.eval(expr, locals)
        };

        let digested = self.digest();

        match (outcome, digested) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(error), Ok(())) => Err(ScopeError::Callback(error)),
            (Ok(_), Err(digest_error)) => Err(digest_error),
            (Err(error), Err(digest_error)) => {
                error!(%error, "apply expression failed before a failing digest");
                Err(digest_error)
            }
        }
    }

    /// Run `f` once, after the next digest settles. Schedules nothing.
    pub fn post_digest<F>(&self, f: F)
    where
        F: FnOnce() -> CallbackResult + Send + 'static,
    {
        self.inner.queues.post_digest.lock().push_back(Box::new(f));
    }

    /// True when the coalescing timer is armed.
    pub fn has_pending_apply_async(&self) -> bool {
        self.inner.queues.apply_async.lock().timer.is_some()
    }

    pub(super) fn has_pending_async(&self) -> bool {
        !self.inner.queues.async_queue.lock().is_empty()
    }

    pub(super) fn drain_async_queue(&self) {
        loop {
            let task = self.inner.queues.async_queue.lock().pop_front();
            let Some(AsyncTask { scope, expression }) = task else {
                break;
            };
            let Some(scope) = scope.upgrade() else {
                continue;
            };
            if let Err(error) = scope.eval(expression, None) {
                error!(%error, "async task failed");
            }
        }
    }

    pub(super) fn drain_post_digest(&self) {
        loop {
            let task = self.inner.queues.post_digest.lock().pop_front();
            let Some(task) = task else {
                break;
            };
            if let Err(error) = task() {
                error!(%error, "post-digest task failed");
            }
        }
    }

    /// Cancel the coalescing timer and run its batch now.
    pub(super) fn absorb_pending_apply_async(&self) {
        let pending = self.inner.queues.apply_async.lock().timer;
        if let Some(handle) = pending {
            self.inner.timer.cancel(handle);
            self.flush_apply_async();
        }
    }

    fn fire_apply_async(&self) {
        let result = self.apply(
            |scope, _| {
                scope.flush_apply_async();
                Ok(())
            },
            None,
        );
        if let Err(error) = result {
            warn!(%error, "coalesced apply failed");
        }
    }

    /// Run the batch to empty, including tasks queued by the batch itself,
    /// then disarm the timer.
    fn flush_apply_async(&self) {
        loop {
            let task = {
                let mut batch = self.inner.queues.apply_async.lock();
                match batch.tasks.pop_front() {
                    Some(task) => task,
                    None => {
                        batch.timer = None;
                        break;
                    }
                }
            };
            if let Err(error) = task(self) {
                error!(%error, "apply_async task failed");
            }
        }
    }
}
