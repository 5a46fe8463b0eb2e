//! Manually driven timer.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::{Timer, TimerCallback, TimerHandle};

/// A [`Timer`] that fires only when told to.
///
/// Callbacks queue in scheduling order. [`run_pending`](Self::run_pending)
/// fires the ones that were queued when it was called; anything they
/// schedule waits for the next call.
#[derive(Default)]
pub struct ManualTimer {
    queue: Mutex<VecDeque<(TimerHandle, TimerCallback)>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks waiting to fire.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Fire every callback queued at the time of the call, in order.
    ///
    /// A callback cancelled by an earlier one in the same round is skipped.
    /// Returns how many callbacks ran.
    pub fn run_pending(&self) -> usize {
        let due: Vec<TimerHandle> = self.queue.lock().iter().map(|(h, _)| *h).collect();
        let mut ran = 0;

        for handle in due {
            let callback = {
                let mut queue = self.queue.lock();
                queue
                    .iter()
                    .position(|(h, _)| *h == handle)
                    .and_then(|index| queue.remove(index))
                    .map(|(_, callback)| callback)
            };

            // Lock released before running: callbacks may schedule or cancel.
            if let Some(callback) = callback {
                callback();
                ran += 1;
            }
        }

        ran
    }

    /// Keep firing rounds until nothing is queued. Returns the total fired.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.run_pending();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }
}

impl Timer for ManualTimer {
    fn schedule_soon(&self, callback: TimerCallback) -> TimerHandle {
        let handle = TimerHandle::next();
        self.queue.lock().push_back((handle, callback));
        handle
    }

    fn cancel(&self, handle: TimerHandle) {
        self.queue.lock().retain(|(h, _)| *h != handle);
    }
}

impl std::fmt::Debug for ManualTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualTimer")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counter_callback(counter: &Arc<AtomicI32>) -> TimerCallback {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn callbacks_wait_for_run_pending() {
        let timer = ManualTimer::new();
        let count = Arc::new(AtomicI32::new(0));

        timer.schedule_soon(counter_callback(&count));
        timer.schedule_soon(counter_callback(&count));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(timer.pending(), 2);

        assert_eq!(timer.run_pending(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(timer.pending(), 0);
    }

    #[test]
    fn cancelled_callbacks_never_fire() {
        let timer = ManualTimer::new();
        let count = Arc::new(AtomicI32::new(0));

        let handle = timer.schedule_soon(counter_callback(&count));
        timer.cancel(handle);

        assert_eq!(timer.run_pending(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Cancelling twice is harmless
        timer.cancel(handle);
    }

    #[test]
    fn callbacks_scheduled_while_running_wait_a_round() {
        let timer = Arc::new(ManualTimer::new());
        let count = Arc::new(AtomicI32::new(0));

        let inner_timer = timer.clone();
        let inner_count = count.clone();
        timer.schedule_soon(Box::new(move || {
            inner_timer.schedule_soon(counter_callback(&inner_count));
        }));

        assert_eq!(timer.run_pending(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(timer.pending(), 1);

        assert_eq!(timer.run_until_idle(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
