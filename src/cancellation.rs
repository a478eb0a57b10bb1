//! Cooperative cancellation shared by the two differs, the executor
//! coordinator, and every transient worker thread.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct State {
    cancelled: bool,
}

/// An `Arc`-shared flag plus condvar. Cloning shares the same underlying
/// flag; `cancel()` wakes every sleeper immediately rather than waiting out
/// their backoff.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<(Mutex<State>, Condvar)>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new((Mutex::new(State::default()), Condvar::new())),
        }
    }

    pub fn cancel(&self) {
        let (lock, condvar) = &*self.inner;
        lock.lock().cancelled = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.0.lock().cancelled
    }

    /// Sleeps for `dur` unless cancellation fires first, in which case it
    /// returns early. Used as the backoff primitive by the long-running loops.
    pub fn sleep(&self, dur: Duration) {
        let (lock, condvar) = &*self.inner;
        let mut guard = lock.lock();
        if guard.cancelled {
            return;
        }
        condvar.wait_for(&mut guard, dur);
    }
}
