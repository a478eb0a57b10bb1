//! Three non-negative counters guarded by one mutex. They are a lightweight
//! gate only: walkers bump them on change, differs/executor decrement them
//! once per sweep/drain. Correctness must never depend on exact values.

use parking_lot::Mutex;

#[derive(Default)]
struct Counts {
    local_changed: u64,
    remote_changed: u64,
    action_pending: u64,
}

pub struct ModificationCounters {
    inner: Mutex<Counts>,
}

impl Default for ModificationCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl ModificationCounters {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Counts::default()),
        }
    }

    pub fn bump_local_changed(&self) {
        self.inner.lock().local_changed += 1;
    }

    pub fn bump_remote_changed(&self) {
        self.inner.lock().remote_changed += 1;
    }

    pub fn bump_action_pending(&self) {
        self.inner.lock().action_pending += 1;
    }

    pub fn local_changed(&self) -> u64 {
        self.inner.lock().local_changed
    }

    pub fn remote_changed(&self) -> u64 {
        self.inner.lock().remote_changed
    }

    pub fn action_pending(&self) -> u64 {
        self.inner.lock().action_pending
    }

    pub fn decrement_local_changed(&self) {
        let mut counts = self.inner.lock();
        counts.local_changed = counts.local_changed.saturating_sub(1);
    }

    pub fn decrement_remote_changed(&self) {
        let mut counts = self.inner.lock();
        counts.remote_changed = counts.remote_changed.saturating_sub(1);
    }

    pub fn decrement_action_pending(&self) {
        let mut counts = self.inner.lock();
        counts.action_pending = counts.action_pending.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_at_zero() {
        let counters = ModificationCounters::new();
        counters.decrement_local_changed();
        assert_eq!(counters.local_changed(), 0);
    }

    #[test]
    fn bump_then_decrement_round_trips() {
        let counters = ModificationCounters::new();
        counters.bump_local_changed();
        counters.bump_local_changed();
        assert_eq!(counters.local_changed(), 2);
        counters.decrement_local_changed();
        assert_eq!(counters.local_changed(), 1);
    }
}
