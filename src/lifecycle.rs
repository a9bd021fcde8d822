use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Exactly-once bookkeeping for `created`, `onload` and `done`.
///
/// Each `mark_*` method returns `true` only for the call that performs the transition,
/// so the caller fires the matching callback exactly when it gets `true`. Script slots are
/// tracked by descriptor index; settling an index twice (or one never tracked) is a no-op.
#[derive(Debug, Default)]
pub struct LifecycleLatch {
    pending: AtomicUsize,
    tracked: Mutex<HashSet<usize>>,
    fired_created: AtomicBool,
    fired_onload: AtomicBool,
    fired_done: AtomicBool,
}

impl LifecycleLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking script `index`. Refused once `done` has fired or for a duplicate index.
    pub fn track(&self, index: usize) -> bool {
        let mut tracked = self.tracked.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if self.fired_done.load(Ordering::Acquire) || !tracked.insert(index) {
            return false;
        }
        self.pending.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Record completion of script `index`. Returns `true` when this settle drained the
    /// last pending script.
    pub fn settle(&self, index: usize) -> bool {
        let removed = self
            .tracked
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&index);
        if !removed {
            tracing::debug!(target: "env", index, "ignoring duplicate completion");
            return false;
        }
        self.pending.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn mark_created(&self) -> bool {
        transition(&self.fired_created)
    }

    pub fn mark_onload(&self) -> bool {
        self.fired_created.load(Ordering::Acquire)
            && !self.fired_done.load(Ordering::Acquire)
            && transition(&self.fired_onload)
    }

    /// Normal completion: requires `created` and `onload` and no pending scripts.
    pub fn mark_done(&self) -> bool {
        // Holding the lock keeps `track` from slipping a script in between the checks.
        let _tracked = self.tracked.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.fired_created.load(Ordering::Acquire)
            && self.fired_onload.load(Ordering::Acquire)
            && self.pending.load(Ordering::Acquire) == 0
            && transition(&self.fired_done)
    }

    /// Fatal completion: `done` fires without `onload`. Requires `created`.
    pub fn mark_failed(&self) -> bool {
        self.fired_created.load(Ordering::Acquire) && transition(&self.fired_done)
    }
}

fn transition(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}
