use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::types::{Target, TargetId};

/// Rules deciding when a target is due again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuePolicy {
    /// Floor applied to every target interval
    pub min_interval: Duration,

    /// When set, a target whose last probe was down is due again after this
    /// long (capped by its interval). When unset a failed probe waits the full
    /// interval like a successful one.
    pub retry_failed_after: Option<Duration>,
}

impl Default for DuePolicy {
    fn default() -> Self {
        Self { min_interval: Duration::from_secs(1), retry_failed_after: None }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    last_checked: Option<Instant>,
    last_up: bool,
    in_flight: bool,
}

/// Last-checked bookkeeping for the scheduler.
///
/// Process-local and monotonic. Starts empty, so after a restart every target
/// is due on the first tick.
#[derive(Debug, Default)]
pub struct CheckLedger {
    policy: DuePolicy,
    entries: Mutex<HashMap<TargetId, Entry>>,
}

impl CheckLedger {
    pub fn new(policy: DuePolicy) -> Self {
        Self { policy, entries: Mutex::new(HashMap::new()) }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<TargetId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `target` should be probed at `now`. Reads only.
    pub fn is_due(&self, target: &Target, now: Instant) -> bool {
        let entries = self.entries();
        self.entry_is_due(entries.get(&target.id), target, now)
    }

    /// Atomically check due-ness and mark the target in flight.
    ///
    /// Returns `false` when the target is not due or already being probed, so
    /// one target never has two probes running at once.
    pub fn claim_if_due(&self, target: &Target, now: Instant) -> bool {
        let mut entries = self.entries();
        if !self.entry_is_due(entries.get(&target.id), target, now) {
            return false;
        }
        entries.entry(target.id).or_default().in_flight = true;
        true
    }

    /// Record a finished probe. `checked_at` is the tick the probe was
    /// dispatched on, whatever the outcome.
    pub fn complete(&self, id: TargetId, checked_at: Instant, up: bool) {
        let mut entries = self.entries();
        let entry = entries.entry(id).or_default();
        entry.last_checked = Some(checked_at);
        entry.last_up = up;
        entry.in_flight = false;
    }

    /// Drop a claim whose probe never started
    pub fn release(&self, id: TargetId) {
        if let Some(entry) = self.entries().get_mut(&id) {
            entry.in_flight = false;
        }
    }

    /// Forget targets that are no longer registered. Entries with a probe in
    /// flight are kept until that probe completes. Returns the number pruned.
    pub fn retain_targets(&self, live: &HashSet<TargetId>) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|id, entry| entry.in_flight || live.contains(id));
        before - entries.len()
    }

    pub fn is_in_flight(&self, id: TargetId) -> bool {
        self.entries().get(&id).is_some_and(|entry| entry.in_flight)
    }

    pub fn last_checked(&self, id: TargetId) -> Option<Instant> {
        self.entries().get(&id).and_then(|entry| entry.last_checked)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    fn entry_is_due(&self, entry: Option<&Entry>, target: &Target, now: Instant) -> bool {
        let Some(entry) = entry else { return true };
        if entry.in_flight {
            return false;
        }
        let Some(last_checked) = entry.last_checked else { return true };

        let mut wait = target.effective_interval(self.policy.min_interval);
        if !entry.last_up {
            if let Some(retry) = self.policy.retry_failed_after {
                wait = wait.min(retry.max(self.policy.min_interval));
            }
        }

        now.saturating_duration_since(last_checked) >= wait
    }
}
