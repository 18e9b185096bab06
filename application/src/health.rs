//! Shared, mutex-guarded health tracker.
//!
//! The domain [`HealthTracker`] is a plain synchronous state machine.
//! Round dispatch tasks and the infrastructure monitor share one
//! instance behind a single mutex; every operation is a short
//! in-memory update, so the std mutex is held only across
//! non-suspending code.

use chorus_domain::{ErrorKind, HealthPolicy, HealthSnapshot, HealthTracker, VoiceIdentity};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle to the session's single [`HealthTracker`].
#[derive(Clone)]
pub struct SharedHealthTracker {
    inner: Arc<Mutex<HealthTracker>>,
}

impl SharedHealthTracker {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HealthTracker::new(policy))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HealthTracker> {
        // A poisoned lock only means a panic elsewhere; the tracker
        // state itself is still valid scalar data.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record_outcome(
        &self,
        identity: &VoiceIdentity,
        success: bool,
        error_kind: Option<ErrorKind>,
    ) -> f64 {
        self.lock().record_outcome(identity, success, error_kind)
    }

    pub fn selection_probability(&self, identity: &VoiceIdentity) -> f64 {
        self.lock().selection_probability(identity)
    }

    pub fn synthesis_weight(&self, identity: &VoiceIdentity) -> f64 {
        self.lock().synthesis_weight(identity)
    }

    pub fn should_emergency_exclude(&self, identity: &VoiceIdentity) -> bool {
        self.lock().should_emergency_exclude(identity)
    }

    pub fn note_quality(&self, identity: &VoiceIdentity, quality: f64) {
        self.lock().note_quality(identity, quality)
    }

    pub fn snapshot(&self, identity: &VoiceIdentity) -> HealthSnapshot {
        self.lock().snapshot(identity)
    }

    /// Operator action; the only path back from emergency exclusion.
    pub fn reset(&self, identity: &VoiceIdentity) {
        self.lock().reset(identity)
    }

    pub fn known_identities(&self) -> Vec<VoiceIdentity> {
        self.lock().known_identities()
    }
}

impl Default for SharedHealthTracker {
    fn default() -> Self {
        Self::new(HealthPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let tracker = SharedHealthTracker::default();
        let clone = tracker.clone();
        let identity = VoiceIdentity::new("p", "m");
        tracker.record_outcome(&identity, false, Some(ErrorKind::Timeout));
        assert_eq!(clone.snapshot(&identity).consecutive_failures, 1);
    }
}
