//! Health tracker - decaying reliability scores per voice identity.
//!
//! Pure in-memory state machine, no I/O. The application layer shares
//! one tracker across round dispatch tasks and the infrastructure
//! monitor behind a single mutex; nothing in here is async.

use crate::core::error::ErrorKind;
use crate::core::identity::VoiceIdentity;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Tuning knobs for [`HealthTracker`].
#[derive(Debug, Clone)]
pub struct HealthPolicy {
    /// Floor for any health score
    pub min_health: f64,
    /// Ceiling for any health score
    pub max_health: f64,
    /// Score assigned to an identity with no recorded history
    pub initial_health: f64,
    /// Multiplier applied on success
    pub success_boost: f64,
    /// Multiplier applied on failure
    pub failure_penalty: f64,
    /// Consecutive failures beyond which the streak penalty applies
    pub streak_threshold: u32,
    /// Extra multiplier once the streak threshold is exceeded
    pub streak_penalty: f64,
    /// Consecutive failures that force emergency exclusion
    pub exclusion_streak: u32,
    /// Number of recent outcomes considered for ratio-based exclusion
    pub recent_window: usize,
    /// Failure ratio over a full recent window that forces exclusion
    pub exclusion_failure_ratio: f64,
    /// Idle period after which a one-time partial recovery applies
    pub recovery_window: Duration,
    /// Fraction of the gap to `initial_health` recovered per idle window
    pub recovery_fraction: f64,
    /// EMA smoothing factor for the coherence signal
    pub coherence_alpha: f64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            min_health: 0.1,
            max_health: 1.0,
            initial_health: 0.8,
            success_boost: 1.1,
            failure_penalty: 0.85,
            streak_threshold: 3,
            streak_penalty: 0.7,
            exclusion_streak: 10,
            recent_window: 20,
            exclusion_failure_ratio: 0.9,
            recovery_window: Duration::hours(24),
            recovery_fraction: 0.5,
            coherence_alpha: 0.3,
        }
    }
}

/// Point-in-time view of one identity's tracked state.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub score: f64,
    pub consecutive_failures: u32,
    /// Fraction of failures over the recent outcome window (0 when empty)
    pub failure_rate: f64,
    /// Smoothed response-quality signal in [0, 1]
    pub coherence: f64,
    pub error_histogram: BTreeMap<ErrorKind, u32>,
    pub total_outcomes: u64,
}

#[derive(Debug, Clone)]
struct VoiceHealth {
    score: f64,
    consecutive_failures: u32,
    /// Recent outcomes, `true` = success; bounded by `recent_window`
    recent: VecDeque<bool>,
    error_histogram: BTreeMap<ErrorKind, u32>,
    coherence: f64,
    total_outcomes: u64,
    last_outcome_at: DateTime<Utc>,
}

impl VoiceHealth {
    fn new(policy: &HealthPolicy, now: DateTime<Utc>) -> Self {
        Self {
            score: policy.initial_health,
            consecutive_failures: 0,
            recent: VecDeque::with_capacity(policy.recent_window),
            error_histogram: BTreeMap::new(),
            coherence: 0.5,
            total_outcomes: 0,
            last_outcome_at: now,
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let failures = self.recent.iter().filter(|success| !**success).count();
        failures as f64 / self.recent.len() as f64
    }
}

/// Decaying reliability score per voice identity.
///
/// Scores always stay within `[min_health, max_health]`. Success
/// multiplies the score up, failure multiplies it down, and a failure
/// streak past the threshold applies an extra penalty. Identities that
/// sit idle past `recovery_window` are partially forgiven the next
/// time their score is touched, so stale failures do not starve a
/// recovered voice forever.
#[derive(Debug)]
pub struct HealthTracker {
    policy: HealthPolicy,
    voices: HashMap<VoiceIdentity, VoiceHealth>,
}

impl HealthTracker {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            voices: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Record a dispatch or probe outcome and return the new score.
    pub fn record_outcome(
        &mut self,
        identity: &VoiceIdentity,
        success: bool,
        error_kind: Option<ErrorKind>,
    ) -> f64 {
        self.record_outcome_at(identity, success, error_kind, Utc::now())
    }

    /// Clock-injected variant of [`Self::record_outcome`].
    pub fn record_outcome_at(
        &mut self,
        identity: &VoiceIdentity,
        success: bool,
        error_kind: Option<ErrorKind>,
        now: DateTime<Utc>,
    ) -> f64 {
        let policy = self.policy.clone();
        let entry = self
            .voices
            .entry(identity.clone())
            .or_insert_with(|| VoiceHealth::new(&policy, now));
        Self::maybe_recover(&policy, entry, now);

        if success {
            entry.score = (entry.score * policy.success_boost).min(policy.max_health);
            entry.consecutive_failures = 0;
        } else {
            entry.score = (entry.score * policy.failure_penalty).max(policy.min_health);
            entry.consecutive_failures += 1;
            if entry.consecutive_failures > policy.streak_threshold {
                entry.score = (entry.score * policy.streak_penalty).max(policy.min_health);
            }
            let kind = error_kind.unwrap_or(ErrorKind::Other);
            *entry.error_histogram.entry(kind).or_insert(0) += 1;
        }

        if entry.recent.len() == policy.recent_window {
            entry.recent.pop_front();
        }
        entry.recent.push_back(success);
        entry.total_outcomes += 1;
        entry.last_outcome_at = now;
        entry.score
    }

    /// Current health score, used directly as selection probability.
    pub fn selection_probability(&mut self, identity: &VoiceIdentity) -> f64 {
        self.selection_probability_at(identity, Utc::now())
    }

    pub fn selection_probability_at(&mut self, identity: &VoiceIdentity, now: DateTime<Utc>) -> f64 {
        let policy = self.policy.clone();
        match self.voices.get_mut(identity) {
            Some(entry) => {
                Self::maybe_recover(&policy, entry, now);
                entry.score
            }
            None => policy.initial_health,
        }
    }

    /// Squared score: downstream aggregation emphasizes healthy voices
    /// super-linearly.
    pub fn synthesis_weight(&mut self, identity: &VoiceIdentity) -> f64 {
        self.synthesis_weight_at(identity, Utc::now())
    }

    pub fn synthesis_weight_at(&mut self, identity: &VoiceIdentity, now: DateTime<Utc>) -> f64 {
        let score = self.selection_probability_at(identity, now);
        score * score
    }

    /// Whether the identity should be barred from selection outright.
    pub fn should_emergency_exclude(&self, identity: &VoiceIdentity) -> bool {
        let Some(entry) = self.voices.get(identity) else {
            return false;
        };
        if entry.consecutive_failures >= self.policy.exclusion_streak {
            return true;
        }
        entry.recent.len() >= self.policy.recent_window
            && entry.failure_rate() >= self.policy.exclusion_failure_ratio
    }

    /// Feed a response-quality signal into the coherence EMA.
    pub fn note_quality(&mut self, identity: &VoiceIdentity, quality: f64) {
        let policy = self.policy.clone();
        let entry = self
            .voices
            .entry(identity.clone())
            .or_insert_with(|| VoiceHealth::new(&policy, Utc::now()));
        let quality = quality.clamp(0.0, 1.0);
        entry.coherence =
            policy.coherence_alpha * quality + (1.0 - policy.coherence_alpha) * entry.coherence;
    }

    pub fn snapshot(&mut self, identity: &VoiceIdentity) -> HealthSnapshot {
        self.snapshot_at(identity, Utc::now())
    }

    pub fn snapshot_at(&mut self, identity: &VoiceIdentity, now: DateTime<Utc>) -> HealthSnapshot {
        let policy = self.policy.clone();
        match self.voices.get_mut(identity) {
            Some(entry) => {
                Self::maybe_recover(&policy, entry, now);
                HealthSnapshot {
                    score: entry.score,
                    consecutive_failures: entry.consecutive_failures,
                    failure_rate: entry.failure_rate(),
                    coherence: entry.coherence,
                    error_histogram: entry.error_histogram.clone(),
                    total_outcomes: entry.total_outcomes,
                }
            }
            None => HealthSnapshot {
                score: policy.initial_health,
                consecutive_failures: 0,
                failure_rate: 0.0,
                coherence: 0.5,
                error_histogram: BTreeMap::new(),
                total_outcomes: 0,
            },
        }
    }

    /// Operator action: forget everything about an identity. This is
    /// the only way an emergency-excluded voice re-enters selection.
    pub fn reset(&mut self, identity: &VoiceIdentity) {
        self.voices.remove(identity);
    }

    pub fn known_identities(&self) -> Vec<VoiceIdentity> {
        self.voices.keys().cloned().collect()
    }

    /// One-time partial recovery after an idle gap.
    ///
    /// The recovered fraction is proportional to the elapsed time over
    /// the window, capped at a full `recovery_fraction` gap closure.
    /// `last_outcome_at` is bumped so the forgiveness is not re-applied
    /// on every subsequent read.
    fn maybe_recover(policy: &HealthPolicy, entry: &mut VoiceHealth, now: DateTime<Utc>) {
        let elapsed = now - entry.last_outcome_at;
        if elapsed < policy.recovery_window {
            return;
        }
        if entry.score < policy.initial_health {
            let windows =
                elapsed.num_seconds() as f64 / policy.recovery_window.num_seconds().max(1) as f64;
            let fraction = (policy.recovery_fraction * windows).min(1.0);
            entry.score += (policy.initial_health - entry.score) * fraction;
            entry.score = entry.score.clamp(policy.min_health, policy.max_health);
            entry.consecutive_failures = 0;
        }
        entry.last_outcome_at = now;
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(HealthPolicy::default())
    }
}
