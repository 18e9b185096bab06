//! Per-voice and round-level results.
//!
//! Absence is explicit data here, never an exception: every voice that
//! was dispatched ends up in the outcome map, either with a response
//! or with the reason it produced none.

use crate::core::error::ErrorKind;
use crate::core::identity::VoiceIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why a voice produced no response for a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsenceReason {
    /// The per-voice time budget expired
    Timeout,
    /// The round was cancelled before the voice answered; not the
    /// voice's fault and never recorded as a health failure
    Cancelled,
    /// The adapter returned an error of the given kind
    Adapter(ErrorKind),
}

impl std::fmt::Display for AbsenceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbsenceReason::Timeout => write!(f, "timeout"),
            AbsenceReason::Cancelled => write!(f, "cancelled"),
            AbsenceReason::Adapter(kind) => write!(f, "adapter:{kind}"),
        }
    }
}

/// Outcome of one voice's dispatch within a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceOutcome {
    Response {
        text: String,
        /// Scorer-assigned quality in [0, 1]
        quality: f64,
        latency_ms: u64,
    },
    Absent {
        reason: AbsenceReason,
    },
}

impl VoiceOutcome {
    pub fn response(text: impl Into<String>, quality: f64, latency_ms: u64) -> Self {
        Self::Response {
            text: text.into(),
            quality: quality.clamp(0.0, 1.0),
            latency_ms,
        }
    }

    pub fn absent(reason: AbsenceReason) -> Self {
        Self::Absent { reason }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, VoiceOutcome::Response { .. })
    }

    pub fn quality(&self) -> Option<f64> {
        match self {
            VoiceOutcome::Response { quality, .. } => Some(*quality),
            VoiceOutcome::Absent { .. } => None,
        }
    }

    pub fn absence_reason(&self) -> Option<AbsenceReason> {
        match self {
            VoiceOutcome::Absent { reason } => Some(*reason),
            VoiceOutcome::Response { .. } => None,
        }
    }
}

/// Weighted mean of `(quality, weight)` pairs.
///
/// Returns 0 when no pair carries positive weight.
pub fn weighted_aggregate(scored: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = scored.iter().map(|(_, w)| w).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted_sum: f64 = scored.iter().map(|(q, w)| q * w).sum();
    weighted_sum / total_weight
}

/// Complete result of one dialogue round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    /// Round type tag copied from the spec
    pub kind: String,
    /// Per-voice outcomes keyed by identity; key order carries no
    /// meaning about dispatch or completion order
    pub outcomes: BTreeMap<VoiceIdentity, VoiceOutcome>,
    /// Synthesis-weighted mean quality of present responses
    pub aggregate_score: f64,
    /// Aggregate exceeded the threshold with enough perspectives
    pub emergence: bool,
    /// Voices that produced no response
    pub absent: Vec<VoiceIdentity>,
    /// Set when the spec required all voices and some were absent
    pub incomplete: bool,
}

impl RoundResult {
    /// Build a round result from collected outcomes.
    ///
    /// `weights` are the synthesis weights captured at collection time
    /// for each responding identity.
    pub fn from_outcomes(
        kind: impl Into<String>,
        outcomes: BTreeMap<VoiceIdentity, VoiceOutcome>,
        weights: &BTreeMap<VoiceIdentity, f64>,
        emergence_threshold: f64,
        minimum_perspectives: usize,
        require_all_voices: bool,
    ) -> Self {
        let scored: Vec<(f64, f64)> = outcomes
            .iter()
            .filter_map(|(identity, outcome)| {
                let quality = outcome.quality()?;
                Some((quality, weights.get(identity).copied().unwrap_or(1.0)))
            })
            .collect();
        let aggregate_score = weighted_aggregate(&scored);

        let absent: Vec<VoiceIdentity> = outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_response())
            .map(|(identity, _)| identity.clone())
            .collect();
        let responders = outcomes.len() - absent.len();

        Self {
            kind: kind.into(),
            aggregate_score,
            emergence: aggregate_score > emergence_threshold && responders >= minimum_perspectives,
            incomplete: require_all_voices && !absent.is_empty(),
            absent,
            outcomes,
        }
    }

    pub fn responder_count(&self) -> usize {
        self.outcomes.len() - self.absent.len()
    }

    pub fn responses(&self) -> impl Iterator<Item = (&VoiceIdentity, &VoiceOutcome)> {
        self.outcomes.iter().filter(|(_, o)| o.is_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> VoiceIdentity {
        VoiceIdentity::new("p", name)
    }

    #[test]
    fn test_weighted_aggregate_contract_example() {
        // {voiceA: 0.9 (weight 1.0), voiceB: 0.3 (weight 0.25)}
        let aggregate = weighted_aggregate(&[(0.9, 1.0), (0.3, 0.25)]);
        assert!((aggregate - 0.78).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_aggregate_empty_is_zero() {
        assert_eq!(weighted_aggregate(&[]), 0.0);
        assert_eq!(weighted_aggregate(&[(0.9, 0.0)]), 0.0);
    }

    #[test]
    fn test_from_outcomes_flags() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(id("a"), VoiceOutcome::response("text", 0.9, 120));
        outcomes.insert(id("b"), VoiceOutcome::response("text", 0.3, 340));
        outcomes.insert(id("c"), VoiceOutcome::absent(AbsenceReason::Timeout));

        let mut weights = BTreeMap::new();
        weights.insert(id("a"), 1.0);
        weights.insert(id("b"), 0.25);

        let result = RoundResult::from_outcomes("opening", outcomes, &weights, 0.7, 2, true);
        assert!((result.aggregate_score - 0.78).abs() < 1e-9);
        assert!(result.emergence);
        assert!(result.incomplete);
        assert_eq!(result.absent, vec![id("c")]);
        assert_eq!(result.responder_count(), 2);
    }

    #[test]
    fn test_emergence_needs_minimum_perspectives() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(id("a"), VoiceOutcome::response("text", 0.95, 10));
        let weights = BTreeMap::from([(id("a"), 1.0)]);

        let result = RoundResult::from_outcomes("opening", outcomes, &weights, 0.7, 2, false);
        assert!(result.aggregate_score > 0.7);
        assert!(!result.emergence);
        assert!(!result.incomplete);
    }

    #[test]
    fn test_quality_clamped_on_construction() {
        let outcome = VoiceOutcome::response("t", 1.7, 5);
        assert_eq!(outcome.quality(), Some(1.0));
    }

    #[test]
    fn test_absence_reason_display() {
        assert_eq!(AbsenceReason::Timeout.to_string(), "timeout");
        assert_eq!(
            AbsenceReason::Adapter(ErrorKind::Connection).to_string(),
            "adapter:connection"
        );
    }

    #[test]
    fn test_round_result_json_roundtrip() {
        let mut outcomes = BTreeMap::new();
        outcomes.insert(id("a"), VoiceOutcome::response("hello", 0.8, 42));
        outcomes.insert(
            id("b"),
            VoiceOutcome::absent(AbsenceReason::Adapter(ErrorKind::RateLimited)),
        );
        let weights = BTreeMap::from([(id("a"), 1.0)]);
        let result = RoundResult::from_outcomes("k", outcomes, &weights, 0.5, 1, false);

        let json = serde_json::to_string(&result).unwrap();
        let back: RoundResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.outcomes.len(), 2);
        assert_eq!(back.absent, vec![id("b")]);
        assert!((back.aggregate_score - result.aggregate_score).abs() < 1e-9);
    }
}
