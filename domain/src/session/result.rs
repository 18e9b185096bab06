//! Session result and consensus detection.

use crate::core::identity::VoiceIdentity;
use crate::round::result::RoundResult;
use crate::session::checkpoint::SessionCheckpoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete result of a dialogue session.
///
/// A degraded or partially failed session still produces a result;
/// the degradation is reported here explicitly instead of being
/// thrown at the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResult {
    pub session_id: String,
    /// All completed round results in execution order (including
    /// rounds carried over from a resumed checkpoint)
    pub rounds: Vec<RoundResult>,
    pub rounds_completed: usize,
    /// Final-round aggregate with a non-decreasing trailing trend
    pub consensus: bool,
    /// Aggregate score of the final completed round (0 if none)
    pub aggregate_score: f64,
    /// Voices that could not be gathered, with the failure reason
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failed_voices: BTreeMap<VoiceIdentity, String>,
    /// Set when the session proceeded with fewer voices than requested
    pub degraded: bool,
    /// Best-effort error annotation when a round failed irrecoverably
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last checkpoint emitted during the run, if checkpointing was on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<SessionCheckpoint>,
}

/// Consensus heuristic over a completed round sequence.
///
/// True when the final round's aggregate exceeds `threshold` and the
/// trailing `window` aggregates are non-decreasing. With fewer rounds
/// than the window, the whole sequence must be non-decreasing.
pub fn consensus_reached(rounds: &[RoundResult], threshold: f64, window: usize) -> bool {
    let Some(last) = rounds.last() else {
        return false;
    };
    if last.aggregate_score <= threshold {
        return false;
    }
    let tail_start = rounds.len().saturating_sub(window.max(1));
    rounds[tail_start..]
        .windows(2)
        .all(|pair| pair[1].aggregate_score >= pair[0].aggregate_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::result::{VoiceOutcome, weighted_aggregate};

    fn round_with_score(score: f64) -> RoundResult {
        // Single unit-weight responder yields exactly `score`
        let identity = VoiceIdentity::new("p", "m");
        let outcomes = BTreeMap::from([(
            identity.clone(),
            VoiceOutcome::response("t", score, 1),
        )]);
        let weights = BTreeMap::from([(identity, 1.0)]);
        let result = RoundResult::from_outcomes("k", outcomes, &weights, 2.0, 99, false);
        debug_assert!((weighted_aggregate(&[(score, 1.0)]) - score).abs() < 1e-9);
        result
    }

    #[test]
    fn test_consensus_rising_trend() {
        let rounds: Vec<_> = [0.4, 0.6, 0.7, 0.9].into_iter().map(round_with_score).collect();
        assert!(consensus_reached(&rounds, 0.8, 3));
    }

    #[test]
    fn test_no_consensus_below_threshold() {
        let rounds: Vec<_> = [0.4, 0.5, 0.6].into_iter().map(round_with_score).collect();
        assert!(!consensus_reached(&rounds, 0.8, 3));
    }

    #[test]
    fn test_no_consensus_on_decreasing_tail() {
        let rounds: Vec<_> = [0.5, 0.95, 0.85, 0.9].into_iter().map(round_with_score).collect();
        // final 0.9 > 0.8 but the trailing window dips (0.95 -> 0.85)
        assert!(!consensus_reached(&rounds, 0.8, 3));
    }

    #[test]
    fn test_dip_outside_window_ignored() {
        let rounds: Vec<_> = [0.9, 0.3, 0.5, 0.85].into_iter().map(round_with_score).collect();
        assert!(consensus_reached(&rounds, 0.8, 3));
    }

    #[test]
    fn test_no_rounds_no_consensus() {
        assert!(!consensus_reached(&[], 0.5, 3));
    }

    #[test]
    fn test_single_round_above_threshold() {
        let rounds = vec![round_with_score(0.9)];
        assert!(consensus_reached(&rounds, 0.8, 3));
    }
}
