//! Session checkpoints for resumption.

use crate::core::error::DomainError;
use crate::round::result::RoundResult;
use crate::round::spec::RoundSpec;
use crate::voice::spec::VoiceSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of a partially-completed session.
///
/// `completed` followed by `remaining` always reconstructs the
/// original round sequence in order; `cursor` is the monotonically
/// increasing index of the next round to run. A resumed session
/// produces new checkpoints, never mutates one in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCheckpoint {
    pub session_id: String,
    /// Original requested voice roster
    pub specs: Vec<VoiceSpec>,
    /// Results of rounds that already ran, in execution order
    pub completed: Vec<RoundResult>,
    /// Round specs still to run, in original order
    pub remaining: Vec<RoundSpec>,
    /// Index of the next round within the original sequence
    pub cursor: usize,
    pub created_at: DateTime<Utc>,
}

impl SessionCheckpoint {
    pub fn new(
        session_id: impl Into<String>,
        specs: Vec<VoiceSpec>,
        completed: Vec<RoundResult>,
        remaining: Vec<RoundSpec>,
    ) -> Self {
        let cursor = completed.len();
        Self {
            session_id: session_id.into(),
            specs,
            completed,
            remaining,
            cursor,
            created_at: Utc::now(),
        }
    }

    /// Length of the original round sequence.
    pub fn total_rounds(&self) -> usize {
        self.completed.len() + self.remaining.len()
    }

    /// Validate internal consistency before resuming.
    ///
    /// Fails fast on a corrupted checkpoint instead of contacting any
    /// voice.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.cursor != self.completed.len() {
            return Err(DomainError::CorruptCheckpoint(format!(
                "cursor {} does not match {} completed rounds",
                self.cursor,
                self.completed.len()
            )));
        }
        if self.specs.is_empty() {
            return Err(DomainError::CorruptCheckpoint(
                "checkpoint carries no voice specs".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::VoiceIdentity;
    use crate::prompt::template::PromptTemplate;
    use std::collections::BTreeMap;

    fn spec() -> VoiceSpec {
        VoiceSpec::new(VoiceIdentity::new("p", "m"))
    }

    fn round(kind: &str) -> RoundSpec {
        RoundSpec::new(kind, PromptTemplate::new("prompt"))
    }

    fn completed_round(kind: &str) -> RoundResult {
        RoundResult::from_outcomes(kind, BTreeMap::new(), &BTreeMap::new(), 0.7, 2, false)
    }

    #[test]
    fn test_cursor_tracks_completed() {
        let cp = SessionCheckpoint::new(
            "s-1",
            vec![spec()],
            vec![completed_round("a"), completed_round("b")],
            vec![round("c"), round("d"), round("e")],
        );
        assert_eq!(cp.cursor, 2);
        assert_eq!(cp.total_rounds(), 5);
        assert!(cp.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_cursor_mismatch() {
        let mut cp = SessionCheckpoint::new("s-1", vec![spec()], vec![], vec![round("a")]);
        cp.cursor = 3;
        assert!(matches!(
            cp.validate(),
            Err(DomainError::CorruptCheckpoint(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_roster() {
        let cp = SessionCheckpoint::new("s-1", vec![], vec![], vec![round("a")]);
        assert!(cp.validate().is_err());
    }

    #[test]
    fn test_checkpoint_json_roundtrip() {
        let cp = SessionCheckpoint::new(
            "s-9",
            vec![spec()],
            vec![completed_round("a")],
            vec![round("b")],
        );
        let json = serde_json::to_string(&cp).unwrap();
        let back: SessionCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.session_id, "s-9");
        assert_eq!(back.cursor, 1);
        assert_eq!(back.remaining.len(), 1);
        assert!(back.validate().is_ok());
    }
}
