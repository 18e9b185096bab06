//! Round specification.

use crate::prompt::template::PromptTemplate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_time_budget_ms() -> u64 {
    30_000
}

/// Specification for one dialogue round (Value Object)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSpec {
    /// Round type tag, opaque to the core (e.g. "opening", "challenge")
    pub kind: String,
    /// Prompt template rendered against the session context map
    pub prompt: PromptTemplate,
    /// Per-voice time budget in milliseconds
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
    /// Mark the round incomplete if any active voice fails to respond
    #[serde(default)]
    pub require_all_voices: bool,
}

impl RoundSpec {
    pub fn new(kind: impl Into<String>, prompt: impl Into<PromptTemplate>) -> Self {
        Self {
            kind: kind.into(),
            prompt: prompt.into(),
            time_budget_ms: default_time_budget_ms(),
            require_all_voices: false,
        }
    }

    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget_ms = budget.as_millis() as u64;
        self
    }

    pub fn require_all(mut self) -> Self {
        self.require_all_voices = true;
        self
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_spec_defaults() {
        let spec = RoundSpec::new("opening", PromptTemplate::new("Speak on {{theme}}."));
        assert_eq!(spec.time_budget(), Duration::from_secs(30));
        assert!(!spec.require_all_voices);
    }

    #[test]
    fn test_round_spec_builders() {
        let spec = RoundSpec::new("challenge", PromptTemplate::new("p"))
            .with_time_budget(Duration::from_secs(5))
            .require_all();
        assert_eq!(spec.time_budget_ms, 5_000);
        assert!(spec.require_all_voices);
    }

    #[test]
    fn test_round_spec_json_defaults() {
        let spec: RoundSpec = serde_json::from_str(r#"{"kind":"k","prompt":"t"}"#).unwrap();
        assert_eq!(spec.time_budget_ms, 30_000);
        assert!(!spec.require_all_voices);
    }
}
