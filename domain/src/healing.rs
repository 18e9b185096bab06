//! Healing actions and the per-voice condition state machine.

use crate::core::identity::VoiceIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Condition of one monitored voice.
///
/// Transitions: `Healthy -> Degrading -> Critical -> (Healed |
/// EmergencyExcluded)`. `Healed` voices re-enter the machine at
/// `Healthy`; `EmergencyExcluded` is terminal until an operator reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceCondition {
    Healthy,
    Degrading,
    Critical,
    Healed,
    EmergencyExcluded,
}

impl VoiceCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceCondition::Healthy => "healthy",
            VoiceCondition::Degrading => "degrading",
            VoiceCondition::Critical => "critical",
            VoiceCondition::Healed => "healed",
            VoiceCondition::EmergencyExcluded => "emergency_excluded",
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, VoiceCondition::Critical)
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, VoiceCondition::EmergencyExcluded)
    }
}

impl std::fmt::Display for VoiceCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of remediation issued against a critical voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingKind {
    /// Raise the voice's dispatch retry count and backoff
    RetryTune,
    /// Disconnect and reconnect with a short pause
    Reconnect,
    /// Replace the identity with its next declared fallback
    FallbackSwitch,
}

impl HealingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealingKind::RetryTune => "retry_tune",
            HealingKind::Reconnect => "reconnect",
            HealingKind::FallbackSwitch => "fallback_switch",
        }
    }
}

impl std::fmt::Display for HealingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one healing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingOutcome {
    Succeeded,
    Failed(String),
}

impl HealingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, HealingOutcome::Succeeded)
    }
}

/// One bounded, automatic remediation attempt (Value Object)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingAction {
    pub identity: VoiceIdentity,
    pub kind: HealingKind,
    pub reason: String,
    /// 1-based attempt number for this identity within the monitoring
    /// lifetime; monotonically non-decreasing
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<HealingOutcome>,
    pub issued_at: DateTime<Utc>,
}

impl HealingAction {
    pub fn new(
        identity: VoiceIdentity,
        kind: HealingKind,
        reason: impl Into<String>,
        attempt: u32,
    ) -> Self {
        Self {
            identity,
            kind,
            reason: reason.into(),
            attempt,
            outcome: None,
            issued_at: Utc::now(),
        }
    }

    pub fn with_outcome(mut self, outcome: HealingOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}
