//! Monitoring event sink port
//!
//! The monitor and session coordinator report noteworthy events
//! through this port; implementations forward them to logs, files, or
//! metrics exporters. The sink is constructed by the caller and passed
//! in, never a process-global.

use chorus_domain::{HealingAction, VoiceCondition, VoiceIdentity};
use serde::Serialize;

/// One observable event from the orchestration core.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// A voice connected during gathering
    VoiceConnected {
        identity: VoiceIdentity,
        /// True when a fallback identity was used for the slot
        fallback_used: bool,
    },
    /// A requested voice could not be gathered
    VoiceGatherFailed {
        identity: VoiceIdentity,
        reason: String,
    },
    /// Gathering finished below the requested roster under adaptive policy
    GatherDegraded { connected: usize, requested: usize },
    /// A monitored voice changed condition
    ConditionChanged {
        identity: VoiceIdentity,
        from: VoiceCondition,
        to: VoiceCondition,
        failure_probability: f64,
    },
    /// A healing action was dispatched
    HealingIssued { action: HealingAction },
    /// A healing action finished (outcome recorded on the action)
    HealingResolved { action: HealingAction },
    /// An identity exhausted its healing budget
    EmergencyExcluded { identity: VoiceIdentity, attempts: u32 },
    /// Three or more voices are simultaneously critical/disconnected;
    /// emitted once per episode, indicates a shared external cause
    CorrelatedFailure { affected: Vec<VoiceIdentity> },
    /// A round finished
    RoundCompleted {
        kind: String,
        aggregate_score: f64,
        responders: usize,
        absent: usize,
    },
    /// A checkpoint was persisted
    CheckpointWritten { session_id: String, cursor: usize },
}

/// Receiver for [`MonitorEvent`] values.
///
/// Implementations must be cheap and non-blocking; the core calls this
/// inline from orchestration paths.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: MonitorEvent);
}

/// No-op sink for when observability is not wired up.
pub struct NoSink;

impl EventSink for NoSink {
    fn emit(&self, _event: MonitorEvent) {}
}
