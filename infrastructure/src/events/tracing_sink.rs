//! Monitor events bridged onto the tracing pipeline.

use chorus_application::{EventSink, MonitorEvent};
use tracing::{info, warn};

/// Emits every monitor event as a structured tracing record. Failure
/// conditions log at warn, routine lifecycle at info.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: MonitorEvent) {
        match &event {
            MonitorEvent::VoiceConnected {
                identity,
                fallback_used,
            } => info!(%identity, fallback_used, "voice connected"),
            MonitorEvent::VoiceGatherFailed { identity, reason } => {
                warn!(%identity, reason, "voice gather failed")
            }
            MonitorEvent::GatherDegraded {
                connected,
                requested,
            } => warn!(connected, requested, "gather degraded"),
            MonitorEvent::ConditionChanged {
                identity,
                from,
                to,
                failure_probability,
            } => info!(%identity, %from, %to, failure_probability, "voice condition changed"),
            MonitorEvent::HealingIssued { action } => info!(
                identity = %action.identity,
                kind = %action.kind,
                attempt = action.attempt,
                reason = %action.reason,
                "healing issued"
            ),
            MonitorEvent::HealingResolved { action } => {
                let succeeded = action
                    .outcome
                    .as_ref()
                    .map(|o| o.is_success())
                    .unwrap_or(false);
                info!(
                    identity = %action.identity,
                    kind = %action.kind,
                    succeeded,
                    "healing resolved"
                )
            }
            MonitorEvent::EmergencyExcluded { identity, attempts } => {
                warn!(%identity, attempts, "voice emergency excluded")
            }
            MonitorEvent::CorrelatedFailure { affected } => {
                warn!(affected = affected.len(), "correlated failure across voices")
            }
            MonitorEvent::RoundCompleted {
                kind,
                aggregate_score,
                responders,
                absent,
            } => info!(kind, aggregate_score, responders, absent, "round completed"),
            MonitorEvent::CheckpointWritten { session_id, cursor } => {
                info!(session_id, cursor, "checkpoint written")
            }
        }
    }
}
