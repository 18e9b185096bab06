//! Session coordination - the top-level use case.
//!
//! A session gathers a roster, runs its rounds in order, checkpoints
//! progress, and finalizes a [`SessionResult`]. Round-level trouble is
//! absorbed into the result; only pre-flight problems (bad policy,
//! corrupt checkpoint, strict-mode gather failure) surface as errors,
//! and those fail before or during startup, never mid-dialogue.

use crate::health::SharedHealthTracker;
use crate::ports::checkpoint_store::{CheckpointStore, CheckpointStoreError};
use crate::ports::event_sink::{EventSink, MonitorEvent};
use crate::ports::voice_adapter::AdapterFactory;
use crate::use_cases::gather_voices::{GatherError, GatherPolicy, GatherReport, VoiceManager};
use crate::use_cases::monitor::{InfrastructureMonitor, MonitorConfig};
use crate::use_cases::run_round::{RoundOrchestrator, RoundPolicy};
use chorus_domain::{
    HealthPolicy, PriorMessage, QualityScorer, RoundResult, RoundSpec, SessionCheckpoint,
    SessionResult, VoiceIdentity, VoiceSpec, consensus_reached,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Session-level configuration.
#[derive(Clone)]
pub struct SessionPolicy {
    pub gather: GatherPolicy,
    pub round: RoundPolicy,
    pub health: HealthPolicy,
    /// Aggregate the final round must exceed for consensus
    pub consensus_threshold: f64,
    /// Trailing rounds whose aggregates must be non-decreasing
    pub consensus_window: usize,
    /// Checkpoint after every N completed rounds; 0 disables
    pub checkpoint_interval: usize,
    /// Background monitor tuning; `None` runs without a monitor
    pub monitor: Option<MonitorConfig>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            gather: GatherPolicy::default(),
            round: RoundPolicy::default(),
            health: HealthPolicy::default(),
            consensus_threshold: 0.7,
            consensus_window: 3,
            checkpoint_interval: 1,
            monitor: Some(MonitorConfig::default()),
        }
    }
}

/// Session startup errors. Everything here fires before the first
/// round runs; mid-session trouble lands in the result instead.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session policy: {0}")]
    InvalidPolicy(String),

    #[error(transparent)]
    Gather(#[from] GatherError),

    #[error("Corrupt checkpoint: {0}")]
    CorruptCheckpoint(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointStoreError),
}

/// Drives complete dialogue sessions end to end.
pub struct SessionCoordinator {
    manager: Arc<VoiceManager>,
    orchestrator: RoundOrchestrator,
    health: SharedHealthTracker,
    events: Arc<dyn EventSink>,
    checkpoints: Arc<dyn CheckpointStore>,
    policy: SessionPolicy,
    cancel: CancellationToken,
}

impl SessionCoordinator {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        scorer: Arc<dyn QualityScorer>,
        events: Arc<dyn EventSink>,
        checkpoints: Arc<dyn CheckpointStore>,
        policy: SessionPolicy,
    ) -> Self {
        let health = SharedHealthTracker::new(policy.health.clone());
        let manager = Arc::new(VoiceManager::new(
            factory,
            health.clone(),
            Arc::clone(&events),
        ));
        let orchestrator = RoundOrchestrator::new(
            health.clone(),
            scorer,
            Arc::clone(&events),
            policy.round.clone(),
        );
        Self {
            manager,
            orchestrator,
            health,
            events,
            checkpoints,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts the session from outside. Cancelling is
    /// idempotent; in-flight dispatches finish as cancelled absences
    /// and cleanup still runs.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn health(&self) -> &SharedHealthTracker {
        &self.health
    }

    /// Run a fresh session over `rounds`.
    pub async fn run(
        &self,
        session_id: &str,
        specs: &[VoiceSpec],
        rounds: &[RoundSpec],
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<SessionResult, SessionError> {
        self.validate(rounds)?;
        self.execute(session_id, specs, Vec::new(), rounds.to_vec(), context)
            .await
    }

    /// Resume a checkpointed session; only the remaining rounds run
    /// and the result covers the combined sequence.
    pub async fn resume(
        &self,
        checkpoint: SessionCheckpoint,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<SessionResult, SessionError> {
        checkpoint
            .validate()
            .map_err(|e| SessionError::CorruptCheckpoint(e.to_string()))?;
        self.validate(&checkpoint.remaining)?;
        info!(
            session_id = %checkpoint.session_id,
            completed = checkpoint.completed.len(),
            remaining = checkpoint.remaining.len(),
            "resuming session from checkpoint"
        );
        let SessionCheckpoint {
            session_id,
            specs,
            completed,
            remaining,
            ..
        } = checkpoint;
        self.execute(&session_id, &specs, completed, remaining, context)
            .await
    }

    /// Load and resume the latest checkpoint for `session_id`.
    pub async fn resume_by_id(
        &self,
        session_id: &str,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<SessionResult, SessionError> {
        let checkpoint = self.checkpoints.load(session_id).await?;
        self.resume(checkpoint, context).await
    }

    fn validate(&self, rounds: &[RoundSpec]) -> Result<(), SessionError> {
        self.policy
            .gather
            .validate()
            .map_err(|e| SessionError::InvalidPolicy(e.to_string()))?;
        if self.policy.consensus_window == 0 {
            return Err(SessionError::InvalidPolicy(
                "consensus_window must be >= 1".into(),
            ));
        }
        for spec in rounds {
            if spec.time_budget_ms == 0 {
                return Err(SessionError::InvalidPolicy(format!(
                    "round '{}' has a zero time budget",
                    spec.kind
                )));
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        session_id: &str,
        specs: &[VoiceSpec],
        mut completed: Vec<RoundResult>,
        remaining: Vec<RoundSpec>,
        context: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<SessionResult, SessionError> {
        let report = self.manager.gather(specs, &self.policy.gather).await?;
        info!(
            session_id,
            connected = report.connected.len(),
            failed = report.failed.len(),
            rounds = remaining.len(),
            "session started"
        );

        let monitor_handle = self.policy.monitor.clone().map(|config| {
            Arc::new(InfrastructureMonitor::new(
                Arc::clone(&self.manager),
                self.health.clone(),
                Arc::clone(&self.events),
                config,
            ))
            .spawn()
        });

        let mut history: Vec<PriorMessage> = transcript_of(&completed);
        let mut last_checkpoint: Option<SessionCheckpoint> = None;
        let mut error: Option<String> = None;

        for (index, spec) in remaining.iter().enumerate() {
            if self.cancel.is_cancelled() {
                error = Some("session cancelled".to_string());
                break;
            }
            let voices = self.manager.active().await;
            if voices.is_empty() {
                error = Some("no voices remain active".to_string());
                break;
            }

            let result = self
                .orchestrator
                .execute(spec, &voices, context, &history, &self.cancel)
                .await;
            append_transcript(&mut history, &result);
            completed.push(result);

            let rounds_done = index + 1;
            let should_checkpoint = self.policy.checkpoint_interval > 0
                && (rounds_done % self.policy.checkpoint_interval == 0
                    || rounds_done == remaining.len()
                    || self.cancel.is_cancelled());
            if should_checkpoint {
                let checkpoint = SessionCheckpoint::new(
                    session_id,
                    specs.to_vec(),
                    completed.clone(),
                    remaining[rounds_done..].to_vec(),
                );
                // Checkpointing is best-effort; a failing store must
                // not bring down a running dialogue.
                match self.checkpoints.save(&checkpoint).await {
                    Ok(()) => {
                        self.events.emit(MonitorEvent::CheckpointWritten {
                            session_id: session_id.to_string(),
                            cursor: checkpoint.cursor,
                        });
                        last_checkpoint = Some(checkpoint);
                    }
                    Err(e) => warn!(session_id, error = %e, "checkpoint save failed"),
                }
            }
        }

        if let Some(handle) = monitor_handle {
            handle.stop().await;
        }
        self.manager.disconnect_all().await;

        Ok(self.finalize(session_id, completed, report, error, last_checkpoint))
    }

    fn finalize(
        &self,
        session_id: &str,
        rounds: Vec<RoundResult>,
        report: GatherReport,
        error: Option<String>,
        checkpoint: Option<SessionCheckpoint>,
    ) -> SessionResult {
        let consensus = consensus_reached(
            &rounds,
            self.policy.consensus_threshold,
            self.policy.consensus_window,
        );
        let aggregate_score = rounds.last().map(|r| r.aggregate_score).unwrap_or(0.0);
        let failed_voices: BTreeMap<VoiceIdentity, String> =
            report.failed.into_iter().collect();
        info!(
            session_id,
            rounds = rounds.len(),
            consensus,
            aggregate = aggregate_score,
            degraded = report.degraded,
            "session finished"
        );
        SessionResult {
            session_id: session_id.to_string(),
            rounds_completed: rounds.len(),
            rounds,
            consensus,
            aggregate_score,
            failed_voices,
            degraded: report.degraded,
            error,
            checkpoint,
        }
    }
}

/// Rebuild the running transcript from already-completed rounds so a
/// resumed session hands voices the same context a fresh one would.
fn transcript_of(completed: &[RoundResult]) -> Vec<PriorMessage> {
    let mut history = Vec::new();
    for round in completed {
        append_transcript(&mut history, round);
    }
    history
}

fn append_transcript(history: &mut Vec<PriorMessage>, round: &RoundResult) {
    for (identity, outcome) in round.responses() {
        if let Some(text) = outcome_text(outcome) {
            history.push(PriorMessage::assistant(format!("[{identity}] {text}")));
        }
    }
}

fn outcome_text(outcome: &chorus_domain::VoiceOutcome) -> Option<&str> {
    match outcome {
        chorus_domain::VoiceOutcome::Response { text, .. } => Some(text),
        chorus_domain::VoiceOutcome::Absent { .. } => None,
    }
}
