//! Round orchestration - concurrent timed dispatch of one prompt to
//! every active voice.
//!
//! Every voice is dispatched in its own task and raced against the
//! round's time budget and the session cancel token. A voice that does
//! not answer becomes an explicit [`VoiceOutcome::Absent`] entry; the
//! round itself always completes with a [`RoundResult`].

use crate::health::SharedHealthTracker;
use crate::ports::event_sink::{EventSink, MonitorEvent};
use crate::ports::voice_adapter::{AdapterError, VoiceAdapter};
use crate::use_cases::gather_voices::{ActiveVoice, DispatchTuning};
use chorus_domain::{
    AbsenceReason, PriorMessage, QualityScorer, RoundResult, RoundSpec, VoiceIdentity,
    VoiceOutcome, VoiceResponse,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Round-level aggregation knobs.
#[derive(Debug, Clone)]
pub struct RoundPolicy {
    /// Aggregate score a round must exceed to count as emergent
    pub emergence_threshold: f64,
    /// Responders required before emergence can be declared
    pub minimum_perspectives: usize,
}

impl Default for RoundPolicy {
    fn default() -> Self {
        Self {
            emergence_threshold: 0.7,
            minimum_perspectives: 2,
        }
    }
}

/// Runs single dialogue rounds against a gathered roster.
pub struct RoundOrchestrator {
    health: SharedHealthTracker,
    scorer: Arc<dyn QualityScorer>,
    events: Arc<dyn EventSink>,
    policy: RoundPolicy,
}

impl RoundOrchestrator {
    pub fn new(
        health: SharedHealthTracker,
        scorer: Arc<dyn QualityScorer>,
        events: Arc<dyn EventSink>,
        policy: RoundPolicy,
    ) -> Self {
        Self {
            health,
            scorer,
            events,
            policy,
        }
    }

    /// Dispatch one round to every voice in `voices` and collect the
    /// outcomes. The prompt template is rendered once against
    /// `context` and shared by every dispatch.
    pub async fn execute(
        &self,
        spec: &RoundSpec,
        voices: &HashMap<VoiceIdentity, ActiveVoice>,
        context: &serde_json::Map<String, serde_json::Value>,
        history: &[PriorMessage],
        cancel: &CancellationToken,
    ) -> RoundResult {
        let prompt = Arc::new(spec.prompt.render(context));
        let history: Arc<[PriorMessage]> = Arc::from(history);
        let budget = spec.time_budget();
        info!(kind = %spec.kind, voices = voices.len(), budget_ms = spec.time_budget_ms, "running round");

        let mut join_set = JoinSet::new();
        for voice in voices.values() {
            let identity = voice.identity.clone();
            let adapter = Arc::clone(&voice.adapter);
            let tuning = voice.tuning;
            let health = self.health.clone();
            let scorer = Arc::clone(&self.scorer);
            let prompt = Arc::clone(&prompt);
            let history = Arc::clone(&history);
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let outcome = tokio::select! {
                    // Cancellation is not the voice's fault; nothing
                    // is recorded against its health.
                    _ = cancel.cancelled() => VoiceOutcome::absent(AbsenceReason::Cancelled),
                    dispatched = timeout(
                        budget,
                        dispatch_with_retries(&adapter, &prompt, &history, tuning),
                    ) => match dispatched {
                        Ok(Ok((response, latency_ms))) => score_response(
                            &identity, &prompt, response, latency_ms, &health, scorer.as_ref(),
                        ),
                        Ok(Err(error)) => {
                            let kind = error.kind();
                            warn!(identity = %identity, error = %error, "voice dispatch failed");
                            health.record_outcome(&identity, false, Some(kind));
                            VoiceOutcome::absent(AbsenceReason::Adapter(kind))
                        }
                        Err(_) => {
                            debug!(identity = %identity, "voice exceeded round time budget");
                            health.record_outcome(
                                &identity,
                                false,
                                Some(chorus_domain::ErrorKind::Timeout),
                            );
                            VoiceOutcome::absent(AbsenceReason::Timeout)
                        }
                    },
                };
                (identity, outcome)
            });
        }

        let mut outcomes: BTreeMap<VoiceIdentity, VoiceOutcome> = BTreeMap::new();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((identity, outcome)) => {
                    outcomes.insert(identity, outcome);
                }
                Err(e) => warn!("round task join error: {e}"),
            }
        }

        // Synthesis weights are captured once, after health has
        // absorbed this round's outcomes.
        let weights: BTreeMap<VoiceIdentity, f64> = outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_response())
            .map(|(identity, _)| (identity.clone(), self.health.synthesis_weight(identity)))
            .collect();

        let result = RoundResult::from_outcomes(
            spec.kind.clone(),
            outcomes,
            &weights,
            self.policy.emergence_threshold,
            self.policy.minimum_perspectives,
            spec.require_all_voices,
        );
        self.events.emit(MonitorEvent::RoundCompleted {
            kind: result.kind.clone(),
            aggregate_score: result.aggregate_score,
            responders: result.responder_count(),
            absent: result.absent.len(),
        });
        info!(
            kind = %result.kind,
            aggregate = result.aggregate_score,
            responders = result.responder_count(),
            absent = result.absent.len(),
            "round completed"
        );
        result
    }
}

fn score_response(
    identity: &VoiceIdentity,
    prompt: &str,
    response: VoiceResponse,
    latency_ms: u64,
    health: &SharedHealthTracker,
    scorer: &dyn QualityScorer,
) -> VoiceOutcome {
    // Blank text from a nominally successful call counts as an empty
    // response, not a success.
    if response.is_empty() {
        health.record_outcome(
            identity,
            false,
            Some(chorus_domain::ErrorKind::EmptyResponse),
        );
        return VoiceOutcome::absent(AbsenceReason::Adapter(
            chorus_domain::ErrorKind::EmptyResponse,
        ));
    }
    let quality = scorer.score(prompt, &response.text).clamp(0.0, 1.0);
    health.record_outcome(identity, true, None);
    health.note_quality(identity, quality);
    VoiceOutcome::response(response.text, quality, latency_ms)
}

/// Dispatch one prompt once, retrying transient adapter errors up to
/// the voice's tuned attempt budget. The round time budget caps the
/// whole loop from outside. Returns the response with the measured
/// latency of the successful attempt.
async fn dispatch_with_retries(
    adapter: &Arc<dyn VoiceAdapter>,
    prompt: &str,
    history: &[PriorMessage],
    tuning: DispatchTuning,
) -> Result<(VoiceResponse, u64), AdapterError> {
    let mut last_error = AdapterError::Other("no attempt made".to_string());
    for attempt in 1..=tuning.retry_attempts.max(1) {
        let started = Instant::now();
        match adapter.send(prompt, history).await {
            Ok(response) => {
                return Ok((response, started.elapsed().as_millis() as u64));
            }
            Err(error) => {
                if !error.kind().is_transient() || attempt == tuning.retry_attempts {
                    return Err(error);
                }
                tokio::time::sleep(tuning.retry_backoff).await;
                last_error = error;
            }
        }
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::event_sink::NoSink;
    use crate::ports::voice_adapter::AdapterFactory;
    use crate::testing::{ScriptedAdapter, ScriptedFactory, SendScript};
    use chorus_domain::{ErrorKind, FixedScorer, VoiceSpec};
    use std::time::Duration;

    fn id(name: &str) -> VoiceIdentity {
        VoiceIdentity::new("test", name)
    }

    fn active(identity: VoiceIdentity, adapter: Arc<ScriptedAdapter>) -> ActiveVoice {
        ActiveVoice {
            spec: VoiceSpec::new(identity.clone()),
            identity,
            adapter,
            tuning: DispatchTuning::default(),
        }
    }

    fn orchestrator(health: SharedHealthTracker) -> RoundOrchestrator {
        RoundOrchestrator::new(
            health,
            Arc::new(FixedScorer(0.8)),
            Arc::new(NoSink),
            RoundPolicy::default(),
        )
    }

    fn roster(voices: Vec<ActiveVoice>) -> HashMap<VoiceIdentity, ActiveVoice> {
        voices
            .into_iter()
            .map(|voice| (voice.identity.clone(), voice))
            .collect()
    }

    #[tokio::test]
    async fn test_all_voices_respond() {
        let health = SharedHealthTracker::default();
        let voices = roster(vec![
            active(id("a"), Arc::new(ScriptedAdapter::replying("alpha"))),
            active(id("b"), Arc::new(ScriptedAdapter::replying("beta"))),
        ]);
        let spec = RoundSpec::new("opening", "What about {{topic}}?");

        let result = orchestrator(health)
            .execute(
                &spec,
                &voices,
                &serde_json::Map::new(),
                &[],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.responder_count(), 2);
        assert!(result.absent.is_empty());
        assert!(!result.incomplete);
        assert!(result.aggregate_score > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_voice_recorded_absent_within_budget() {
        let health = SharedHealthTracker::default();
        let slow = Arc::new(
            ScriptedAdapter::replying("late").with_latency(Duration::from_secs(120)),
        );
        let voices = roster(vec![
            active(id("fast"), Arc::new(ScriptedAdapter::replying("quick"))),
            active(id("slow"), slow),
        ]);
        let spec = RoundSpec::new("opening", "go").with_time_budget(Duration::from_secs(1));

        let result = orchestrator(health.clone())
            .execute(
                &spec,
                &voices,
                &serde_json::Map::new(),
                &[],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.absent, vec![id("slow")]);
        assert_eq!(
            result.outcomes[&id("slow")].absence_reason(),
            Some(AbsenceReason::Timeout)
        );
        assert_eq!(result.responder_count(), 1);
        // The timeout is a health failure for the slow voice only
        assert_eq!(health.snapshot(&id("slow")).consecutive_failures, 1);
        assert_eq!(health.snapshot(&id("fast")).consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_cancellation_is_not_a_health_failure() {
        let health = SharedHealthTracker::default();
        let hanging = Arc::new(ScriptedAdapter::scripted(vec![SendScript::Hang]));
        let voices = roster(vec![active(id("a"), hanging)]);
        let spec = RoundSpec::new("opening", "go");

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = orchestrator(health.clone())
            .execute(&spec, &voices, &serde_json::Map::new(), &[], &cancel)
            .await;

        assert_eq!(
            result.outcomes[&id("a")].absence_reason(),
            Some(AbsenceReason::Cancelled)
        );
        let snapshot = health.snapshot(&id("a"));
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.total_outcomes, 0);
    }

    #[tokio::test]
    async fn test_adapter_error_becomes_absent_with_kind() {
        let health = SharedHealthTracker::default();
        let failing = Arc::new(ScriptedAdapter::scripted(vec![SendScript::Fail(
            ErrorKind::Protocol,
        )]));
        let voices = roster(vec![active(id("a"), failing)]);
        let spec = RoundSpec::new("opening", "go");

        let result = orchestrator(health.clone())
            .execute(
                &spec,
                &voices,
                &serde_json::Map::new(),
                &[],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            result.outcomes[&id("a")].absence_reason(),
            Some(AbsenceReason::Adapter(ErrorKind::Protocol))
        );
        assert_eq!(
            health.snapshot(&id("a")).error_histogram.get(&ErrorKind::Protocol),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_transient_error_retried_within_tuning() {
        let health = SharedHealthTracker::default();
        let flaky = Arc::new(ScriptedAdapter::scripted(vec![
            SendScript::Fail(ErrorKind::RateLimited),
            SendScript::Reply("recovered".into()),
        ]));
        let mut voice = active(id("a"), flaky.clone());
        voice.tuning = DispatchTuning {
            retry_attempts: 2,
            retry_backoff: Duration::from_millis(1),
        };
        let voices = roster(vec![voice]);
        let spec = RoundSpec::new("opening", "go");

        let result = orchestrator(health)
            .execute(
                &spec,
                &voices,
                &serde_json::Map::new(),
                &[],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.responder_count(), 1);
        assert_eq!(flaky.sends(), 2);
    }

    #[tokio::test]
    async fn test_structural_error_never_retried() {
        let health = SharedHealthTracker::default();
        let broken = Arc::new(ScriptedAdapter::scripted(vec![SendScript::Fail(
            ErrorKind::CapabilityMissing,
        )]));
        let mut voice = active(id("a"), broken.clone());
        voice.tuning = DispatchTuning {
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(1),
        };
        let voices = roster(vec![voice]);

        let result = orchestrator(health)
            .execute(
                &RoundSpec::new("opening", "go"),
                &voices,
                &serde_json::Map::new(),
                &[],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(result.responder_count(), 0);
        assert_eq!(broken.sends(), 1);
    }

    #[tokio::test]
    async fn test_blank_response_counts_as_empty_failure() {
        let health = SharedHealthTracker::default();
        let blank = Arc::new(ScriptedAdapter::replying("   "));
        let voices = roster(vec![active(id("a"), blank)]);

        let result = orchestrator(health.clone())
            .execute(
                &RoundSpec::new("opening", "go"),
                &voices,
                &serde_json::Map::new(),
                &[],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(
            result.outcomes[&id("a")].absence_reason(),
            Some(AbsenceReason::Adapter(ErrorKind::EmptyResponse))
        );
        assert_eq!(health.snapshot(&id("a")).consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_prompt_rendered_against_context() {
        // Responses echo through the fixed scorer regardless of text,
        // so rendering is asserted via template output directly and a
        // full round run confirms the plumbed path stays intact.
        let spec = RoundSpec::new("opening", "Discuss {{topic}} briefly");
        let mut context = serde_json::Map::new();
        context.insert("topic".into(), serde_json::Value::String("rivers".into()));
        assert_eq!(spec.prompt.render(&context), "Discuss rivers briefly");

        let health = SharedHealthTracker::default();
        let voices = roster(vec![active(id("a"), Arc::new(ScriptedAdapter::replying("ok")))]);
        let result = orchestrator(health)
            .execute(&spec, &voices, &context, &[], &CancellationToken::new())
            .await;
        assert_eq!(result.responder_count(), 1);
    }

    #[tokio::test]
    async fn test_require_all_voices_marks_incomplete() {
        let health = SharedHealthTracker::default();
        let voices = roster(vec![
            active(id("a"), Arc::new(ScriptedAdapter::replying("ok"))),
            active(
                id("b"),
                Arc::new(ScriptedAdapter::scripted(vec![SendScript::Fail(
                    ErrorKind::Connection,
                )])),
            ),
        ]);
        let spec = RoundSpec::new("closing", "go").require_all();

        let result = orchestrator(health)
            .execute(
                &spec,
                &voices,
                &serde_json::Map::new(),
                &[],
                &CancellationToken::new(),
            )
            .await;

        assert!(result.incomplete);
        assert_eq!(result.responder_count(), 1);
    }

    // Keeps the factory trait exercised from this module's imports.
    #[test]
    fn test_scripted_factory_unknown_identity_is_error() {
        let factory = ScriptedFactory::new();
        let spec = VoiceSpec::new(id("ghost"));
        assert!(factory.create(&spec, &id("ghost")).is_err());
    }
}
