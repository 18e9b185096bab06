//! Background infrastructure monitor.
//!
//! A single task probes every active voice on a fixed tick, classifies
//! its condition from probe and health data, and issues healing
//! actions through the [`VoiceManager`]. The monitor never touches
//! adapters directly; every mutation goes through the manager so
//! roster ownership stays in one place.

use crate::health::SharedHealthTracker;
use crate::ports::event_sink::{EventSink, MonitorEvent};
use crate::use_cases::gather_voices::VoiceManager;
use chorus_domain::{
    ErrorKind, HealingAction, HealingKind, HealingOutcome, HealthSignature, SignatureHistory,
    VoiceCondition, VoiceIdentity,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Monitor tuning.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub tick_interval: Duration,
    /// Failure probability at which a voice is flagged degrading
    pub degrading_threshold: f64,
    /// Failure probability at which a voice is flagged critical
    pub critical_threshold: f64,
    /// Consecutive failures beyond which a voice is critical regardless
    /// of probability
    pub critical_streak: u32,
    /// Weight of the failure rate in the failure probability blend
    pub failure_weight: f64,
    /// Weight of lost coherence in the failure probability blend
    pub coherence_weight: f64,
    /// Healing attempts per voice before emergency exclusion
    pub max_healing_attempts: u32,
    /// Simultaneously critical voices that signal a correlated failure
    pub correlated_threshold: usize,
    /// Pause between disconnect and reconnect during healing
    pub reconnect_pause: Duration,
    /// How long `stop` waits for the loop before aborting it
    pub shutdown_grace: Duration,
    /// Signatures retained per voice
    pub history_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            degrading_threshold: 0.5,
            critical_threshold: 0.7,
            critical_streak: 3,
            failure_weight: 0.7,
            coherence_weight: 0.3,
            max_healing_attempts: 10,
            correlated_threshold: 3,
            reconnect_pause: Duration::from_millis(500),
            shutdown_grace: Duration::from_secs(5),
            history_capacity: 100,
        }
    }
}

#[derive(Debug)]
struct VoiceState {
    condition: VoiceCondition,
    healing_attempts: u32,
    history: SignatureHistory,
}

impl VoiceState {
    fn new(history_capacity: usize) -> Self {
        Self {
            condition: VoiceCondition::Healthy,
            healing_attempts: 0,
            history: SignatureHistory::new(history_capacity),
        }
    }
}

#[derive(Default)]
struct MonitorState {
    voices: HashMap<VoiceIdentity, VoiceState>,
    /// One correlated-failure event per episode; re-armed when the
    /// critical count drops back below the threshold
    correlated_episode_active: bool,
}

/// Watches the roster and heals struggling voices.
pub struct InfrastructureMonitor {
    manager: Arc<VoiceManager>,
    health: SharedHealthTracker,
    events: Arc<dyn EventSink>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

impl InfrastructureMonitor {
    pub fn new(
        manager: Arc<VoiceManager>,
        health: SharedHealthTracker,
        events: Arc<dyn EventSink>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            manager,
            health,
            events,
            config,
            state: Mutex::new(MonitorState::default()),
        }
    }

    /// Start the background loop. The returned handle owns shutdown.
    pub fn spawn(self: Arc<Self>) -> MonitorHandle {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let grace = self.config.shutdown_grace;
        let monitor = Arc::clone(&self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.tick_interval);
            // The 0th tick fires immediately; skip it so the session
            // gets its grace period before the first probe sweep.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => monitor.tick().await,
                }
            }
            debug!("infrastructure monitor stopped");
        });
        MonitorHandle {
            token,
            task: Mutex::new(Some(task)),
            grace,
        }
    }

    /// One full probe-classify-heal sweep. Public so sessions that run
    /// without a background task (and tests) can drive it directly.
    pub async fn tick(&self) {
        let roster = self.manager.active().await;
        if roster.is_empty() {
            return;
        }

        let mut critical: Vec<VoiceIdentity> = Vec::new();
        for (identity, voice) in &roster {
            let probe = voice.adapter.check_health().await;
            if !probe.connected {
                let kind = probe.raw_error_kind.unwrap_or(ErrorKind::Connection);
                self.health.record_outcome(identity, false, Some(kind));
            }
            let snapshot = self.health.snapshot(identity);
            let failure_probability = self.config.failure_weight * snapshot.failure_rate
                + self.config.coherence_weight * (1.0 - snapshot.coherence);

            let condition = self.classify(identity, probe.connected, failure_probability, &snapshot);
            let signature = HealthSignature {
                identity: identity.clone(),
                connected: probe.connected,
                latency_ms: probe.latency.as_millis() as u64,
                consecutive_failures: snapshot.consecutive_failures,
                error_histogram: snapshot.error_histogram.clone(),
                coherence: snapshot.coherence,
                failure_probability,
                recorded_at: Utc::now(),
            };

            let (previous, attempts) = {
                let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
                let entry = state
                    .voices
                    .entry(identity.clone())
                    .or_insert_with(|| VoiceState::new(self.config.history_capacity));
                entry.history.push(signature);
                let previous = entry.condition;
                entry.condition = condition;
                if condition == VoiceCondition::Healthy || condition == VoiceCondition::Healed {
                    entry.healing_attempts = 0;
                }
                (previous, entry.healing_attempts)
            };

            if previous != condition {
                info!(identity = %identity, from = %previous, to = %condition, "voice condition changed");
                self.events.emit(MonitorEvent::ConditionChanged {
                    identity: identity.clone(),
                    from: previous,
                    to: condition,
                    failure_probability,
                });
            }
            if condition == VoiceCondition::EmergencyExcluded {
                // Tracker-driven exclusion (a run of dispatch failures
                // while the transport probe stays up) must pull the
                // voice out of round dispatch just like budget
                // exhaustion does.
                if previous != VoiceCondition::EmergencyExcluded {
                    warn!(identity = %identity, "failure pattern crossed the exclusion threshold, removing voice");
                    self.events.emit(MonitorEvent::EmergencyExcluded {
                        identity: identity.clone(),
                        attempts,
                    });
                    self.manager.remove(identity).await;
                }
                continue;
            }
            if condition.is_critical() {
                critical.push(identity.clone());
            }
        }

        self.detect_correlated_failure(&critical);
        for identity in critical {
            self.heal(&identity).await;
        }
    }

    fn classify(
        &self,
        identity: &VoiceIdentity,
        connected: bool,
        failure_probability: f64,
        snapshot: &chorus_domain::HealthSnapshot,
    ) -> VoiceCondition {
        if self.health.should_emergency_exclude(identity) {
            return VoiceCondition::EmergencyExcluded;
        }
        if !connected
            || failure_probability >= self.config.critical_threshold
            || snapshot.consecutive_failures > self.config.critical_streak
        {
            return VoiceCondition::Critical;
        }
        if failure_probability >= self.config.degrading_threshold {
            return VoiceCondition::Degrading;
        }
        let was_unwell = {
            let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            state
                .voices
                .get(identity)
                .map(|entry| {
                    matches!(
                        entry.condition,
                        VoiceCondition::Critical | VoiceCondition::Degrading
                    )
                })
                .unwrap_or(false)
        };
        if was_unwell {
            VoiceCondition::Healed
        } else {
            VoiceCondition::Healthy
        }
    }

    /// Three or more voices critical at once points at a shared cause
    /// (network, provider outage); healing them one by one would only
    /// thrash, so the episode is reported once for an operator.
    fn detect_correlated_failure(&self, critical: &[VoiceIdentity]) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if critical.len() >= self.config.correlated_threshold {
            if !state.correlated_episode_active {
                state.correlated_episode_active = true;
                let mut affected = critical.to_vec();
                affected.sort();
                warn!(affected = affected.len(), "correlated failure detected");
                self.events
                    .emit(MonitorEvent::CorrelatedFailure { affected });
            }
        } else {
            state.correlated_episode_active = false;
        }
    }

    async fn heal(&self, identity: &VoiceIdentity) {
        let (attempt, exhausted) = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            let entry = state
                .voices
                .entry(identity.clone())
                .or_insert_with(|| VoiceState::new(self.config.history_capacity));
            entry.healing_attempts += 1;
            let exhausted = entry.healing_attempts > self.config.max_healing_attempts;
            if exhausted {
                entry.condition = VoiceCondition::EmergencyExcluded;
            }
            (entry.healing_attempts, exhausted)
        };

        if exhausted {
            warn!(identity = %identity, attempts = attempt - 1, "healing budget exhausted, excluding voice");
            self.events.emit(MonitorEvent::EmergencyExcluded {
                identity: identity.clone(),
                attempts: attempt - 1,
            });
            self.manager.remove(identity).await;
            return;
        }

        let snapshot = self.health.snapshot(identity);
        let kind = healing_kind_for(&snapshot.error_histogram);
        let action = HealingAction::new(
            identity.clone(),
            kind,
            format!(
                "{} consecutive failures, {:.0}% recent failure rate",
                snapshot.consecutive_failures,
                snapshot.failure_rate * 100.0
            ),
            attempt,
        );
        info!(identity = %identity, kind = %kind, attempt, "issuing healing action");
        self.events.emit(MonitorEvent::HealingIssued {
            action: action.clone(),
        });

        let outcome = match kind {
            HealingKind::RetryTune => {
                let tuned = self
                    .manager
                    .active()
                    .await
                    .get(identity)
                    .map(|voice| voice.tuning.escalate());
                match tuned {
                    Some(tuning) if self.manager.tune_retry(identity, tuning).await => {
                        HealingOutcome::Succeeded
                    }
                    _ => HealingOutcome::Failed("voice no longer active".to_string()),
                }
            }
            HealingKind::Reconnect => {
                match self
                    .manager
                    .reconnect(identity, self.config.reconnect_pause)
                    .await
                {
                    Ok(()) => HealingOutcome::Succeeded,
                    Err(e) => HealingOutcome::Failed(e.to_string()),
                }
            }
            HealingKind::FallbackSwitch => match self.manager.switch_to_fallback(identity).await {
                Ok(next) => {
                    debug!(from = %identity, to = %next, "fallback switch healed slot");
                    HealingOutcome::Succeeded
                }
                Err(e) => HealingOutcome::Failed(e.to_string()),
            },
        };
        self.events.emit(MonitorEvent::HealingResolved {
            action: action.with_outcome(outcome),
        });
    }

    /// Latest recorded condition for one voice.
    pub fn condition(&self, identity: &VoiceIdentity) -> Option<VoiceCondition> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.voices.get(identity).map(|entry| entry.condition)
    }

    /// Signature history snapshot for one voice.
    pub fn history(&self, identity: &VoiceIdentity) -> Vec<HealthSignature> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .voices
            .get(identity)
            .map(|entry| entry.history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Pick a healing strategy from the dominant observed error kind.
///
/// Transient kinds respond to more patient retries; structural kinds
/// mean the identity itself is wrong and a fallback should take the
/// slot; anything else gets the blunt reconnect.
fn healing_kind_for(histogram: &std::collections::BTreeMap<ErrorKind, u32>) -> HealingKind {
    let dominant = histogram
        .iter()
        .max_by_key(|(_, count)| **count)
        .map(|(kind, _)| *kind);
    match dominant {
        Some(kind) if kind.is_transient() => HealingKind::RetryTune,
        Some(kind) if kind.is_structural() => HealingKind::FallbackSwitch,
        _ => HealingKind::Reconnect,
    }
}

/// Shutdown handle for the background monitor task.
pub struct MonitorHandle {
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    grace: Duration,
}

impl MonitorHandle {
    /// Stop the monitor, waiting up to the grace period for the loop
    /// to notice. Safe to call more than once.
    pub async fn stop(&self) {
        self.token.cancel();
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(task) = task {
            if tokio::time::timeout(self.grace, task).await.is_err() {
                warn!("monitor did not stop within grace period");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}
