//! Voice manager - gathering, ownership, and lifecycle of live voices.
//!
//! The manager resolves a requested roster of [`VoiceSpec`]s into
//! connected workers, retrying and substituting fallbacks per policy,
//! and owns every [`ActiveVoice`] for its lifetime. All disconnects in
//! the system are routed through here, so no two components ever tear
//! down the same adapter concurrently.

use crate::health::SharedHealthTracker;
use crate::ports::event_sink::{EventSink, MonitorEvent};
use crate::ports::voice_adapter::{AdapterError, AdapterFactory, VoiceAdapter};
use chorus_domain::{VoiceIdentity, VoiceSpec};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What to do when fewer than `min_count` voices connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Tear everything down and fail the gather call
    Strict,
    /// Proceed degraded with whatever connected
    #[default]
    Adaptive,
}

/// Gathering policy.
#[derive(Debug, Clone)]
pub struct GatherPolicy {
    pub min_count: usize,
    pub max_count: usize,
    pub failure_mode: FailureMode,
    /// Connect attempts per candidate identity
    pub retry_attempts: u32,
    /// Base delay between connect attempts
    pub retry_backoff: Duration,
    /// Exponential backoff when true, linear otherwise
    pub exponential_backoff: bool,
}

impl Default for GatherPolicy {
    fn default() -> Self {
        Self {
            min_count: 1,
            max_count: 8,
            failure_mode: FailureMode::Adaptive,
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(250),
            exponential_backoff: true,
        }
    }
}

impl GatherPolicy {
    /// Delay before the attempt following `attempt` failures (1-based).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.exponential_backoff {
            let shift = attempt.saturating_sub(1).min(6);
            self.retry_backoff * (1_u32 << shift)
        } else {
            self.retry_backoff * attempt
        }
    }

    pub fn validate(&self) -> Result<(), GatherError> {
        if self.max_count == 0 {
            return Err(GatherError::InvalidPolicy("max_count must be >= 1".into()));
        }
        if self.min_count > self.max_count {
            return Err(GatherError::InvalidPolicy(format!(
                "min_count {} exceeds max_count {}",
                self.min_count, self.max_count
            )));
        }
        if self.retry_attempts == 0 {
            return Err(GatherError::InvalidPolicy(
                "retry_attempts must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Errors that can occur during voice gathering
#[derive(Error, Debug)]
pub enum GatherError {
    #[error("Insufficient voices: {available} connected, {required} required")]
    InsufficientVoices {
        available: usize,
        required: usize,
        /// Every identity attempted during this gather
        known: Vec<VoiceIdentity>,
    },

    #[error("Invalid gather policy: {0}")]
    InvalidPolicy(String),
}

/// Per-voice dispatch tuning, adjusted by retry-tune healing.
#[derive(Debug, Clone, Copy)]
pub struct DispatchTuning {
    /// Send attempts per round dispatch (transient failures only)
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for DispatchTuning {
    fn default() -> Self {
        Self {
            retry_attempts: 1,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl DispatchTuning {
    /// Escalated tuning for a struggling voice: one more attempt,
    /// doubled backoff, both capped.
    pub fn escalate(&self) -> Self {
        Self {
            retry_attempts: (self.retry_attempts + 1).min(5),
            retry_backoff: (self.retry_backoff * 2).min(Duration::from_secs(5)),
        }
    }
}

/// A live, connected worker bound to its originating spec.
#[derive(Clone)]
pub struct ActiveVoice {
    /// Identity actually connected (the spec's primary or a fallback)
    pub identity: VoiceIdentity,
    pub spec: VoiceSpec,
    pub adapter: Arc<dyn VoiceAdapter>,
    pub tuning: DispatchTuning,
}

/// Result of a gather call. Partial failure is not an error; callers
/// inspect `failed` to learn what did not connect.
#[derive(Debug, Default)]
pub struct GatherReport {
    pub connected: Vec<VoiceIdentity>,
    pub failed: HashMap<VoiceIdentity, String>,
    pub degraded: bool,
}

struct SlotOutcome {
    connected: Option<ActiveVoice>,
    failures: Vec<(VoiceIdentity, String)>,
    fallback_used: bool,
}

/// Owns the live roster and every adapter mutation in the system.
pub struct VoiceManager {
    factory: Arc<dyn AdapterFactory>,
    health: SharedHealthTracker,
    events: Arc<dyn EventSink>,
    roster: RwLock<HashMap<VoiceIdentity, ActiveVoice>>,
    rng: Mutex<SmallRng>,
}

impl VoiceManager {
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        health: SharedHealthTracker,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            factory,
            health,
            events,
            roster: RwLock::new(HashMap::new()),
            rng: Mutex::new(SmallRng::from_entropy()),
        }
    }

    /// Resolve the requested roster into connected voices.
    pub async fn gather(
        &self,
        specs: &[VoiceSpec],
        policy: &GatherPolicy,
    ) -> Result<GatherReport, GatherError> {
        policy.validate()?;

        let chosen = self.select_slots(specs, policy.max_count);
        info!(
            requested = specs.len(),
            gathering = chosen.len(),
            "gathering voices"
        );

        let mut join_set = JoinSet::new();
        for spec in chosen {
            let factory = Arc::clone(&self.factory);
            let health = self.health.clone();
            let policy = policy.clone();
            join_set.spawn(async move { Self::connect_slot(factory, health, spec, policy).await });
        }

        let mut failed: HashMap<VoiceIdentity, String> = HashMap::new();
        let mut attempted: Vec<VoiceIdentity> = Vec::new();
        while let Some(result) = join_set.join_next().await {
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("gather task join error: {e}");
                    continue;
                }
            };
            for (identity, reason) in outcome.failures {
                self.events.emit(MonitorEvent::VoiceGatherFailed {
                    identity: identity.clone(),
                    reason: reason.clone(),
                });
                attempted.push(identity.clone());
                failed.insert(identity, reason);
            }
            if let Some(voice) = outcome.connected {
                let mut roster = self.roster.write().await;
                if roster.contains_key(&voice.identity) {
                    // Two slots resolved to the same identity, e.g. one
                    // slot's fallback equals another's primary. The
                    // first connection keeps the slot; release the
                    // duplicate handle instead of overwriting it.
                    drop(roster);
                    warn!(identity = %voice.identity, "slot resolved to an already-connected identity");
                    voice.adapter.disconnect().await;
                    let reason = "identity already held by another slot".to_string();
                    self.events.emit(MonitorEvent::VoiceGatherFailed {
                        identity: voice.identity.clone(),
                        reason: reason.clone(),
                    });
                    attempted.push(voice.identity.clone());
                    failed.insert(voice.identity, reason);
                    continue;
                }
                info!(identity = %voice.identity, fallback = outcome.fallback_used, "voice connected");
                self.events.emit(MonitorEvent::VoiceConnected {
                    identity: voice.identity.clone(),
                    fallback_used: outcome.fallback_used,
                });
                attempted.push(voice.identity.clone());
                roster.insert(voice.identity.clone(), voice);
            }
        }

        let available = self.roster.read().await.len();
        if available < policy.min_count {
            match policy.failure_mode {
                FailureMode::Strict => {
                    self.disconnect_all().await;
                    attempted.sort();
                    attempted.dedup();
                    return Err(GatherError::InsufficientVoices {
                        available,
                        required: policy.min_count,
                        known: attempted,
                    });
                }
                FailureMode::Adaptive => {
                    warn!(
                        connected = available,
                        requested = specs.len(),
                        "proceeding in degraded mode"
                    );
                    self.events.emit(MonitorEvent::GatherDegraded {
                        connected: available,
                        requested: specs.len(),
                    });
                }
            }
        }

        let mut connected: Vec<VoiceIdentity> =
            self.roster.read().await.keys().cloned().collect();
        connected.sort();
        let degraded = connected.len() < specs.len().min(policy.max_count);
        Ok(GatherReport {
            connected,
            failed,
            degraded,
        })
    }

    /// When more slots are requested than `max_count`, choose which to
    /// gather with a health-weighted draw instead of first-come order,
    /// so recovering identities are periodically re-tried.
    fn select_slots(&self, specs: &[VoiceSpec], max_count: usize) -> Vec<VoiceSpec> {
        if specs.len() <= max_count {
            return specs.to_vec();
        }
        let mut pool: Vec<(usize, f64)> = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                let weight = self
                    .health
                    .selection_probability(&spec.identity)
                    .max(f64::EPSILON);
                (index, weight)
            })
            .collect();

        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        let mut chosen: Vec<usize> = Vec::with_capacity(max_count);
        while chosen.len() < max_count && !pool.is_empty() {
            let total: f64 = pool.iter().map(|(_, w)| w).sum();
            let mut target = rng.r#gen::<f64>() * total;
            let mut pick = pool.len() - 1;
            for (position, (_, weight)) in pool.iter().enumerate() {
                target -= weight;
                if target <= 0.0 {
                    pick = position;
                    break;
                }
            }
            chosen.push(pool.remove(pick).0);
        }
        chosen.sort_unstable();
        chosen.into_iter().map(|index| specs[index].clone()).collect()
    }

    async fn connect_slot(
        factory: Arc<dyn AdapterFactory>,
        health: SharedHealthTracker,
        spec: VoiceSpec,
        policy: GatherPolicy,
    ) -> SlotOutcome {
        let mut failures: Vec<(VoiceIdentity, String)> = Vec::new();

        let candidates: Vec<VoiceIdentity> = match policy.failure_mode {
            // Strict gathers exactly what was asked for
            FailureMode::Strict => vec![spec.identity.clone()],
            FailureMode::Adaptive => spec.candidates().cloned().collect(),
        };

        for (position, candidate) in candidates.into_iter().enumerate() {
            if health.should_emergency_exclude(&candidate) {
                debug!(identity = %candidate, "skipping emergency-excluded candidate");
                failures.push((candidate, "emergency excluded".to_string()));
                continue;
            }
            let adapter = match factory.create(&spec, &candidate) {
                Ok(adapter) => adapter,
                Err(e) => {
                    health.record_outcome(&candidate, false, Some(e.kind()));
                    failures.push((candidate, e.to_string()));
                    continue;
                }
            };
            match Self::connect_with_retries(&adapter, &candidate, &health, &policy).await {
                Ok(()) => {
                    return SlotOutcome {
                        connected: Some(ActiveVoice {
                            identity: candidate,
                            spec,
                            adapter,
                            tuning: DispatchTuning::default(),
                        }),
                        failures,
                        fallback_used: position > 0,
                    };
                }
                Err(e) => failures.push((candidate, e.to_string())),
            }
        }

        SlotOutcome {
            connected: None,
            failures,
            fallback_used: false,
        }
    }

    async fn connect_with_retries(
        adapter: &Arc<dyn VoiceAdapter>,
        identity: &VoiceIdentity,
        health: &SharedHealthTracker,
        policy: &GatherPolicy,
    ) -> Result<(), AdapterError> {
        let mut last_error = AdapterError::Connection("no attempt made".to_string());
        for attempt in 1..=policy.retry_attempts {
            match adapter.connect().await {
                Ok(_) => {
                    health.record_outcome(identity, true, None);
                    return Ok(());
                }
                Err(e) => {
                    health.record_outcome(identity, false, Some(e.kind()));
                    debug!(identity = %identity, attempt, error = %e, "connect attempt failed");
                    if attempt < policy.retry_attempts {
                        tokio::time::sleep(policy.backoff_delay(attempt)).await;
                    }
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Best-effort concurrent disconnect of every active voice.
    ///
    /// Never fails; used in cleanup position on all session exit paths
    /// and safe to call repeatedly.
    pub async fn disconnect_all(&self) {
        let drained: Vec<ActiveVoice> = self
            .roster
            .write()
            .await
            .drain()
            .map(|(_, voice)| voice)
            .collect();
        if drained.is_empty() {
            return;
        }
        let mut join_set = JoinSet::new();
        for voice in drained {
            join_set.spawn(async move {
                voice.adapter.disconnect().await;
                voice.identity
            });
        }
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(identity) => debug!(identity = %identity, "voice disconnected"),
                Err(e) => warn!("disconnect task join error: {e}"),
            }
        }
    }

    /// Snapshot of the live roster.
    pub async fn active(&self) -> HashMap<VoiceIdentity, ActiveVoice> {
        self.roster.read().await.clone()
    }

    pub async fn spec_for(&self, identity: &VoiceIdentity) -> Option<VoiceSpec> {
        self.roster
            .read()
            .await
            .get(identity)
            .map(|voice| voice.spec.clone())
    }

    pub async fn active_count(&self) -> usize {
        self.roster.read().await.len()
    }

    /// Remove one voice from the roster and disconnect it. Used by the
    /// monitor for emergency exclusion.
    pub async fn remove(&self, identity: &VoiceIdentity) -> bool {
        let removed = self.roster.write().await.remove(identity);
        match removed {
            Some(voice) => {
                voice.adapter.disconnect().await;
                true
            }
            None => false,
        }
    }

    /// Monitor-only: disconnect and reconnect one voice after a pause.
    pub async fn reconnect(
        &self,
        identity: &VoiceIdentity,
        pause: Duration,
    ) -> Result<(), AdapterError> {
        let adapter = self
            .roster
            .read()
            .await
            .get(identity)
            .map(|voice| voice.adapter.clone())
            .ok_or_else(|| AdapterError::Connection(format!("{identity} is not active")))?;
        adapter.disconnect().await;
        tokio::time::sleep(pause).await;
        adapter.connect().await?;
        self.health.record_outcome(identity, true, None);
        Ok(())
    }

    /// Monitor-only: replace one identity with a fallback from its
    /// spec. Among the remaining untried fallbacks the replacement is
    /// drawn health-weighted.
    pub async fn switch_to_fallback(
        &self,
        identity: &VoiceIdentity,
    ) -> Result<VoiceIdentity, AdapterError> {
        let (spec, old_adapter) = {
            let roster = self.roster.read().await;
            let voice = roster
                .get(identity)
                .ok_or_else(|| AdapterError::Connection(format!("{identity} is not active")))?;
            (voice.spec.clone(), voice.adapter.clone())
        };

        let active_ids: Vec<VoiceIdentity> = self.roster.read().await.keys().cloned().collect();
        let candidates: Vec<(VoiceIdentity, f64)> = spec
            .fallbacks_after(identity)
            .iter()
            .filter(|candidate| !active_ids.contains(candidate))
            .filter(|candidate| !self.health.should_emergency_exclude(candidate))
            .map(|candidate| {
                let weight = self.health.selection_probability(candidate).max(f64::EPSILON);
                (candidate.clone(), weight)
            })
            .collect();

        let next = self
            .choose_weighted(&candidates)
            .ok_or_else(|| AdapterError::CapabilityMissing("no fallback remaining".to_string()))?;

        let adapter = self.factory.create(&spec, &next)?;
        adapter.connect().await?;
        self.health.record_outcome(&next, true, None);

        {
            let mut roster = self.roster.write().await;
            roster.remove(identity);
            roster.insert(
                next.clone(),
                ActiveVoice {
                    identity: next.clone(),
                    spec,
                    adapter,
                    tuning: DispatchTuning::default(),
                },
            );
        }
        old_adapter.disconnect().await;
        info!(from = %identity, to = %next, "switched to fallback voice");
        Ok(next)
    }

    /// Monitor-only: replace one voice's dispatch tuning.
    pub async fn tune_retry(&self, identity: &VoiceIdentity, tuning: DispatchTuning) -> bool {
        match self.roster.write().await.get_mut(identity) {
            Some(voice) => {
                voice.tuning = tuning;
                true
            }
            None => false,
        }
    }

    fn choose_weighted(&self, candidates: &[(VoiceIdentity, f64)]) -> Option<VoiceIdentity> {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        pick_weighted(&mut *rng, candidates).cloned()
    }
}

/// Weighted random draw over `(identity, weight)` pairs.
///
/// Zero or negative weights are skipped; if no weight is positive the
/// first candidate is returned so a fully-degraded pool still yields.
pub(crate) fn pick_weighted<'a, R: Rng>(
    rng: &mut R,
    candidates: &'a [(VoiceIdentity, f64)],
) -> Option<&'a VoiceIdentity> {
    if candidates.is_empty() {
        return None;
    }
    let total: f64 = candidates.iter().map(|(_, w)| w.max(0.0)).sum();
    if total <= 0.0 {
        return candidates.first().map(|(identity, _)| identity);
    }
    let mut target = rng.r#gen::<f64>() * total;
    for (identity, weight) in candidates {
        if *weight <= 0.0 {
            continue;
        }
        target -= weight;
        if target <= 0.0 {
            return Some(identity);
        }
    }
    candidates.last().map(|(identity, _)| identity)
}
