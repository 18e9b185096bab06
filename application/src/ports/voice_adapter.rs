//! Voice adapter port
//!
//! Defines the contract each external voice worker implements. The
//! core only ever calls this interface; concrete adapters live in the
//! infrastructure layer and are resolved through an [`AdapterFactory`]
//! once at gather time.

use async_trait::async_trait;
use chorus_domain::{ErrorKind, PriorMessage, VoiceIdentity, VoiceResponse, VoiceSpec};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during voice adapter operations
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Voice returned an empty response")]
    EmptyResponse,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Capability missing: {0}")]
    CapabilityMissing(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Adapter error: {0}")]
    Other(String),
}

impl AdapterError {
    /// Map onto the shared error-kind taxonomy used by health
    /// histograms and healing-strategy selection.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Connection(_) => ErrorKind::Connection,
            AdapterError::Timeout => ErrorKind::Timeout,
            AdapterError::RateLimited(_) => ErrorKind::RateLimited,
            AdapterError::EmptyResponse => ErrorKind::EmptyResponse,
            AdapterError::Protocol(_) => ErrorKind::Protocol,
            AdapterError::CapabilityMissing(_) | AdapterError::UnknownProvider(_) => {
                ErrorKind::CapabilityMissing
            }
            AdapterError::Other(_) => ErrorKind::Other,
        }
    }
}

/// Result of a non-erroring health probe.
#[derive(Debug, Clone)]
pub struct HealthProbe {
    pub connected: bool,
    pub latency: Duration,
    /// Error category observed by the probe, if any
    pub raw_error_kind: Option<ErrorKind>,
}

impl HealthProbe {
    pub fn healthy(latency: Duration) -> Self {
        Self {
            connected: true,
            latency,
            raw_error_kind: None,
        }
    }

    pub fn disconnected(kind: ErrorKind) -> Self {
        Self {
            connected: false,
            latency: Duration::ZERO,
            raw_error_kind: Some(kind),
        }
    }
}

/// A live worker wrapping one external conversational backend
///
/// Deadlines are enforced by the dispatching side (the round
/// orchestrator races `send` against the round's time budget), so
/// implementations only need to be cancel-safe.
#[async_trait]
pub trait VoiceAdapter: Send + Sync {
    /// Establish the connection. Idempotent: calling when already
    /// connected returns `Ok(true)` without side effects.
    async fn connect(&self) -> Result<bool, AdapterError>;

    /// Best-effort teardown. Must not fail; errors are swallowed and
    /// at most logged by the implementation.
    async fn disconnect(&self);

    /// Send one prompt with prior conversation context.
    async fn send(
        &self,
        prompt: &str,
        history: &[PriorMessage],
    ) -> Result<VoiceResponse, AdapterError>;

    /// Probe liveness. Never errors; failures are reported through
    /// the returned probe.
    async fn check_health(&self) -> HealthProbe;
}

/// Factory resolving a concrete adapter for one identity.
///
/// Constructed explicitly at startup and passed in; resolution happens
/// once at gather time (and again on fallback switches), never through
/// global state.
pub trait AdapterFactory: Send + Sync {
    fn create(
        &self,
        spec: &VoiceSpec,
        identity: &VoiceIdentity,
    ) -> Result<Arc<dyn VoiceAdapter>, AdapterError>;
}
