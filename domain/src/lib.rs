//! Domain layer for chorus
//!
//! This crate contains the core entities and value objects of the
//! multi-voice dialogue orchestration core. It has no dependencies on
//! infrastructure or transport concerns and performs no I/O.
//!
//! # Core Concepts
//!
//! ## Voice
//!
//! A voice is a logical worker wrapping a connection to an external
//! conversational backend, identified by a stable `(provider, model)`
//! pair. Voices are requested through a [`VoiceSpec`] which may declare
//! ordered fallback identities.
//!
//! ## Round
//!
//! A round is one structured, time-bounded broadcast-and-collect cycle
//! across all active voices. Per-voice results are explicit
//! [`VoiceOutcome`] values; absence is data, not an error.
//!
//! ## Health
//!
//! [`HealthTracker`] maintains a decaying reliability score per voice
//! identity. Selection weighting, synthesis weighting, and emergency
//! exclusion all derive from it.

pub mod core;
pub mod dialogue;
pub mod healing;
pub mod health;
pub mod prompt;
pub mod round;
pub mod scoring;
pub mod session;
pub mod voice;

// Re-export commonly used types
pub use core::{
    error::{DomainError, ErrorKind},
    identity::VoiceIdentity,
};
pub use dialogue::message::{PriorMessage, Role, VoiceResponse};
pub use healing::{HealingAction, HealingKind, HealingOutcome, VoiceCondition};
pub use health::{
    signature::{HealthSignature, SignatureHistory},
    tracker::{HealthPolicy, HealthSnapshot, HealthTracker},
};
pub use prompt::template::PromptTemplate;
pub use round::{
    result::{AbsenceReason, RoundResult, VoiceOutcome, weighted_aggregate},
    spec::RoundSpec,
};
pub use scoring::{FixedScorer, QualityScorer};
pub use session::{
    checkpoint::SessionCheckpoint,
    result::{SessionResult, consensus_reached},
};
pub use voice::spec::VoiceSpec;
