//! Application layer for chorus
//!
//! This crate contains the orchestration use cases and the port
//! definitions their adapters implement. It depends only on the
//! domain layer.
//!
//! # Control flow
//!
//! [`SessionCoordinator`] gathers voices through [`VoiceManager`],
//! drives rounds through [`RoundOrchestrator`], and runs one
//! [`InfrastructureMonitor`] task per session. All health state flows
//! through a single [`SharedHealthTracker`]; all adapter mutation
//! (connect, disconnect, fallback switches) is routed through the
//! voice manager.

pub mod health;
pub mod ports;
pub mod use_cases;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use health::SharedHealthTracker;
pub use ports::{
    checkpoint_store::{CheckpointStore, CheckpointStoreError, NoCheckpoints},
    event_sink::{EventSink, MonitorEvent, NoSink},
    voice_adapter::{AdapterError, AdapterFactory, HealthProbe, VoiceAdapter},
};
pub use use_cases::gather_voices::{
    ActiveVoice, DispatchTuning, FailureMode, GatherError, GatherPolicy, GatherReport,
    VoiceManager,
};
pub use use_cases::monitor::{InfrastructureMonitor, MonitorConfig, MonitorHandle};
pub use use_cases::run_round::{RoundOrchestrator, RoundPolicy};
pub use use_cases::run_session::{SessionCoordinator, SessionError, SessionPolicy};
