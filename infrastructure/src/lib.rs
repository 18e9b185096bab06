//! Infrastructure layer for chorus
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer, including configuration file loading.

pub mod config;
pub mod events;
pub mod persistence;
pub mod providers;
pub mod scoring;

// Re-export commonly used types
pub use config::{ConfigLoader, FileConfig, FileProviderConfig, FileVoiceConfig};
pub use events::{FanoutSink, JsonlEventSink, TracingEventSink};
pub use persistence::JsonCheckpointStore;
#[cfg(feature = "http-voice")]
pub use providers::HttpVoiceFactory;
pub use providers::{AdapterRegistry, StaticVoiceAdapter, StaticVoiceFactory};
pub use scoring::LengthHeuristicScorer;
