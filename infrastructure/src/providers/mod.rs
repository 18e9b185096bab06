//! Provider adapters and the registry that routes to them.

#[cfg(feature = "http-voice")]
mod http;
mod registry;
mod statics;

#[cfg(feature = "http-voice")]
pub use http::{HttpVoiceAdapter, HttpVoiceFactory};
pub use registry::AdapterRegistry;
pub use statics::{StaticVoiceAdapter, StaticVoiceFactory};
