//! Conversation payloads exchanged with voice adapters.

pub mod message;
