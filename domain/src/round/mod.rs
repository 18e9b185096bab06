//! Dialogue rounds: specifications and per-voice results.

pub mod result;
pub mod spec;
