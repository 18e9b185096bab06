//! Prompt rendering.

pub mod template;
