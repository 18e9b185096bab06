//! Requested voice configuration.

pub mod spec;
