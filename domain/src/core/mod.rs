//! Core domain primitives: identities and errors.

pub mod error;
pub mod identity;
