//! Voice health: decaying reliability scores and probe signatures.

pub mod signature;
pub mod tracker;
