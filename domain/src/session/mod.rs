//! Session lifecycle: checkpoints and results.

pub mod checkpoint;
pub mod result;
