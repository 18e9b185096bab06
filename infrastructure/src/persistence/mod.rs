//! Checkpoint persistence.

mod checkpoint;

pub use checkpoint::JsonCheckpointStore;
