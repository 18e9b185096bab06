//! Checkpoint persistence port.

use async_trait::async_trait;
use chorus_domain::SessionCheckpoint;
use thiserror::Error;

/// Errors from checkpoint persistence
#[derive(Error, Debug)]
pub enum CheckpointStoreError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No checkpoint found for session {0}")]
    NotFound(String),
}

/// Persists session checkpoints for later resumption.
///
/// Checkpoints are written whole and never mutated in place; a resumed
/// session produces new checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &SessionCheckpoint) -> Result<(), CheckpointStoreError>;

    async fn load(&self, session_id: &str) -> Result<SessionCheckpoint, CheckpointStoreError>;
}

/// Discards every checkpoint. Used when checkpointing is disabled.
pub struct NoCheckpoints;

#[async_trait]
impl CheckpointStore for NoCheckpoints {
    async fn save(&self, _checkpoint: &SessionCheckpoint) -> Result<(), CheckpointStoreError> {
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<SessionCheckpoint, CheckpointStoreError> {
        Err(CheckpointStoreError::NotFound(session_id.to_string()))
    }
}
