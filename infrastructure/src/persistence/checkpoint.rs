//! JSON checkpoint files on disk.
//!
//! One file per session, `<session_id>.checkpoint.json`, replaced
//! whole on every save. The write goes through a temp file and a
//! rename so a crash mid-save never leaves a truncated checkpoint
//! behind.

use async_trait::async_trait;
use chorus_application::{CheckpointStore, CheckpointStoreError};
use chorus_domain::SessionCheckpoint;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct JsonCheckpointStore {
    dir: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        // Session ids may contain path-hostile characters
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.checkpoint.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    async fn save(&self, checkpoint: &SessionCheckpoint) -> Result<(), CheckpointStoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CheckpointStoreError::Io(e.to_string()))?;

        let body = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| CheckpointStoreError::Serialization(e.to_string()))?;

        let path = self.path_for(&checkpoint.session_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| CheckpointStoreError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CheckpointStoreError::Io(e.to_string()))?;
        debug!(
            session_id = %checkpoint.session_id,
            cursor = checkpoint.cursor,
            path = %path.display(),
            "checkpoint saved"
        );
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<SessionCheckpoint, CheckpointStoreError> {
        let path = self.path_for(session_id);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointStoreError::NotFound(session_id.to_string()));
            }
            Err(e) => return Err(CheckpointStoreError::Io(e.to_string())),
        };
        serde_json::from_slice(&body)
            .map_err(|e| CheckpointStoreError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_domain::{RoundSpec, VoiceIdentity, VoiceSpec};

    fn sample_checkpoint(session_id: &str) -> SessionCheckpoint {
        SessionCheckpoint::new(
            session_id,
            vec![VoiceSpec::new(VoiceIdentity::new("p", "m"))],
            Vec::new(),
            vec![RoundSpec::new("opening", "go")],
        )
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path());

        store.save(&sample_checkpoint("abc")).await.unwrap();
        let loaded = store.load("abc").await.unwrap();
        assert_eq!(loaded.session_id, "abc");
        assert_eq!(loaded.remaining.len(), 1);
        assert!(loaded.validate().is_ok());
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path());
        assert!(matches!(
            store.load("nope").await,
            Err(CheckpointStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_replaces_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path());

        store.save(&sample_checkpoint("s")).await.unwrap();
        let mut newer = sample_checkpoint("s");
        newer.remaining.clear();
        store.save(&newer).await.unwrap();

        let loaded = store.load("s").await.unwrap();
        assert!(loaded.remaining.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_reports_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path());
        tokio::fs::write(dir.path().join("bad.checkpoint.json"), b"{ not json")
            .await
            .unwrap();
        assert!(matches!(
            store.load("bad").await,
            Err(CheckpointStoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_hostile_session_id_sanitized() {
        let store = JsonCheckpointStore::new("/tmp/ckpt");
        let path = store.path_for("../../etc/passwd");
        assert!(!path.to_string_lossy().contains(".."));
        assert!(path.starts_with("/tmp/ckpt"));
    }
}
