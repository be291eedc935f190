//! Persistence of thread state between graph steps.

use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use travel_agent_model::ModelMessage;

pub use crate::error::CheckpointError;
use crate::graph::Node;

/// A snapshot of one thread.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// The thread this snapshot belongs to.
    pub thread_id: String,
    /// The conversation so far, without the system prompt.
    pub messages: Vec<ModelMessage>,
    /// The node to run next, `None` when the thread is idle.
    pub next: Option<Node>,
    /// Number of graph steps the thread has taken in total.
    pub step: u64,
}

impl Checkpoint {
    /// Creates an empty checkpoint for `thread_id`.
    #[inline]
    pub fn new<S: Into<String>>(thread_id: S) -> Self {
        Self {
            thread_id: thread_id.into(),
            ..Default::default()
        }
    }
}

/// A store of checkpoints, keyed by thread id.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Loads the latest checkpoint of a thread.
    async fn load(
        &self,
        thread_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Saves a checkpoint, replacing the previous one of its thread.
    async fn save(&self, checkpoint: &Checkpoint)
    -> Result<(), CheckpointError>;
}

/// Keeps checkpoints in memory. Threads are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryCheckpointer {
    threads: RwLock<HashMap<String, Checkpoint>>,
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn load(
        &self,
        thread_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn save(
        &self,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        self.threads
            .write()
            .await
            .insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }
}

/// Stores every thread as a JSON file in a directory.
#[derive(Clone, Debug)]
pub struct FileCheckpointer {
    base_path: PathBuf,
}

impl FileCheckpointer {
    /// Creates a checkpointer rooted at `base_path`. The directory is created
    /// on the first save.
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn thread_path(&self, thread_id: &str) -> Result<PathBuf, CheckpointError> {
        validate_thread_id(thread_id)?;
        Ok(self.base_path.join(format!("{thread_id}.json")))
    }
}

#[async_trait]
impl Checkpointer for FileCheckpointer {
    async fn load(
        &self,
        thread_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.thread_path(thread_id)?;
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(err) if err.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let checkpoint = serde_json::from_str(&json)?;
        Ok(Some(checkpoint))
    }

    async fn save(
        &self,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        let path = self.thread_path(&checkpoint.thread_id)?;
        tokio::fs::create_dir_all(&self.base_path).await?;
        let json = serde_json::to_string_pretty(checkpoint)?;
        // Readers never see a half written file.
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        trace!("saved checkpoint to {}", path.display());
        Ok(())
    }
}

/// Checks that `thread_id` is usable as a file name.
pub fn validate_thread_id(thread_id: &str) -> Result<(), CheckpointError> {
    let valid = (1..=128).contains(&thread_id.len())
        && thread_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidThreadId(thread_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use travel_agent_model::AssistantMessage;

    use super::*;

    fn sample(thread_id: &str) -> Checkpoint {
        Checkpoint {
            thread_id: thread_id.to_owned(),
            messages: vec![
                ModelMessage::User("Weekend in Porto".to_owned()),
                ModelMessage::Assistant(AssistantMessage::text("Sure!")),
            ],
            next: Some(Node::EmailSender),
            step: 2,
        }
    }

    #[tokio::test]
    async fn test_memory_checkpointer() {
        let checkpointer = MemoryCheckpointer::default();
        assert_eq!(checkpointer.load("t1").await.unwrap(), None);

        checkpointer.save(&sample("t1")).await.unwrap();
        let loaded = checkpointer.load("t1").await.unwrap();
        assert_eq!(loaded, Some(sample("t1")));
        assert_eq!(checkpointer.load("t2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_checkpointer() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path().join("threads"));
        assert_eq!(checkpointer.load("trip-42").await.unwrap(), None);

        checkpointer.save(&sample("trip-42")).await.unwrap();
        let mut updated = sample("trip-42");
        updated.next = None;
        checkpointer.save(&updated).await.unwrap();

        // A new instance reads what the previous one wrote.
        let checkpointer = FileCheckpointer::new(dir.path().join("threads"));
        assert_eq!(checkpointer.load("trip-42").await.unwrap(), Some(updated));
        assert!(!dir.path().join("threads/trip-42.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_invalid_thread_ids() {
        let dir = tempfile::tempdir().unwrap();
        let checkpointer = FileCheckpointer::new(dir.path());
        for thread_id in ["", "../escape", "a b", &"x".repeat(129)] {
            let err = checkpointer.load(thread_id).await.unwrap_err();
            assert!(matches!(err, CheckpointError::InvalidThreadId(_)));
        }
        assert!(validate_thread_id(&"x".repeat(128)).is_ok());
        assert!(
            checkpointer
                .save(&Checkpoint::new("bad/id"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        let checkpointer = FileCheckpointer::new(dir.path());
        let err = checkpointer.load("broken").await.unwrap_err();
        assert!(matches!(err, CheckpointError::Serde(_)));
    }
}
