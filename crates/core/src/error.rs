use std::io;

use thiserror::Error;
use travel_agent_model::{ErrorKind, ModelProviderError};

/// Errors returned by the agent.
#[derive(Debug, Error)]
pub enum Error {
    /// The model request failed, after retries if the failure was transient.
    #[error("model request failed: {0}")]
    Model(Box<dyn ModelProviderError>),
    /// The thread state could not be loaded or saved.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
    /// `resume` was called on a thread that isn't paused.
    #[error("thread `{0}` has nothing to resume")]
    NothingToResume(String),
    /// The turn took more graph steps than allowed.
    #[error("turn exceeded the limit of {0} steps")]
    StepLimitExceeded(usize),
}

impl Error {
    /// Returns the provider error kind, if this is a model error.
    #[inline]
    pub fn model_error_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Model(err) => Some(err.kind()),
            _ => None,
        }
    }
}

/// Errors returned by a [`Checkpointer`](crate::checkpoint::Checkpointer).
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Thread ids must be 1 to 128 characters of `[A-Za-z0-9_-]`.
    #[error("invalid thread id `{0}`")]
    InvalidThreadId(String),
    /// Reading or writing the store failed.
    #[error("checkpoint io error: {0}")]
    Io(#[from] io::Error),
    /// The stored checkpoint is malformed.
    #[error("malformed checkpoint: {0}")]
    Serde(#[from] serde_json::Error),
}
