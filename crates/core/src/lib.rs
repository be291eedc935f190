//! Core logic including the agent graph, tool execution, checkpoints, etc.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod checkpoint;
pub mod email;
mod error;
pub mod graph;
mod model_client;
pub mod tool;

pub use agent::{
    Agent, AgentBuilder, AgentEvent, TranscriptSource, TurnOutcome,
};
pub use error::Error;
pub use model_client::{ModelClient, ModelClientResponse, RetryPolicy};
