//! The protocol spoken between the travel agent and the LLM providers.
//!
//! This crate establishes an unified protocol for the agent to interact
//! with the supported LLMs (Gemini and Ollama at the moment), so that the
//! agent can switch between them without touching the orchestration code.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to. Conversation types
//! are serializable, because the agent checkpoints them between turns.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
