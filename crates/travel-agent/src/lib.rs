//! A travel planning agent that searches flights and hotels, writes
//! itineraries and mails the final plan.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring the planner into your own host apps.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod llm;
pub mod sendgrid;
mod session;
pub mod settings;
pub mod tools;

pub use session::{Session, SessionBuilder, SessionError};
pub use settings::{EmailSettings, ProviderKind, Settings, SettingsError};

/// Re-exports of [`travel_agent_core`] crate.
pub mod core {
    pub use travel_agent_core::*;
}
