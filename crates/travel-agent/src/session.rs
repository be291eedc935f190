use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Datelike, Local};
use thiserror::Error;
use travel_agent_core::checkpoint::{
    CheckpointError, FileCheckpointer, validate_thread_id,
};
use travel_agent_core::email::EmailSender;
use travel_agent_core::{
    Agent, AgentBuilder, AgentEvent, ModelClient, TranscriptSource,
    TurnOutcome,
};
use travel_agent_model::ModelMessage;

use crate::llm;
use crate::sendgrid::SendGridSender;
use crate::settings::{Settings, SettingsError};
use crate::tools::*;

const TOOLS_SYSTEM_PROMPT: &str = include_str!("./prompts/tools_system.md");
const EMAIL_SYSTEM_PROMPT: &str = include_str!("./prompts/email_system.md");

type OnTranscript = Box<dyn Fn(TranscriptSource, String) + Send + Sync>;
type OnEvent = Box<dyn Fn(AgentEvent) + Send + Sync>;

/// Errors returned by a [`Session`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// The configuration is unusable.
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// The thread id can't be used.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    /// The agent failed to run a turn.
    #[error(transparent)]
    Agent(#[from] travel_agent_core::Error),
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    settings: Settings,
    model_client: Option<ModelClient>,
    state_dir: Option<PathBuf>,
    thread_id: Option<String>,
    email_sender: Option<Arc<dyn EmailSender>>,
    on_transcript: Option<OnTranscript>,
    on_event: Option<OnEvent>,
}

impl SessionBuilder {
    /// Creates a session builder from the runtime settings.
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings,
            model_client: None,
            state_dir: None,
            thread_id: None,
            email_sender: None,
            on_transcript: None,
            on_event: None,
        }
    }

    /// Uses `model_client` instead of the provider named in the settings.
    #[inline]
    pub fn with_model_client(mut self, model_client: ModelClient) -> Self {
        self.model_client = Some(model_client);
        self
    }

    /// Keeps threads as files in `state_dir`, so they survive restarts.
    /// Threads live in memory otherwise.
    #[inline]
    pub fn with_state_dir<P: Into<PathBuf>>(mut self, state_dir: P) -> Self {
        self.state_dir = Some(state_dir.into());
        self
    }

    /// Continues an existing thread instead of starting a new one.
    #[inline]
    pub fn with_thread_id<S: Into<String>>(mut self, thread_id: S) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Delivers emails with `sender` instead of SendGrid. This enables the
    /// email step even when the email settings are missing.
    #[inline]
    pub fn with_email_sender<E: EmailSender + 'static>(
        mut self,
        sender: E,
    ) -> Self {
        self.email_sender = Some(Arc::new(sender));
        self
    }

    /// Attaches a callback to be invoked when a transcript is generated.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(TranscriptSource, String) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Box::new(on_transcript));
        self
    }

    /// Attaches a callback to be invoked when the agent reports progress.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(AgentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Box::new(on_event));
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Result<Session, SessionError> {
        let settings = self.settings;
        let model_client = match self.model_client {
            Some(model_client) => model_client,
            None => llm::model_client(&settings)?,
        };
        let thread_id = match self.thread_id {
            Some(thread_id) => {
                validate_thread_id(&thread_id)?;
                thread_id
            }
            None => new_thread_id(),
        };

        let serpapi = SerpApiClient::new(settings.serpapi_api_key.clone());
        let mut agent_builder =
            AgentBuilder::with_model_client(model_client.clone())
                .with_system_prompt(tools_system_prompt())
                .with_tool(FlightsTool::new(serpapi.clone()))
                .with_tool(HotelsTool::new(serpapi))
                .with_tool(ItineraryTool::new(model_client));

        let email_sender = self.email_sender.or_else(|| {
            let email = settings.email.clone()?;
            Some(Arc::new(SendGridSender::new(email)) as Arc<dyn EmailSender>)
        });
        let email_enabled = email_sender.is_some();
        match email_sender {
            Some(sender) => {
                agent_builder =
                    agent_builder.with_email(EMAIL_SYSTEM_PROMPT, sender);
            }
            None => info!("email is not configured, the email step is off"),
        }
        if let Some(state_dir) = &self.state_dir {
            debug!("keeping threads in {}", state_dir.display());
            agent_builder =
                agent_builder.with_checkpointer(FileCheckpointer::new(state_dir));
        }
        if let Some(on_transcript) = self.on_transcript {
            agent_builder = agent_builder.on_transcript(on_transcript);
        }
        if let Some(on_event) = self.on_event {
            agent_builder = agent_builder.on_event(on_event);
        }

        Ok(Session {
            agent: agent_builder.build(),
            thread_id,
            active_model_name: settings.active_model_name(),
            email_enabled,
        })
    }
}

/// A chat session on one thread at a time.
///
/// The session holds a fully configured agent with the travel tools, and it
/// is basically a wrapper around [`Agent`] that remembers the thread.
pub struct Session {
    agent: Agent,
    thread_id: String,
    active_model_name: String,
    email_enabled: bool,
}

impl Session {
    /// Sends a message on the current thread and waits for the turn to end
    /// or pause.
    pub async fn send_message(
        &self,
        message: &str,
    ) -> Result<TurnOutcome, SessionError> {
        Ok(self.agent.invoke(&self.thread_id, message).await?)
    }

    /// Runs the email step the current thread is paused before.
    pub async fn send_email(&self) -> Result<TurnOutcome, SessionError> {
        Ok(self.agent.resume(&self.thread_id).await?)
    }

    /// Returns the messages of the current thread.
    pub async fn history(&self) -> Result<Vec<ModelMessage>, SessionError> {
        Ok(self.agent.history(&self.thread_id).await?)
    }

    /// Switches to a fresh thread and returns its id.
    pub fn new_thread(&mut self) -> &str {
        self.thread_id = new_thread_id();
        debug!("started thread {}", self.thread_id);
        &self.thread_id
    }

    /// Returns the id of the current thread.
    #[inline]
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Returns a display name like `Gemini (gemini-flash-latest)`.
    #[inline]
    pub fn active_model_name(&self) -> &str {
        &self.active_model_name
    }

    /// Whether finished answers pause before the email step.
    #[inline]
    pub fn email_enabled(&self) -> bool {
        self.email_enabled
    }

    /// Returns the agent graph as a Mermaid flowchart.
    #[inline]
    pub fn graph_mermaid(&self) -> String {
        self.agent.graph().to_mermaid()
    }
}

fn tools_system_prompt() -> String {
    TOOLS_SYSTEM_PROMPT
        .replace("{{CURRENT_YEAR}}", &Local::now().year().to_string())
}

fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
