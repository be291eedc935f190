use std::fmt::{self, Debug};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::{
    Agent, AgentEvent, AgentInner, EmailStep, OnEvent, OnTranscript,
    TranscriptSource,
};
use crate::checkpoint::{Checkpointer, MemoryCheckpointer};
use crate::email::EmailSender;
use crate::graph::Graph;
use crate::model_client::ModelClient;
use crate::tool::{Registry, Tool};

const DEFAULT_TOOLS_TEMPERATURE: f32 = 0.7;
const DEFAULT_EMAIL_TEMPERATURE: f32 = 0.1;
const DEFAULT_MAX_STEPS: usize = 25;

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    system_prompt: Option<String>,
    tools: Registry,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    email: Option<EmailStep>,
    tools_temperature: f32,
    email_temperature: f32,
    max_steps: usize,
    on_transcript: Option<OnTranscript>,
    on_event: Option<OnEvent>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model client.
    #[inline]
    pub fn with_model_client(model_client: ModelClient) -> Self {
        Self {
            model_client,
            system_prompt: None,
            tools: Registry::default(),
            checkpointer: None,
            email: None,
            tools_temperature: DEFAULT_TOOLS_TEMPERATURE,
            email_temperature: DEFAULT_EMAIL_TEMPERATURE,
            max_steps: DEFAULT_MAX_STEPS,
            on_transcript: None,
            on_event: None,
        }
    }

    /// Sets the system prompt sent before the history on every tool-calling
    /// request.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.tools.add_tool(tool);
        self
    }

    /// Sets where thread state is kept, in memory by default.
    #[inline]
    pub fn with_checkpointer<C: Checkpointer + 'static>(
        mut self,
        checkpointer: C,
    ) -> Self {
        self.checkpointer = Some(Arc::new(checkpointer));
        self
    }

    /// Enables the email step. `prompt` instructs the model to turn an
    /// answer into an HTML email body.
    #[inline]
    pub fn with_email<S, E>(mut self, prompt: S, sender: E) -> Self
    where
        S: Into<String>,
        E: EmailSender + 'static,
    {
        self.email = Some(EmailStep {
            prompt: prompt.into(),
            sender: Arc::new(sender),
        });
        self
    }

    /// Sets the sampling temperatures of the tool-calling requests and the
    /// email requests.
    #[inline]
    pub fn with_temperatures(mut self, tools: f32, email: f32) -> Self {
        self.tools_temperature = tools;
        self.email_temperature = email;
        self
    }

    /// Sets the maximum number of graph steps in a single turn.
    #[inline]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Attaches a callback that receives text as it streams from the model.
    #[inline]
    pub fn on_transcript(
        mut self,
        on_transcript: impl Fn(TranscriptSource, String) + Send + Sync + 'static,
    ) -> Self {
        self.on_transcript = Some(Arc::new(on_transcript));
        self
    }

    /// Attaches a callback that receives [`AgentEvent`]s.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(AgentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Arc::new(on_event));
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let graph = Graph::new(self.email.is_some());
        debug!("agent graph:\n{}", graph.to_mermaid());

        let checkpointer = self
            .checkpointer
            .unwrap_or_else(|| {
                Arc::new(MemoryCheckpointer::default()) as Arc<dyn Checkpointer>
            });
        let inner = AgentInner {
            model_client: self.model_client,
            system_prompt: self.system_prompt,
            tools: self.tools,
            graph,
            checkpointer,
            email: self.email,
            tools_temperature: self.tools_temperature,
            email_temperature: self.email_temperature,
            max_steps: self.max_steps,
            on_transcript: self.on_transcript,
            on_event: self.on_event,
            threads: Mutex::default(),
        };
        Agent {
            inner: Arc::new(inner),
        }
    }
}

impl Debug for AgentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("system_prompt", &self.system_prompt.is_some())
            .field("tools", &self.tools.definitions().len())
            .field("email", &self.email.is_some())
            .field("tools_temperature", &self.tools_temperature)
            .field("email_temperature", &self.email_temperature)
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}
