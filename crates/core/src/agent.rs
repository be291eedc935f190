mod builder;
#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::Instrument;
use travel_agent_model::{
    ErrorKind, ModelMessage, ModelProviderError, ModelRequest, ToolCallResult,
};

pub use builder::AgentBuilder;

use crate::checkpoint::{Checkpoint, Checkpointer};
use crate::email::{
    EmailDelivery, EmailMessage, EmailSender, strip_code_fence,
};
use crate::error::Error;
use crate::graph::{Graph, Node};
use crate::model_client::{ModelClient, ModelClientResponse};
use crate::tool::Registry;

/// Where a streamed piece of text comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TranscriptSource {
    /// The answer shown to the user.
    Assistant,
    /// The HTML body being generated for the email step.
    Email,
}

/// Notable things that happen while a turn runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentEvent {
    /// A tool is about to be called.
    ToolCall {
        /// Name of the tool.
        name: String,
    },
    /// The model rejected the tool list and the request was sent again
    /// without tools.
    ToolsUnsupported,
    /// The run paused before the given node.
    Interrupted(Node),
    /// The email step finished.
    EmailDelivered(EmailDelivery),
}

/// What a finished `invoke` or `resume` call left behind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Text of the last assistant message in the thread.
    pub reply: Option<String>,
    /// The node the thread is paused before, if any.
    pub pending: Option<Node>,
    /// Result of the email step, if it ran.
    pub email: Option<EmailDelivery>,
}

pub(crate) struct EmailStep {
    pub(crate) prompt: String,
    pub(crate) sender: Arc<dyn EmailSender>,
}

pub(crate) type OnTranscript =
    Arc<dyn Fn(TranscriptSource, String) + Send + Sync>;
pub(crate) type OnEvent = Arc<dyn Fn(AgentEvent) + Send + Sync>;

struct AgentInner {
    model_client: ModelClient,
    system_prompt: Option<String>,
    tools: Registry,
    graph: Graph,
    checkpointer: Arc<dyn Checkpointer>,
    email: Option<EmailStep>,
    tools_temperature: f32,
    email_temperature: f32,
    max_steps: usize,
    on_transcript: Option<OnTranscript>,
    on_event: Option<OnEvent>,
    threads: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// An agent that walks the travel planning graph for any number of threads.
///
/// The agent itself is stateless between calls: everything a thread needs is
/// loaded from the checkpointer and saved back after every step. Calls on
/// the same thread are serialized, calls on different threads run
/// concurrently. Cloning is cheap and clones share everything.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl Agent {
    /// Sends a user message on a thread and runs the graph until the turn
    /// ends or pauses.
    ///
    /// A thread paused before the email step drops the pending step, the
    /// new message starts a fresh turn.
    pub async fn invoke<S: Into<String>>(
        &self,
        thread_id: &str,
        input: S,
    ) -> Result<TurnOutcome, Error> {
        let input = input.into();
        self.with_thread_lock(thread_id, async {
            let mut checkpoint = self
                .inner
                .checkpointer
                .load(thread_id)
                .await?
                .unwrap_or_else(|| Checkpoint::new(thread_id));
            if let Some(pending) = checkpoint.next {
                debug!("thread {thread_id}: dropping pending step {pending}");
            }
            answer_pending_calls(&mut checkpoint.messages, INTERRUPTED_CALL);
            checkpoint.messages.push(ModelMessage::User(input));
            checkpoint.next = Some(Node::ENTRY);
            self.inner.checkpointer.save(&checkpoint).await?;

            self.run(&mut checkpoint, false)
                .instrument(debug_span!("agent invoke", thread = thread_id))
                .await
        })
        .await
    }

    /// Continues a paused thread, running the step it paused before.
    pub async fn resume(&self, thread_id: &str) -> Result<TurnOutcome, Error> {
        self.with_thread_lock(thread_id, async {
            let mut checkpoint =
                match self.inner.checkpointer.load(thread_id).await? {
                    Some(checkpoint) if checkpoint.next.is_some() => checkpoint,
                    _ => {
                        return Err(Error::NothingToResume(thread_id.to_owned()));
                    }
                };

            self.run(&mut checkpoint, true)
                .instrument(debug_span!("agent resume", thread = thread_id))
                .await
        })
        .await
    }

    /// Returns the messages of a thread, empty if the thread is unknown.
    pub async fn history(
        &self,
        thread_id: &str,
    ) -> Result<Vec<ModelMessage>, Error> {
        let checkpoint = self.inner.checkpointer.load(thread_id).await?;
        Ok(checkpoint.map(|c| c.messages).unwrap_or_default())
    }

    /// Returns the node a thread is paused before, if any.
    pub async fn pending(&self, thread_id: &str) -> Result<Option<Node>, Error> {
        let checkpoint = self.inner.checkpointer.load(thread_id).await?;
        Ok(checkpoint.and_then(|c| c.next))
    }

    /// Returns the graph this agent walks.
    #[inline]
    pub fn graph(&self) -> &Graph {
        &self.inner.graph
    }

    /// Runs `fut` while holding the lock of `thread_id`.
    ///
    /// The lock entry is dropped afterwards unless another call is waiting
    /// on it, so the table only holds threads with calls in flight.
    async fn with_thread_lock<F, T>(&self, thread_id: &str, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let lock = {
            let mut threads = self.inner.threads.lock().await;
            Arc::clone(threads.entry(thread_id.to_owned()).or_default())
        };
        let output = {
            let _guard = lock.lock().await;
            fut.await
        };

        let mut threads = self.inner.threads.lock().await;
        // One reference is ours, the other is the table's.
        if Arc::strong_count(&lock) <= 2 {
            threads.remove(thread_id);
        }
        output
    }

    #[cfg(test)]
    async fn locked_threads(&self) -> usize {
        self.inner.threads.lock().await.len()
    }

    async fn run(
        &self,
        checkpoint: &mut Checkpoint,
        resuming: bool,
    ) -> Result<TurnOutcome, Error> {
        let inner = &self.inner;
        let mut skip_interrupt = resuming;
        let mut steps = 0;
        let mut email = None;

        while let Some(node) = checkpoint.next {
            if node == Node::End {
                checkpoint.next = None;
                inner.checkpointer.save(checkpoint).await?;
                break;
            }
            if inner.graph.interrupts_before(node) && !skip_interrupt {
                debug!("interrupted before {node}");
                self.emit(AgentEvent::Interrupted(node));
                return Ok(self.outcome(checkpoint, email));
            }
            skip_interrupt = false;

            if steps >= inner.max_steps {
                warn!("turn exceeded {} steps", inner.max_steps);
                answer_pending_calls(&mut checkpoint.messages, STEP_LIMIT_CALL);
                checkpoint.next = None;
                inner.checkpointer.save(checkpoint).await?;
                return Err(Error::StepLimitExceeded(inner.max_steps));
            }
            steps += 1;

            trace!("running {node}");
            match node {
                Node::CallToolsLlm => self.call_tools_llm(checkpoint).await?,
                Node::InvokeTools => self.invoke_tools(checkpoint).await,
                Node::EmailSender => {
                    email = self.send_email(checkpoint).await?;
                }
                Node::End => {}
            }

            let next = inner.graph.route(node, &checkpoint.messages);
            checkpoint.next = (next != Node::End).then_some(next);
            checkpoint.step += 1;
            inner.checkpointer.save(checkpoint).await?;
        }

        Ok(self.outcome(checkpoint, email))
    }

    fn outcome(
        &self,
        checkpoint: &Checkpoint,
        email: Option<EmailDelivery>,
    ) -> TurnOutcome {
        let reply = checkpoint.messages.iter().rev().find_map(|msg| match msg {
            ModelMessage::Assistant(msg) => Some(msg.content.clone()),
            _ => None,
        });
        TurnOutcome {
            reply,
            pending: checkpoint.next,
            email,
        }
    }

    async fn call_tools_llm(
        &self,
        checkpoint: &mut Checkpoint,
    ) -> Result<(), Error> {
        let inner = &self.inner;
        let mut messages = Vec::with_capacity(checkpoint.messages.len() + 1);
        if let Some(system_prompt) = &inner.system_prompt {
            messages.push(ModelMessage::System(system_prompt.clone()));
        }
        messages.extend(checkpoint.messages.iter().cloned());
        let req = ModelRequest {
            messages,
            tools: inner.tools.definitions(),
            temperature: Some(inner.tools_temperature),
        };

        let resp = match self.send(req.clone(), TranscriptSource::Assistant).await
        {
            Ok(resp) => resp,
            Err(Error::Model(err))
                if !req.tools.is_empty() && is_tools_unsupported(&*err) =>
            {
                warn!("model does not support tools, continuing without: {err}");
                self.emit(AgentEvent::ToolsUnsupported);
                let req = ModelRequest {
                    tools: vec![],
                    ..req
                };
                self.send(req, TranscriptSource::Assistant).await?
            }
            Err(err) => return Err(err),
        };

        checkpoint
            .messages
            .push(ModelMessage::Assistant(resp.into_message()));
        Ok(())
    }

    async fn invoke_tools(&self, checkpoint: &mut Checkpoint) {
        let Some(calls) = checkpoint.messages.last().map(|m| m.tool_calls())
        else {
            return;
        };
        let calls = calls.to_vec();
        for call in &calls {
            debug!("calling tool: {}", call.name);
            self.emit(AgentEvent::ToolCall {
                name: call.name.clone(),
            });
        }
        let results = self.inner.tools.execute_all(&calls).await;
        checkpoint
            .messages
            .extend(results.into_iter().map(ModelMessage::Tool));
    }

    async fn send_email(
        &self,
        checkpoint: &Checkpoint,
    ) -> Result<Option<EmailDelivery>, Error> {
        let Some(email) = &self.inner.email else {
            warn!("no email step configured, skipping");
            return Ok(None);
        };
        let content = checkpoint
            .messages
            .last()
            .map(|msg| msg.text().to_owned())
            .unwrap_or_default();
        let req = ModelRequest {
            messages: vec![
                ModelMessage::System(email.prompt.clone()),
                ModelMessage::User(content),
            ],
            tools: vec![],
            temperature: Some(self.inner.email_temperature),
        };
        let resp = self.send(req, TranscriptSource::Email).await?;
        debug!("email content generated");

        let message = EmailMessage {
            html: strip_code_fence(&resp.transcript).to_owned(),
        };
        let delivery = match email.sender.send(&message).await {
            Ok(status) => {
                debug!("email sent: {status}");
                EmailDelivery::Sent { status }
            }
            Err(err) => {
                error!("error sending email: {err}");
                EmailDelivery::Failed(format!("{err}"))
            }
        };
        self.emit(AgentEvent::EmailDelivered(delivery.clone()));
        Ok(Some(delivery))
    }

    async fn send(
        &self,
        req: ModelRequest,
        source: TranscriptSource,
    ) -> Result<ModelClientResponse, Error> {
        let on_transcript = self.inner.on_transcript.clone();
        self.inner
            .model_client
            .send_request(req, move |delta| {
                if let Some(on_transcript) = &on_transcript {
                    on_transcript(source, delta);
                }
            })
            .await
            .map_err(Error::Model)
    }

    #[inline]
    fn emit(&self, event: AgentEvent) {
        if let Some(on_event) = &self.inner.on_event {
            on_event(event);
        }
    }
}

const STEP_LIMIT_CALL: &str = r#"{"error":"step limit reached"}"#;
const INTERRUPTED_CALL: &str = r#"{"error":"tool call was interrupted"}"#;

/// Gives every tool call of a trailing assistant message a result, so the
/// history never ends in calls the model has no answer for.
fn answer_pending_calls(messages: &mut Vec<ModelMessage>, content: &str) {
    let Some(calls) = messages.last().map(|msg| msg.tool_calls().to_vec())
    else {
        return;
    };
    if !calls.is_empty() {
        debug!("closing {} unanswered tool calls", calls.len());
    }
    messages.extend(calls.into_iter().map(|call| {
        ModelMessage::Tool(ToolCallResult {
            id: call.id,
            name: call.name,
            content: content.to_owned(),
        })
    }));
}

fn is_tools_unsupported(err: &dyn ModelProviderError) -> bool {
    if err.kind() == ErrorKind::ToolsUnsupported {
        return true;
    }
    let message = err.to_string().to_lowercase();
    message.contains("tools") && message.contains("support")
}
