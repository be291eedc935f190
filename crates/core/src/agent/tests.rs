use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::timeout;
use travel_agent_model::{
    AssistantMessage, ErrorKind, ModelMessage, ToolCallRequest, ToolCallResult,
};
use travel_agent_test_model::{PresetEvent, PresetResponse, TestModelProvider};

use super::*;
use crate::checkpoint::FileCheckpointer;
use crate::email::SendError;
use crate::tool::{INVALID_TOOL_MESSAGE, Tool, ToolResult};
use crate::{AgentBuilder, ModelClient};

const TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
struct WeatherInput {
    city: String,
}

struct WeatherTool {
    schema: Value,
}

impl WeatherTool {
    fn new() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"]
            }),
        }
    }
}

impl Tool for WeatherTool {
    type Input = WeatherInput;

    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Returns the forecast for a city"
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        std::future::ready(Ok(format!("Sunny in {}", input.city)))
    }
}

#[derive(Clone, Default)]
struct RecordingSender {
    sent: Arc<Mutex<Vec<EmailMessage>>>,
    fail: bool,
}

#[async_trait]
impl EmailSender for RecordingSender {
    async fn send(&self, message: &EmailMessage) -> Result<u16, SendError> {
        if self.fail {
            return Err("sendgrid said no".into());
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(202)
    }
}

fn tool_call(name: &str, arguments: Value) -> PresetResponse {
    PresetResponse::with_events([PresetEvent::ToolCall(ToolCallRequest {
        id: "call_0".to_owned(),
        name: name.to_owned(),
        arguments,
    })])
}

fn build_agent(provider: &TestModelProvider) -> AgentBuilder {
    AgentBuilder::with_model_client(ModelClient::new(provider.clone()))
        .with_system_prompt("You are a travel planner.")
        .with_tool(WeatherTool::new())
}

#[tokio::test]
async fn test_simple_answer() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_events([
        PresetEvent::MessageDelta("Hi, ".to_owned()),
        PresetEvent::MessageDelta("where to?".to_owned()),
    ]));

    let transcript = Arc::new(Mutex::new(String::new()));
    let agent = build_agent(&provider)
        .on_transcript({
            let transcript = Arc::clone(&transcript);
            move |source, delta| {
                assert_eq!(source, TranscriptSource::Assistant);
                transcript.lock().unwrap().push_str(&delta);
            }
        })
        .build();

    let outcome = timeout(TIMEOUT, agent.invoke("t1", "Hello"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.reply.as_deref(), Some("Hi, where to?"));
    // No email step, so nothing to pause for.
    assert_eq!(outcome.pending, None);
    assert_eq!(*transcript.lock().unwrap(), "Hi, where to?");

    let requests = provider.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].messages[0],
        ModelMessage::System("You are a travel planner.".to_owned())
    );
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].temperature, Some(0.7));
    assert_eq!(agent.history("t1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_history_carries_over() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_text("Lisbon is lovely."));
    provider.add_response(PresetResponse::with_text("Try Sintra."));

    let agent = build_agent(&provider).build();
    agent.invoke("t1", "Lisbon?").await.unwrap();
    agent.invoke("t1", "Day trips?").await.unwrap();
    agent.invoke("t2", "Other thread").await.unwrap_err();

    let requests = provider.requests();
    // System prompt, two user messages and the first answer.
    assert_eq!(requests[1].messages.len(), 4);
    assert_eq!(
        requests[1].messages[3],
        ModelMessage::User("Day trips?".to_owned())
    );
    // A fresh thread only sees its own message.
    assert_eq!(requests[2].messages.len(), 2);
}

#[tokio::test]
async fn test_tool_loop_and_email() {
    let mut provider = TestModelProvider::default();
    provider.add_response(tool_call("weather", json!({ "city": "Kyoto" })));
    provider.add_response(PresetResponse::with_text("Pack sunglasses."));
    provider.add_response(PresetResponse::with_text(
        "```html\n<p>Pack sunglasses.</p>\n```",
    ));

    let sender = RecordingSender::default();
    let events = Arc::new(Mutex::new(vec![]));
    let agent = build_agent(&provider)
        .with_email("Write an HTML email.", sender.clone())
        .on_event({
            let events = Arc::clone(&events);
            move |event| events.lock().unwrap().push(event)
        })
        .build();

    let outcome = timeout(TIMEOUT, agent.invoke("trip", "Kyoto weather?"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.reply.as_deref(), Some("Pack sunglasses."));
    assert_eq!(outcome.pending, Some(Node::EmailSender));
    assert!(sender.sent.lock().unwrap().is_empty());

    let history = agent.history("trip").await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[2].text(), "Sunny in Kyoto");

    let outcome = timeout(TIMEOUT, agent.resume("trip"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.pending, None);
    assert_eq!(outcome.email, Some(EmailDelivery::Sent { status: 202 }));
    assert_eq!(
        *sender.sent.lock().unwrap(),
        vec![EmailMessage {
            html: "<p>Pack sunglasses.</p>".to_owned()
        }]
    );

    // The email request stands alone, without tools or history.
    let requests = provider.requests();
    let email_request = &requests[2];
    assert_eq!(email_request.messages.len(), 2);
    assert_eq!(
        email_request.messages[1],
        ModelMessage::User("Pack sunglasses.".to_owned())
    );
    assert!(email_request.tools.is_empty());
    assert_eq!(email_request.temperature, Some(0.1));

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            AgentEvent::ToolCall {
                name: "weather".to_owned()
            },
            AgentEvent::Interrupted(Node::EmailSender),
            AgentEvent::EmailDelivered(EmailDelivery::Sent { status: 202 }),
        ]
    );

    // The email step ran exactly once.
    let err = agent.resume("trip").await.unwrap_err();
    assert!(matches!(err, Error::NothingToResume(_)));
}

#[tokio::test]
async fn test_email_failure_is_reported() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_text("Your plan."));
    provider.add_response(PresetResponse::with_text("<p>Your plan.</p>"));

    let sender = RecordingSender {
        fail: true,
        ..Default::default()
    };
    let agent = build_agent(&provider)
        .with_email("Write an HTML email.", sender)
        .build();
    agent.invoke("t1", "Plan it").await.unwrap();
    let outcome = agent.resume("t1").await.unwrap();
    assert_eq!(
        outcome.email,
        Some(EmailDelivery::Failed("sendgrid said no".to_owned()))
    );
    assert_eq!(agent.pending("t1").await.unwrap(), None);
}

#[tokio::test]
async fn test_new_input_drops_pending_email() {
    let mut provider = TestModelProvider::default();
    provider.add_response(PresetResponse::with_text("Plan A."));
    provider.add_response(PresetResponse::with_text("Plan B."));

    let sender = RecordingSender::default();
    let agent = build_agent(&provider)
        .with_email("Write an HTML email.", sender.clone())
        .build();
    agent.invoke("t1", "Plan").await.unwrap();
    let outcome = agent.invoke("t1", "Another plan").await.unwrap();

    assert_eq!(outcome.reply.as_deref(), Some("Plan B."));
    assert_eq!(outcome.pending, Some(Node::EmailSender));
    assert!(sender.sent.lock().unwrap().is_empty());
    assert_eq!(provider.remaining(), 0);
}

#[tokio::test]
async fn test_unknown_tool() {
    let mut provider = TestModelProvider::default();
    provider.add_response(tool_call("teleport", json!({ "to": "Mars" })));
    provider.add_response(PresetResponse::with_text("Sorry, let me retry."));

    let agent = build_agent(&provider).build();
    let outcome = agent.invoke("t1", "Go to Mars").await.unwrap();
    assert_eq!(outcome.reply.as_deref(), Some("Sorry, let me retry."));

    let history = agent.history("t1").await.unwrap();
    assert_eq!(history[2].text(), INVALID_TOOL_MESSAGE);
}

#[tokio::test]
async fn test_tools_unsupported_fallback() {
    let mut provider = TestModelProvider::default();
    provider.reject_tools();
    provider.add_response(PresetResponse::with_text("No tools, but here."));

    let events = Arc::new(Mutex::new(vec![]));
    let agent = build_agent(&provider)
        .on_event({
            let events = Arc::clone(&events);
            move |event| events.lock().unwrap().push(event)
        })
        .build();
    let outcome = agent.invoke("t1", "Hotels in Oslo").await.unwrap();
    assert_eq!(outcome.reply.as_deref(), Some("No tools, but here."));

    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].tools.is_empty());
    assert!(requests[1].tools.is_empty());
    assert_eq!(requests[0].messages, requests[1].messages);
    assert_eq!(*events.lock().unwrap(), vec![AgentEvent::ToolsUnsupported]);
}

#[tokio::test]
async fn test_step_limit() {
    let mut provider = TestModelProvider::default();
    for _ in 0..10 {
        provider.add_response(tool_call("weather", json!({ "city": "Oslo" })));
    }

    let agent = build_agent(&provider).with_max_steps(5).build();
    let err = timeout(TIMEOUT, agent.invoke("t1", "Loop forever"))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::StepLimitExceeded(5)));
    // Three model calls and two tool runs.
    assert_eq!(provider.requests().len(), 3);
    assert_eq!(agent.pending("t1").await.unwrap(), None);

    let history = agent.history("t1").await.unwrap();
    assert_eq!(
        history.last(),
        Some(&ModelMessage::Tool(ToolCallResult {
            id: "call_0".to_owned(),
            name: "weather".to_owned(),
            content: r#"{"error":"step limit reached"}"#.to_owned(),
        }))
    );
}

#[tokio::test]
async fn test_thread_usable_after_step_limit() {
    let mut provider = TestModelProvider::default();
    for _ in 0..2 {
        provider.add_response(tool_call("weather", json!({ "city": "Oslo" })));
    }
    provider.add_response(PresetResponse::with_text("Let's stop there."));

    let agent = build_agent(&provider).with_max_steps(3).build();
    agent.invoke("t1", "Loop").await.unwrap_err();
    let outcome = agent.invoke("t1", "again").await.unwrap();
    assert_eq!(outcome.reply.as_deref(), Some("Let's stop there."));

    let requests = provider.requests();
    let messages = &requests.last().unwrap().messages;
    for (i, msg) in messages.iter().enumerate() {
        for call in msg.tool_calls() {
            let answered = messages[i + 1..].iter().any(|later| {
                matches!(later, ModelMessage::Tool(result) if result.id == call.id)
            });
            assert!(answered, "call {} has no result", call.id);
        }
    }
    assert_eq!(
        messages.last(),
        Some(&ModelMessage::User("again".to_owned()))
    );
}

#[tokio::test]
async fn test_dangling_calls_answered_on_invoke() {
    let provider = TestModelProvider::default();
    let agent = build_agent(&provider).build();

    let mut checkpoint = Checkpoint::new("t1");
    checkpoint.messages = vec![
        ModelMessage::User("Oslo".to_owned()),
        ModelMessage::Assistant(AssistantMessage {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_0".to_owned(),
                name: "weather".to_owned(),
                arguments: json!({ "city": "Oslo" }),
            }],
        }),
    ];
    checkpoint.next = Some(Node::InvokeTools);
    agent.inner.checkpointer.save(&checkpoint).await.unwrap();

    // The scripted provider has nothing left, only the history matters here.
    agent.invoke("t1", "again").await.unwrap_err();
    let history = agent.history("t1").await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(matches!(&history[2], ModelMessage::Tool(result) if result.id == "call_0"));
    assert_eq!(history[3], ModelMessage::User("again".to_owned()));
}

#[tokio::test]
async fn test_thread_locks_released() {
    let mut provider = TestModelProvider::default();
    for _ in 0..3 {
        provider.add_response(PresetResponse::with_text("ok"));
    }

    let agent = build_agent(&provider).build();
    for thread_id in ["a", "b", "c"] {
        agent.invoke(thread_id, "go").await.unwrap();
    }
    agent.resume("a").await.unwrap_err();
    assert_eq!(agent.locked_threads().await, 0);
}

#[derive(Debug)]
struct MessageError(&'static str);

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for MessageError {}

impl ModelProviderError for MessageError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[test]
fn test_tools_unsupported_detection() {
    assert!(is_tools_unsupported(&MessageError(
        "registry.ollama.ai/library/gemma:2b does not support tools"
    )));
    assert!(is_tools_unsupported(&MessageError(
        "Tools are not supported by this model"
    )));
    assert!(!is_tools_unsupported(&MessageError("quota exceeded")));
}
