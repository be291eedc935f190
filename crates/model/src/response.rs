use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelProviderError;

/// The answer of a model, streamed event by event.
pub trait ModelResponse: Sized + Send + 'static {
    /// Error returned when the stream breaks.
    type Error: ModelProviderError;

    /// Polls for the next event.
    ///
    /// - `Poll::Pending`: nothing yet, the task is woken when there may be.
    /// - `Poll::Ready(Ok(Some(event)))`: an event, more may follow.
    /// - `Poll::Ready(Ok(None))`: the answer is complete. Polling again keeps
    ///   returning `None`.
    /// - `Poll::Ready(Err(error))`: the stream failed.
    ///
    /// A well behaved response emits [`ModelResponseEvent::Completed`] right
    /// before it returns `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// Why the model stopped generating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The model is waiting for the results of the tools it called.
    ToolCalls,
    /// The answer is complete.
    Stop,
}

impl ModelFinishReason {
    /// The reason for an answer that requested `tool_calls` calls. Neither
    /// Gemini nor Ollama report tool calls as a finish reason of their own.
    #[inline]
    pub fn after_tool_calls(tool_calls: usize) -> Self {
        if tool_calls > 0 {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        }
    }
}

/// A tool call the model asked for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Identifies the call within the response. Providers that don't send
    /// ids get generated ones like `call_0`.
    pub id: String,
    /// Name of the tool.
    pub name: String,
    /// The arguments, as decoded JSON.
    pub arguments: Value,
}

/// One step of a streamed answer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// The answer is over.
    Completed(ModelFinishReason),
    /// More text of the answer.
    MessageDelta(String),
    /// A complete tool call.
    ToolCall(ToolCallRequest),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_after_tool_calls() {
        assert_eq!(
            ModelFinishReason::after_tool_calls(2),
            ModelFinishReason::ToolCalls
        );
        assert_eq!(ModelFinishReason::after_tool_calls(0), ModelFinishReason::Stop);
    }
}
