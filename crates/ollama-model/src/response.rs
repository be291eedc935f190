use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use travel_agent_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};

use crate::Error;
use crate::io::{JsonLines, LinesError};
use crate::proto::ChatChunk;

struct PartialState {
    lines: JsonLines,
    pending_events: VecDeque<ModelResponseEvent>,
    tool_call_count: usize,
    completed: bool,
}

impl PartialState {
    fn complete(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let reason = ModelFinishReason::after_tool_calls(self.tool_call_count);
        self.pending_events
            .push_back(ModelResponseEvent::Completed(reason));
    }

    fn apply_chunk(&mut self, chunk: ChatChunk) -> Result<(), Error> {
        if let Some(error) = chunk.error {
            return Err(crate::error_from_message(error, ErrorKind::Other));
        }
        if let Some(message) = chunk.message {
            if !message.content.is_empty() {
                self.pending_events
                    .push_back(ModelResponseEvent::MessageDelta(message.content));
            }
            // Ollama doesn't assign ids to tool calls.
            for call in message.tool_calls {
                let id = format!("call_{}", self.tool_call_count);
                self.tool_call_count += 1;
                self.pending_events.push_back(ModelResponseEvent::ToolCall(
                    ToolCallRequest {
                        id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                    },
                ));
            }
        }
        if chunk.done {
            trace!("done reason: {:?}", chunk.done_reason);
            self.complete();
        }
        Ok(())
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct OllamaResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OllamaResponse {
    #[inline]
    pub fn from_lines(lines: JsonLines) -> Self {
        let partial_state = PartialState {
            lines,
            pending_events: Default::default(),
            tool_call_count: 0,
            completed: false,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(partial_state))),
        }
    }
}

impl ModelResponse for OllamaResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        match ready!(next_event_fut.as_mut().poll(cx)) {
            Ok((Some(event), partial_state)) => {
                *this.next_event_fut = Some(Box::pin(next_event(partial_state)));
                Poll::Ready(Ok(Some(event)))
            }
            Ok((None, _)) => {
                *this.next_event_fut = None;
                Poll::Ready(Ok(None))
            }
            Err(err) => {
                *this.next_event_fut = None;
                Poll::Ready(Err(err))
            }
        }
    }
}

async fn next_event(mut partial_state: PartialState) -> NextEvent {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }
        if partial_state.completed {
            return Ok((None, partial_state));
        }

        let line = match partial_state.lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                return Err(Error::new(
                    "stream ended before the response was done",
                    ErrorKind::Other,
                ));
            }
            Err(LinesError::ChunksError(err)) => {
                let kind = if err.is_disconnect() {
                    ErrorKind::Unavailable
                } else {
                    ErrorKind::Other
                };
                return Err(Error::new(err.message(), kind));
            }
            Err(LinesError::InvalidPayload) => {
                return Err(Error::new(
                    "the response is not valid UTF-8",
                    ErrorKind::Other,
                ));
            }
        };
        trace!("got line: {line}");

        let chunk = serde_json::from_str::<ChatChunk>(&line)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        partial_state.apply_chunk(chunk)?;
    }
}
