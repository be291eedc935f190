use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use travel_agent_model::{
    ErrorKind, ModelFinishReason, ModelResponse, ModelResponseEvent,
    ToolCallRequest,
};

use crate::Error;
use crate::io::{Sse, SseError};
use crate::proto::GenerateContentResponse;

struct PartialState {
    sse: Sse,
    // Events decoded from a chunk but not yet handed to the caller. One
    // chunk may carry several text and function call parts.
    pending_events: VecDeque<ModelResponseEvent>,
    tool_call_count: usize,
    completed: bool,
}

impl PartialState {
    fn finish_reason(&self) -> ModelFinishReason {
        ModelFinishReason::after_tool_calls(self.tool_call_count)
    }

    fn complete(&mut self) {
        if !self.completed {
            self.completed = true;
            let reason = self.finish_reason();
            self.pending_events
                .push_back(ModelResponseEvent::Completed(reason));
        }
    }

    fn apply_chunk(&mut self, chunk: GenerateContentResponse) -> Result<(), Error> {
        if let Some(reason) = chunk
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(Error::new(
                format!("prompt blocked: {reason}"),
                ErrorKind::Moderated,
            ));
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return Ok(());
        };
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if part.thought == Some(true) {
                continue;
            }
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                self.pending_events
                    .push_back(ModelResponseEvent::MessageDelta(text));
            }
            if let Some(call) = part.function_call {
                let id = call
                    .id
                    .unwrap_or_else(|| format!("call_{}", self.tool_call_count));
                self.tool_call_count += 1;
                self.pending_events.push_back(ModelResponseEvent::ToolCall(
                    ToolCallRequest {
                        id,
                        name: call.name,
                        arguments: call.args,
                    },
                ));
            }
        }

        match candidate.finish_reason.as_deref() {
            None | Some("FINISH_REASON_UNSPECIFIED") => {}
            Some("STOP") | Some("MAX_TOKENS") => self.complete(),
            Some(
                reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST"
                | "PROHIBITED_CONTENT" | "SPII"),
            ) => {
                return Err(Error::new(
                    format!("response blocked: {reason}"),
                    ErrorKind::Moderated,
                ));
            }
            Some(reason) => {
                return Err(Error::new(
                    format!("generation stopped: {reason}"),
                    ErrorKind::Other,
                ));
            }
        }
        Ok(())
    }
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    pub struct GeminiResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl GeminiResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            pending_events: Default::default(),
            tool_call_count: 0,
            completed: false,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(partial_state))),
        }
    }
}

impl ModelResponse for GeminiResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        *this.next_event_fut = Some(Box::pin(next_event(partial_state)));
        Poll::Ready(Ok(Some(event)))
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

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                // Some proxies drop the final chunk carrying the finish
                // reason, treat a clean end of stream as completion.
                partial_state.complete();
                continue;
            }
            Err(err) => return Err(stream_error(err)),
        };
        trace!("got sse event: {sse_event}");

        let chunk = serde_json::from_str::<GenerateContentResponse>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        partial_state.apply_chunk(chunk)?;
    }
}

fn stream_error(err: SseError) -> Error {
    match err {
        // The retry will start the answer over.
        SseError::ChunksError(err) if err.is_transient() => {
            Error::new(err.message(), ErrorKind::Unavailable)
        }
        SseError::ChunksError(err) => Error::new(err.message(), ErrorKind::Other),
        SseError::InvalidPayload => {
            Error::new("the event stream is not valid UTF-8", ErrorKind::Other)
        }
    }
}
