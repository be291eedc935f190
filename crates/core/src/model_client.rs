use std::future::poll_fn;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use tracing::Instrument;
use travel_agent_model::{
    AssistantMessage, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, ToolCallRequest,
};

type SendRequestResult =
    Result<ModelClientResponse, Box<dyn ModelProviderError>>;
type BoxedSendRequestFuture =
    Pin<Box<dyn Future<Output = SendRequestResult> + Send>>;
type OnDelta = Arc<dyn Fn(String) + Send + Sync>;
#[rustfmt::skip]
type HandlerFn = Arc<
    dyn Fn(ModelRequest, OnDelta) -> BoxedSendRequestFuture + Send + Sync
>;

/// How transient model errors are retried.
///
/// Only errors whose kind is transient (rate limits and unavailable
/// services) are retried, with exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Total time after which the last error is returned.
    pub max_elapsed_time: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_elapsed_time: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn make_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_elapsed_time(Some(self.max_elapsed_time))
            .build()
    }
}

/// A wrapper around a model provider that provides a type-erased,
/// retrying interface for the other modules.
#[derive(Clone)]
pub struct ModelClient {
    handler_fn: HandlerFn,
    retry_policy: RetryPolicy,
}

impl ModelClient {
    /// Wraps a model provider.
    #[inline]
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let handler_fn: HandlerFn = Arc::new(move |req, on_delta| {
            let fut = provider.send_request(&req);
            Box::pin(
                async move {
                    trace!("got a request: {:?}", req);
                    let resp_or_err = fut.await;
                    handle_response::<P>(resp_or_err, on_delta).await
                }
                .instrument(trace_span!("model client req")),
            )
        });
        Self {
            handler_fn,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sends a request and returns the fully received response.
    ///
    /// `on_delta` is called with every text fragment as it streams in. When
    /// an attempt fails halfway and is retried, fragments of the failed
    /// attempt have already been delivered.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when this operation is cancelled.
    pub async fn send_request(
        &self,
        req: ModelRequest,
        on_delta: impl Fn(String) + Send + Sync + 'static,
    ) -> SendRequestResult {
        let on_delta: OnDelta = Arc::new(on_delta);
        let operation = || {
            let fut = (self.handler_fn)(req.clone(), Arc::clone(&on_delta));
            async move {
                fut.await.map_err(|err| {
                    if err.is_transient() {
                        warn!("transient model error, will retry: {err}");
                        backoff::Error::transient(err)
                    } else {
                        backoff::Error::permanent(err)
                    }
                })
            }
        };
        backoff::future::retry(self.retry_policy.make_backoff(), operation)
            .await
    }
}

/// A completely received response from the model client.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelClientResponse {
    /// Concatenated text of the response.
    pub transcript: String,
    /// Tool calls requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// The reason the model finished generating.
    pub finish_reason: Option<ModelFinishReason>,
}

impl ModelClientResponse {
    /// Converts the response into a message that can be put in the history.
    #[inline]
    pub fn into_message(self) -> AssistantMessage {
        AssistantMessage {
            content: self.transcript,
            tool_calls: self.tool_calls,
        }
    }
}

async fn handle_response<P: ModelProvider + 'static>(
    resp_or_err: Result<P::Response, P::Error>,
    on_delta: OnDelta,
) -> SendRequestResult {
    let resp = match resp_or_err {
        Ok(resp) => resp,
        Err(err) => {
            error!("got an error: {err:?}");
            return Err(Box::new(err));
        }
    };

    let mut response = ModelClientResponse::default();

    trace!("start receiving events");

    let mut pinned_resp = pin!(resp);
    loop {
        let event_or_err =
            poll_fn(|cx| pinned_resp.as_mut().poll_next_event(cx)).await;
        let event = match event_or_err {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(err) => {
                error!("got an error: {err:?}");
                return Err(Box::new(err));
            }
        };
        trace!("got an event: {event:?}");

        match event {
            ModelResponseEvent::MessageDelta(msg) => {
                response.transcript.push_str(&msg);
                on_delta(msg);
            }
            ModelResponseEvent::ToolCall(req) => {
                response.tool_calls.push(req);
            }
            ModelResponseEvent::Completed(reason) => {
                response.finish_reason = Some(reason);
            }
        }
    }

    trace!("finished a request");

    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use travel_agent_model::{ErrorKind, ModelMessage};
    use travel_agent_test_model::{
        PresetEvent, PresetResponse, TestModelProvider,
    };

    use super::*;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            initial_interval: Duration::from_millis(1),
            max_elapsed_time: Duration::from_millis(200),
        }
    }

    fn user_request(text: &str) -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User(text.to_owned())],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_events([
            PresetEvent::MessageDelta("Checking ".to_owned()),
            PresetEvent::MessageDelta("hotels.".to_owned()),
            PresetEvent::ToolCall(ToolCallRequest {
                id: "call_0".to_owned(),
                name: "hotels_finder".to_owned(),
                arguments: json!({ "params": { "q": "Rome" } }),
            }),
        ]));

        let model_client = ModelClient::new(model_provider);
        let deltas = Arc::new(AtomicUsize::new(0));
        let resp = model_client
            .send_request(user_request("Hotels in Rome"), {
                let deltas = Arc::clone(&deltas);
                move |_| {
                    deltas.fetch_add(1, Ordering::Relaxed);
                }
            })
            .await
            .unwrap();

        assert_eq!(resp.transcript, "Checking hotels.");
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.finish_reason, Some(ModelFinishReason::ToolCalls));
        assert_eq!(deltas.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_retry_rate_limit() {
        let mut model_provider = TestModelProvider::default();
        model_provider
            .add_response(PresetResponse::with_text("Ciao").with_failures(2));

        let model_client = ModelClient::new(model_provider.clone())
            .with_retry_policy(fast_retry());
        let resp = model_client
            .send_request(user_request("Hi"), |_| {})
            .await
            .unwrap();

        assert_eq!(resp.transcript, "Ciao");
        assert_eq!(model_provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let mut model_provider = TestModelProvider::default();
        model_provider
            .add_response(PresetResponse::with_text("never").with_failures(0));

        let model_client = ModelClient::new(model_provider.clone())
            .with_retry_policy(fast_retry());
        let err = model_client
            .send_request(user_request("Hi"), |_| {})
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert!(model_provider.requests().len() > 1);
    }

    #[tokio::test]
    async fn test_permanent_error() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider.clone())
            .with_retry_policy(fast_retry());
        let err = model_client
            .send_request(user_request("Hi"), |_| {})
            .await
            .unwrap_err();

        // An exhausted script is not a transient failure.
        assert_eq!(err.kind(), ErrorKind::Other);
        assert_eq!(model_provider.requests().len(), 1);
    }
}
