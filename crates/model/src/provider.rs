use crate::error::ModelProviderError;
use crate::request::ModelRequest;
use crate::response::ModelResponse;

/// An LLM backend the agent can send requests to.
///
/// Providers are treated as stateless: the agent may clone the request,
/// send it again after a transient error, or drop the provider at any time.
/// Connection pools and similar caches are fine as long as nothing depends
/// on them.
pub trait ModelProvider: Send + Sync {
    /// Error returned by the provider and its responses.
    type Error: ModelProviderError;

    /// The streaming response of this provider.
    type Response: ModelResponse<Error = Self::Error>;

    /// Starts a request.
    ///
    /// The returned future resolves once the backend accepted the request,
    /// the answer itself streams through the response. It must not borrow
    /// from `self` or `req`.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;
}
