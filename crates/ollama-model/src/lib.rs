//! A model provider for a local or remote Ollama daemon.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use reqwest::{Client, Response, StatusCode};
use travel_agent_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};

pub use config::{DEFAULT_MODEL, OllamaConfig, OllamaConfigBuilder};
use io::{Chunks, JsonLines};
use proto::ErrorBody;
pub use response::OllamaResponse;

/// Error type for [`OllamaProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Ollama model provider.
#[derive(Clone, Debug)]
pub struct OllamaProvider {
    client: Client,
    config: Arc<OllamaConfig>,
}

impl OllamaProvider {
    /// Creates a new `OllamaProvider` with the given configuration.
    #[inline]
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this provider.
    #[inline]
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }
}

impl ModelProvider for OllamaProvider {
    type Error = Error;
    type Response = OllamaResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let ollama_req = proto::create_request(req, &self.config.model);
        let resp_fut = self
            .client
            .post(format!("{}/api/chat", self.config.base_url))
            .json(&ollama_req)
            .send();

        async move {
            let resp = resp_fut.await.map_err(|err| {
                // A refused connection usually means the daemon isn't running.
                let kind = if err.is_connect() {
                    ErrorKind::Unavailable
                } else {
                    ErrorKind::Other
                };
                Error::new(format!("{err}"), kind)
            })?;
            let resp = check_status(resp).await?;

            let chunks = Chunks::from_response(resp);
            Ok(OllamaResponse::from_lines(JsonLines::new(chunks)))
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(error_from_status(status, &body))
}

fn error_from_status(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|body| body.error)
        .unwrap_or_else(|_| body.trim().to_owned());
    let kind = if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorKind::RateLimitExceeded
    } else if status.is_server_error() {
        ErrorKind::Unavailable
    } else {
        ErrorKind::Other
    };
    error_from_message(format!("Ollama returned {status}: {message}"), kind)
}

/// Builds an error, recognizing models that can't take a tool list.
pub(crate) fn error_from_message(message: String, kind: ErrorKind) -> Error {
    let kind = if message.contains("does not support tools") {
        ErrorKind::ToolsUnsupported
    } else {
        kind
    };
    Error::new(message, kind)
}
