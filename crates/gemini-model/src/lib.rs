//! A model provider for Google Gemini (Generative Language API).

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use reqwest::{Client, Response, StatusCode, Url, header};
use travel_agent_model::{
    ErrorKind, ModelProvider, ModelProviderError, ModelRequest,
};

pub use config::{
    ALLOWED_MODELS, DEFAULT_MODEL, GeminiConfig, GeminiConfigBuilder,
    resolve_model,
};
use io::{Chunks, Sse};
pub use proto::ModelInfo;
use proto::{ErrorEnvelope, ListModelsResponse};
pub use response::GeminiResponse;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Error type for [`GeminiProvider`].
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

/// Gemini model provider.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: Client,
    config: Arc<GeminiConfig>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` with the given configuration.
    #[inline]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this provider.
    #[inline]
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    /// Lists the models that are available to the configured API key.
    ///
    /// This is a cheap way to verify that the key works.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, Error> {
        let mut models = vec![];
        let mut page_token: Option<String> = None;
        loop {
            let url =
                list_models_url(&self.config.base_url, page_token.as_deref())?;
            let resp = self
                .client
                .get(url)
                .header(API_KEY_HEADER, &self.config.api_key)
                .send()
                .await
                .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
            let resp = check_status(resp).await?;
            let page: ListModelsResponse = resp
                .json()
                .await
                .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
            models.extend(page.models);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(models)
    }
}

fn list_models_url(
    base_url: &str,
    page_token: Option<&str>,
) -> Result<Url, Error> {
    let mut params = vec![("pageSize", "100")];
    if let Some(token) = page_token {
        params.push(("pageToken", token));
    }
    Url::parse_with_params(&format!("{base_url}/models"), &params)
        .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))
}

impl ModelProvider for GeminiProvider {
    type Error = Error;
    type Response = GeminiResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let gemini_req = proto::create_request(req);
        let resp_fut = self
            .client
            .post(format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.config.base_url, self.config.model
            ))
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(header::ACCEPT, "text/event-stream")
            .json(&gemini_req)
            .send();

        async move {
            let resp = resp_fut
                .await
                .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
            let resp = check_status(resp).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| m.subtype().as_str() == "event-stream")
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("Unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            // Here we got a successful response.
            let chunks = Chunks::from_response(resp);
            let sse = Sse::new(chunks);
            Ok(GeminiResponse::from_sse(sse))
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
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| match envelope.error.status {
            Some(code) => format!("{code}: {}", envelope.error.message),
            None => envelope.error.message,
        })
        .unwrap_or_else(|_| body.trim().to_owned());
    let kind = if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorKind::RateLimitExceeded
    } else if status.is_server_error() {
        ErrorKind::Unavailable
    } else {
        ErrorKind::Other
    };
    Error::new(format!("Gemini returned {status}: {message}"), kind)
}
