use std::fmt::{self, Debug};

/// Models that are known to work with the travel agent.
pub const ALLOWED_MODELS: &[&str] = &[
    "gemini-flash-latest",
    "gemini-pro-latest",
    "gemini-2.5-flash",
    "gemini-2.5-pro",
];

/// The model used when none (or an unsupported one) is configured.
pub const DEFAULT_MODEL: &str = "gemini-flash-latest";

const DEFAULT_BASE_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta";

/// Maps a requested model name to a supported one.
///
/// Unsupported names fall back to [`DEFAULT_MODEL`] instead of failing,
/// so a typo in the environment doesn't prevent the agent from starting.
pub fn resolve_model(requested: &str) -> &'static str {
    let requested = requested.trim();
    ALLOWED_MODELS
        .iter()
        .copied()
        .find(|m| *m == requested)
        .unwrap_or(DEFAULT_MODEL)
}

/// Builder for [`GeminiConfig`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GeminiConfigBuilder {
    api_key: String,
    model: Option<String>,
    base_url: Option<String>,
}

impl GeminiConfigBuilder {
    /// Creates a builder with the given API key.
    #[inline]
    pub fn with_api_key<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_key: api_key.into(),
            model: None,
            base_url: None,
        }
    }

    /// Sets the model to use. See [`resolve_model`] for how unsupported
    /// names are handled.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a custom base URL.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> GeminiConfig {
        let model = match self.model.as_deref() {
            Some(requested) => {
                let resolved = resolve_model(requested);
                if resolved != requested {
                    warn!(
                        "model `{requested}` is not supported, using `{resolved}`"
                    );
                }
                resolved
            }
            None => DEFAULT_MODEL,
        };
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        GeminiConfig {
            api_key: self.api_key,
            model: model.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }
}

impl Debug for GeminiConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfigBuilder")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Configuration for the Gemini provider.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct GeminiConfig {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
}

impl GeminiConfig {
    /// Returns the resolved model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}
