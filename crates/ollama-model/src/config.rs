/// The model used when none is configured.
pub const DEFAULT_MODEL: &str = "llama3.1";

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Builder for [`OllamaConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct OllamaConfigBuilder {
    model: Option<String>,
    base_url: Option<String>,
}

impl OllamaConfigBuilder {
    /// Creates a builder with default settings.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model to use.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets a custom base URL, the default is the local daemon.
    #[inline]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Builds the configuration.
    #[inline]
    pub fn build(self) -> OllamaConfig {
        OllamaConfig {
            model: self
                .model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_owned(),
        }
    }
}

/// Configuration for the Ollama provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OllamaConfig {
    pub(crate) model: String,
    pub(crate) base_url: String,
}

impl OllamaConfig {
    /// Returns the model name.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}
