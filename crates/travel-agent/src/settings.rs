//! Runtime configuration from the environment.

use std::env;
use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use thiserror::Error;
use travel_agent_gemini_model::resolve_model;

/// Errors in the runtime configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Gemini is selected but no key is configured.
    #[error(
        "GOOGLE_API_KEY is missing. Set it in your environment to use Gemini."
    )]
    MissingGoogleApiKey,
    /// `LLM_PROVIDER` names a provider that doesn't exist.
    #[error("unknown LLM provider `{0}`, expected `gemini` or `ollama`")]
    UnknownProvider(String),
}

/// Which model backend answers the requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Google Gemini.
    #[default]
    Gemini,
    /// A local Ollama daemon.
    Ollama,
}

impl FromStr for ProviderKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "ollama" => Ok(ProviderKind::Ollama),
            _ => Err(SettingsError::UnknownProvider(s.to_owned())),
        }
    }
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Gemini => f.write_str("gemini"),
            ProviderKind::Ollama => f.write_str("ollama"),
        }
    }
}

/// SendGrid credentials and the envelope of the trip email.
#[derive(Clone, PartialEq, Eq)]
pub struct EmailSettings {
    /// SendGrid API key.
    pub api_key: String,
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
}

impl Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("api_key", &"<redacted>")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("subject", &self.subject)
            .finish()
    }
}

/// Runtime configuration, read from the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// The model backend.
    pub provider: ProviderKind,
    /// Key for the Gemini API.
    pub google_api_key: Option<String>,
    /// Requested Gemini model, see [`resolve_model`].
    pub model: Option<String>,
    /// Base URL of the Ollama daemon.
    pub ollama_base_url: Option<String>,
    /// Ollama model name.
    pub ollama_model: Option<String>,
    /// Key for SerpApi, used by the flight and hotel tools.
    pub serpapi_api_key: Option<String>,
    /// Enabled only when all four email variables are set.
    pub email: Option<EmailSettings>,
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        if let Err(err) = dotenv::dotenv() {
            trace!("no .env loaded: {err}");
        }
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Reads the settings through `get`. Empty values count as unset.
    pub fn from_vars<F>(get: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            get(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let provider = match get("LLM_PROVIDER") {
            Some(provider) => provider.parse()?,
            None => ProviderKind::default(),
        };
        let email = match (
            get("SENDGRID_API_KEY"),
            get("FROM_EMAIL"),
            get("TO_EMAIL"),
            get("EMAIL_SUBJECT"),
        ) {
            (Some(api_key), Some(from), Some(to), Some(subject)) => {
                Some(EmailSettings {
                    api_key,
                    from,
                    to,
                    subject,
                })
            }
            (None, None, None, None) => None,
            _ => {
                warn!("email settings are incomplete, the email step is off");
                None
            }
        };

        Ok(Self {
            provider,
            google_api_key: get("GOOGLE_API_KEY"),
            model: get("LLM_MODEL"),
            ollama_base_url: get("OLLAMA_BASE_URL"),
            ollama_model: get("OLLAMA_MODEL"),
            serpapi_api_key: get("SERPAPI_API_KEY"),
            email,
        })
    }

    /// Returns the Gemini key, or an error if it isn't set.
    #[inline]
    pub fn google_api_key(&self) -> Result<&str, SettingsError> {
        self.google_api_key
            .as_deref()
            .ok_or(SettingsError::MissingGoogleApiKey)
    }

    /// The model that will actually be used for the selected provider.
    pub fn resolved_model(&self) -> String {
        match self.provider {
            ProviderKind::Gemini => resolve_model(
                self.model
                    .as_deref()
                    .unwrap_or(travel_agent_gemini_model::DEFAULT_MODEL),
            )
            .to_owned(),
            ProviderKind::Ollama => self
                .ollama_model
                .clone()
                .unwrap_or_else(|| {
                    travel_agent_ollama_model::DEFAULT_MODEL.to_owned()
                }),
        }
    }

    /// A display name like `Gemini (gemini-flash-latest)`.
    pub fn active_model_name(&self) -> String {
        let provider = match self.provider {
            ProviderKind::Gemini => "Gemini",
            ProviderKind::Ollama => "Ollama",
        };
        format!("{provider} ({})", self.resolved_model())
    }
}

impl Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Settings")
            .field("provider", &self.provider)
            .field("google_api_key", &redact(&self.google_api_key))
            .field("model", &self.model)
            .field("ollama_base_url", &self.ollama_base_url)
            .field("ollama_model", &self.ollama_model)
            .field("serpapi_api_key", &redact(&self.serpapi_api_key))
            .field("email", &self.email)
            .finish()
    }
}
