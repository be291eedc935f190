//! Picks the model provider described by the settings.

use travel_agent_core::ModelClient;
use travel_agent_gemini_model::{GeminiConfigBuilder, GeminiProvider};
use travel_agent_ollama_model::{OllamaConfigBuilder, OllamaProvider};

use crate::settings::{ProviderKind, Settings, SettingsError};

/// Creates the Gemini provider, regardless of the selected provider.
pub fn gemini_provider(
    settings: &Settings,
) -> Result<GeminiProvider, SettingsError> {
    let mut config = GeminiConfigBuilder::with_api_key(settings.google_api_key()?);
    if let Some(model) = &settings.model {
        config = config.with_model(model);
    }
    Ok(GeminiProvider::new(config.build()))
}

/// Creates the Ollama provider, regardless of the selected provider.
pub fn ollama_provider(settings: &Settings) -> OllamaProvider {
    let mut config = OllamaConfigBuilder::new();
    if let Some(model) = &settings.ollama_model {
        config = config.with_model(model);
    }
    if let Some(base_url) = &settings.ollama_base_url {
        config = config.with_base_url(base_url);
    }
    OllamaProvider::new(config.build())
}

/// Creates a client for the selected provider.
pub fn model_client(settings: &Settings) -> Result<ModelClient, SettingsError> {
    let client = match settings.provider {
        ProviderKind::Gemini => {
            let provider = gemini_provider(settings)?;
            debug!("using gemini model {}", provider.config().model());
            ModelClient::new(provider)
        }
        ProviderKind::Ollama => {
            let provider = ollama_provider(settings);
            debug!("using ollama model {}", provider.config().model());
            ModelClient::new(provider)
        }
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_requires_key() {
        let settings = Settings::default();
        assert!(matches!(
            model_client(&settings),
            Err(SettingsError::MissingGoogleApiKey)
        ));

        let settings = Settings {
            google_api_key: Some("key".to_owned()),
            model: Some("gemini-1.0-ultra".to_owned()),
            ..Default::default()
        };
        let provider = gemini_provider(&settings).unwrap();
        assert_eq!(provider.config().model(), "gemini-flash-latest");
        assert!(model_client(&settings).is_ok());
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let settings = Settings {
            provider: ProviderKind::Ollama,
            ollama_model: Some("qwen2.5".to_owned()),
            ..Default::default()
        };
        assert!(model_client(&settings).is_ok());
        assert_eq!(ollama_provider(&settings).config().model(), "qwen2.5");
    }
}
