//! LLM provider factory.
//!
//! Creates an LLM client from the application's language-model settings.

use std::sync::Arc;
use std::time::Duration;

use crate::client::LlmClient;
use crate::providers::{GeminiClient, OllamaClient, DEFAULT_GEMINI_URL, DEFAULT_OLLAMA_URL};
use crate::types::ProviderType;
use docqa_core::config::LlmSettings;
use docqa_core::{AppError, AppResult};

/// Create an LLM client based on the configured provider.
///
/// # Arguments
/// * `settings` - Provider, endpoint and timeout settings
/// * `api_key` - API key (required by Gemini, ignored by Ollama)
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or a required
/// secret is missing.
pub fn create_client(
    settings: &LlmSettings,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn LlmClient>> {
    let provider = ProviderType::parse(&settings.provider)
        .ok_or_else(|| AppError::Config(format!("Unknown provider: {}", settings.provider)))?;
    let timeout = Duration::from_secs(settings.timeout_secs);

    if provider.requires_api_key() && api_key.is_none() {
        return Err(AppError::Config(format!(
            "{} provider requires API key",
            provider.as_str()
        )));
    }

    match provider {
        ProviderType::Ollama => {
            let base_url = settings
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_OLLAMA_URL);
            Ok(Arc::new(OllamaClient::with_timeout(base_url, timeout)?))
        }
        ProviderType::Gemini => {
            let api_key = api_key.unwrap_or_default();
            let base_url = settings
                .endpoint
                .as_deref()
                .unwrap_or(DEFAULT_GEMINI_URL);
            Ok(Arc::new(GeminiClient::with_config(base_url, api_key, timeout)?))
        }
    }
}
