//! Embedding provider trait and factory.

use docqa_core::config::EmbeddingSettings;
use docqa_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for semantic embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "ollama")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in a batch.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text (convenience method).
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::EmbeddingUnavailable("No embedding returned".to_string()))
    }
}

/// Create a semantic embedding provider based on configuration.
///
/// Fails with `AppError::EmbeddingUnavailable` when the provider cannot be
/// reached, so callers can fall back to lexical embeddings.
pub async fn create_provider(settings: &EmbeddingSettings) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "ollama" => {
            let provider = super::providers::ollama::OllamaProvider::new(settings).await?;
            Ok(Arc::new(provider))
        }

        "lexical" => Err(AppError::EmbeddingUnavailable(
            "Lexical embeddings have no semantic provider".to_string(),
        )),

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: ollama, lexical",
            settings.provider
        ))),
    }
}
