//! Answer synthesis.
//!
//! Packs retrieved chunks into a bounded prompt and asks the language model,
//! retrying transient failures. Every failure becomes a marked fallback answer
//! so one question never aborts the others.

use std::sync::Arc;

use docqa_core::config::{AppConfig, LlmSettings};
use docqa_core::{AppError, AppResult};
use docqa_llm::{LlmClient, LlmRequest};
use docqa_prompt::{build_bounded_prompt, BuiltPrompt, PromptDefinition};
use tracing::instrument;

use crate::retry::RetryPolicy;
use crate::types::{Answer, FallbackReason, ScoredChunk};

/// Turns a question and its retrieved chunks into an answer.
pub struct AnswerSynthesizer {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    prompt: PromptDefinition,
    max_prompt_chars: usize,
    retry: RetryPolicy,
}

impl AnswerSynthesizer {
    pub fn new(
        client: Arc<dyn LlmClient>,
        llm: &LlmSettings,
        prompt: PromptDefinition,
        max_prompt_chars: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            model: llm.model.clone(),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            prompt,
            max_prompt_chars,
            retry,
        }
    }

    /// Synthesizer with the configured answer prompt (built-in unless
    /// `llm.promptFile` is set) and the configured limits.
    pub fn from_config(client: Arc<dyn LlmClient>, config: &AppConfig) -> AppResult<Self> {
        let prompt = match &config.llm.prompt_file {
            Some(path) => docqa_prompt::load_prompt(path)?,
            None => docqa_prompt::default_answer_prompt()?,
        };

        Ok(Self::new(
            client,
            &config.llm,
            prompt,
            config.pipeline.max_prompt_chars,
            RetryPolicy::from(&config.retry),
        ))
    }

    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    /// Build the prompt for `question` from `retrieved`, best chunk first.
    pub fn build_prompt(&self, question: &str, retrieved: &[ScoredChunk]) -> AppResult<BuiltPrompt> {
        let passages: Vec<String> = retrieved.iter().map(|s| s.chunk.text.clone()).collect();
        build_bounded_prompt(&self.prompt, question, &passages, self.max_prompt_chars)
    }

    /// Answer `question` from `retrieved`. Never fails: errors become fallbacks.
    #[instrument(skip(self, retrieved), fields(chunks = retrieved.len(), provider = %self.client.provider_name()))]
    pub async fn answer(&self, question: &str, retrieved: &[ScoredChunk]) -> Answer {
        let built = match self.build_prompt(question, retrieved) {
            Ok(built) => built,
            Err(e) => {
                tracing::warn!("Could not build prompt: {}", e);
                return Answer::fallback(question, FallbackReason::PromptTooLarge, None, 0);
            }
        };

        tracing::debug!(
            context_chunks = built.metadata.context_chunks,
            truncated_chunks = built.metadata.truncated_chunks,
            chars = built.metadata.char_count,
            "Built answer prompt"
        );

        let mut request = LlmRequest::new(built.user, self.model.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let outcome = self.retry.retry(|| self.client.complete(&request)).await;

        match outcome.result {
            Ok(response) => {
                let text = response.content.trim();
                if text.is_empty() {
                    tracing::warn!("Language model returned an empty answer");
                    Answer::fallback(
                        question,
                        FallbackReason::Rejected,
                        Some("empty response"),
                        outcome.attempts,
                    )
                } else {
                    Answer::answered(question, text, outcome.attempts)
                }
            }
            Err(e) => fallback_for(question, &e, outcome.attempts),
        }
    }
}

fn fallback_for(question: &str, error: &AppError, attempts: u32) -> Answer {
    if error.is_retryable() {
        tracing::warn!(attempts, "Giving up after transient failures: {}", error);
        let detail = format!("{} attempts", attempts);
        Answer::fallback(question, FallbackReason::Exhausted, Some(&detail), attempts)
    } else {
        tracing::warn!("Language model rejected the request: {}", error);
        Answer::fallback(question, FallbackReason::Rejected, None, attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Chunk;
    use async_trait::async_trait;
    use docqa_llm::{LlmResponse, LlmUsage};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails `failures` times with `error`, then echoes the prompt.
    struct FlakyLlm {
        failures: u32,
        error: fn() -> AppError,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for FlakyLlm {
        fn provider_name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err((self.error)());
            }
            Ok(LlmResponse {
                content: request.prompt.clone(),
                model: request.model.clone(),
                usage: LlmUsage::default(),
            })
        }
    }

    fn synthesizer(llm: Arc<FlakyLlm>, max_prompt_chars: usize) -> AnswerSynthesizer {
        AnswerSynthesizer::new(
            llm,
            &LlmSettings::default(),
            docqa_prompt::default_answer_prompt().unwrap(),
            max_prompt_chars,
            RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2)),
        )
    }

    fn flaky(failures: u32, error: fn() -> AppError) -> Arc<FlakyLlm> {
        Arc::new(FlakyLlm {
            failures,
            error,
            calls: AtomicU32::new(0),
        })
    }

    fn retrieved(text: &str) -> Vec<ScoredChunk> {
        vec![ScoredChunk {
            chunk: Chunk {
                index: 0,
                text: text.to_string(),
                start: 0,
                end: text.chars().count(),
                char_len: text.chars().count(),
            },
            score: 0.9,
        }]
    }

    #[tokio::test]
    async fn test_prompt_contains_retrieved_chunk() {
        let llm = flaky(0, || AppError::LlmTransient("unused".to_string()));
        let answer = synthesizer(llm, 4000)
            .answer("Are cats mammals?", &retrieved("Cats are mammals."))
            .await;

        assert!(!answer.is_fallback());
        assert!(answer.text.contains("Cats are mammals."));
        assert!(answer.text.contains("Are cats mammals?"));
        assert_eq!(answer.attempts, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let llm = flaky(2, || AppError::LlmTransient("503".to_string()));
        let answer = synthesizer(llm.clone(), 4000)
            .answer("q?", &retrieved("text"))
            .await;

        assert!(!answer.is_fallback());
        assert_eq!(answer.attempts, 3);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_gives_fallback() {
        let llm = flaky(u32::MAX, || AppError::LlmTransient("429".to_string()));
        let answer = synthesizer(llm, 4000).answer("q?", &retrieved("text")).await;

        assert_eq!(answer.fallback_reason(), Some(FallbackReason::Exhausted));
        assert!(answer.text.contains("3 attempts"));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let llm = flaky(u32::MAX, || AppError::LlmRejected("safety".to_string()));
        let answer = synthesizer(llm.clone(), 4000)
            .answer("q?", &retrieved("text"))
            .await;

        assert_eq!(answer.fallback_reason(), Some(FallbackReason::Rejected));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prompt_file_replaces_builtin_prompt() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("answer.yml");
        std::fs::write(
            &path,
            "id: custom.answer\ntitle: Custom\napiVersion: \"1.0\"\ntemplate: \"CTX {{context}} Q {{question}}\"\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.llm.prompt_file = Some(path);
        let llm = flaky(0, || AppError::LlmTransient("unused".to_string()));
        let synthesizer = AnswerSynthesizer::from_config(llm, &config).unwrap();

        let built = synthesizer.build_prompt("q?", &retrieved("text")).unwrap();
        assert_eq!(built.metadata.source_prompt_id, "custom.answer");
        assert_eq!(built.user, "CTX [Passage 1]\ntext Q q?");
        assert!(built.system.is_none());
    }

    #[test]
    fn test_missing_prompt_file_is_an_error() {
        let mut config = AppConfig::default();
        config.llm.prompt_file = Some("/nonexistent/answer.yml".into());
        let llm = flaky(0, || AppError::LlmTransient("unused".to_string()));
        assert!(matches!(
            AnswerSynthesizer::from_config(llm, &config),
            Err(AppError::Prompt(_))
        ));
    }

    #[test]
    fn test_system_and_user_messages_share_budget() {
        let llm = flaky(0, || AppError::LlmTransient("unused".to_string()));
        let long_chunk = "w".repeat(1000);
        let built = synthesizer(llm, 400)
            .build_prompt("q?", &retrieved(&long_chunk))
            .unwrap();

        let system_len = built.system.as_deref().map_or(0, |s| s.chars().count());
        assert!(system_len > 0);
        assert!(system_len + built.user.chars().count() <= 400);
        assert_eq!(built.metadata.truncated_chunks, 1);
    }

    #[tokio::test]
    async fn test_prompt_budget_too_small() {
        let llm = flaky(0, || AppError::LlmTransient("unused".to_string()));
        let answer = synthesizer(llm.clone(), 10).answer("q?", &retrieved("text")).await;

        assert_eq!(answer.fallback_reason(), Some(FallbackReason::PromptTooLarge));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }
}
