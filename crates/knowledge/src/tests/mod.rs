//! Cross-module tests and the in-memory doubles they share.

mod pipeline;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docqa_core::config::{CacheSettings, LlmSettings, PipelineSettings};
use docqa_core::{AppError, AppResult};
use docqa_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};

use crate::cache::RetrievalCache;
use crate::chunker::ChunkerConfig;
use crate::embeddings::Embedder;
use crate::indexer::DocumentIndexer;
use crate::parser::{content_type_from_reference, DefaultParser};
use crate::pipeline::QaPipeline;
use crate::retry::RetryPolicy;
use crate::source::{DocumentSource, FetchedDocument};
use crate::synthesizer::AnswerSynthesizer;

pub const ANIMALS: &str = "Cats are mammals. Dogs are mammals too. Fish are not.";

/// Serves documents from memory and counts fetches.
pub struct StaticSource {
    documents: HashMap<String, Vec<u8>>,
    delay: Duration,
    pub fetches: AtomicUsize,
}

impl StaticSource {
    pub fn new() -> Self {
        Self {
            documents: HashMap::new(),
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, reference: &str, text: &str) -> Self {
        self.documents
            .insert(reference.to_string(), text.as_bytes().to_vec());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSource for StaticSource {
    async fn fetch(&self, reference: &str) -> AppResult<FetchedDocument> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let bytes = self
            .documents
            .get(reference)
            .cloned()
            .ok_or_else(|| AppError::Fetch(format!("{} not found", reference)))?;

        Ok(FetchedDocument {
            bytes,
            content_type: Some(
                content_type_from_reference(reference)
                    .unwrap_or("text/plain")
                    .to_string(),
            ),
        })
    }
}

/// Echoes the prompt back, with optional per-question latency and failures.
///
/// Rules match on the `Question: ...` line of the rendered prompt.
pub struct ScriptedLlm {
    failing: Vec<String>,
    delays: Vec<(String, Duration)>,
    pub calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn echo() -> Self {
        Self {
            failing: Vec::new(),
            delays: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fail transiently for `question`.
    pub fn failing_on(mut self, question: &str) -> Self {
        self.failing.push(format!("Question: {}", question));
        self
    }

    pub fn delaying(mut self, question: &str, delay: Duration) -> Self {
        self.delays.push((format!("Question: {}", question), delay));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        for (marker, delay) in &self.delays {
            if request.prompt.contains(marker.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }

        if self
            .failing
            .iter()
            .any(|marker| request.prompt.contains(marker.as_str()))
        {
            return Err(AppError::LlmTransient("503 Service Unavailable".to_string()));
        }

        Ok(LlmResponse {
            content: request.prompt.clone(),
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(4))
}

/// Pipeline over `source` and `llm` with lexical embeddings and a fresh cache.
pub fn test_pipeline(
    source: Arc<StaticSource>,
    llm: Arc<ScriptedLlm>,
    settings: PipelineSettings,
) -> Arc<QaPipeline> {
    let indexer = DocumentIndexer::new(
        source,
        Arc::new(DefaultParser),
        Embedder::lexical(1000),
        ChunkerConfig::from_settings(&settings).unwrap(),
        settings.max_document_bytes,
    );

    let synthesizer = AnswerSynthesizer::new(
        llm,
        &LlmSettings::default(),
        docqa_prompt::default_answer_prompt().unwrap(),
        settings.max_prompt_chars,
        fast_retry(),
    );

    Arc::new(QaPipeline::new(
        settings,
        Arc::new(indexer),
        Arc::new(synthesizer),
        Arc::new(RetrievalCache::new(&CacheSettings::default())),
    ))
}
