//! Question-answering pipeline.
//!
//! One request resolves the document index through the cache, then answers
//! each question on a bounded worker pool. Answers come back in question
//! order; anything unanswered at the request deadline gets a timeout fallback.

use std::sync::Arc;
use std::time::Duration;

use docqa_core::config::{AppConfig, PipelineSettings};
use docqa_core::{AppError, AppResult};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::{CacheStatus, RetrievalCache};
use crate::indexer::DocumentIndexer;
use crate::synthesizer::AnswerSynthesizer;
use crate::types::{
    Answer, AnswerSet, FallbackReason, IndexedDocument, QueryRequest, QueryResponse,
    ResponseMetadata, RetrievalReport,
};

/// The retrieval-augmented answering pipeline.
pub struct QaPipeline {
    settings: PipelineSettings,
    indexer: Arc<DocumentIndexer>,
    synthesizer: Arc<AnswerSynthesizer>,
    cache: Arc<RetrievalCache>,
}

impl QaPipeline {
    pub fn new(
        settings: PipelineSettings,
        indexer: Arc<DocumentIndexer>,
        synthesizer: Arc<AnswerSynthesizer>,
        cache: Arc<RetrievalCache>,
    ) -> Self {
        Self {
            settings,
            indexer,
            synthesizer,
            cache,
        }
    }

    /// Wire up the pipeline from configuration.
    ///
    /// # Errors
    /// * `AppError::Config` - If the configuration is invalid or the language
    ///   model client cannot be created
    pub async fn from_config(config: &AppConfig, api_key: Option<&str>) -> AppResult<Self> {
        config.validate()?;

        let client = docqa_llm::create_client(&config.llm, api_key)?;
        let synthesizer = AnswerSynthesizer::from_config(client, config)?;
        let indexer = DocumentIndexer::from_config(config).await?;

        tracing::debug!(
            llm = synthesizer.provider_name(),
            embedding = %indexer.embedder().mode(),
            "Pipeline ready"
        );

        Ok(Self::new(
            config.pipeline.clone(),
            Arc::new(indexer),
            Arc::new(synthesizer),
            Arc::new(RetrievalCache::new(&config.cache)),
        ))
    }

    pub fn cache(&self) -> &Arc<RetrievalCache> {
        &self.cache
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Answer every question in `request` about its document.
    ///
    /// Per-question failures become fallback answers. Only request validation
    /// and document indexing failures are returned as errors.
    ///
    /// # Errors
    /// * `AppError::InvalidRequest` - If the request breaks the configured limits
    /// * `AppError::CacheBuild` - If the document could not be indexed
    pub async fn run(self: &Arc<Self>, request: QueryRequest) -> AppResult<QueryResponse> {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            questions = request.questions.len()
        );

        self.run_request(request_id, request).instrument(span).await
    }

    async fn run_request(
        self: &Arc<Self>,
        request_id: String,
        request: QueryRequest,
    ) -> AppResult<QueryResponse> {
        let started = std::time::Instant::now();
        self.validate(&request)?;

        let deadline = Instant::now() + Duration::from_millis(self.settings.request_timeout_ms);
        let reference = request.document.trim().to_string();
        let questions = request.questions;

        tracing::info!(document = %reference, "Answering questions");

        let pipeline = Arc::clone(self);
        let (owned_reference, owned_questions) = (reference.clone(), questions.clone());
        let (set, status) = self
            .cache
            .get_or_compute_answers(&reference, &questions, move || async move {
                pipeline
                    .compute_answers(owned_reference, owned_questions, deadline)
                    .await
            })
            .await?;

        let metadata = ResponseMetadata {
            request_id,
            document_fingerprint: set.document_fingerprint.clone(),
            question_count: questions.len(),
            chunk_count: set.chunk_count,
            elapsed_ms: started.elapsed().as_millis() as u64,
            cache_hit: status.is_hit(),
            index_cache_hit: status.is_hit() || set.index_reused,
            embedding_mode: set.embedding_mode,
            fallback_count: set.fallback_count(),
        };

        tracing::info!(
            elapsed_ms = metadata.elapsed_ms,
            cache_hit = metadata.cache_hit,
            fallbacks = metadata.fallback_count,
            "Request complete"
        );

        Ok(QueryResponse {
            answers: set.answers.iter().map(|a| a.text.clone()).collect(),
            metadata,
        })
    }

    /// Retrieve the `k` best chunks for `question` without calling the
    /// language model.
    pub async fn retrieve(
        &self,
        reference: &str,
        question: &str,
        k: usize,
    ) -> AppResult<RetrievalReport> {
        let (indexed, status) = self.index_for(reference.trim()).await?;
        let query = indexed.embedder.embed(question).await?;
        let results = indexed.index.query(&query, k)?;

        Ok(RetrievalReport {
            document_fingerprint: indexed.document.fingerprint.clone(),
            embedding_mode: indexed.index.mode(),
            chunk_count: indexed.index.len(),
            cache_hit: status.is_hit(),
            results,
        })
    }

    fn validate(&self, request: &QueryRequest) -> AppResult<()> {
        if request.document.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Document reference is empty".to_string(),
            ));
        }

        if request.questions.is_empty() {
            return Err(AppError::InvalidRequest(
                "At least one question is required".to_string(),
            ));
        }

        if request.questions.len() > self.settings.max_questions {
            return Err(AppError::InvalidRequest(format!(
                "Too many questions ({}, limit {})",
                request.questions.len(),
                self.settings.max_questions
            )));
        }

        if let Some(position) = request.questions.iter().position(|q| q.trim().is_empty()) {
            return Err(AppError::InvalidRequest(format!(
                "Question {} is empty",
                position + 1
            )));
        }

        Ok(())
    }

    async fn index_for(&self, reference: &str) -> AppResult<(Arc<IndexedDocument>, CacheStatus)> {
        let indexer = Arc::clone(&self.indexer);
        let owned = reference.to_string();

        self.cache
            .get_or_build_index(reference, move || async move { indexer.build(&owned).await })
            .await
    }

    async fn compute_answers(
        self: Arc<Self>,
        reference: String,
        questions: Vec<String>,
        deadline: Instant,
    ) -> AppResult<AnswerSet> {
        // The index build keeps running past the deadline and fills the cache
        let (indexed, status) = match timeout_at(deadline, self.index_for(&reference)).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!("Request deadline reached while indexing the document");
                return Ok(AnswerSet::timed_out(&questions));
            }
        };

        let answers = self.answer_all(&indexed, &questions, deadline).await;

        Ok(AnswerSet {
            document_fingerprint: Some(indexed.document.fingerprint.clone()),
            chunk_count: indexed.index.len(),
            embedding_mode: Some(indexed.index.mode()),
            answers,
            index_reused: status.is_hit(),
        })
    }

    /// Answer all questions concurrently, keeping question order.
    async fn answer_all(
        &self,
        indexed: &Arc<IndexedDocument>,
        questions: &[String],
        deadline: Instant,
    ) -> Vec<Answer> {
        let semaphore = Arc::new(Semaphore::new(self.settings.answer_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (i, question) in questions.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let indexed = Arc::clone(indexed);
            let synthesizer = Arc::clone(&self.synthesizer);
            let question = question.clone();
            let top_k = self.settings.top_k;

            tasks.spawn(
                async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        let answer = Answer::fallback(question, FallbackReason::Internal, None, 0);
                        return (i, answer);
                    };
                    (i, answer_one(&synthesizer, &indexed, &question, top_k).await)
                }
                .instrument(tracing::debug_span!("question", index = i)),
            );
        }

        let mut slots: Vec<Option<Answer>> = vec![None; questions.len()];
        let mut timed_out = false;

        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((i, answer)))) => slots[i] = Some(answer),
                Ok(Some(Err(e))) => tracing::error!("Answer task failed: {}", e),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        unanswered = tasks.len(),
                        "Request deadline reached, cancelling unanswered questions"
                    );
                    tasks.abort_all();
                    timed_out = true;
                    break;
                }
            }
        }

        let missing = if timed_out {
            FallbackReason::Timeout
        } else {
            FallbackReason::Internal
        };

        slots
            .into_iter()
            .zip(questions)
            .map(|(slot, question)| {
                slot.unwrap_or_else(|| Answer::fallback(question.clone(), missing, None, 0))
            })
            .collect()
    }
}

async fn answer_one(
    synthesizer: &AnswerSynthesizer,
    indexed: &IndexedDocument,
    question: &str,
    top_k: usize,
) -> Answer {
    let query = match indexed.embedder.embed(question).await {
        Ok(query) => query,
        Err(e) => {
            tracing::warn!("Could not embed question: {}", e);
            return Answer::fallback(question, FallbackReason::EmbeddingFailed, None, 0);
        }
    };

    let retrieved = match indexed.index.query(&query, top_k) {
        Ok(retrieved) => retrieved,
        Err(e) => {
            tracing::warn!("Retrieval failed: {}", e);
            return Answer::fallback(question, FallbackReason::EmbeddingFailed, None, 0);
        }
    };

    tracing::debug!(
        retrieved = retrieved.len(),
        best_score = retrieved.first().map_or(0.0, |s| s.score),
        "Retrieved chunks"
    );

    synthesizer.answer(question, &retrieved).await
}
