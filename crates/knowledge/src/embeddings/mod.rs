//! Embedding engine for document chunks and questions.
//!
//! The embedder is chosen once: a semantic provider when one is reachable,
//! otherwise TF-IDF lexical vectors. A document that fails to embed
//! semantically is re-embedded lexically as a whole, so one index never mixes
//! vectors from both modes.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::lexical::LexicalEmbedder;

use docqa_core::config::EmbeddingSettings;
use docqa_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Which kind of vectors an embedder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingMode {
    Semantic,
    Lexical,
}

impl EmbeddingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Lexical => "lexical",
        }
    }
}

impl fmt::Display for EmbeddingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic embeddings from a model provider.
#[derive(Debug, Clone)]
pub struct SemanticEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    /// Vocabulary cap used if this document has to fall back to lexical
    fallback_features: usize,
}

/// Embedder selected at construction.
#[derive(Debug, Clone)]
pub enum Embedder {
    Semantic(SemanticEmbedder),
    Lexical(LexicalEmbedder),
}

/// Chunk vectors together with the embedder that produced them.
#[derive(Debug)]
pub struct CorpusEmbedding {
    pub embedder: Embedder,
    pub vectors: Vec<Vec<f32>>,
}

impl Embedder {
    /// Pick the embedder for these settings.
    ///
    /// An unreachable semantic provider is not an error: the lexical embedder
    /// is returned instead and the switch is logged.
    pub async fn select(settings: &EmbeddingSettings) -> AppResult<Self> {
        if settings.provider == "lexical" {
            tracing::info!("Using lexical embeddings");
            return Ok(Self::lexical(settings.lexical_max_features));
        }

        match create_provider(settings).await {
            Ok(provider) => {
                tracing::info!(
                    provider = provider.provider_name(),
                    model = provider.model_name(),
                    dimensions = provider.dimensions(),
                    "Using semantic embeddings"
                );
                Ok(Self::semantic(
                    provider,
                    settings.batch_size,
                    settings.lexical_max_features,
                ))
            }
            Err(AppError::EmbeddingUnavailable(reason)) => {
                tracing::warn!("Semantic embeddings unavailable, using lexical fallback: {}", reason);
                Ok(Self::lexical(settings.lexical_max_features))
            }
            Err(e) => Err(e),
        }
    }

    pub fn semantic(
        provider: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
        fallback_features: usize,
    ) -> Self {
        Self::Semantic(SemanticEmbedder {
            provider,
            batch_size: batch_size.max(1),
            fallback_features,
        })
    }

    /// An unfitted lexical embedder; `embed_corpus` fits it.
    pub fn lexical(max_features: usize) -> Self {
        Self::Lexical(LexicalEmbedder::new(max_features))
    }

    pub fn mode(&self) -> EmbeddingMode {
        match self {
            Self::Semantic(_) => EmbeddingMode::Semantic,
            Self::Lexical(_) => EmbeddingMode::Lexical,
        }
    }

    /// Embed one text, L2-normalized.
    pub async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        match self {
            Self::Semantic(semantic) => {
                let mut vector = semantic.provider.embed(text).await?;
                l2_normalize(&mut vector);
                Ok(vector)
            }
            Self::Lexical(lexical) => Ok(lexical.embed(text)),
        }
    }

    /// Embed several texts, in order. Semantic requests go out in batches.
    pub async fn embed_many(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        match self {
            Self::Semantic(semantic) => {
                let mut vectors = Vec::with_capacity(texts.len());

                for batch in texts.chunks(semantic.batch_size) {
                    let embedded = semantic.provider.embed_batch(batch).await?;
                    if embedded.len() != batch.len() {
                        return Err(AppError::EmbeddingUnavailable(format!(
                            "Provider returned {} embeddings for {} texts",
                            embedded.len(),
                            batch.len()
                        )));
                    }
                    vectors.extend(embedded);
                }

                for vector in &mut vectors {
                    l2_normalize(vector);
                }

                Ok(vectors)
            }
            Self::Lexical(lexical) => Ok(texts.iter().map(|t| lexical.embed(t)).collect()),
        }
    }

    /// Embed every chunk of one document.
    ///
    /// The lexical embedder is fitted on `texts`. If the semantic provider
    /// fails partway, the whole corpus is re-embedded lexically and the
    /// returned embedder is the fitted lexical one.
    pub async fn embed_corpus(&self, texts: &[String]) -> AppResult<CorpusEmbedding> {
        match self {
            Self::Semantic(semantic) => match self.embed_many(texts).await {
                Ok(vectors) => Ok(CorpusEmbedding {
                    embedder: self.clone(),
                    vectors,
                }),
                Err(e) => {
                    tracing::warn!(
                        chunks = texts.len(),
                        "Semantic embedding failed, re-embedding document lexically: {}",
                        e
                    );
                    Ok(Self::fit_lexical(texts, semantic.fallback_features))
                }
            },
            Self::Lexical(lexical) => Ok(Self::fit_lexical(texts, lexical.max_features())),
        }
    }

    fn fit_lexical(texts: &[String], max_features: usize) -> CorpusEmbedding {
        let fitted = LexicalEmbedder::fit(texts, max_features);
        let vectors = texts.iter().map(|t| fitted.embed(t)).collect();
        CorpusEmbedding {
            embedder: Self::Lexical(fitted),
            vectors,
        }
    }
}

/// Scale `vector` to unit length; zero vectors are left unchanged.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}
