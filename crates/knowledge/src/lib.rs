//! Retrieval-augmented question answering over a single document.
//!
//! A document is fetched, extracted, chunked and embedded into an in-memory
//! similarity index. Each question retrieves its best chunks, which are packed
//! into a bounded prompt for the language model. Indexes and answer sets are
//! kept in a TTL cache that builds each key at most once at a time.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use docqa_core::AppConfig;
//! use docqa_knowledge::{QaPipeline, QueryRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let pipeline = Arc::new(QaPipeline::from_config(&config, None).await?);
//! let response = pipeline
//!     .run(QueryRequest {
//!         document: "https://example.com/policy.txt".to_string(),
//!         questions: vec!["What is the grace period?".to_string()],
//!     })
//!     .await?;
//! println!("{}", response.answers[0]);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chunker;
pub mod document;
pub mod embeddings;
pub mod index;
pub mod indexer;
pub mod parser;
pub mod pipeline;
pub mod retry;
pub mod source;
pub mod synthesizer;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use cache::{CacheStatus, Clock, ManualClock, RetrievalCache, RetrievalCacheStats, SystemClock};
pub use chunker::{chunk_text, ChunkerConfig};
pub use document::Document;
pub use embeddings::{Embedder, EmbeddingMode};
pub use index::SimilarityIndex;
pub use indexer::DocumentIndexer;
pub use parser::{DefaultParser, FormatParser};
pub use pipeline::QaPipeline;
pub use retry::RetryPolicy;
pub use source::{DefaultSource, DocumentSource, FetchedDocument};
pub use synthesizer::AnswerSynthesizer;
pub use types::{
    Answer, AnswerSet, AnswerStatus, Chunk, FallbackReason, IndexedDocument, QueryRequest,
    QueryResponse, ResponseMetadata, RetrievalReport, ScoredChunk, FALLBACK_PREFIX,
};
