//! Retrieval pipeline type definitions.

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::embeddings::{Embedder, EmbeddingMode};
use crate::index::SimilarityIndex;

/// Marker placed at the start of every fallback answer.
pub const FALLBACK_PREFIX: &str = "[answer unavailable]";

/// A contiguous span of document text, the atomic retrieval unit.
///
/// `start` and `end` are character offsets into the normalized document text;
/// `text` is exactly that span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position in document order
    pub index: usize,

    /// Text span, untrimmed
    pub text: String,

    /// First character offset (inclusive)
    pub start: usize,

    /// Last character offset (exclusive)
    pub end: usize,

    /// Length in characters
    pub char_len: usize,
}

impl Chunk {
    /// Non-empty and no longer than `max_len` characters.
    pub fn is_valid(&self, max_len: usize) -> bool {
        !self.text.trim().is_empty() && self.char_len <= max_len
    }
}

/// A chunk paired with its similarity to a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Why a question received a fallback answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Transient failures on every attempt
    Exhausted,
    /// The language model refused the request
    Rejected,
    /// The request deadline passed first
    Timeout,
    /// Template and question leave no room in the prompt budget
    PromptTooLarge,
    /// The question could not be embedded
    EmbeddingFailed,
    /// The answering task itself failed
    Internal,
}

impl FallbackReason {
    fn describe(&self) -> &'static str {
        match self {
            Self::Exhausted => "the language model did not respond successfully after retrying",
            Self::Rejected => "the language model rejected the request",
            Self::Timeout => "the request deadline passed before this question was answered",
            Self::PromptTooLarge => "the question does not fit in the prompt budget",
            Self::EmbeddingFailed => "the question could not be embedded",
            Self::Internal => "an internal error occurred while answering",
        }
    }
}

/// Outcome of answering one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnswerStatus {
    Answered,
    Fallback { reason: FallbackReason },
}

/// The answer to one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    #[serde(flatten)]
    pub status: AnswerStatus,
    /// Language-model calls made for this question
    pub attempts: u32,
}

impl Answer {
    /// A successful answer.
    pub fn answered(question: impl Into<String>, text: impl Into<String>, attempts: u32) -> Self {
        Self {
            question: question.into(),
            text: text.into(),
            status: AnswerStatus::Answered,
            attempts,
        }
    }

    /// A clearly marked fallback answer.
    pub fn fallback(
        question: impl Into<String>,
        reason: FallbackReason,
        detail: Option<&str>,
        attempts: u32,
    ) -> Self {
        let text = match detail {
            Some(detail) => format!("{} {} ({})", FALLBACK_PREFIX, reason.describe(), detail),
            None => format!("{} {}", FALLBACK_PREFIX, reason.describe()),
        };

        Self {
            question: question.into(),
            text,
            status: AnswerStatus::Fallback { reason },
            attempts,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self.status, AnswerStatus::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self.status {
            AnswerStatus::Fallback { reason } => Some(reason),
            AnswerStatus::Answered => None,
        }
    }
}

/// Answers for one request, in question order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSet {
    /// Fingerprint of the indexed document, unknown if indexing timed out
    pub document_fingerprint: Option<String>,
    pub chunk_count: usize,
    pub embedding_mode: Option<EmbeddingMode>,
    pub answers: Vec<Answer>,
    /// The document index came from the cache
    pub index_reused: bool,
}

impl AnswerSet {
    /// Every question answered with a timeout fallback.
    pub fn timed_out(questions: &[String]) -> Self {
        Self {
            document_fingerprint: None,
            chunk_count: 0,
            embedding_mode: None,
            answers: questions
                .iter()
                .map(|q| Answer::fallback(q.clone(), FallbackReason::Timeout, None, 0))
                .collect(),
            index_reused: false,
        }
    }

    pub fn fallback_count(&self) -> usize {
        self.answers.iter().filter(|a| a.is_fallback()).count()
    }
}

/// A document together with its similarity index and the embedder that
/// produced it. Questions must be embedded with the same embedder.
#[derive(Debug)]
pub struct IndexedDocument {
    pub document: Document,
    pub index: SimilarityIndex,
    pub embedder: Embedder,
}

/// One question-answering request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// URL or local path of the document
    pub document: String,
    pub questions: Vec<String>,
}

/// Metadata returned alongside the answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub request_id: String,
    pub document_fingerprint: Option<String>,
    pub question_count: usize,
    pub chunk_count: usize,
    pub elapsed_ms: u64,
    /// The answer set was served from the cache
    pub cache_hit: bool,
    /// The document index was served from the cache
    pub index_cache_hit: bool,
    pub embedding_mode: Option<EmbeddingMode>,
    pub fallback_count: usize,
}

/// Answers in question order plus metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answers: Vec<String>,
    pub metadata: ResponseMetadata,
}

/// Result of retrieving chunks without answering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalReport {
    pub document_fingerprint: String,
    pub embedding_mode: EmbeddingMode,
    pub chunk_count: usize,
    pub cache_hit: bool,
    pub results: Vec<ScoredChunk>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_validity() {
        let chunk = Chunk {
            index: 0,
            text: "Cats are mammals.".to_string(),
            start: 0,
            end: 17,
            char_len: 17,
        };
        assert!(chunk.is_valid(20));
        assert!(!chunk.is_valid(10));

        let blank = Chunk {
            text: "   ".to_string(),
            char_len: 3,
            ..chunk
        };
        assert!(!blank.is_valid(20));
    }

    #[test]
    fn test_fallback_answer_is_marked() {
        let answer = Answer::fallback("q?", FallbackReason::Exhausted, Some("3 attempts"), 3);
        assert!(answer.is_fallback());
        assert!(answer.text.starts_with(FALLBACK_PREFIX));
        assert!(answer.text.contains("3 attempts"));
        assert_eq!(answer.fallback_reason(), Some(FallbackReason::Exhausted));
    }

    #[test]
    fn test_answer_serializes_status_inline() {
        let answer = Answer::fallback("q?", FallbackReason::Timeout, None, 0);
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(json["status"], "fallback");
        assert_eq!(json["reason"], "timeout");
    }

    #[test]
    fn test_timed_out_set() {
        let set = AnswerSet::timed_out(&["a?".to_string(), "b?".to_string()]);
        assert_eq!(set.answers.len(), 2);
        assert_eq!(set.fallback_count(), 2);
        assert_eq!(set.answers[1].question, "b?");
    }
}
