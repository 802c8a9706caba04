//! Error types for DocQA.
//!
//! This module defines a unified error enum covering every failure the
//! answering pipeline can surface: document fetch and parsing, embedding,
//! language-model calls, cache builds, plus configuration and I/O.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for DocQA.
///
/// All functions in the workspace return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Document unreachable or over the size limit
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Document format is recognised but cannot be extracted
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Document bytes could not be turned into text
    #[error("Parse error: {0}")]
    Parse(String),

    /// Normalized text had nothing to chunk
    #[error("No content: {0}")]
    NoContent(String),

    /// Semantic embedding model could not be used
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Retryable language-model failure (network, rate limit, 5xx)
    #[error("LLM transient error: {0}")]
    LlmTransient(String),

    /// Non-retryable language-model failure (invalid input, safety block)
    #[error("LLM rejected request: {0}")]
    LlmRejected(String),

    /// A shared index build failed; every waiter receives the same failure
    #[error("Index build failed ({kind}): {message}")]
    CacheBuild { kind: ErrorKind, message: String },

    /// Request shape violates configured limits
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Retrieval and index invariant errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Stable, machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Io,
    Fetch,
    UnsupportedFormat,
    Parse,
    NoContent,
    EmbeddingUnavailable,
    LlmTransient,
    LlmRejected,
    CacheBuild,
    InvalidRequest,
    Knowledge,
    Prompt,
    Serialization,
    Other,
}

impl ErrorKind {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Io => "io",
            Self::Fetch => "fetch",
            Self::UnsupportedFormat => "unsupported_format",
            Self::Parse => "parse",
            Self::NoContent => "no_content",
            Self::EmbeddingUnavailable => "embedding_unavailable",
            Self::LlmTransient => "llm_transient",
            Self::LlmRejected => "llm_rejected",
            Self::CacheBuild => "cache_build",
            Self::InvalidRequest => "invalid_request",
            Self::Knowledge => "knowledge",
            Self::Prompt => "prompt",
            Self::Serialization => "serialization",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-visible failure: a kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl AppError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::Parse(_) => ErrorKind::Parse,
            Self::NoContent(_) => ErrorKind::NoContent,
            Self::EmbeddingUnavailable(_) => ErrorKind::EmbeddingUnavailable,
            Self::LlmTransient(_) => ErrorKind::LlmTransient,
            Self::LlmRejected(_) => ErrorKind::LlmRejected,
            Self::CacheBuild { .. } => ErrorKind::CacheBuild,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::Knowledge(_) => ErrorKind::Knowledge,
            Self::Prompt(_) => ErrorKind::Prompt,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether a retry of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LlmTransient(_))
    }

    /// Structured form suitable for output to callers.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_llm_errors_are_retryable() {
        assert!(AppError::LlmTransient("429".to_string()).is_retryable());
        assert!(!AppError::LlmRejected("safety".to_string()).is_retryable());
        assert!(!AppError::Fetch("unreachable".to_string()).is_retryable());
    }

    #[test]
    fn test_report_carries_kind_and_message() {
        let report = AppError::Fetch("File too large".to_string()).report();
        assert_eq!(report.kind, ErrorKind::Fetch);
        assert!(report.message.contains("File too large"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "fetch");
    }

    #[test]
    fn test_cache_build_display_includes_cause_kind() {
        let err = AppError::CacheBuild {
            kind: ErrorKind::Parse,
            message: "bad bytes".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::CacheBuild);
        assert_eq!(err.to_string(), "Index build failed (parse): bad bytes");
    }
}
