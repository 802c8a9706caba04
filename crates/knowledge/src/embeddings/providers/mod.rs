//! Embedding provider implementations.

pub mod lexical;
pub mod ollama;
