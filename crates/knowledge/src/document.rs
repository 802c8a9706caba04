//! Ingested documents, text normalization and fingerprints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A fetched, extracted and normalized document. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Hash of the reference and the raw bytes
    pub fingerprint: String,

    /// URL or path the document was fetched from
    pub reference: String,

    /// Resolved content type (e.g., "text", "html")
    pub content_type: String,

    /// Normalized plain text
    pub text: String,

    /// Size of the raw bytes
    pub size_bytes: u64,

    /// Whether the raw bytes were within the size limit
    pub within_limit: bool,

    pub ingested_at: DateTime<Utc>,
}

impl Document {
    /// Build a document from raw bytes and its extracted text.
    pub fn new(
        reference: &str,
        raw: &[u8],
        content_type: &str,
        extracted_text: &str,
        max_bytes: u64,
    ) -> Self {
        let size_bytes = raw.len() as u64;

        Self {
            fingerprint: fingerprint(reference, raw),
            reference: reference.to_string(),
            content_type: content_type.to_string(),
            text: normalize_text(extracted_text),
            size_bytes,
            within_limit: size_bytes <= max_bytes,
            ingested_at: Utc::now(),
        }
    }

    /// Length of the normalized text in characters.
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Strip control characters, collapse whitespace runs to one space and trim.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable document fingerprint: SHA-256 over the reference and the content.
pub fn fingerprint(reference: &str, raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reference.as_bytes());
    hasher.update([0u8]);
    hasher.update(raw);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace_and_controls() {
        let raw = "  Cats\tare\u{0007} mammals.\r\n\n Dogs   too.\u{0000} ";
        assert_eq!(normalize_text(raw), "Cats are mammals. Dogs too.");
    }

    #[test]
    fn test_normalize_keeps_unicode() {
        assert_eq!(normalize_text("Ünïcödé  text"), "Ünïcödé text");
    }

    #[test]
    fn test_fingerprint_depends_on_reference_and_content() {
        let a = fingerprint("https://x/doc.txt", b"hello");
        assert_eq!(a, fingerprint("https://x/doc.txt", b"hello"));
        assert_ne!(a, fingerprint("https://x/other.txt", b"hello"));
        assert_ne!(a, fingerprint("https://x/doc.txt", b"hello!"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_document_flags_oversized_content() {
        let doc = Document::new("ref", b"0123456789", "text", "0123456789", 5);
        assert!(!doc.within_limit);
        assert_eq!(doc.size_bytes, 10);
        assert_eq!(doc.char_count(), 10);
    }
}
