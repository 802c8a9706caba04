//! Document indexing: fetch, extract, chunk, embed, index.

use std::sync::Arc;
use std::time::Duration;

use docqa_core::config::AppConfig;
use docqa_core::{AppError, AppResult};
use tracing::instrument;

use crate::chunker::{chunk_text, ChunkerConfig};
use crate::document::Document;
use crate::embeddings::Embedder;
use crate::index::SimilarityIndex;
use crate::parser::{resolve_content_type, DefaultParser, FormatParser};
use crate::source::{DefaultSource, DocumentSource};
use crate::types::IndexedDocument;

/// Builds the similarity index for a document reference.
pub struct DocumentIndexer {
    source: Arc<dyn DocumentSource>,
    parser: Arc<dyn FormatParser>,
    embedder: Embedder,
    chunker: ChunkerConfig,
    max_document_bytes: u64,
}

impl DocumentIndexer {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        parser: Arc<dyn FormatParser>,
        embedder: Embedder,
        chunker: ChunkerConfig,
        max_document_bytes: u64,
    ) -> Self {
        Self {
            source,
            parser,
            embedder,
            chunker,
            max_document_bytes,
        }
    }

    /// Indexer with the HTTP/file source, the built-in parser and the
    /// embedder selected from configuration.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let pipeline = &config.pipeline;
        let source = DefaultSource::new(
            pipeline.max_document_bytes,
            Duration::from_secs(pipeline.fetch_timeout_secs),
        )?;

        Ok(Self::new(
            Arc::new(source),
            Arc::new(DefaultParser),
            Embedder::select(&config.embedding).await?,
            ChunkerConfig::from_settings(pipeline)?,
            pipeline.max_document_bytes,
        ))
    }

    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Fetch `reference` and build its index.
    ///
    /// # Errors
    /// * `AppError::Fetch` - If the document is unreachable or too large
    /// * `AppError::UnsupportedFormat` / `AppError::Parse` - If no text can
    ///   be extracted
    /// * `AppError::NoContent` - If the extracted text is blank
    #[instrument(skip(self))]
    pub async fn build(&self, reference: &str) -> AppResult<IndexedDocument> {
        let fetched = self.source.fetch(reference).await?;

        if fetched.bytes.len() as u64 > self.max_document_bytes {
            return Err(AppError::Fetch(format!(
                "Document {} is too large ({} bytes, limit {} bytes)",
                reference,
                fetched.bytes.len(),
                self.max_document_bytes
            )));
        }

        let declared = fetched.content_type.as_deref();
        let text = self.parser.extract_text(&fetched.bytes, declared)?;
        let content_type = resolve_content_type(&fetched.bytes, declared);

        let document = Document::new(
            reference,
            &fetched.bytes,
            content_type.as_str(),
            &text,
            self.max_document_bytes,
        );

        let chunks = chunk_text(&document.text, &self.chunker)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let corpus = self.embedder.embed_corpus(&texts).await?;
        let index = SimilarityIndex::build(chunks, corpus.vectors, corpus.embedder.mode())?;

        tracing::info!(
            fingerprint = %document.fingerprint,
            bytes = document.size_bytes,
            chars = document.char_count(),
            chunks = index.len(),
            dimensions = index.dimensions(),
            mode = %index.mode(),
            "Indexed document"
        );

        Ok(IndexedDocument {
            document,
            index,
            embedder: corpus.embedder,
        })
    }
}
