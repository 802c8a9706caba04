//! In-memory similarity index for one document.
//!
//! Built once from parallel chunk and vector sequences, then only read. Queries
//! are an exact linear scan with cosine similarity.

use std::cmp::Ordering;

use docqa_core::{AppError, AppResult};

use crate::embeddings::EmbeddingMode;
use crate::types::{Chunk, ScoredChunk};

/// Embedded chunks of a single document.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    dimensions: usize,
    mode: EmbeddingMode,
}

impl SimilarityIndex {
    /// Build an index from chunks and their vectors.
    ///
    /// # Errors
    /// * `AppError::Knowledge` - If the sequences differ in length or the
    ///   vectors do not all share one dimensionality
    pub fn build(
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        mode: EmbeddingMode,
    ) -> AppResult<Self> {
        if chunks.len() != vectors.len() {
            return Err(AppError::Knowledge(format!(
                "Cannot index {} chunks with {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let dimensions = vectors.first().map_or(0, Vec::len);
        if let Some(position) = vectors.iter().position(|v| v.len() != dimensions) {
            return Err(AppError::Knowledge(format!(
                "Vector {} has {} dimensions, expected {}",
                position,
                vectors[position].len(),
                dimensions
            )));
        }

        tracing::debug!(
            chunks = chunks.len(),
            dimensions,
            mode = %mode,
            "Built similarity index"
        );

        Ok(Self {
            chunks,
            vectors,
            dimensions,
            mode,
        })
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// Equal scores rank the earlier chunk first. `k` is clamped to the index
    /// size, and an empty index yields no results.
    ///
    /// # Errors
    /// * `AppError::Knowledge` - If `query` has the wrong dimensionality
    pub fn query(&self, query: &[f32], k: usize) -> AppResult<Vec<ScoredChunk>> {
        if self.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if query.len() != self.dimensions {
            return Err(AppError::Knowledge(format!(
                "Query vector has {} dimensions, index has {}",
                query.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, vector)| (i, cosine_similarity(query, vector)))
            .collect();

        let k = k.min(scored.len());
        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, rank);
            scored.truncate(k);
        }
        scored.sort_by(rank);

        Ok(scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn mode(&self) -> EmbeddingMode {
        self.mode
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

/// Higher score first, then lower chunk position.
fn rank(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Cosine similarity; zero when either vector has no length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: usize) -> Chunk {
        let text = format!("chunk {}", index);
        Chunk {
            index,
            char_len: text.chars().count(),
            start: 0,
            end: text.chars().count(),
            text,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_build_rejects_length_mismatch() {
        let err = SimilarityIndex::build(vec![chunk(0)], vec![], EmbeddingMode::Lexical);
        assert!(matches!(err, Err(AppError::Knowledge(_))));
    }

    #[test]
    fn test_build_rejects_mixed_dimensions() {
        let err = SimilarityIndex::build(
            vec![chunk(0), chunk(1)],
            vec![vec![1.0, 0.0], vec![1.0]],
            EmbeddingMode::Lexical,
        );
        assert!(matches!(err, Err(AppError::Knowledge(_))));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index =
            SimilarityIndex::build(vec![chunk(0)], vec![vec![1.0, 0.0]], EmbeddingMode::Semantic)
                .unwrap();
        assert_eq!(index.dimensions(), 2);
        assert!(index.query(&[1.0], 1).is_err());
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = SimilarityIndex::build(vec![], vec![], EmbeddingMode::Lexical).unwrap();
        assert!(index.is_empty());
        assert!(index.query(&[1.0, 0.0], 3).unwrap().is_empty());
    }
}
