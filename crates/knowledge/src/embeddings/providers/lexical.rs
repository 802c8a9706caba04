//! TF-IDF lexical embeddings.
//!
//! Used when no semantic model is available. The vocabulary is fitted on the
//! chunks of one document, so queries must be embedded with the fitted
//! embedder that produced the index.

use crate::embeddings::l2_normalize;
use std::collections::{HashMap, HashSet};
use unicode_segmentation::UnicodeSegmentation;

/// Common English words that carry no retrieval signal.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and", "any",
    "are", "as", "at", "be", "because", "been", "before", "being", "below", "between", "both",
    "but", "by", "can", "could", "did", "do", "does", "doing", "down", "during", "each", "few",
    "for", "from", "further", "had", "has", "have", "having", "he", "her", "here", "hers",
    "herself", "him", "himself", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "itself", "just", "may", "me", "might", "more", "most", "must", "my", "myself", "no", "nor",
    "not", "now", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves",
    "out", "over", "own", "same", "shall", "she", "should", "so", "some", "such", "than", "that",
    "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "was", "we", "were", "what",
    "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you",
    "your", "yours", "yourself", "yourselves",
];

/// Fitted TF-IDF vocabulary.
#[derive(Debug, Clone, Default)]
pub struct LexicalEmbedder {
    max_features: usize,
    /// Term to vector column
    vocabulary: HashMap<String, usize>,
    /// Inverse document frequency per column
    idf: Vec<f32>,
}

impl LexicalEmbedder {
    /// An embedder with no vocabulary yet.
    pub fn new(max_features: usize) -> Self {
        Self {
            max_features,
            ..Self::default()
        }
    }

    /// Fit a vocabulary on `corpus`.
    ///
    /// Keeps the `max_features` terms with the highest document frequency
    /// (ties broken alphabetically) and orders columns alphabetically, so the
    /// same corpus always yields the same vector space.
    pub fn fit(corpus: &[String], max_features: usize) -> Self {
        let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for text in corpus {
            let unique: HashSet<String> = tokenize(text, &stop_words).collect();
            for term in unique {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = document_frequency.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(max_features);
        ranked.sort_by(|a, b| a.0.cmp(&b.0));

        let documents = corpus.len() as f32;
        let mut vocabulary = HashMap::with_capacity(ranked.len());
        let mut idf = Vec::with_capacity(ranked.len());

        for (column, (term, df)) in ranked.into_iter().enumerate() {
            // Smoothed idf: ln((1 + n) / (1 + df)) + 1
            idf.push(((1.0 + documents) / (1.0 + df as f32)).ln() + 1.0);
            vocabulary.insert(term, column);
        }

        tracing::debug!(
            terms = vocabulary.len(),
            documents = corpus.len(),
            "Fitted lexical vocabulary"
        );

        Self {
            max_features,
            vocabulary,
            idf,
        }
    }

    pub fn max_features(&self) -> usize {
        self.max_features
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Vector length; at least one so empty vocabularies still yield vectors.
    pub fn dimensions(&self) -> usize {
        self.vocabulary.len().max(1)
    }

    /// L2-normalized TF-IDF vector. Text with no known terms maps to zeros.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
        let mut vector = vec![0.0f32; self.dimensions()];

        for term in tokenize(text, &stop_words) {
            if let Some(&column) = self.vocabulary.get(&term) {
                vector[column] += self.idf[column];
            }
        }

        l2_normalize(&mut vector);
        vector
    }
}

/// Lowercased words longer than one character, stop words removed.
fn tokenize<'a>(
    text: &'a str,
    stop_words: &'a HashSet<&'static str>,
) -> impl Iterator<Item = String> + 'a {
    text.unicode_words()
        .map(str::to_lowercase)
        .filter(move |word| word.chars().count() > 1 && !stop_words.contains(word.as_str()))
}
