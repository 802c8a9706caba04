//! Prompt types for DocQA.
//!
//! This module defines the domain entities for the prompt system.

use serde::{Deserialize, Serialize};

/// A prompt definition loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDefinition {
    /// Unique prompt identifier
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// API version for schema evolution
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// System instruction sent alongside the user message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Template string with Handlebars syntax.
    ///
    /// Must reference `{{question}}` and `{{context}}`.
    pub template: String,
}

/// A fully built prompt ready for LLM execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltPrompt {
    /// System message (optional)
    pub system: Option<String>,

    /// User message (required)
    pub user: String,

    /// Metadata about the built prompt
    pub metadata: BuiltPromptMetadata,
}

/// Metadata about a built prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltPromptMetadata {
    /// Source prompt ID
    pub source_prompt_id: String,

    /// Passages that made it into the context (fully or truncated)
    pub context_chunks: usize,

    /// Passages that were cut short to fit the budget
    pub truncated_chunks: usize,

    /// Characters in the system and user messages combined
    pub char_count: usize,
}

impl BuiltPrompt {
    /// Create a new built prompt.
    pub fn new(
        system: Option<String>,
        user: String,
        source_prompt_id: String,
        context_chunks: usize,
        truncated_chunks: usize,
    ) -> Self {
        let char_count = system.as_deref().map_or(0, |s| s.chars().count()) + user.chars().count();
        Self {
            system,
            user,
            metadata: BuiltPromptMetadata {
                source_prompt_id,
                context_chunks,
                truncated_chunks,
                char_count,
            },
        }
    }
}
