//! Prompt system for DocQA.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions (a default answer prompt is built in)
//! - Handlebars template rendering
//! - Character-budgeted packing of retrieved passages

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::{build_bounded_prompt, render_template};
pub use loader::{default_answer_prompt, load_prompt, validate_prompt};
pub use types::{BuiltPrompt, BuiltPromptMetadata, PromptDefinition};
