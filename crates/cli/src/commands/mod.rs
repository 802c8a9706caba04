//! Command handlers for the DocQA CLI.
//!
//! This module organizes all CLI commands into separate submodules.

pub mod ask;
pub mod config;
pub mod retrieve;

// Re-export command types for convenience
pub use ask::AskCommand;
pub use config::ConfigCommand;
pub use retrieve::RetrieveCommand;
