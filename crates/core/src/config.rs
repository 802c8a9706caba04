//! Configuration management for DocQA.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (`docqa.yaml` or the path in `DOCQA_CONFIG`)
//! - Environment variables
//! - Command-line flags
//!
//! The answering core treats these values as opaque limits supplied by the caller.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers able to answer prompts.
pub const KNOWN_LLM_PROVIDERS: [&str; 2] = ["ollama", "gemini"];

/// Providers able to produce embeddings.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "lexical"];

/// Default config file looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "docqa.yaml";

/// Smallest context share a prompt budget must leave after the template.
const MIN_CONTEXT_BUDGET: usize = 256;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    /// Config file the values were read from (if any)
    #[serde(skip)]
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Log output format
    pub log_format: LogFormat,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Language-model settings
    pub llm: LlmSettings,

    /// Embedding settings
    pub embedding: EmbeddingSettings,

    /// Chunking, retrieval and request limits
    pub pipeline: PipelineSettings,

    /// Retrieval cache settings
    pub cache: CacheSettings,

    /// Backoff policy for language-model calls
    pub retry: RetrySettings,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// Parse a format name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Language-model provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// Provider name ("ollama" or "gemini")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Custom endpoint (provider default when unset)
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate per answer
    pub max_tokens: u32,

    /// Per-call HTTP timeout
    pub timeout_secs: u64,

    /// YAML answer prompt replacing the built-in one
    pub prompt_file: Option<PathBuf>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(), // Local-first default
            model: "llama3.2".to_string(),
            endpoint: None,
            api_key_env: None,
            temperature: 0.2,
            max_tokens: 512,
            timeout_secs: 60,
            prompt_file: None,
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmbeddingSettings {
    /// Provider name ("ollama" for semantic, "lexical" to force the fallback)
    pub provider: String,

    /// Semantic model identifier
    pub model: String,

    /// Custom endpoint (provider default when unset)
    pub endpoint: Option<String>,

    /// Expected semantic vector dimensions
    pub dimensions: usize,

    /// Texts per embedding batch
    pub batch_size: usize,

    /// Vocabulary cap for the lexical fallback
    pub lexical_max_features: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            endpoint: None,
            dimensions: 768,
            batch_size: 32,
            lexical_max_features: 1000,
        }
    }
}

/// Chunking, retrieval and request limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Maximum chunk length in characters
    pub chunk_size: usize,

    /// Characters shared by adjacent chunks
    pub chunk_overlap: usize,

    /// Window before the size limit searched for a sentence end
    pub sentence_lookback: usize,

    /// Chunks retrieved per question
    pub top_k: usize,

    /// Character budget for a complete answer prompt
    pub max_prompt_chars: usize,

    /// Largest accepted document
    pub max_document_bytes: u64,

    /// Largest accepted question list
    pub max_questions: usize,

    /// Questions answered in parallel
    pub answer_concurrency: usize,

    /// Deadline for a whole request
    pub request_timeout_ms: u64,

    /// Timeout for the document download
    pub fetch_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
            sentence_lookback: 200,
            top_k: 3,
            max_prompt_chars: 12_000,
            max_document_bytes: 50 * 1024 * 1024,
            max_questions: 20,
            answer_concurrency: 4,
            request_timeout_ms: 120_000,
            fetch_timeout_secs: 30,
        }
    }
}

/// Retrieval cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Entry lifetime
    pub ttl_secs: u64,

    /// Ready entries kept per cache
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            capacity: 100,
        }
    }
}

/// Exponential backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay_ms: u64,

    /// Upper bound on any single delay
    pub max_delay_ms: u64,

    /// Growth factor between delays
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8000,
            multiplier: 2.0,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            log_level: None,
            log_format: LogFormat::Pretty,
            verbose: false,
            no_color: false,
            llm: LlmSettings::default(),
            embedding: EmbeddingSettings::default(),
            pipeline: PipelineSettings::default(),
            cache: CacheSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file and environment variables.
    ///
    /// Environment variables:
    /// - `DOCQA_CONFIG`: Path to config file
    /// - `DOCQA_PROVIDER`: LLM provider
    /// - `DOCQA_MODEL`: Model identifier
    /// - `DOCQA_LLM_ENDPOINT`: LLM endpoint
    /// - `DOCQA_PROMPT_FILE`: Answer prompt YAML file
    /// - `DOCQA_EMBEDDING_PROVIDER`: Embedding provider
    /// - `DOCQA_TOP_K`: Chunks retrieved per question
    /// - `DOCQA_CACHE_TTL`: Cache TTL in seconds
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use docqa_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Provider: {}", config.llm.provider);
    /// ```
    pub fn load() -> AppResult<Self> {
        let explicit = std::env::var("DOCQA_CONFIG").ok().map(PathBuf::from);
        Self::load_from(explicit.as_deref())
    }

    /// Load configuration, reading `path` (or `./docqa.yaml`) when it exists.
    pub fn load_from(path: Option<&Path>) -> AppResult<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(AppError::Config(format!(
                        "Config file does not exist: {:?}",
                        path
                    )));
                }
                Self::from_yaml_file(path)?
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_yaml_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Parse a YAML config file.
    fn from_yaml_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config: AppConfig = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;
        config.config_file = Some(path.to_path_buf());

        tracing::debug!("Loaded config file {:?}", path);
        Ok(config)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(provider) = std::env::var("DOCQA_PROVIDER") {
            self.llm.provider = provider;
        }

        if let Ok(model) = std::env::var("DOCQA_MODEL") {
            self.llm.model = model;
        }

        if let Ok(endpoint) = std::env::var("DOCQA_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }

        if let Ok(path) = std::env::var("DOCQA_PROMPT_FILE") {
            self.llm.prompt_file = Some(PathBuf::from(path));
        }

        if let Ok(provider) = std::env::var("DOCQA_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Ok(top_k) = std::env::var("DOCQA_TOP_K") {
            self.pipeline.top_k = top_k
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid DOCQA_TOP_K: {}", e)))?;
        }

        if let Ok(ttl) = std::env::var("DOCQA_CACHE_TTL") {
            self.cache.ttl_secs = ttl
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid DOCQA_CACHE_TTL: {}", e)))?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }

        // Check for NO_COLOR environment variable
        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    pub fn with_overrides(
        mut self,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        log_format: Option<LogFormat>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(provider) = provider {
            self.llm.provider = provider;
        }

        if let Some(model) = model {
            self.llm.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if let Some(log_format) = log_format {
            self.log_format = log_format;
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Resolve the language-model API key from the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        // Check explicit DOCQA_API_KEY first
        if let Ok(key) = std::env::var("DOCQA_API_KEY") {
            return Some(key);
        }

        let env_var = match (&self.llm.api_key_env, self.llm.provider.as_str()) {
            (Some(var), _) => var.clone(),
            (None, "gemini") => "GEMINI_API_KEY".to_string(),
            (None, _) => return None,
        };

        std::env::var(env_var).ok()
    }

    /// Validate configuration.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.llm.provider.as_str();
        if !KNOWN_LLM_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                provider,
                KNOWN_LLM_PROVIDERS.join(", ")
            )));
        }

        let embedding_provider = self.embedding.provider.as_str();
        if !KNOWN_EMBEDDING_PROVIDERS.contains(&embedding_provider) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                embedding_provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        let pipeline = &self.pipeline;
        if pipeline.chunk_size == 0 {
            return Err(AppError::Config("chunkSize must be positive".to_string()));
        }
        if pipeline.chunk_overlap >= pipeline.chunk_size {
            return Err(AppError::Config(format!(
                "chunkOverlap ({}) must be smaller than chunkSize ({})",
                pipeline.chunk_overlap, pipeline.chunk_size
            )));
        }
        if pipeline.top_k == 0 {
            return Err(AppError::Config("topK must be positive".to_string()));
        }
        if pipeline.max_questions == 0 {
            return Err(AppError::Config("maxQuestions must be positive".to_string()));
        }
        if pipeline.answer_concurrency == 0 {
            return Err(AppError::Config(
                "answerConcurrency must be positive".to_string(),
            ));
        }
        if pipeline.max_prompt_chars < MIN_CONTEXT_BUDGET {
            return Err(AppError::Config(format!(
                "maxPromptChars must be at least {}",
                MIN_CONTEXT_BUDGET
            )));
        }

        if self.cache.capacity == 0 {
            return Err(AppError::Config("cache capacity must be positive".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(AppError::Config("maxAttempts must be positive".to_string()));
        }
        if self.retry.multiplier < 1.0 {
            return Err(AppError::Config(
                "retry multiplier must be at least 1.0".to_string(),
            ));
        }

        if provider == "gemini" && self.resolve_api_key().is_none() {
            return Err(AppError::Config(
                "Gemini provider requires an API key (DOCQA_API_KEY or GEMINI_API_KEY)"
                    .to_string(),
            ));
        }

        Ok(())
    }
}
