//! DocQA CLI
//!
//! Main entry point for the docqa command-line tool.
//! Answers questions about a document with retrieval-augmented generation.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ConfigCommand, RetrieveCommand};
use docqa_core::config::{AppConfig, LogFormat};
use docqa_core::{logging, AppError, AppResult};
use std::path::PathBuf;

/// DocQA - answer questions about a document
#[derive(Parser, Debug)]
#[command(name = "docqa")]
#[command(about = "Answer questions about a document with retrieval-augmented generation", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "DOCQA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, gemini)
    #[arg(short, long, global = true, env = "DOCQA_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "DOCQA_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer questions about a document
    Ask(AskCommand),

    /// Show the chunks retrieved for a question, without calling the LLM
    Retrieve(RetrieveCommand),

    /// Show the effective configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let log_format = cli
        .log_format
        .as_deref()
        .map(|s| {
            LogFormat::parse(s)
                .ok_or_else(|| AppError::Config(format!("Unknown log format: {}", s)))
        })
        .transpose()?;

    // Load configuration from file and environment, then apply CLI overrides
    let config = AppConfig::load_from(cli.config.as_deref())?.with_overrides(
        cli.provider,
        cli.model,
        cli.log_level,
        log_format,
        cli.verbose,
        cli.no_color,
    );

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.log_format, config.no_color)?;

    tracing::info!("DocQA CLI starting");
    tracing::debug!("LLM: {} ({})", config.llm.provider, config.llm.model);
    tracing::debug!("Embeddings: {}", config.embedding.provider);

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Retrieve(_) => "retrieve",
        Commands::Config(_) => "config",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Retrieve(cmd) => cmd.execute(&config).await,
        Commands::Config(cmd) => cmd.execute(&config),
    };

    match result {
        Ok(()) => {
            tracing::info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            let report = e.report();
            eprintln!("error[{}]: {}", report.kind, report.message);
            std::process::exit(1);
        }
    }
}
