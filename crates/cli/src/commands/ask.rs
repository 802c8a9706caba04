//! Ask command handler.
//!
//! Answers one or more questions about a document.

use clap::Args;
use docqa_core::{config::AppConfig, AppError, AppResult};
use docqa_knowledge::{QaPipeline, QueryRequest, QueryResponse};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Answer questions about a document
#[derive(Args, Debug)]
pub struct AskCommand {
    /// Document URL or local path
    #[arg(short, long)]
    pub document: String,

    /// Question to answer (repeat for several)
    #[arg(short = 'q', long = "question")]
    pub questions: Vec<String>,

    /// Read questions from a file, one per line
    #[arg(long)]
    pub questions_file: Option<PathBuf>,

    /// Chunks retrieved per question
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let mut config = config.clone();
        if let Some(top_k) = self.top_k {
            config.pipeline.top_k = top_k;
        }

        let questions = self.collect_questions()?;
        let api_key = config.resolve_api_key();
        let pipeline = Arc::new(QaPipeline::from_config(&config, api_key.as_deref()).await?);

        let response = pipeline
            .run(QueryRequest {
                document: self.document.clone(),
                questions: questions.clone(),
            })
            .await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else {
            print_answers(&questions, &response);
        }

        Ok(())
    }

    /// Questions from the flags followed by those in the questions file.
    fn collect_questions(&self) -> AppResult<Vec<String>> {
        let mut questions = self.questions.clone();

        if let Some(path) = &self.questions_file {
            questions.extend(read_questions_file(path)?);
        }

        if questions.is_empty() {
            return Err(AppError::InvalidRequest(
                "No questions provided. Use --question or --questions-file".to_string(),
            ));
        }

        Ok(questions)
    }
}

/// Non-blank lines, skipping `#` comments.
fn read_questions_file(path: &Path) -> AppResult<Vec<String>> {
    let content = std::fs::read_to_string(path)?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn print_answers(questions: &[String], response: &QueryResponse) {
    for (question, answer) in questions.iter().zip(&response.answers) {
        println!("Q: {}", question);
        println!("A: {}", answer);
        println!();
    }

    let metadata = &response.metadata;
    tracing::info!(
        request_id = %metadata.request_id,
        chunks = metadata.chunk_count,
        elapsed_ms = metadata.elapsed_ms,
        cache_hit = metadata.cache_hit,
        fallbacks = metadata.fallback_count,
        "Answered {} questions",
        metadata.question_count
    );
}
