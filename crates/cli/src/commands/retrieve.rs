//! Retrieve command handler.
//!
//! Shows which chunks a question retrieves, without calling the language model.

use clap::Args;
use docqa_core::{config::AppConfig, AppResult};
use docqa_knowledge::QaPipeline;

/// Show the chunks retrieved for a question
#[derive(Args, Debug)]
pub struct RetrieveCommand {
    /// Document URL or local path
    #[arg(short, long)]
    pub document: String,

    /// The question to retrieve chunks for
    pub question: String,

    /// Number of chunks (default: configured top-k)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl RetrieveCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing retrieve command");

        let api_key = config.resolve_api_key();
        let pipeline = QaPipeline::from_config(config, api_key.as_deref()).await?;
        let k = self.top_k.unwrap_or(pipeline.settings().top_k);

        let report = pipeline.retrieve(&self.document, &self.question, k).await?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!(
            "Document {} ({} chunks, {} embeddings)",
            &report.document_fingerprint[..12.min(report.document_fingerprint.len())],
            report.chunk_count,
            report.embedding_mode
        );
        println!();

        for (rank, scored) in report.results.iter().enumerate() {
            println!(
                "#{} score {:.3} chunk {} [{}..{}]",
                rank + 1,
                scored.score,
                scored.chunk.index,
                scored.chunk.start,
                scored.chunk.end
            );
            println!("{}", scored.chunk.text);
            println!();
        }

        Ok(())
    }
}
