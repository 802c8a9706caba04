//! Config command handler.
//!
//! Prints the effective configuration after file, environment and flags.

use clap::Args;
use docqa_core::{config::AppConfig, AppResult};

/// Show the effective configuration
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Output as JSON instead of YAML
    #[arg(long)]
    pub json: bool,
}

impl ConfigCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing config command");

        if let Err(e) = config.validate() {
            tracing::warn!("Configuration is not valid: {}", e);
        }

        if let Some(path) = &config.config_file {
            tracing::info!("Loaded from {:?}", path);
        }

        let api_key_set = config.resolve_api_key().is_some();

        if self.json {
            let output = serde_json::json!({
                "config": config,
                "apiKeySet": api_key_set,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print!("{}", serde_yaml::to_string(config)?);
            println!("# API key: {}", if api_key_set { "set" } else { "not set" });
        }

        Ok(())
    }
}
