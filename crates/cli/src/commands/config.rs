//! Config command handler.
//!
//! Prints the effective configuration after merging defaults, config files,
//! environment variables, and CLI flags.

use clap::Args;
use ordinance_core::{config::AgentConfig, AppResult};

/// Show the effective configuration
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Output as JSON instead of YAML
    #[arg(long)]
    pub json: bool,
}

impl ConfigCommand {
    /// Execute the config command.
    pub fn execute(&self, config: &AgentConfig) -> AppResult<()> {
        if self.json {
            let json = serde_json::to_string_pretty(config)
                .map_err(|e| ordinance_core::AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            let yaml = serde_yaml::to_string(config)
                .map_err(|e| ordinance_core::AppError::Serialization(e.to_string()))?;
            println!("{}", yaml);
        }

        Ok(())
    }
}
