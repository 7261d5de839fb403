//! Ask command handler.
//!
//! Runs the answering pipeline for a single question and prints the answer,
//! sources, and optional confidence to stdout.

use clap::Args;
use futures::StreamExt;
use ordinance_core::{config::AgentConfig, AppResult};
use ordinance_llm::{create_client, create_embedding_client};
use ordinance_pipeline::index::ChromaIndex;
use ordinance_pipeline::locator::HttpLocator;
use ordinance_pipeline::{Agent, AgentOptions, AgentResponse, Message};
use std::path::PathBuf;
use std::sync::Arc;

/// Ask a building-code question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Skip the clarification phase and use the raw question
    #[arg(long)]
    pub skip_clarification: bool,

    /// Include the aggregate confidence in the output
    #[arg(long)]
    pub confidence: bool,

    /// Maximum number of sources to include
    #[arg(long)]
    pub max_sources: Option<usize>,

    /// Stream the answer incrementally (default: true)
    #[arg(long, default_value = "true")]
    pub stream: bool,

    /// Disable streaming
    #[arg(long, conflicts_with = "stream")]
    pub no_stream: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AgentConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let question = self
            .get_question()
            .ok_or_else(|| ordinance_core::AppError::Config("No question provided".to_string()))?;

        let agent = build_agent(config)?;

        let options = AgentOptions {
            skip_clarification: self.skip_clarification,
            include_confidence: self.confidence,
            max_sources: self.max_sources,
        };

        let messages = vec![Message::user(question)];

        if self.is_streaming() && !self.json {
            self.handle_streaming(&agent, &messages, &options).await
        } else {
            self.handle_blocking(&agent, &messages, &options).await
        }
    }

    /// Run the pipeline to completion, then print.
    async fn handle_blocking(
        &self,
        agent: &Agent,
        messages: &[Message],
        options: &AgentOptions,
    ) -> AppResult<()> {
        let response = agent.invoke(messages, options).await;

        if self.json {
            let json = serde_json::to_string_pretty(&response)
                .map_err(|e| ordinance_core::AppError::Serialization(e.to_string()))?;
            println!("{}", json);
        } else {
            print_response(&response);
        }

        Ok(())
    }

    /// Print chunks as they arrive.
    async fn handle_streaming(
        &self,
        agent: &Agent,
        messages: &[Message],
        options: &AgentOptions,
    ) -> AppResult<()> {
        let mut stream = agent.stream(messages, options).await;

        while let Some(chunk) = stream.next().await {
            print!("{}", chunk);
            use std::io::Write;
            std::io::stdout().flush().ok();
        }

        println!();
        Ok(())
    }

    /// Get the question text from the argument or a file.
    fn get_question(&self) -> Option<String> {
        self.question.clone().or_else(|| {
            self.file.as_ref().and_then(|path| {
                std::fs::read_to_string(path)
                    .map_err(|e| tracing::error!("Failed to read question file: {}", e))
                    .ok()
            })
        })
    }

    /// Check if streaming is enabled.
    fn is_streaming(&self) -> bool {
        !self.no_stream && self.stream
    }
}

/// Wire the agent from configuration.
fn build_agent(config: &AgentConfig) -> AppResult<Agent> {
    let llm = create_client("ollama", Some(&config.endpoints.ollama_url))
        .map_err(ordinance_core::AppError::Config)?;

    let embeddings = create_embedding_client(
        "ollama",
        Some(&config.endpoints.ollama_url),
        &config.models.embedding,
        config.models.embedding_dimensions,
    )
    .map_err(ordinance_core::AppError::Config)?;

    let index = Arc::new(ChromaIndex::new(
        &config.endpoints.index_url,
        config.endpoints.api_key.clone(),
    ));

    let locator = Arc::new(HttpLocator::new(
        &config.endpoints.locator_url,
        config.endpoints.api_key.clone(),
    ));

    Agent::new(config, llm, embeddings, index, locator)
}

/// Print a completed response as plain text.
fn print_response(response: &AgentResponse) {
    println!("{}", response.content);

    if let Some(ref sources) = response.sources {
        if !sources.is_empty() {
            println!("\n---\n\nSources:");
            for source in sources {
                match source.page {
                    Some(page) => println!("- {} (Page {})", source.citation, page),
                    None => println!("- {}", source.citation),
                }
            }
        }
    }

    if let Some(confidence) = response.confidence {
        println!("\nConfidence: {:.0}%", confidence * 100.0);
    }
}
