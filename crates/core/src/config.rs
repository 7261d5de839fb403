//! Configuration management for the Ordinance agent.
//!
//! This module handles loading and merging configuration from multiple
//! sources:
//! - Built-in defaults
//! - Config files (`.ordinance/config.yaml`)
//! - Environment variables
//! - Command-line flags
//!
//! The resulting [`AgentConfig`] is built once at startup and passed into the
//! pipeline phases explicitly; there is no global configuration object.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Main application configuration.
///
/// Holds every tunable the pipeline phases need, grouped by concern. Each
/// phase receives a reference to the section it cares about at construction
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path to the workspace root (contains .ordinance/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// External service endpoints
    pub endpoints: EndpointConfig,

    /// Model selection and temperatures per phase
    pub models: ModelConfig,

    /// Namespace names and per-namespace result limits
    pub retrieval: RetrievalConfig,

    /// Fuzzy-match thresholds and verification concurrency
    pub verification: VerificationConfig,

    /// Response shaping (source caps, excerpt budget)
    pub response: ResponseConfig,

    /// Feature flags
    pub features: FeatureFlags,

    /// Per-phase wall-clock budgets
    pub timeouts: TimeoutConfig,
}

/// External service endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointConfig {
    /// Ollama base URL (completions and embeddings)
    pub ollama_url: String,

    /// Document index (vector search) base URL
    pub index_url: String,

    /// Source locator service base URL
    pub locator_url: String,

    /// Optional API key forwarded to the index and locator services
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            index_url: "http://localhost:8000".to_string(),
            locator_url: "http://localhost:9200".to_string(),
            api_key: None,
        }
    }
}

/// Model selection per pipeline phase.
///
/// The planner handles clarification, the verifier handles semantic match
/// checks (a small, fast model is enough), and the synthesizer writes the
/// final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelConfig {
    pub planner: String,
    pub verifier: String,
    pub synthesizer: String,
    pub embedding: String,
    pub embedding_dimensions: usize,
    pub planner_temperature: f32,
    pub verifier_temperature: f32,
    pub synthesizer_temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            planner: "llama3.2".to_string(),
            verifier: "llama3.2".to_string(),
            synthesizer: "llama3.2".to_string(),
            embedding: "nomic-embed-text".to_string(),
            embedding_dimensions: 768,
            planner_temperature: 0.3,
            verifier_temperature: 0.0,
            synthesizer_temperature: 0.1,
        }
    }
}

/// Namespace configuration for the document index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrievalConfig {
    /// General municipal codes namespace
    pub general_namespace: String,

    /// User-uploaded documents namespace
    pub user_namespace: String,

    /// Company exceptions namespace
    pub company_namespace: String,

    /// Top-N for the general namespace
    pub general_limit: usize,

    /// Top-N for the user namespace
    pub user_limit: usize,

    /// Top-N for the company namespace
    pub company_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            general_namespace: "building-codes-general".to_string(),
            user_namespace: "user-documents".to_string(),
            company_namespace: "company-exceptions".to_string(),
            general_limit: 10,
            user_limit: 5,
            company_limit: 5,
        }
    }
}

/// Verification phase tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerificationConfig {
    /// Minimum fuzzy similarity before a candidate is worth a semantic check
    pub min_similarity: f64,

    /// Maximum fuzzy candidates to consider per citation
    pub max_candidates: usize,

    /// Maximum concurrent per-document verifications
    pub max_concurrent: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.5,
            max_candidates: 5,
            max_concurrent: 4,
        }
    }
}

/// Response shaping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResponseConfig {
    /// Maximum number of sources returned with an answer
    pub max_sources: usize,

    /// Character budget for source excerpts
    pub excerpt_length: usize,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_sources: 5,
            excerpt_length: 200,
        }
    }
}

/// Feature flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FeatureFlags {
    /// Search the user-documents and company-exceptions namespaces
    pub search_user_documents: bool,

    /// Surface clarifying questions when the query is underspecified
    pub interactive_clarification: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            search_user_documents: true,
            interactive_clarification: true,
        }
    }
}

/// Per-phase wall-clock budgets, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutConfig {
    pub clarify_secs: u64,
    pub retrieve_secs: u64,
    pub verify_secs: u64,
    pub synthesize_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            clarify_secs: 30,
            retrieve_secs: 45,
            verify_secs: 60,
            synthesize_secs: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn clarify(&self) -> Duration {
        Duration::from_secs(self.clarify_secs)
    }

    pub fn retrieve(&self) -> Duration {
        Duration::from_secs(self.retrieve_secs)
    }

    pub fn verify(&self) -> Duration {
        Duration::from_secs(self.verify_secs)
    }

    pub fn synthesize(&self) -> Duration {
        Duration::from_secs(self.synthesize_secs)
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    endpoints: Option<EndpointConfig>,
    models: Option<ModelConfig>,
    retrieval: Option<RetrievalConfig>,
    verification: Option<VerificationConfig>,
    response: Option<ResponseConfig>,
    features: Option<FeatureFlags>,
    timeouts: Option<TimeoutConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            endpoints: EndpointConfig::default(),
            models: ModelConfig::default(),
            retrieval: RetrievalConfig::default(),
            verification: VerificationConfig::default(),
            response: ResponseConfig::default(),
            features: FeatureFlags::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables and defaults.
    ///
    /// Environment variables:
    /// - `ORDINANCE_WORKSPACE`: Override workspace path
    /// - `ORDINANCE_CONFIG`: Path to config file
    /// - `ORDINANCE_OLLAMA_URL`: Ollama base URL
    /// - `ORDINANCE_INDEX_URL`: Document index base URL
    /// - `ORDINANCE_LOCATOR_URL`: Source locator base URL
    /// - `ORDINANCE_API_KEY`: API key for index/locator services
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("ORDINANCE_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("ORDINANCE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = if let Some(ref cf) = config.config_file {
            cf.clone()
        } else {
            config.workspace.join(".ordinance/config.yaml")
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override YAML config
        if let Ok(url) = std::env::var("ORDINANCE_OLLAMA_URL") {
            config.endpoints.ollama_url = url;
        }

        if let Ok(url) = std::env::var("ORDINANCE_INDEX_URL") {
            config.endpoints.index_url = url;
        }

        if let Ok(url) = std::env::var("ORDINANCE_LOCATOR_URL") {
            config.endpoints.locator_url = url;
        }

        if let Ok(key) = std::env::var("ORDINANCE_API_KEY") {
            config.endpoints.api_key = Some(key);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    ///
    /// Sections present in the file replace the corresponding defaults;
    /// fields omitted within a section keep their default values.
    fn merge_yaml(&mut self, path: &PathBuf) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(endpoints) = config_file.endpoints {
            result.endpoints = endpoints;
        }

        if let Some(models) = config_file.models {
            result.models = models;
        }

        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }

        if let Some(verification) = config_file.verification {
            result.verification = verification;
        }

        if let Some(response) = config_file.response {
            result.response = response;
        }

        if let Some(features) = config_file.features {
            result.features = features;
        }

        if let Some(timeouts) = config_file.timeouts {
            result.timeouts = timeouts;
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and config files.
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .ordinance directory.
    pub fn ordinance_dir(&self) -> PathBuf {
        self.workspace.join(".ordinance")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AppResult<()> {
        if self.retrieval.general_limit == 0 {
            return Err(AppError::Config(
                "retrieval.generalLimit must be at least 1".to_string(),
            ));
        }

        if self.response.max_sources == 0 {
            return Err(AppError::Config(
                "response.maxSources must be at least 1".to_string(),
            ));
        }

        if self.verification.max_concurrent == 0 {
            return Err(AppError::Config(
                "verification.maxConcurrent must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.verification.min_similarity) {
            return Err(AppError::Config(format!(
                "verification.minSimilarity must be within [0, 1], got {}",
                self.verification.min_similarity
            )));
        }

        if self.response.excerpt_length < 4 {
            return Err(AppError::Config(
                "response.excerptLength is too small to hold an ellipsis".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.retrieval.general_limit, 10);
        assert_eq!(config.retrieval.user_limit, 5);
        assert_eq!(config.response.max_sources, 5);
        assert_eq!(config.verification.min_similarity, 0.5);
        assert!(config.features.search_user_documents);
        assert!(!config.verbose);
    }

    #[test]
    fn test_default_timeouts() {
        let config = AgentConfig::default();
        assert_eq!(config.timeouts.clarify(), Duration::from_secs(30));
        assert_eq!(config.timeouts.retrieve(), Duration::from_secs(45));
        assert_eq!(config.timeouts.verify(), Duration::from_secs(60));
        assert_eq!(config.timeouts.synthesize(), Duration::from_secs(30));
    }

    #[test]
    fn test_merge_yaml_partial_section() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
retrieval:
  generalLimit: 20
response:
  maxSources: 3
logging:
  level: debug
"#,
        )
        .unwrap();

        let mut config = AgentConfig::default();
        let merged = config.merge_yaml(&path).unwrap();

        // Overridden fields
        assert_eq!(merged.retrieval.general_limit, 20);
        assert_eq!(merged.response.max_sources, 3);
        assert_eq!(merged.log_level, Some("debug".to_string()));

        // Omitted fields within a present section keep defaults
        assert_eq!(merged.retrieval.user_limit, 5);
        assert_eq!(merged.response.excerpt_length, 200);

        // Untouched sections keep defaults
        assert_eq!(merged.verification.max_concurrent, 4);
    }

    #[test]
    fn test_with_overrides() {
        let config = AgentConfig::default();
        let overridden = config.with_overrides(None, None, None, true, true);

        assert!(overridden.verbose);
        assert!(overridden.no_color);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_validate_rejects_zero_sources() {
        let mut config = AgentConfig::default();
        config.response.max_sources = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_similarity() {
        let mut config = AgentConfig::default();
        config.verification.min_similarity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_default_is_ok() {
        let config = AgentConfig::default();
        assert!(config.validate().is_ok());
    }
}
