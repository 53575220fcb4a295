//! Configuration parsing and validation.
//!
//! DocChat is configured with a TOML file (default `./config/dchat.toml`).
//! Only `[db]` is required; every other section falls back to defaults.
//!
//! ```toml
//! [db]
//! path = "./data/dchat.sqlite"
//!
//! [chunking]
//! chunk_size = 1000
//! overlap = 200
//!
//! [retrieval]
//! top_k = 5
//! metric = "cosine"
//! empty_result_policy = "proceed"
//!
//! [embedding]
//! provider = "openai"            # disabled | openai | hash
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [completion]
//! provider = "anthropic"         # disabled | anthropic | openai | echo
//! model = "claude-3-sonnet-20240229"
//!
//! [chat]
//! system_directive = "Answer from the provided documents."
//!
//! [log]
//! level = "info"
//! ```
//!
//! API keys are never read from the file; see
//! [`EmbeddingConfig`] and [`CompletionConfig`] for the environment
//! variables used.

use anyhow::{bail, Context, Result};
use docchat_core::chat::EmptyRetrievalPolicy;
use docchat_core::embedding::DistanceMetric;
use docchat_core::session::SessionSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub metric: DistanceMetric,
    /// Characters of each retrieved chunk shown to the model.
    #[serde(default = "default_chunk_char_limit")]
    pub chunk_char_limit: Option<usize>,
    #[serde(default)]
    pub empty_result_policy: EmptyRetrievalPolicy,
    /// Added to the prompt when retrieval finds nothing.
    #[serde(default)]
    pub empty_context_notice: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            metric: DistanceMetric::default(),
            chunk_char_limit: default_chunk_char_limit(),
            empty_result_policy: EmptyRetrievalPolicy::default(),
            empty_context_notice: None,
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_chunk_char_limit() -> Option<usize> {
    Some(500)
}

/// Embedding provider settings. The `openai` provider reads its key from
/// `OPENAI_API_KEY`.
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            base_url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

/// Completion provider settings. `anthropic` reads `ANTHROPIC_API_KEY`,
/// `openai` reads `OPENAI_API_KEY`.
#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Override the API endpoint, e.g. an OpenAI-compatible gateway.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_completion_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            base_url: None,
            max_retries: default_completion_max_retries(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_completion_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "claude-3-sonnet-20240229".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_completion_max_retries() -> u32 {
    2
}
fn default_completion_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default)]
    pub system_directive: Option<String>,
    /// Prompt budget in estimated tokens.
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_directive: None,
            context_budget: default_context_budget(),
        }
    }
}

fn default_context_budget() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Settings new sessions are created with.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            model: self.completion.model.clone(),
            temperature: self.completion.temperature,
            max_tokens: self.completion.max_tokens,
            system_directive: self.chat.system_directive.clone(),
            retrieval_k: self.retrieval.top_k,
            context_budget: self.chat.context_budget,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
            config.chunking.overlap,
            config.chunking.chunk_size
        );
    }

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider == "openai" && config.embedding.model.is_none() {
            bail!("embedding.model must be specified when provider is 'openai'");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "hash" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or hash.",
            other
        ),
    }

    match config.completion.provider.as_str() {
        "disabled" | "anthropic" | "openai" | "echo" => {}
        other => bail!(
            "Unknown completion provider: '{}'. Must be disabled, anthropic, openai, or echo.",
            other
        ),
    }

    if !(0.0..=2.0).contains(&config.completion.temperature) {
        bail!("completion.temperature must be in [0.0, 2.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"./data/dchat.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.metric, DistanceMetric::Cosine);
        assert_eq!(config.completion.model, "claude-3-sonnet-20240229");
        assert_eq!(config.completion.max_tokens, 4000);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.log.level, "info");

        let settings = config.session_settings();
        assert_eq!(settings.retrieval_k, 5);
        assert!((settings.temperature - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let err = parse(
            "[db]\npath = \"x.sqlite\"\n[chunking]\nchunk_size = 100\noverlap = 100\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_enabled_embedding_requires_dims() {
        let err = parse("[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"hash\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_unknown_completion_provider() {
        let err = parse("[db]\npath = \"x.sqlite\"\n[completion]\nprovider = \"gpt\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown completion provider"));
    }

    #[test]
    fn test_policy_and_metric_parse() {
        let config = parse(
            "[db]\npath = \"x.sqlite\"\n[retrieval]\nmetric = \"l2\"\nempty_result_policy = \"decline\"\n",
        )
        .unwrap();
        assert_eq!(config.retrieval.metric, DistanceMetric::L2);
        assert_eq!(
            config.retrieval.empty_result_policy,
            EmptyRetrievalPolicy::Decline
        );
    }
}
