//! TOML configuration with defaults for every key.
//!
//! A configuration file is optional: [`Config::default`] reproduces the
//! behaviour of a stock local setup (Ollama on `localhost:11434`, `llama2`,
//! 1000/200 chunking, top-3 retrieval, 4000-token context budget).
//!
//! ```toml
//! [ollama]
//! url = "http://localhost:11434"
//! model = "llama3.2"
//!
//! [chunking]
//! chunk_size = 1000
//! overlap = 200
//!
//! [retrieval]
//! top_k = 3
//! max_context_tokens = 4000
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//! ```
//!
//! The Ollama URL can be overridden with `OLLAMA_BASE_URL` (or the older
//! `OLLAMA_URL`), which takes precedence over the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub availability: AvailabilityConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: Option<f64>,
    #[serde(default = "default_generate_timeout")]
    pub generate_timeout_secs: u64,
    #[serde(default = "default_list_timeout")]
    pub list_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_model(),
            temperature: default_temperature(),
            generate_timeout_secs: default_generate_timeout(),
            list_timeout_secs: default_list_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

fn default_ollama_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}
fn default_model() -> String {
    "llama2".to_string()
}
fn default_temperature() -> Option<f64> {
    Some(0.1)
}
fn default_generate_timeout() -> u64 {
    60
}
fn default_list_timeout() -> u64 {
    10
}
fn default_probe_timeout() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AvailabilityConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout_secs: u64,
    #[serde(default = "default_pull_timeout")]
    pub pull_timeout_secs: u64,
    /// Match models by substring containment, as older releases did.
    #[serde(default)]
    pub legacy_substring_match: bool,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            wait_timeout_secs: default_wait_timeout(),
            pull_timeout_secs: default_pull_timeout(),
            legacy_substring_match: false,
        }
    }
}

impl AvailabilityConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }
}

fn default_poll_interval() -> u64 {
    5
}
fn default_wait_timeout() -> u64 {
    300
}
fn default_pull_timeout() -> u64 {
    1800
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
    crate::chunk::DEFAULT_CHUNK_SIZE
}
fn default_overlap() -> usize {
    crate::chunk::DEFAULT_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_max_context_tokens() -> usize {
    crate::prompt::DEFAULT_MAX_CONTEXT_TOKENS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider; defaults to `[ollama].url`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

impl Config {
    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `OLLAMA_BASE_URL` / `OLLAMA_URL` from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        let from_env = std::env::var("OLLAMA_BASE_URL")
            .or_else(|_| std::env::var("OLLAMA_URL"))
            .ok()
            .filter(|v| !v.trim().is_empty());
        if let Some(url) = from_env {
            self.ollama.url = url;
        }
        self.ollama.url = self.ollama.url.trim_end_matches('/').to_string();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k < 1 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }

        if self.retrieval.max_context_tokens == 0 {
            anyhow::bail!("retrieval.max_context_tokens must be > 0");
        }

        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        if self.availability.poll_interval_secs == 0 {
            anyhow::bail!("availability.poll_interval_secs must be > 0");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "local" => {}
            "ollama" => {
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    anyhow::bail!("embedding.dims must be > 0 when provider is 'ollama'");
                }
                if self.embedding.model.is_none() {
                    anyhow::bail!("embedding.model must be specified when provider is 'ollama'");
                }
            }
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, local, or ollama.",
                other
            ),
        }

        Ok(())
    }
}

/// Load the configuration file, or defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Config::from_toml(&content)?
        }
        None => Config::default(),
    };
    Ok(config.with_env_overrides())
}
