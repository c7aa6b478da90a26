//! TOML configuration parsing and validation.
//!
//! All tunables live in a single file (default `./config/pdfchat.toml`).
//! API keys are never read from the file; providers pull them from the
//! environment when they are constructed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable that marks a hosted (Azure App Service) deployment.
pub const HOSTED_ENV_MARKER: &str = "WEBSITE_SITE_NAME";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: ProviderConfig,
    #[serde(default = "default_chat_config")]
    pub chat: ProviderConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Used instead of `path` when running on the hosted platform.
    #[serde(default)]
    pub hosted_path: Option<PathBuf>,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_collection() -> String {
    "documents".to_string()
}

impl StoreConfig {
    /// Resolve the database path for the current environment.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.hosted_path {
            Some(hosted) if std::env::var_os(HOSTED_ENV_MARKER).is_some() => hosted.clone(),
            _ => self.path.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> usize {
    crate::chunk::DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub pdf_top_k: usize,
    #[serde(default = "default_top_k")]
    pub conversation_top_k: usize,
    /// Abort the turn when retrieval fails instead of answering without context.
    #[serde(default)]
    pub fail_on_error: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            pdf_top_k: default_top_k(),
            conversation_top_k: default_top_k(),
            fail_on_error: false,
        }
    }
}

fn default_top_k() -> usize {
    3
}

/// Settings shared by the embedding and chat gateways.
///
/// `model` is the OpenAI model name for `provider = "openai"` and the
/// deployment name for `provider = "azure"`.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            endpoint: None,
            api_version: None,
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_chat_config() -> ProviderConfig {
    ProviderConfig {
        timeout_secs: 60,
        ..ProviderConfig::default()
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_temperature() -> f32 {
    0.4
}
fn default_timeout_secs() -> u64 {
    30
}

impl ProviderConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    fn validate(&self, section: &str) -> Result<()> {
        match self.provider.as_str() {
            "disabled" => return Ok(()),
            "openai" | "azure" => {}
            other => anyhow::bail!(
                "Unknown {section} provider: '{}'. Must be disabled, openai, or azure.",
                other
            ),
        }
        if self.model.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!(
                "{section}.model must be specified when provider is '{}'",
                self.provider
            );
        }
        if self.provider == "azure" {
            if self.endpoint.is_none() {
                anyhow::bail!("{section}.endpoint is required for the azure provider");
            }
            if self.api_version.is_none() {
                anyhow::bail!("{section}.api_version is required for the azure provider");
            }
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("{section}.timeout_secs must be > 0");
        }
        Ok(())
    }
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
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// In-code defaults with a relative database path and disabled providers.
    pub fn minimal() -> Self {
        Self {
            store: StoreConfig {
                path: PathBuf::from("./data/pdfchat.sqlite"),
                hosted_path: None,
                collection: default_collection(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: ProviderConfig::default(),
            chat: default_chat_config(),
            server: ServerConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.store.collection.trim().is_empty() {
            anyhow::bail!("store.collection must not be empty");
        }
        if self.retrieval.pdf_top_k == 0 || self.retrieval.conversation_top_k == 0 {
            anyhow::bail!("retrieval top-k values must be >= 1");
        }
        if !(0.0..=2.0).contains(&self.chat.temperature) {
            anyhow::bail!("chat.temperature must be in [0.0, 2.0]");
        }
        self.embedding.validate("embedding")?;
        self.chat.validate("chat")?;
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
