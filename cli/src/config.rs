//! # Configuration Management
//!
//! This module handles loading and saving the askdb configuration: where the
//! knowledge base lives, which tables may be queried, and how to reach the
//! embedding model, the language model, the vector index and the database.
//!
//! ## Configuration File Location
//!
//! `$XDG_CONFIG_HOME/askdb/config.json`, falling back to
//! `$HOME/.config/askdb/config.json`. `--config <path>` overrides both.
//!
//! A missing file means defaults. Environment variables take precedence over
//! the file:
//!
//! - `ASKDB_KB_PATH`
//! - `ASKDB_DATABASE_URL`
//! - `ASKDB_LLM_MODEL`
//! - `ASKDB_EMBEDDING_MODEL`
//! - `ASKDB_OLLAMA_HOST` (applied to every Ollama endpoint)

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const KB_PATH_ENV_VAR: &str = "ASKDB_KB_PATH";
pub const DATABASE_URL_ENV_VAR: &str = "ASKDB_DATABASE_URL";
pub const LLM_MODEL_ENV_VAR: &str = "ASKDB_LLM_MODEL";
pub const EMBEDDING_MODEL_ENV_VAR: &str = "ASKDB_EMBEDDING_MODEL";
pub const OLLAMA_HOST_ENV_VAR: &str = "ASKDB_OLLAMA_HOST";

const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";

/// Tables the lab deployment allows queries against.
const DEFAULT_ALLOWED_TABLES: &[&str] = &[
    "o", "r", "sa", "rr", "ep", "tat", "c", "cti", "m", "i", "mc", "mac", "ao", "ar", "asa",
    "arr", "aep",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    /// Directory holding `<table>.json` files and the catalog index
    pub path: PathBuf,
    pub allowed_tables: Vec<String>,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./kb"),
            allowed_tables: DEFAULT_ALLOWED_TABLES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Embedding model configuration
///
/// # Supported Providers
///
/// - `ollama`: Local Ollama instance (default)
/// - `openai`: OpenAI-compatible embeddings API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub model: String,
    pub dimensions: usize,
    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: Some(DEFAULT_OLLAMA_ENDPOINT.to_string()),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            api_key_env: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn get_api_key(&self) -> Option<String> {
        self.api_key_env
            .as_ref()
            .and_then(|env_var| std::env::var(env_var).ok())
    }

    pub fn is_ready(&self) -> bool {
        self.provider == "ollama" || self.get_api_key().is_some()
    }
}

/// LLM configuration for SQL generation
///
/// # Supported Providers
///
/// - `ollama`: Local Ollama instance (default)
/// - `openai`: OpenAI API
/// - `anthropic`: Anthropic API
/// - `custom`: Custom OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub endpoint: String,
    pub model: String,
    /// API key stored in the file (api_key_env is preferred)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            api_key_env: None,
            timeout_seconds: 120,
        }
    }
}

impl LlmConfig {
    /// Get the API key from environment or config
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(ref env_var) = self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                return Some(key);
            }
        }
        self.api_key.clone()
    }

    /// Check if the LLM is configured and ready to use
    pub fn is_ready(&self) -> bool {
        // Ollama and custom endpoints may run without a key
        if self.provider == "ollama" || self.provider == "custom" {
            return true;
        }
        self.get_api_key().is_some()
    }

    /// Get a masked version of the API key for display
    pub fn masked_api_key(&self) -> Option<String> {
        self.get_api_key().map(|key| mask_secret(&key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Lancedb,
    /// In-process only; nothing survives the process.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub path: PathBuf,
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Lancedb,
            path: PathBuf::from(".askdb/schemas.lance"),
            collection: "lab_schema".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: DatabaseDriver,
    /// No database is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::Sqlite,
            url: None,
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 300,
            max_size: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: usize,
    pub examples_limit: usize,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            examples_limit: 3,
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

/// askdb configuration
///
/// Every section is optional in the file; absent sections take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub knowledge_base: KnowledgeBaseConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub index: IndexConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub query: QueryConfig,
}

impl Config {
    /// Load configuration and apply environment overrides.
    ///
    /// An explicit `path` must exist. The default location may be absent,
    /// in which case defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                if !path.exists() {
                    bail!("Config file not found: {}", path.display());
                }
                Self::load_from(path)?
            }
            None => match config_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Write the configuration, creating the parent directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory: {}", parent.display())
                })?;
            }
        }

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(KB_PATH_ENV_VAR) {
            self.knowledge_base.path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var(DATABASE_URL_ENV_VAR) {
            self.database.driver = driver_for_url(&url).unwrap_or(self.database.driver);
            self.database.url = Some(url);
        }
        if let Ok(model) = std::env::var(LLM_MODEL_ENV_VAR) {
            self.llm.model = model;
        }
        if let Ok(model) = std::env::var(EMBEDDING_MODEL_ENV_VAR) {
            self.embedding.model = model;
        }
        if let Ok(host) = std::env::var(OLLAMA_HOST_ENV_VAR) {
            if self.llm.provider == "ollama" {
                self.llm.endpoint = host.clone();
            }
            if self.embedding.provider == "ollama" {
                self.embedding.endpoint = Some(host);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.knowledge_base.allowed_tables.is_empty() {
            bail!("knowledge_base.allowed_tables must list at least one table");
        }
        if self.embedding.dimensions == 0 {
            bail!("embedding.dimensions must be greater than zero");
        }
        if self.query.max_limit == 0 {
            bail!("query.max_limit must be greater than zero");
        }
        Ok(())
    }
}

/// Infer the driver from a database URL scheme.
pub fn driver_for_url(url: &str) -> Option<DatabaseDriver> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        Some(DatabaseDriver::Postgres)
    } else if url.starts_with("sqlite:") {
        Some(DatabaseDriver::Sqlite)
    } else {
        None
    }
}

/// Mask a secret for display, keeping the first and last four characters.
pub fn mask_secret(secret: &str) -> String {
    if secret.len() > 8 {
        format!("{}...{}", &secret[..4], &secret[secret.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// Get the path to the default configuration file
pub fn config_path() -> Option<PathBuf> {
    dirs_config_dir().map(|dir| dir.join("askdb").join("config.json"))
}

/// Uses `$XDG_CONFIG_HOME`, else `$HOME/.config`, on all platforms.
fn dirs_config_dir() -> Option<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .or_else(|| std::env::var("USERPROFILE").ok())
                .map(|h| PathBuf::from(h).join(".config"))
        })
}
