//! Configuration management for Ragstore.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - Config file (`<data_dir>/.ragstore/config.yaml` or `RAGSTORE_CONFIG`)
//! - Environment variables
//! - Command-line flags (`with_overrides`)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Embedding providers the factory knows how to build.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["mock", "ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory for all persisted state
    pub data_dir: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Index manager settings
    pub index: IndexSettings,

    /// Embedding provider settings
    pub embedding: EmbeddingSettings,

    /// Chunking settings for the ingestion path
    pub ingest: IngestSettings,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Settings for the owner-partitioned index manager.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexSettings {
    /// Directory holding one persisted artifact directory per owner.
    /// Relative paths resolve against `data_dir`.
    #[serde(rename = "vectorsDir")]
    pub vectors_dir: PathBuf,

    /// Prefix of every owner directory name
    #[serde(rename = "namespacePrefix")]
    pub namespace_prefix: String,

    /// SQLite file backing the canonical chunk store
    #[serde(rename = "chunkDb")]
    pub chunk_db: PathBuf,

    /// Load every persisted owner when the registry starts
    #[serde(rename = "eagerLoad")]
    pub eager_load: bool,

    /// Result count used when the caller does not ask for one
    #[serde(rename = "defaultTopK")]
    pub default_top_k: usize,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Provider name: "mock" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Provider base URL, when the provider talks HTTP
    pub endpoint: Option<String>,
}

/// Chunking parameters for ingested documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestSettings {
    #[serde(rename = "chunkSize")]
    pub chunk_size: usize,

    #[serde(rename = "chunkOverlap")]
    pub chunk_overlap: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            vectors_dir: PathBuf::from("vectors"),
            namespace_prefix: "owner_".to_string(),
            chunk_db: PathBuf::from("chunks.sqlite"),
            eager_load: true,
            default_top_k: 6,
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(), // Offline-first default
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1200,
            chunk_overlap: 200,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    index: Option<IndexSettings>,
    embedding: Option<EmbeddingSettings>,
    ingest: Option<IngestSettings>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            index: IndexSettings::default(),
            embedding: EmbeddingSettings::default(),
            ingest: IngestSettings::default(),
            log_level: None,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file, and environment variables.
    ///
    /// Environment variables:
    /// - `RAGSTORE_DATA_DIR`: Root directory for persisted state
    /// - `RAGSTORE_CONFIG`: Path to config file
    /// - `RAGSTORE_VECTORS_DIR`: Override the artifact directory
    /// - `RAGSTORE_EMBEDDING_PROVIDER`: Embedding provider
    /// - `RAGSTORE_EMBEDDING_MODEL`: Embedding model
    /// - `OLLAMA_URL`: Ollama endpoint when none is configured
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(data_dir) = std::env::var("RAGSTORE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(config_file) = std::env::var("RAGSTORE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        config = config.apply_file()?;

        if let Ok(vectors_dir) = std::env::var("RAGSTORE_VECTORS_DIR") {
            config.index.vectors_dir = PathBuf::from(vectors_dir);
        }

        if let Ok(provider) = std::env::var("RAGSTORE_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }

        if let Ok(model) = std::env::var("RAGSTORE_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }

        if config.embedding.endpoint.is_none() {
            config.embedding.endpoint = std::env::var("OLLAMA_URL").ok();
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge the config file, if one exists, into this config.
    fn apply_file(self) -> AppResult<Self> {
        let config_path = match self.config_file {
            Some(ref cf) => cf.clone(),
            None => self.ragstore_dir().join("config.yaml"),
        };

        if !config_path.exists() {
            if self.config_file.is_some() {
                return Err(AppError::Config(format!(
                    "Config file does not exist: {:?}",
                    config_path
                )));
            }
            return Ok(self);
        }

        self.merge_yaml(&config_path)
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(index) = config_file.index {
            result.index = index;
        }

        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }

        if let Some(ingest) = config_file.ingest {
            result.ingest = ingest;
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
    /// CLI flags take precedence over environment variables and the config file.
    pub fn with_overrides(
        mut self,
        data_dir: Option<PathBuf>,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> AppResult<Self> {
        // A new data dir or config path means a different config file
        let reload_file = data_dir.is_some() || config_file.is_some();

        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if reload_file {
            self = self.apply_file()?;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        Ok(self)
    }

    /// Get the path to the .ragstore directory.
    pub fn ragstore_dir(&self) -> PathBuf {
        self.data_dir.join(".ragstore")
    }

    /// Directory holding every owner's persisted artifact.
    pub fn vectors_dir(&self) -> PathBuf {
        self.resolve(&self.index.vectors_dir)
    }

    /// Path of the canonical chunk store database.
    pub fn chunk_db_path(&self) -> PathBuf {
        self.resolve(&self.index.chunk_db)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    /// Validate settings that would otherwise fail deep inside an operation.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.embedding.provider.as_str();
        if !KNOWN_EMBEDDING_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if self.index.namespace_prefix.is_empty()
            || self.index.namespace_prefix.contains(std::path::is_separator)
        {
            return Err(AppError::Config(format!(
                "Invalid namespace prefix: {:?}",
                self.index.namespace_prefix
            )));
        }

        if self.index.default_top_k == 0 {
            return Err(AppError::Config("defaultTopK must be at least 1".to_string()));
        }

        if self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return Err(AppError::Config(format!(
                "chunkOverlap ({}) must be smaller than chunkSize ({})",
                self.ingest.chunk_overlap, self.ingest.chunk_size
            )));
        }

        Ok(())
    }
}
