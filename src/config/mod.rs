// eventlake configuration
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority, EVENTLAKE_* prefix)
// 2. Config file path from EVENTLAKE_CONFIG env var
// 3. Config file contents from EVENTLAKE_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.eventlake.toml)
// 5. Built-in defaults (lowest priority)
//
// CLI flags are applied on top by the binary.

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            fs: Some(FsConfig::default()),
            s3: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    S3,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            "s3" | "aws" => Ok(StorageBackend::S3),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            _ => anyhow::bail!(
                "Unsupported storage backend: {}. Supported: fs, s3, memory",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Optional path prefix for all stored files (e.g., "demo/")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Location and file layout of the partitioned dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub path: String,
    pub row_group_size: usize,
}

fn default_row_group_size() -> usize {
    crate::encoding::DEFAULT_ROW_GROUP_SIZE
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: "events".to_string(),
            row_group_size: default_row_group_size(),
        }
    }
}

/// Synthetic data generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub rows: usize,
    pub user_modulus: u64,
    /// Timestamp of the first event, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`
    pub start: String,
    pub overwrite: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            rows: 100_000,
            user_modulus: 1234,
            start: "2025-01-01T00:00:00".to_string(),
            overwrite: false,
        }
    }
}

impl GeneratorConfig {
    pub fn start_timestamp(&self) -> crate::Result<NaiveDateTime> {
        let raw = self.start.trim();
        raw.parse::<NaiveDateTime>()
            .ok()
            .or_else(|| {
                raw.parse::<NaiveDate>()
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .ok_or_else(|| {
                crate::DatasetError::invalid_config(format!(
                    "generator.start '{}' is not a timestamp (YYYY-MM-DDTHH:MM:SS)",
                    self.start
                ))
            })
    }
}

/// Scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Upper bound on rows per streamed chunk
    pub chunk_rows: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { chunk_rows: 8192 }
    }
}

/// Chunked aggregation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding partial aggregate artifacts of the current run
    pub output_path: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_path: "agg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Load configuration from all sources with priority.
    /// A missing config file falls back to defaults; a malformed one is an error.
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default()
    }

    /// Merge another config into this one (used for TOML layering).
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.storage = other.storage;
        self.dataset = other.dataset;
        self.generator = other.generator;
        self.scan = other.scan;
        self.pipeline = other.pipeline;
        self.logging = other.logging;
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Build a configuration from inline TOML plus overrides supplied by an
    /// `EnvSource`, without touching the host environment or filesystem.
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        let mut config = RuntimeConfig::default();

        if let Some(inline) = inline_config {
            let file_config: RuntimeConfig =
                toml::from_str(inline).context("Failed to parse inline config content")?;
            config.merge(file_config);
        }

        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
