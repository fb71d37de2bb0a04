// Configuration source loading.
//
// Priority order:
// 1. Environment variables (EVENTLAKE_* prefix)
// 2. Config file path from EVENTLAKE_CONFIG
// 3. Inline config content from EVENTLAKE_CONFIG_CONTENT
// 4. Default config files (./config.toml, ./.eventlake.toml)
// 5. Built-in defaults

use super::env_overrides::{self, EnvSource, ENV_PREFIX};
use super::RuntimeConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_FILES: [&str; 2] = ["./config.toml", "./.eventlake.toml"];

fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var("EVENTLAKE_CONFIG") {
        return parse_file(Path::new(&path)).map(Some);
    }

    if let Ok(content) = env::var("EVENTLAKE_CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content)
            .context("Failed to parse inline config from EVENTLAKE_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    first_existing(&DEFAULT_CONFIG_FILES)
}

/// Parse the first candidate that exists. Only absence falls through.
fn first_existing<P: AsRef<Path>>(candidates: &[P]) -> Result<Option<RuntimeConfig>> {
    for path in candidates {
        let path = path.as_ref();
        if path.exists() {
            return parse_file(path).map(Some);
        }
    }
    Ok(None)
}

fn parse_file(path: &Path) -> Result<RuntimeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let file_config = parse_file(path.as_ref())?;

    let mut config = RuntimeConfig::default();
    config.merge(file_config);

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration with graceful fallback to defaults.
/// Uses defaults when no config file exists; a file that exists but cannot
/// be read or parsed is an error.
pub fn load_or_default() -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::default();

    if let Some(file_config) = load_from_file()? {
        config.merge(file_config);
    }

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}
