use super::{FsConfig, LogFormat, RuntimeConfig, S3Config};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "EVENTLAKE_";

/// Abstraction over environment-variable lookups so tests and embedders can
/// supply their own source of overrides.
pub trait EnvSource {
    /// Get `EVENTLAKE_{key}`
    fn get(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Storage backend
    if let Some(backend) = get_env_string(env, "STORAGE_BACKEND") {
        config.storage.backend = backend
            .parse()
            .context("Invalid EVENTLAKE_STORAGE_BACKEND value")?;
    }
    // Filesystem storage
    if let Some(path) = get_env_string(env, "STORAGE_PATH") {
        config.storage.fs.get_or_insert_with(FsConfig::default).path = path;
    }

    // S3 storage
    if let Some(bucket) = get_env_string(env, "S3_BUCKET") {
        ensure_s3(config).bucket = bucket;
    }
    if let Some(region) = get_env_string(env, "S3_REGION") {
        ensure_s3(config).region = region;
    }
    if let Some(endpoint) = get_env_string(env, "S3_ENDPOINT") {
        ensure_s3(config).endpoint = Some(endpoint);
    }
    if let Some(prefix) = get_env_string(env, "S3_PREFIX") {
        ensure_s3(config).prefix = normalize_prefix(prefix);
    }

    // Dataset layout
    if let Some(path) = get_env_string(env, "DATASET_PATH") {
        config.dataset.path = path;
    }
    if let Some(val) = get_env_usize(env, "ROW_GROUP_SIZE")? {
        config.dataset.row_group_size = val;
    }

    // Generator
    if let Some(val) = get_env_usize(env, "GENERATOR_ROWS")? {
        config.generator.rows = val;
    }
    if let Some(val) = get_env_u64(env, "GENERATOR_USER_MODULUS")? {
        config.generator.user_modulus = val;
    }
    if let Some(start) = get_env_string(env, "GENERATOR_START") {
        config.generator.start = start;
    }
    if let Some(val) = get_env_bool(env, "GENERATOR_OVERWRITE")? {
        config.generator.overwrite = val;
    }

    // Scan / pipeline
    if let Some(val) = get_env_usize(env, "CHUNK_ROWS")? {
        config.scan.chunk_rows = val;
    }
    if let Some(path) = get_env_string(env, "PIPELINE_OUTPUT_PATH") {
        config.pipeline.output_path = path;
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.logging.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn ensure_s3(config: &mut RuntimeConfig) -> &mut S3Config {
    config.storage.s3.get_or_insert_with(|| S3Config {
        bucket: String::new(),
        region: String::new(),
        endpoint: None,
        prefix: None,
    })
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key)
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn normalize_prefix(prefix: String) -> Option<String> {
    if prefix.is_empty() {
        None
    } else if prefix.ends_with('/') {
        Some(prefix)
    } else {
        Some(format!("{}/", prefix))
    }
}
