// Configuration validation
//
// Validates that required fields are present and values are sensible

use super::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_storage_config(&config.storage)?;
    validate_dataset_config(&config.dataset)?;
    validate_generator_config(&config.generator)?;

    if config.scan.chunk_rows == 0 {
        bail!("scan.chunk_rows must be greater than 0");
    }

    validate_output_path(&config.dataset.path, &config.pipeline.output_path)?;

    Ok(())
}

fn validate_dataset_config(config: &DatasetConfig) -> Result<()> {
    if config.path.trim_matches('/').is_empty() {
        bail!("dataset.path must not be empty");
    }

    if config.row_group_size == 0 {
        bail!("dataset.row_group_size must be greater than 0");
    }

    if config.row_group_size > 1024 * 1024 {
        warn!(
            row_group_size = config.row_group_size,
            "dataset.row_group_size is very large; may cause memory issues"
        );
    }

    Ok(())
}

fn validate_generator_config(config: &GeneratorConfig) -> Result<()> {
    if config.rows == 0 {
        bail!("generator.rows must be greater than 0");
    }

    if config.user_modulus == 0 {
        bail!("generator.user_modulus must be greater than 0");
    }

    config.start_timestamp()?;

    if config.rows > 50_000_000 {
        warn!(
            rows = config.rows,
            "generator.rows is very large; the table is built in memory"
        );
    }

    Ok(())
}

/// Artifacts are deleted at the start of every aggregation run, so they may
/// never share a directory tree with the dataset.
fn validate_output_path(dataset: &str, output: &str) -> Result<()> {
    if let Err(e) = crate::partition::ensure_disjoint_output(dataset, output) {
        bail!(
            "Invalid pipeline.output_path: {}\n\n\
            How to fix:\n\
              • Environment: export {}PIPELINE_OUTPUT_PATH=agg\n\
              • TOML: [pipeline]\n              output_path = \"agg\"\n",
            e,
            ENV_PREFIX
        );
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<()> {
    match config.backend {
        StorageBackend::Fs => {
            let fs = config
                .fs
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("fs storage backend requires 'fs' configuration"))?;

            if fs.path.is_empty() {
                bail!(
                    "Filesystem path is required\n\n\
                    How to fix:\n\
                      • Environment: export {}STORAGE_PATH=./data\n\
                      • TOML: [storage.fs]\n              path = \"./data\"\n",
                    ENV_PREFIX
                );
            }
        }
        StorageBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("s3 storage backend requires 's3' configuration"))?;

            if s3.bucket.is_empty() {
                bail!(
                    "S3 bucket name is required\n\n\
                    How to fix:\n\
                      • Environment: export {}S3_BUCKET=my-bucket\n\
                      • TOML: [storage.s3]\n              bucket = \"my-bucket\"\n",
                    ENV_PREFIX
                );
            }

            if s3.region.is_empty() {
                bail!(
                    "S3 region is required\n\n\
                    How to fix:\n\
                      • Environment: export {}S3_REGION=us-west-2\n\
                      • TOML: [storage.s3]\n              region = \"us-west-2\"\n",
                    ENV_PREFIX
                );
            }
        }
        StorageBackend::Memory => {}
    }

    Ok(())
}
