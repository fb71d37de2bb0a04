// Initialization utilities
//
// Storage operator and logging/tracing setup

use crate::config::{LoggingConfig, LogFormat, StorageBackend, StorageConfig};
use crate::error::{DatasetError, Result};
use opendal::Operator;
use tracing::info;

/// Build the storage operator described by `config`.
pub fn init_storage(config: &StorageConfig) -> Result<Operator> {
    info!("Initializing storage backend: {}", config.backend);

    let operator = match config.backend {
        StorageBackend::Fs => {
            let fs = config.fs.as_ref().ok_or_else(|| {
                DatasetError::invalid_config("fs config required for filesystem backend")
            })?;
            info!("Using filesystem storage at: {}", fs.path);

            let fs_builder = opendal::services::Fs::default().root(&fs.path);
            Operator::new(fs_builder)
                .map_err(|e| {
                    DatasetError::storage(format!("Failed to create filesystem operator: {}", e))
                })?
                .finish()
        }
        StorageBackend::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                DatasetError::invalid_config("s3 config required for S3 backend")
            })?;
            info!(
                "Using S3 storage: bucket={}, region={}",
                s3.bucket, s3.region
            );

            let mut s3_builder = opendal::services::S3::default()
                .bucket(&s3.bucket)
                .region(&s3.region);

            if let Some(endpoint) = &s3.endpoint {
                s3_builder = s3_builder.endpoint(endpoint);
            }
            // The prefix becomes the operator root so dataset paths stay relative.
            if let Some(prefix) = &s3.prefix {
                s3_builder = s3_builder.root(prefix);
            }

            Operator::new(s3_builder)
                .map_err(|e| DatasetError::storage(format!("Failed to create S3 operator: {}", e)))?
                .finish()
        }
        StorageBackend::Memory => {
            info!("Using in-memory storage; data is discarded on exit");
            Operator::new(opendal::services::Memory::default())
                .map_err(|e| {
                    DatasetError::storage(format!("Failed to create memory operator: {}", e))
                })?
                .finish()
        }
    };

    tracing::debug!("Storage operator initialized");
    Ok(operator)
}

/// Initialize tracing/logging from the logging section
pub fn init_tracing(config: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    // Parse log level from config
    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Try to set the global subscriber; ignore error if already set (idempotent)
    let _ = match config.format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}
