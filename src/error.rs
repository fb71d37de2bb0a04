//! Error types for dataset generation, scanning and aggregation.

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Dataset location missing or without partitions
    E001StorageNotFound,
    /// E002: Stored data incompatible with the expected schema
    E002SchemaMismatch,
    /// E003: Generator destination already populated
    E003DestinationNotEmpty,
    /// E004: Configuration missing or invalid
    E004InvalidConfig,
    /// E005: Partial aggregate write failed
    E005ArtifactWrite,
    /// E006: Storage operation failed
    E006Storage,
    /// E007: Filter or projection rejected
    E007InvalidQuery,
    /// E008: Partition directory does not follow `key=value`
    E008InvalidPartitionPath,
    /// E009: Arrow or Parquet encoding failed
    E009Encoding,
    /// E010: Value outside the supported range or kinds
    E010Unsupported,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001StorageNotFound => "E001",
            Self::E002SchemaMismatch => "E002",
            Self::E003DestinationNotEmpty => "E003",
            Self::E004InvalidConfig => "E004",
            Self::E005ArtifactWrite => "E005",
            Self::E006Storage => "E006",
            Self::E007InvalidQuery => "E007",
            Self::E008InvalidPartitionPath => "E008",
            Self::E009Encoding => "E009",
            Self::E010Unsupported => "E010",
        }
    }
}

/// Errors that can occur while working with the partitioned dataset
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("[{code}] Dataset not found at '{path}': no partitions present")]
    StorageNotFound { code: &'static str, path: String },

    #[error("[{code}] Schema mismatch at '{path}': {reason}")]
    SchemaMismatch {
        code: &'static str,
        path: String,
        reason: String,
    },

    #[error("[{code}] Destination '{path}' already contains data; enable overwrite to replace it")]
    DestinationNotEmpty { code: &'static str, path: String },

    #[error("[{code}] Invalid configuration: {message}")]
    InvalidConfig { code: &'static str, message: String },

    /// The map phase stops at the first failed chunk.
    #[error("[{code}] Failed to write partial aggregate for chunk {chunk} to '{path}': {message}")]
    ArtifactWrite {
        code: &'static str,
        chunk: usize,
        path: String,
        message: String,
    },

    #[error("[{code}] Storage operation failed: {message}")]
    Storage { code: &'static str, message: String },

    #[error("[{code}] Invalid predicate: {message}")]
    InvalidPredicate { code: &'static str, message: String },

    #[error("[{code}] Invalid projection: {message}")]
    InvalidProjection { code: &'static str, message: String },

    #[error("[{code}] Invalid partition path '{path}': {reason}")]
    InvalidPartitionPath {
        code: &'static str,
        path: String,
        reason: String,
    },

    #[error("[{code}] Encoding failed: {message}")]
    Encoding { code: &'static str, message: String },

    #[error("[{code}] Unsupported column type for '{column}': {data_type}")]
    UnsupportedType {
        code: &'static str,
        column: String,
        data_type: String,
    },

    #[error("[{code}] Sum overflow while aggregating user_id {user_id}")]
    AggregateOverflow { code: &'static str, user_id: i64 },
}

impl DatasetError {
    pub fn storage_not_found(path: impl Into<String>) -> Self {
        Self::StorageNotFound {
            code: ErrorCode::E001StorageNotFound.as_str(),
            path: path.into(),
        }
    }

    pub fn schema_mismatch(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            code: ErrorCode::E002SchemaMismatch.as_str(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn destination_not_empty(path: impl Into<String>) -> Self {
        Self::DestinationNotEmpty {
            code: ErrorCode::E003DestinationNotEmpty.as_str(),
            path: path.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            code: ErrorCode::E004InvalidConfig.as_str(),
            message: message.into(),
        }
    }

    pub fn artifact_write(chunk: usize, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ArtifactWrite {
            code: ErrorCode::E005ArtifactWrite.as_str(),
            chunk,
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            code: ErrorCode::E006Storage.as_str(),
            message: message.into(),
        }
    }

    pub fn invalid_predicate(message: impl Into<String>) -> Self {
        Self::InvalidPredicate {
            code: ErrorCode::E007InvalidQuery.as_str(),
            message: message.into(),
        }
    }

    pub fn invalid_projection(message: impl Into<String>) -> Self {
        Self::InvalidProjection {
            code: ErrorCode::E007InvalidQuery.as_str(),
            message: message.into(),
        }
    }

    pub fn invalid_partition_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPartitionPath {
            code: ErrorCode::E008InvalidPartitionPath.as_str(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            code: ErrorCode::E009Encoding.as_str(),
            message: message.into(),
        }
    }

    pub fn unsupported_type(column: impl Into<String>, data_type: impl ToString) -> Self {
        Self::UnsupportedType {
            code: ErrorCode::E010Unsupported.as_str(),
            column: column.into(),
            data_type: data_type.to_string(),
        }
    }

    pub fn aggregate_overflow(user_id: i64) -> Self {
        Self::AggregateOverflow {
            code: ErrorCode::E010Unsupported.as_str(),
            user_id,
        }
    }

    /// Stable error code of this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::StorageNotFound { code, .. }
            | Self::SchemaMismatch { code, .. }
            | Self::DestinationNotEmpty { code, .. }
            | Self::InvalidConfig { code, .. }
            | Self::ArtifactWrite { code, .. }
            | Self::Storage { code, .. }
            | Self::InvalidPredicate { code, .. }
            | Self::InvalidProjection { code, .. }
            | Self::InvalidPartitionPath { code, .. }
            | Self::Encoding { code, .. }
            | Self::UnsupportedType { code, .. }
            | Self::AggregateOverflow { code, .. } => code,
        }
    }
}

impl From<arrow::error::ArrowError> for DatasetError {
    fn from(e: arrow::error::ArrowError) -> Self {
        DatasetError::encoding(format!("arrow: {}", e))
    }
}

impl From<parquet::errors::ParquetError> for DatasetError {
    fn from(e: parquet::errors::ParquetError) -> Self {
        DatasetError::encoding(format!("parquet: {}", e))
    }
}

/// Result type alias for DatasetError
pub type Result<T> = std::result::Result<T, DatasetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_carry_codes() {
        let err = DatasetError::storage_not_found("events");
        assert_eq!(err.code(), "E001");
        assert!(err.to_string().starts_with("[E001]"));
        assert!(err.to_string().contains("events"));

        let err = DatasetError::artifact_write(3, "agg/part_3.parquet", "disk full");
        assert_eq!(err.code(), "E005");
        assert!(err.to_string().contains("chunk 3"));
    }

    #[test]
    fn predicate_and_projection_share_code() {
        assert_eq!(DatasetError::invalid_predicate("x").code(), "E007");
        assert_eq!(DatasetError::invalid_projection("x").code(), "E007");
    }
}
