//! eventlake - synthetic partitioned event datasets on object storage
//!
//! Generates a Hive-style partitioned Parquet dataset
//! (`event_date=YYYY-MM-DD/country=XX/part-0.parquet`), scans it with
//! partition pruning and column projection, aggregates it chunk by chunk
//! through persisted partial results, and normalizes columns to text.
//!
//! Every storage access goes through an explicitly passed OpenDAL
//! [`opendal::Operator`], so the same code runs against a local directory,
//! S3 or memory.

pub mod config;
pub mod encoding;
pub mod error;
pub mod generator;
pub mod init;
pub mod normalize;
pub mod partition;
pub mod pipeline;
pub mod predicate;
pub mod report;
pub mod scan;
pub mod schema;
pub mod storage;
pub mod timing;

pub use config::RuntimeConfig;
pub use error::{DatasetError, ErrorCode, Result};
pub use generator::{generate, EventSpec, GenerateSummary};
pub use init::{init_storage, init_tracing};
pub use normalize::{load_as_text, normalize_columns, NormalizedTable};
pub use pipeline::{
    partial_aggregate, reduce_partials, AggregatePipeline, AggregateRun, FinalAggregate, Stage,
};
pub use predicate::Predicate;
pub use scan::{ChunkStream, DatasetScanner, ScanRequest, ScanStats};
pub use schema::{ColumnKind, Value};
pub use timing::{timed, timed_blocking};
