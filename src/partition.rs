//! Hive-style partition paths.
//!
//! Leaves live at:
//! `{dataset}/event_date={YYYY-MM-DD}/country={country}/part-0.parquet`
//!
//! Partition values are recoverable from the path alone, which is what lets
//! the scanner prune directories without opening any file.

use crate::error::{DatasetError, Result};
use crate::schema::{self, Value, COUNTRY, EVENT_DATE};
use chrono::NaiveDate;

/// File name of the single Parquet file written per partition leaf.
pub const LEAF_FILE_NAME: &str = "part-0.parquet";

/// Characters that cannot appear in a partition value.
const INVALID: [char; 10] = ['/', '\\', '=', ':', '*', '?', '"', '<', '>', '|'];

/// Values of all partition columns for one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub event_date: NaiveDate,
    pub country: String,
}

impl PartitionKey {
    pub fn new(event_date: NaiveDate, country: impl Into<String>) -> Self {
        Self {
            event_date,
            country: country.into(),
        }
    }

    /// Value of a partition column, `None` for non-partition columns.
    pub fn value(&self, column: &str) -> Option<Value> {
        match column {
            EVENT_DATE => Some(Value::Date(self.event_date)),
            COUNTRY => Some(Value::Str(self.country.clone())),
            _ => None,
        }
    }

    /// Directory of this partition relative to the dataset root.
    ///
    /// Format: `event_date={YYYY-MM-DD}/country={country}`
    pub fn relative_dir(&self) -> Result<String> {
        let date = Value::Date(self.event_date);
        let country = Value::Str(self.country.clone());
        Ok(format!(
            "{}/{}",
            segment(EVENT_DATE, &date)?,
            segment(COUNTRY, &country)?
        ))
    }

    /// Full path of this partition's leaf file under `root`.
    pub fn leaf_path(&self, root: &str) -> Result<String> {
        Ok(format!(
            "{}{}/{}",
            dir_path(root),
            self.relative_dir()?,
            LEAF_FILE_NAME
        ))
    }
}

/// Build a single `column=value` path segment.
pub fn segment(column: &str, value: &Value) -> Result<String> {
    let rendered = value.to_string();
    if rendered.is_empty() || rendered.chars().any(|c| INVALID.contains(&c)) {
        return Err(DatasetError::invalid_partition_path(
            format!("{}={}", column, rendered),
            "partition value is empty or contains a reserved character",
        ));
    }
    Ok(format!("{}={}", column, rendered))
}

/// Parse a directory name (`column=value`, trailing `/` allowed) at a level
/// whose column is `expected`.
pub fn parse_segment(name: &str, expected: &str) -> Result<Value> {
    let trimmed = name.trim_end_matches('/');
    let (column, raw) = trimmed.split_once('=').ok_or_else(|| {
        DatasetError::invalid_partition_path(name, "expected 'column=value'")
    })?;

    if column != expected {
        return Err(DatasetError::invalid_partition_path(
            name,
            format!("expected partition column '{}', found '{}'", expected, column),
        ));
    }

    let kind = schema::column_kind(expected).ok_or_else(|| {
        DatasetError::invalid_partition_path(name, format!("unknown column '{}'", expected))
    })?;

    kind.parse_value(raw).ok_or_else(|| {
        DatasetError::invalid_partition_path(name, format!("'{}' is not a valid {}", raw, kind))
    })
}

/// Entries that readers skip, as written by other tools (`_SUCCESS`, `.crc`).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Normalize a storage path to directory form (`a/b/`). The root stays empty.
pub fn dir_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Reject an aggregation output that shares a directory tree with the dataset.
///
/// Everything under the output is deleted when an aggregation run starts.
pub fn ensure_disjoint_output(dataset: &str, output: &str) -> Result<()> {
    let dataset = dataset.trim_matches('/');
    let output = output.trim_matches('/');

    if output.is_empty() {
        return Err(DatasetError::invalid_config(
            "aggregate output path must not be empty",
        ));
    }

    let nested = |outer: &str, inner: &str| {
        outer.is_empty() || inner == outer || inner.starts_with(&format!("{}/", outer))
    };
    if nested(dataset, output) || nested(output, dataset) {
        return Err(DatasetError::invalid_config(format!(
            "aggregate output '{}' overlaps dataset '{}'",
            output, dataset
        )));
    }
    Ok(())
}
