//! Synthetic event generation and partitioned writes.

use crate::config::GeneratorConfig;
use crate::encoding;
use crate::error::{DatasetError, Result};
use crate::partition::PartitionKey;
use crate::schema::{self, COUNTRIES, COUNTRY, EVENT_DATE, LEAF_COLUMNS};
use crate::storage;
use arrow::array::{
    Array, Date32Array, Int64Array, RecordBatch, StringArray, UInt32Array,
};
use arrow::compute::take;
use arrow::datatypes::Schema;
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use opendal::Operator;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Parameters of the synthetic event sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub rows: usize,
    pub user_modulus: i64,
    /// Timestamp of event 0; event `i` happens `i` minutes later
    pub start: NaiveDateTime,
}

impl Default for EventSpec {
    fn default() -> Self {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Self {
            rows: 100_000,
            user_modulus: 1234,
            start,
        }
    }
}

impl TryFrom<&GeneratorConfig> for EventSpec {
    type Error = DatasetError;

    fn try_from(config: &GeneratorConfig) -> Result<Self> {
        let start = config.start_timestamp()?;
        let user_modulus = i64::try_from(config.user_modulus)
            .map_err(|_| DatasetError::invalid_config("generator.user_modulus is too large"))?;
        Ok(Self {
            rows: config.rows,
            user_modulus,
            start,
        })
    }
}

/// Outcome of a partitioned write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateSummary {
    pub rows: usize,
    pub partitions: usize,
    pub files: Vec<String>,
}

/// Build the full event table in memory.
///
/// Row `i` has `event_id = i`, `user_id = i % user_modulus`,
/// `country = COUNTRIES[i % 10]`, `event_date` = calendar day of
/// `start + i minutes` and `value = i`.
pub fn build_events(spec: &EventSpec) -> Result<RecordBatch> {
    if spec.user_modulus <= 0 {
        return Err(DatasetError::invalid_config(
            "generator.user_modulus must be greater than 0",
        ));
    }
    let rows = i64::try_from(spec.rows)
        .map_err(|_| DatasetError::invalid_config("generator.rows is too large"))?;

    let mut event_dates = Vec::with_capacity(spec.rows);
    for i in 0..rows {
        let ts = TimeDelta::try_minutes(i)
            .and_then(|offset| spec.start.checked_add_signed(offset))
            .ok_or_else(|| {
                DatasetError::invalid_config(format!(
                    "event {} overflows the timestamp range from {}",
                    i, spec.start
                ))
            })?;
        event_dates.push(schema::date_to_days(ts.date()));
    }

    let columns: Vec<Arc<dyn Array>> = vec![
        Arc::new(Int64Array::from_iter_values(0..rows)),
        Arc::new(Int64Array::from_iter_values(
            (0..rows).map(|i| i % spec.user_modulus),
        )),
        Arc::new(StringArray::from_iter_values(
            (0..spec.rows).map(|i| COUNTRIES[i % COUNTRIES.len()]),
        )),
        Arc::new(Date32Array::from(event_dates)),
        Arc::new(Int64Array::from_iter_values(0..rows)),
    ];

    Ok(RecordBatch::try_new(schema::event_schema(), columns)?)
}

/// Write `batch` (full event schema) as one Parquet file per
/// `(event_date, country)` leaf under `root`.
///
/// A populated destination is rejected unless `overwrite` is set, in which
/// case its files are deleted first. Without `overwrite`, files with a
/// different leaf schema are reported as a schema mismatch.
pub async fn write_partitioned(
    op: &Operator,
    root: &str,
    batch: &RecordBatch,
    overwrite: bool,
    row_group_size: usize,
) -> Result<GenerateSummary> {
    ensure_event_schema(batch.schema().as_ref())?;
    prepare_destination(op, root, overwrite).await?;

    let groups = group_by_partition(batch)?;
    let mut files = Vec::with_capacity(groups.len());

    for (key, rows) in &groups {
        let indices = UInt32Array::from(rows.clone());
        let mut columns = Vec::with_capacity(LEAF_COLUMNS.len());
        for name in LEAF_COLUMNS {
            let column = batch.column_by_name(name).ok_or_else(|| {
                DatasetError::schema_mismatch(root, format!("input batch is missing '{}'", name))
            })?;
            columns.push(take(column.as_ref(), &indices, None)?);
        }
        let leaf = RecordBatch::try_new(schema::leaf_schema(), columns)?;

        let path = key.leaf_path(root)?;
        let bytes = encoding::encode_parquet(&leaf, encoding::writer_properties(row_group_size))?;
        let size = bytes.len();
        storage::write_bytes(op, &path, bytes).await?;
        debug!(
            "✓ Wrote {} rows to '{}' ({} bytes)",
            leaf.num_rows(),
            path,
            size
        );
        files.push(path);
    }

    info!(
        "Wrote {} rows into {} partitions under '{}'",
        batch.num_rows(),
        groups.len(),
        root
    );

    Ok(GenerateSummary {
        rows: batch.num_rows(),
        partitions: groups.len(),
        files,
    })
}

/// Generate the synthetic dataset and persist it partitioned under `root`.
pub async fn generate(
    op: &Operator,
    root: &str,
    spec: &EventSpec,
    overwrite: bool,
    row_group_size: usize,
) -> Result<GenerateSummary> {
    let batch = build_events(spec)?;
    write_partitioned(op, root, &batch, overwrite, row_group_size).await
}

fn ensure_event_schema(schema: &Schema) -> Result<()> {
    for expected in schema::event_schema().fields() {
        let found = schema.field_with_name(expected.name()).map_err(|_| {
            DatasetError::schema_mismatch("input batch", format!("missing '{}'", expected.name()))
        })?;
        if found.data_type() != expected.data_type() {
            return Err(DatasetError::schema_mismatch(
                "input batch",
                format!(
                    "'{}' is {} but {} is required",
                    expected.name(),
                    found.data_type(),
                    expected.data_type()
                ),
            ));
        }
    }
    Ok(())
}

async fn prepare_destination(op: &Operator, root: &str, overwrite: bool) -> Result<()> {
    let existing = storage::list_files(op, root).await?;
    let Some(first) = existing.first() else {
        return Ok(());
    };

    if let Some(reason) = incompatibility(op, first).await? {
        if !overwrite {
            return Err(DatasetError::schema_mismatch(first.as_str(), reason));
        }
    } else if !overwrite {
        return Err(DatasetError::destination_not_empty(root));
    }

    let removed = storage::delete_files(op, root).await?;
    info!("Overwrite enabled: removed {} existing files under '{}'", removed, root);
    Ok(())
}

/// Why an existing file cannot belong to this dataset, if it cannot.
async fn incompatibility(op: &Operator, path: &str) -> Result<Option<String>> {
    if !path.ends_with(".parquet") {
        return Ok(Some("unexpected non-Parquet file".to_string()));
    }

    let bytes: Bytes = storage::read_bytes(op, path).await?;
    let found = match encoding::parquet_schema(bytes) {
        Ok(schema) => schema,
        Err(e) => return Ok(Some(format!("unreadable Parquet file: {}", e))),
    };

    let expected = schema::leaf_schema();
    let same = found.fields().len() == expected.fields().len()
        && found
            .fields()
            .iter()
            .zip(expected.fields().iter())
            .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type());

    Ok((!same).then(|| {
        let names: Vec<_> = found.fields().iter().map(|f| f.name().as_str()).collect();
        format!("existing file has columns [{}]", names.join(", "))
    }))
}

/// Row indices of each partition, ordered by partition key.
fn group_by_partition(batch: &RecordBatch) -> Result<BTreeMap<PartitionKey, Vec<u32>>> {
    let countries = batch
        .column_by_name(COUNTRY)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| DatasetError::schema_mismatch("input batch", "country is not Utf8"))?;
    let dates = batch
        .column_by_name(EVENT_DATE)
        .and_then(|c| c.as_any().downcast_ref::<Date32Array>())
        .ok_or_else(|| DatasetError::schema_mismatch("input batch", "event_date is not Date32"))?;

    let mut groups: BTreeMap<PartitionKey, Vec<u32>> = BTreeMap::new();
    for row in 0..batch.num_rows() {
        if countries.is_null(row) || dates.is_null(row) {
            return Err(DatasetError::schema_mismatch(
                "input batch",
                format!("row {} has a null partition value", row),
            ));
        }
        let date = schema::days_to_date(dates.value(row)).ok_or_else(|| {
            DatasetError::schema_mismatch("input batch", format!("row {} has an invalid date", row))
        })?;
        let index = u32::try_from(row).map_err(|_| {
            DatasetError::invalid_config("input batch exceeds u32::MAX rows")
        })?;
        groups
            .entry(PartitionKey::new(date, countries.value(row)))
            .or_default()
            .push(index);
    }
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_spec(rows: usize) -> EventSpec {
        EventSpec {
            rows,
            ..EventSpec::default()
        }
    }

    #[test]
    fn build_events_follows_generation_rules() {
        let batch = build_events(&small_spec(3000)).unwrap();
        assert_eq!(batch.num_rows(), 3000);

        let ids = batch
            .column_by_name("event_id")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        let users = batch
            .column_by_name("user_id")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        let countries = batch
            .column_by_name("country")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        let dates = batch
            .column_by_name("event_date")
            .unwrap()
            .as_any()
            .downcast_ref::<Date32Array>()
            .unwrap();

        assert_eq!(ids.value(1235), 1235);
        assert_eq!(users.value(1235), 1);
        assert_eq!(countries.value(0), "US");
        assert_eq!(countries.value(11), "IN");
        // 1440 minutes per day
        assert_eq!(schema::days_to_date(dates.value(1439)).unwrap().to_string(), "2025-01-01");
        assert_eq!(schema::days_to_date(dates.value(1440)).unwrap().to_string(), "2025-01-02");
    }

    #[test]
    fn default_spec_spans_seventy_days() {
        let batch = build_events(&EventSpec::default()).unwrap();
        let groups = group_by_partition(&batch).unwrap();
        // 100_000 minutes cover 70 calendar days, each holding all 10 countries
        assert_eq!(groups.len(), 700);
        let total: usize = groups.values().map(Vec::len).sum();
        assert_eq!(total, 100_000);
    }

    #[test]
    fn zero_modulus_is_rejected() {
        let spec = EventSpec {
            user_modulus: 0,
            ..small_spec(10)
        };
        assert!(build_events(&spec).is_err());
    }

    #[test]
    fn spec_from_config() {
        let config = GeneratorConfig::default();
        let spec = EventSpec::try_from(&config).unwrap();
        assert_eq!(spec, EventSpec::default());
    }
}
