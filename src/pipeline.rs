//! Chunked map/reduce aggregation: sum of `value` per `user_id`.
//!
//! The map phase streams filtered chunks from the scanner, reduces each one to
//! a partial aggregate and persists it as `part_<i>.parquet` under the output
//! directory. The reduce phase reads every persisted partial back and merges
//! them into the final aggregate. Only the partials and the final map are held
//! in memory, never the full filtered table.

use crate::encoding;
use crate::error::{DatasetError, Result};
use crate::partition::{dir_path, ensure_disjoint_output};
use crate::predicate::Predicate;
use crate::scan::{DatasetScanner, ScanRequest, ScanStats};
use crate::schema::{self, USER_ID, VALUE};
use crate::storage;
use arrow::array::{Array, Int64Array, RecordBatch};
use opendal::Operator;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Run state of an [`AggregatePipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Scanning,
    MapDone,
    Reducing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Scanning => "scanning",
            Stage::MapDone => "map_done",
            Stage::Reducing => "reducing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Final per-user sums, ordered by `user_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalAggregate {
    sums: BTreeMap<i64, i64>,
}

impl FinalAggregate {
    pub fn get(&self, user_id: i64) -> Option<i64> {
        self.sums.get(&user_id).copied()
    }

    pub fn len(&self) -> usize {
        self.sums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.sums.iter().map(|(k, v)| (*k, *v))
    }

    /// Sum over all users.
    pub fn total(&self) -> Result<i64> {
        self.sums.iter().try_fold(0i64, |acc, (user_id, v)| {
            acc.checked_add(*v)
                .ok_or_else(|| DatasetError::aggregate_overflow(*user_id))
        })
    }

    /// Two-column `(user_id, value)` batch sorted by `user_id`.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        sums_to_batch(&self.sums)
    }
}

/// Result of a completed aggregation run.
#[derive(Debug, Clone)]
pub struct AggregateRun {
    pub final_aggregate: FinalAggregate,
    /// Artifact paths written by the map phase, in chunk order
    pub artifacts: Vec<String>,
    pub scan_stats: ScanStats,
}

/// Map/reduce aggregation over a scanned dataset.
pub struct AggregatePipeline {
    scanner: DatasetScanner,
    output: String,
    chunk_rows: usize,
    row_group_size: usize,
    stage: Stage,
}

impl AggregatePipeline {
    pub fn new(scanner: DatasetScanner, output: impl Into<String>, chunk_rows: usize) -> Self {
        Self {
            scanner,
            output: output.into(),
            chunk_rows,
            row_group_size: encoding::DEFAULT_ROW_GROUP_SIZE,
            stage: Stage::Init,
        }
    }

    pub fn with_row_group_size(mut self, row_group_size: usize) -> Self {
        self.row_group_size = row_group_size;
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Aggregate every row admitted by `predicate`.
    ///
    /// The output must not overlap the dataset. Artifacts left under it by
    /// earlier runs are deleted once the scan plan is known, before the map
    /// phase. A failed artifact write aborts the run before the reduce phase.
    pub async fn run(&mut self, predicate: Predicate) -> Result<AggregateRun> {
        self.stage = Stage::Init;
        predicate.validate()?;
        ensure_disjoint_output(self.scanner.root(), &self.output)?;

        let request = ScanRequest::new([USER_ID, VALUE], predicate, self.chunk_rows);
        let mut stream = self.scanner.chunks(request).await?;

        let op = self.scanner.operator().clone();
        let output = dir_path(&self.output);
        let stale = storage::delete_files(&op, &output).await?;
        if stale > 0 {
            info!("Removed {} stale artifacts under '{}'", stale, output);
        }

        self.advance(Stage::Scanning);
        let props = encoding::writer_properties(self.row_group_size);
        let mut artifacts = Vec::new();

        while let Some(chunk) = stream.next_chunk().await? {
            let index = artifacts.len();
            let partial = partial_aggregate(&chunk)?;
            let path = format!("{}part_{}.parquet", output, index);
            let bytes = encoding::encode_parquet(&partial, props.clone())?;
            storage::write_bytes(&op, &path, bytes)
                .await
                .map_err(|e| DatasetError::artifact_write(index, &path, e.to_string()))?;
            debug!(
                "Chunk {}: {} rows -> {} users in '{}'",
                index,
                chunk.num_rows(),
                partial.num_rows(),
                path
            );
            artifacts.push(path);
        }
        let scan_stats = stream.into_stats();

        self.advance(Stage::MapDone);
        info!(
            "Map phase wrote {} artifacts from {} matching rows",
            artifacts.len(),
            scan_stats.rows_matched
        );

        self.advance(Stage::Reducing);
        let final_aggregate = reduce_partials(&op, &output).await?;

        self.advance(Stage::Done);
        Ok(AggregateRun {
            final_aggregate,
            artifacts,
            scan_stats,
        })
    }

    fn advance(&mut self, next: Stage) {
        info!(from = %self.stage, to = %next, "Pipeline stage transition");
        self.stage = next;
    }
}

/// Group one chunk by `user_id` and sum `value`.
///
/// Rows with a null `user_id` or `value` do not contribute.
pub fn partial_aggregate(batch: &RecordBatch) -> Result<RecordBatch> {
    let users = int_column(batch, USER_ID, "chunk")?;
    let values = int_column(batch, VALUE, "chunk")?;

    let mut sums = BTreeMap::new();
    for row in 0..batch.num_rows() {
        if users.is_null(row) || values.is_null(row) {
            continue;
        }
        add(&mut sums, users.value(row), values.value(row))?;
    }
    sums_to_batch(&sums)
}

/// Merge every `*.parquet` artifact under `output` into the final aggregate.
///
/// Reads only; repeated calls over the same artifacts give the same result.
pub async fn reduce_partials(op: &Operator, output: &str) -> Result<FinalAggregate> {
    let expected = schema::aggregate_schema();
    let mut sums = BTreeMap::new();
    let mut artifacts = 0usize;

    for path in storage::list_files(op, output).await? {
        if !path.ends_with(".parquet") {
            continue;
        }
        let bytes = storage::read_bytes(op, &path).await?;
        for batch in encoding::decode_parquet(bytes)? {
            let found = batch.schema();
            let compatible = found.fields().len() == expected.fields().len()
                && found
                    .fields()
                    .iter()
                    .zip(expected.fields().iter())
                    .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type());
            if !compatible {
                return Err(DatasetError::schema_mismatch(
                    path.as_str(),
                    "artifact is not a (user_id: Int64, value: Int64) partial aggregate",
                ));
            }

            let users = int_column(&batch, USER_ID, &path)?;
            let values = int_column(&batch, VALUE, &path)?;
            for row in 0..batch.num_rows() {
                if users.is_null(row) || values.is_null(row) {
                    continue;
                }
                add(&mut sums, users.value(row), values.value(row))?;
            }
        }
        artifacts += 1;
    }

    debug!(
        "Reduced {} artifacts under '{}' into {} users",
        artifacts,
        output,
        sums.len()
    );
    Ok(FinalAggregate { sums })
}

fn add(sums: &mut BTreeMap<i64, i64>, user_id: i64, value: i64) -> Result<()> {
    let slot = sums.entry(user_id).or_insert(0);
    *slot = slot
        .checked_add(value)
        .ok_or_else(|| DatasetError::aggregate_overflow(user_id))?;
    Ok(())
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str, source: &str) -> Result<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| {
            DatasetError::schema_mismatch(source, format!("'{}' must be an Int64 column", name))
        })
}

fn sums_to_batch(sums: &BTreeMap<i64, i64>) -> Result<RecordBatch> {
    let users = Int64Array::from_iter_values(sums.keys().copied());
    let values = Int64Array::from_iter_values(sums.values().copied());
    Ok(RecordBatch::try_new(
        schema::aggregate_schema(),
        vec![Arc::new(users), Arc::new(values)],
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};

    fn chunk(users: Vec<Option<i64>>, values: Vec<Option<i64>>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new(USER_ID, DataType::Int64, true),
            Field::new(VALUE, DataType::Int64, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(users)),
                Arc::new(Int64Array::from(values)),
            ],
        )
        .unwrap()
    }

    fn memory_operator() -> Operator {
        Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish()
    }

    #[test]
    fn partial_aggregate_groups_and_sorts() {
        let batch = chunk(
            vec![Some(3), Some(1), Some(3), None, Some(1)],
            vec![Some(10), Some(5), Some(7), Some(100), None],
        );
        let partial = partial_aggregate(&batch).unwrap();
        let users = partial.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        let sums = partial.column(1).as_any().downcast_ref::<Int64Array>().unwrap();

        assert_eq!(users.values().to_vec(), vec![1, 3]);
        assert_eq!(sums.values().to_vec(), vec![5, 17]);
    }

    #[test]
    fn partial_aggregate_detects_overflow() {
        let batch = chunk(vec![Some(1), Some(1)], vec![Some(i64::MAX), Some(1)]);
        let err = partial_aggregate(&batch).unwrap_err();
        assert!(matches!(err, DatasetError::AggregateOverflow { user_id: 1, .. }));
    }

    #[test]
    fn partial_aggregate_requires_user_and_value() {
        let schema = Arc::new(Schema::new(vec![Field::new(USER_ID, DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        assert!(partial_aggregate(&batch).is_err());
    }

    #[tokio::test]
    async fn reduce_merges_artifacts() {
        let op = memory_operator();
        let props = || encoding::writer_properties(1024);
        let first = partial_aggregate(&chunk(vec![Some(1), Some(2)], vec![Some(10), Some(20)]))
            .unwrap();
        let second =
            partial_aggregate(&chunk(vec![Some(2), Some(3)], vec![Some(1), Some(2)])).unwrap();
        storage::write_bytes(&op, "agg/part_0.parquet", encoding::encode_parquet(&first, props()).unwrap())
            .await
            .unwrap();
        storage::write_bytes(&op, "agg/part_1.parquet", encoding::encode_parquet(&second, props()).unwrap())
            .await
            .unwrap();

        let reduced = reduce_partials(&op, "agg").await.unwrap();
        assert_eq!(reduced.get(1), Some(10));
        assert_eq!(reduced.get(2), Some(21));
        assert_eq!(reduced.get(3), Some(2));
        assert_eq!(reduced.total().unwrap(), 33);
        assert_eq!(reduced.to_record_batch().unwrap().num_rows(), 3);

        let again = reduce_partials(&op, "agg").await.unwrap();
        assert_eq!(reduced, again);
    }

    #[tokio::test]
    async fn reduce_rejects_foreign_artifacts() {
        let op = memory_operator();
        let schema = Arc::new(Schema::new(vec![Field::new("event_id", DataType::Int64, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        let bytes = encoding::encode_parquet(&batch, encoding::writer_properties(1024)).unwrap();
        storage::write_bytes(&op, "agg/part_0.parquet", bytes)
            .await
            .unwrap();

        let err = reduce_partials(&op, "agg").await.unwrap_err();
        assert!(matches!(err, DatasetError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn reduce_of_missing_directory_is_empty() {
        let op = memory_operator();
        let reduced = reduce_partials(&op, "agg").await.unwrap();
        assert!(reduced.is_empty());
        assert_eq!(reduced.total().unwrap(), 0);
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::MapDone.to_string(), "map_done");
        assert_eq!(Stage::Init.to_string(), "init");
    }
}
