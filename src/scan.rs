//! Filtered scans over the partitioned dataset.
//!
//! A scan runs in two steps:
//! - [`DatasetScanner::plan`] walks the directory tree one partition level at a
//!   time and drops every directory whose `column=value` cannot satisfy the
//!   predicate. Pruned directories are never listed and their files never read.
//! - [`ChunkStream`] reads the surviving leaf files one at a time, decodes only
//!   the needed columns, applies the remaining clauses with Arrow kernels and
//!   re-chunks the result into batches of at most `chunk_rows` rows.

use crate::error::{DatasetError, Result};
use crate::partition::{self, PartitionKey};
use crate::predicate::Predicate;
use crate::schema::{self, Value, COUNTRY, EVENT_DATE, EVENT_ID, LEAF_COLUMNS};
use crate::storage;
use arrow::array::RecordBatch;
use arrow::compute::{concat_batches, filter_record_batch};
use arrow::datatypes::SchemaRef;
use opendal::Operator;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ProjectionMask;
use std::collections::VecDeque;
use tracing::debug;

/// What to read: projected columns, row filter and chunk bound.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub columns: Vec<String>,
    pub predicate: Predicate,
    pub chunk_rows: usize,
}

impl ScanRequest {
    pub fn new<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        predicate: Predicate,
        chunk_rows: usize,
    ) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            predicate,
            chunk_rows,
        }
    }
}

/// Counters describing the I/O a scan performed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Leaf partitions that survived pruning
    pub partitions_selected: usize,
    /// Directories skipped because their value cannot match
    pub directories_pruned: usize,
    pub files_read: usize,
    pub rows_read: usize,
    pub rows_matched: usize,
    pub chunks: usize,
}

/// A leaf file selected by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafFile {
    pub path: String,
    pub key: PartitionKey,
}

#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub leaves: Vec<LeafFile>,
    pub stats: ScanStats,
}

/// Fully materialized scan result.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub batch: RecordBatch,
    pub stats: ScanStats,
}

/// Read side of a partitioned dataset rooted at `root`.
#[derive(Clone)]
pub struct DatasetScanner {
    op: Operator,
    root: String,
}

impl DatasetScanner {
    pub fn new(op: Operator, root: impl Into<String>) -> Self {
        Self {
            op,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Select the leaf files that can hold rows matching `predicate`.
    pub async fn plan(&self, predicate: &Predicate) -> Result<ScanPlan> {
        predicate.validate()?;

        let date_dirs = partition_dirs(&self.op, &self.root).await?;
        if date_dirs.is_empty() {
            return Err(DatasetError::storage_not_found(&self.root));
        }

        let mut stats = ScanStats::default();
        let mut leaves = Vec::new();

        for date_dir in date_dirs {
            let date = partition::parse_segment(&date_dir.name, EVENT_DATE)?;
            let Value::Date(event_date) = date else {
                return Err(DatasetError::invalid_partition_path(
                    &date_dir.path,
                    "event_date is not a date",
                ));
            };
            if !predicate.admits_partition(EVENT_DATE, &date) {
                stats.directories_pruned += 1;
                continue;
            }

            for country_dir in partition_dirs(&self.op, &date_dir.path).await? {
                let country = partition::parse_segment(&country_dir.name, COUNTRY)?;
                if !predicate.admits_partition(COUNTRY, &country) {
                    stats.directories_pruned += 1;
                    continue;
                }
                let key = PartitionKey::new(event_date, country.to_string());

                stats.partitions_selected += 1;
                for file in storage::list_dir(&self.op, &country_dir.path).await? {
                    if file.is_dir || partition::is_hidden(&file.name) {
                        continue;
                    }
                    if !file.name.ends_with(".parquet") {
                        continue;
                    }
                    leaves.push(LeafFile {
                        path: file.path,
                        key: key.clone(),
                    });
                }
            }
        }

        debug!(
            "Planned scan of '{}' for [{}]: {} partitions, {} files, {} directories pruned",
            self.root,
            predicate,
            stats.partitions_selected,
            leaves.len(),
            stats.directories_pruned
        );

        Ok(ScanPlan { leaves, stats })
    }

    /// Lazily stream matching rows in chunks of at most `chunk_rows` rows.
    pub async fn chunks(&self, request: ScanRequest) -> Result<ChunkStream> {
        if request.chunk_rows == 0 {
            return Err(DatasetError::invalid_config(
                "scan.chunk_rows must be greater than 0",
            ));
        }
        let layout = Layout::new(&request.columns, &request.predicate)?;
        let plan = self.plan(&request.predicate).await?;

        Ok(ChunkStream {
            op: self.op.clone(),
            leaves: plan.leaves.into(),
            reader: None,
            layout,
            predicate: request.predicate,
            chunk_rows: request.chunk_rows,
            pending: Vec::new(),
            pending_rows: 0,
            stats: plan.stats,
        })
    }

    /// Materialize every matching row into one batch.
    pub async fn to_table(&self, request: ScanRequest) -> Result<ScanOutput> {
        let mut stream = self.chunks(request).await?;
        let mut batches = Vec::new();
        while let Some(chunk) = stream.next_chunk().await? {
            batches.push(chunk);
        }
        let batch = concat_batches(&stream.schema(), &batches)?;
        Ok(ScanOutput {
            batch,
            stats: stream.into_stats(),
        })
    }
}

/// Partition directories directly under `dir`, hidden entries skipped.
async fn partition_dirs(op: &Operator, dir: &str) -> Result<Vec<storage::DirEntry>> {
    Ok(storage::list_dir(op, dir)
        .await?
        .into_iter()
        .filter(|entry| entry.is_dir && !partition::is_hidden(&entry.name))
        .collect())
}

/// Output schema plus the leaf columns that must be decoded to produce it.
#[derive(Debug, Clone)]
struct Layout {
    schema: SchemaRef,
    file_columns: Vec<String>,
}

impl Layout {
    fn new(columns: &[String], predicate: &Predicate) -> Result<Self> {
        let schema = schema::project_event_schema(columns)?;
        let filter_columns = predicate.leaf_columns();

        let mut file_columns: Vec<String> = LEAF_COLUMNS
            .iter()
            .copied()
            .filter(|name| columns.iter().any(|c| c == name) || filter_columns.contains(name))
            .map(|name| name.to_string())
            .collect();

        // Projections of partition columns alone still need row counts.
        if file_columns.is_empty() {
            file_columns.push(EVENT_ID.to_string());
        }

        Ok(Self {
            schema,
            file_columns,
        })
    }
}

/// Finite, lazy sequence of filtered and projected chunks.
///
/// Not resumable: once drained, call [`DatasetScanner::chunks`] again to
/// restart from the beginning.
pub struct ChunkStream {
    op: Operator,
    leaves: VecDeque<LeafFile>,
    reader: Option<(PartitionKey, ParquetRecordBatchReader)>,
    layout: Layout,
    predicate: Predicate,
    chunk_rows: usize,
    pending: Vec<RecordBatch>,
    pending_rows: usize,
    stats: ScanStats,
}

impl ChunkStream {
    pub fn schema(&self) -> SchemaRef {
        self.layout.schema.clone()
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn into_stats(self) -> ScanStats {
        self.stats
    }

    /// Next chunk of at most `chunk_rows` rows; `None` once the scan is done.
    pub async fn next_chunk(&mut self) -> Result<Option<RecordBatch>> {
        loop {
            if self.pending_rows >= self.chunk_rows {
                return self.emit(self.chunk_rows).map(Some);
            }

            match self.next_filtered().await? {
                Some(batch) => {
                    if batch.num_rows() > 0 {
                        self.pending_rows += batch.num_rows();
                        self.pending.push(batch);
                    }
                }
                None if self.pending_rows > 0 => return self.emit(self.pending_rows).map(Some),
                None => return Ok(None),
            }
        }
    }

    fn emit(&mut self, rows: usize) -> Result<RecordBatch> {
        let combined = concat_batches(&self.layout.schema, &self.pending)?;
        self.pending.clear();

        let rest = combined.num_rows() - rows;
        if rest > 0 {
            self.pending.push(combined.slice(rows, rest));
        }
        self.pending_rows = rest;
        self.stats.chunks += 1;

        Ok(combined.slice(0, rows))
    }

    /// Next decoded batch after filtering, moving on to the next leaf file when
    /// the current one is exhausted.
    async fn next_filtered(&mut self) -> Result<Option<RecordBatch>> {
        loop {
            if let Some((key, reader)) = self.reader.as_mut() {
                match reader.next() {
                    Some(batch) => {
                        let batch = batch?;
                        return shape_batch(
                            &self.layout,
                            &self.predicate,
                            key,
                            batch,
                            &mut self.stats,
                        )
                        .map(Some);
                    }
                    None => self.reader = None,
                }
            }

            let Some(leaf) = self.leaves.pop_front() else {
                return Ok(None);
            };
            let reader = open_leaf(
                &self.op,
                &self.layout,
                self.chunk_rows,
                &leaf.path,
                &mut self.stats,
            )
            .await?;
            self.reader = Some((leaf.key, reader));
        }
    }
}

async fn open_leaf(
    op: &Operator,
    layout: &Layout,
    batch_size: usize,
    path: &str,
    stats: &mut ScanStats,
) -> Result<ParquetRecordBatchReader> {
    let bytes = storage::read_bytes(op, path).await?;
    stats.files_read += 1;
    debug!("Reading leaf '{}' ({} bytes)", path, bytes.len());

    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    for name in &layout.file_columns {
        let field = builder.schema().field_with_name(name).map_err(|_| {
            DatasetError::schema_mismatch(path, format!("missing column '{}'", name))
        })?;
        let expected = schema::column_kind(name).map(|kind| kind.data_type());
        if expected.as_ref() != Some(field.data_type()) {
            return Err(DatasetError::schema_mismatch(
                path,
                format!("column '{}' has type {}", name, field.data_type()),
            ));
        }
    }

    let mask = ProjectionMask::columns(
        builder.parquet_schema(),
        layout.file_columns.iter().map(String::as_str),
    );
    Ok(builder
        .with_projection(mask)
        .with_batch_size(batch_size)
        .build()?)
}

/// Apply leaf-column clauses and assemble the projected output columns,
/// filling partition columns from the directory values.
fn shape_batch(
    layout: &Layout,
    predicate: &Predicate,
    key: &PartitionKey,
    batch: RecordBatch,
    stats: &mut ScanStats,
) -> Result<RecordBatch> {
    stats.rows_read += batch.num_rows();
    let batch = match predicate.selection(&batch)? {
        Some(mask) => filter_record_batch(&batch, &mask)?,
        None => batch,
    };
    stats.rows_matched += batch.num_rows();

    let columns = layout
        .schema
        .fields()
        .iter()
        .map(|field| match key.value(field.name()) {
            Some(value) => Ok(value.to_array(batch.num_rows())),
            None => batch.column_by_name(field.name()).cloned().ok_or_else(|| {
                DatasetError::schema_mismatch(
                    field.name().as_str(),
                    "column missing from decoded batch",
                )
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RecordBatch::try_new(layout.schema.clone(), columns)?)
}
