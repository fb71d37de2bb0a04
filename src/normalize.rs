//! Convert projected columns to their canonical text form.

use crate::error::Result;
use crate::predicate::Predicate;
use crate::scan::{DatasetScanner, ScanRequest};
use crate::schema::ColumnKind;
use arrow::array::{ArrayRef, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use opendal::Operator;
use std::sync::Arc;

/// A table whose columns are all `Utf8`.
#[derive(Debug, Clone)]
pub struct NormalizedTable {
    pub batch: RecordBatch,
    /// `(column, type)` pairs in column order
    pub column_types: Vec<(String, DataType)>,
}

/// Rewrite every column of `batch` as text.
///
/// Integers become decimal digits, strings are unchanged and dates become
/// `YYYY-MM-DD`. Nulls stay null. Columns of any other Arrow type are rejected.
pub fn normalize_columns(batch: &RecordBatch) -> Result<NormalizedTable> {
    let schema = batch.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let kind = ColumnKind::of(field.name(), field.data_type())?;
        columns.push(Arc::new(kind.format_array(field.name(), column)?));
        fields.push(Field::new(field.name(), DataType::Utf8, field.is_nullable()));
    }

    let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
    let column_types = batch
        .schema()
        .fields()
        .iter()
        .map(|f| (f.name().clone(), f.data_type().clone()))
        .collect();

    Ok(NormalizedTable {
        batch,
        column_types,
    })
}

/// Scan `columns` of the whole dataset and normalize them to text.
pub async fn load_as_text(
    op: &Operator,
    root: &str,
    columns: &[String],
    chunk_rows: usize,
) -> Result<NormalizedTable> {
    let scanner = DatasetScanner::new(op.clone(), root);
    let request = ScanRequest::new(columns.iter().cloned(), Predicate::all(), chunk_rows);
    let output = scanner.to_table(request).await?;
    normalize_columns(&output.batch)
}
