//! Console rendering of result tables.

use crate::error::Result;
use arrow::array::RecordBatch;
use arrow::datatypes::DataType;
use arrow::util::pretty::pretty_format_batches;

/// First `limit` rows of `batch` as an ASCII table followed by the total row
/// count.
pub fn format_preview(batch: &RecordBatch, limit: usize) -> Result<String> {
    let shown = batch.slice(0, limit.min(batch.num_rows()));
    let table = pretty_format_batches(&[shown])?;
    Ok(format!("{}\nTotal rows: {}", table, batch.num_rows()))
}

/// One `column: type` line per column.
pub fn format_column_types(column_types: &[(String, DataType)]) -> String {
    column_types
        .iter()
        .map(|(name, data_type)| format!("{}: {}", name, data_type))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn print_preview(title: &str, batch: &RecordBatch, limit: usize) -> Result<()> {
    println!("{}", title);
    println!("{}", format_preview(batch, limit)?);
    Ok(())
}
