//! Shared setup for integration tests
//!
//! Every test gets its own filesystem operator rooted in a fresh temporary
//! directory, so tests never observe each other's datasets.

#![allow(dead_code)]

use arrow::array::{Array, Int64Array, RecordBatch, StringArray};
use eventlake::{generator, EventSpec, GenerateSummary};
use opendal::{services, Operator};
use tempfile::TempDir;

pub const DATASET: &str = "events";
pub const OUTPUT: &str = "agg";

/// Filesystem operator and the directory backing it.
pub struct TestStore {
    pub op: Operator,
    pub dir: TempDir,
}

pub fn fs_store() -> TestStore {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let root = dir.path().to_str().expect("temp dir is not UTF-8");
    let op = Operator::new(services::Fs::default().root(root))
        .expect("Failed to create fs operator")
        .finish();
    TestStore { op, dir }
}

pub fn spec(rows: usize) -> EventSpec {
    EventSpec {
        rows,
        ..EventSpec::default()
    }
}

/// Store with a freshly generated dataset of `rows` events under [`DATASET`].
pub async fn store_with_events(rows: usize) -> (TestStore, GenerateSummary) {
    let store = fs_store();
    let summary = generator::generate(&store.op, DATASET, &spec(rows), false, 4096)
        .await
        .expect("Failed to generate dataset");
    (store, summary)
}

pub fn int_values(batch: &RecordBatch, column: &str) -> Vec<i64> {
    batch
        .column_by_name(column)
        .unwrap_or_else(|| panic!("missing column {}", column))
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap_or_else(|| panic!("{} is not Int64", column))
        .values()
        .to_vec()
}

pub fn text_values(batch: &RecordBatch, column: &str) -> Vec<String> {
    let array = batch
        .column_by_name(column)
        .unwrap_or_else(|| panic!("missing column {}", column))
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap_or_else(|| panic!("{} is not Utf8", column));
    (0..array.len()).map(|i| array.value(i).to_string()).collect()
}
