// Integration tests for dataset generation and filtered scans
//
// Datasets are written to a real filesystem directory and read back through
// the scanner.

mod harness;

use arrow::array::{Int64Array, RecordBatch};
use arrow::datatypes::{DataType, Field, Schema};
use chrono::NaiveDate;
use eventlake::schema::{COUNTRIES, EVENT_ID};
use eventlake::{
    encoding, generator, storage, DatasetError, DatasetScanner, Predicate, ScanRequest, Value,
};
use harness::{int_values, spec, store_with_events, DATASET};
use std::collections::BTreeSet;
use std::sync::Arc;

const MINUTES_PER_DAY: usize = 1440;

fn all_columns() -> Vec<&'static str> {
    vec!["event_id", "user_id", "country", "event_date", "value"]
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
}

/// Event ids matching `keep`, computed from the generation rules alone.
fn brute_force(rows: usize, keep: impl Fn(usize) -> bool) -> BTreeSet<i64> {
    (0..rows).filter(|&i| keep(i)).map(|i| i as i64).collect()
}

#[tokio::test]
async fn generated_dataset_holds_every_event_once() {
    let rows = 5_000;
    let (store, summary) = store_with_events(rows).await;
    assert_eq!(summary.rows, rows);
    // 5000 minutes span 4 days, each with all 10 countries
    assert_eq!(summary.partitions, 40);
    assert_eq!(summary.files.len(), 40);
    assert!(summary
        .files
        .iter()
        .all(|f| f.starts_with("events/event_date=") && f.ends_with("/part-0.parquet")));

    let scanner = DatasetScanner::new(store.op.clone(), DATASET);
    let output = scanner
        .to_table(ScanRequest::new([EVENT_ID], Predicate::all(), 1000))
        .await
        .unwrap();

    let ids = int_values(&output.batch, EVENT_ID);
    assert_eq!(ids.len(), rows);
    let unique: BTreeSet<i64> = ids.into_iter().collect();
    assert_eq!(unique, (0..rows as i64).collect::<BTreeSet<_>>());
}

#[tokio::test]
async fn scan_equals_brute_force_filtering() {
    let rows = 5_000;
    let (store, _) = store_with_events(rows).await;
    let scanner = DatasetScanner::new(store.op.clone(), DATASET);

    let cases = vec![
        (
            Predicate::parse(&["country=FR"]).unwrap(),
            brute_force(rows, |i| COUNTRIES[i % 10] == "FR"),
        ),
        (
            Predicate::parse(&["country=FR", "user_id=7"]).unwrap(),
            brute_force(rows, |i| COUNTRIES[i % 10] == "FR" && i % 1234 == 7),
        ),
        (
            Predicate::eq("event_date", Value::Date(date(3))).and_eq("value", Value::Int(3000)),
            brute_force(rows, |i| i / MINUTES_PER_DAY == 2 && i == 3000),
        ),
        (
            Predicate::parse(&["user_id=1233"]).unwrap(),
            brute_force(rows, |i| i % 1234 == 1233),
        ),
    ];

    for (predicate, expected) in cases {
        let label = predicate.to_string();
        let output = scanner
            .to_table(ScanRequest::new(all_columns(), predicate, 256))
            .await
            .unwrap();
        let found: BTreeSet<i64> = int_values(&output.batch, EVENT_ID).into_iter().collect();
        assert_eq!(found, expected, "mismatch for {}", label);
        assert_eq!(output.batch.num_rows(), expected.len());
        assert_eq!(output.stats.rows_matched, expected.len());
    }
}

#[tokio::test]
async fn pruned_partitions_are_never_read() {
    let (store, _) = store_with_events(5_000).await;
    let scanner = DatasetScanner::new(store.op.clone(), DATASET);
    let request = |filters: &[&str]| {
        ScanRequest::new(["event_id"], Predicate::parse(filters).unwrap(), 512)
    };

    let by_country = scanner.to_table(request(&["country=US"])).await.unwrap();
    assert_eq!(by_country.stats.partitions_selected, 4);
    assert_eq!(by_country.stats.files_read, 4);
    assert_eq!(by_country.stats.directories_pruned, 4 * 9);

    let by_date = scanner
        .to_table(request(&["event_date=2025-01-02"]))
        .await
        .unwrap();
    assert_eq!(by_date.stats.files_read, 10);
    assert_eq!(by_date.stats.directories_pruned, 3);
    assert_eq!(by_date.batch.num_rows(), MINUTES_PER_DAY);

    let both = scanner
        .to_table(request(&["country=US", "event_date=2025-01-02"]))
        .await
        .unwrap();
    assert_eq!(both.stats.files_read, 1);

    // A leaf-column clause cannot prune directories.
    let by_user = scanner.to_table(request(&["user_id=5"])).await.unwrap();
    assert_eq!(by_user.stats.files_read, 40);
    assert_eq!(by_user.stats.directories_pruned, 0);
}

#[tokio::test]
async fn predicate_pruning_everything_is_empty_not_an_error() {
    let (store, _) = store_with_events(2_000).await;
    let scanner = DatasetScanner::new(store.op.clone(), DATASET);

    let output = scanner
        .to_table(ScanRequest::new(
            ["event_id", "country"],
            Predicate::parse(&["country=ZZ"]).unwrap(),
            128,
        ))
        .await
        .unwrap();

    assert_eq!(output.batch.num_rows(), 0);
    assert_eq!(output.batch.num_columns(), 2);
    assert_eq!(output.stats.files_read, 0);
    assert_eq!(output.stats.chunks, 0);
}

#[tokio::test]
async fn us_on_second_day_scenario() {
    let rows = 100_000;
    let (store, summary) = store_with_events(rows).await;
    assert_eq!(summary.partitions, 700);

    let scanner = DatasetScanner::new(store.op.clone(), DATASET);
    let predicate = Predicate::parse(&["country=US", "event_date=2025-01-02"]).unwrap();
    let output = scanner
        .to_table(ScanRequest::new(
            ["event_id", "user_id", "value"],
            predicate,
            8192,
        ))
        .await
        .unwrap();

    let names: Vec<_> = output
        .batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    assert_eq!(names, vec!["event_id", "user_id", "value"]);

    let expected = brute_force(rows, |i| i % 10 == 0 && i / MINUTES_PER_DAY == 1);
    assert_eq!(expected.len(), 144);
    let ids = int_values(&output.batch, "event_id");
    assert_eq!(ids.iter().copied().collect::<BTreeSet<_>>(), expected);
    assert_eq!(output.stats.files_read, 1);

    let users = int_values(&output.batch, "user_id");
    let values = int_values(&output.batch, "value");
    for ((id, user), value) in ids.iter().zip(&users).zip(&values) {
        assert_eq!(*user, id % 1234);
        assert_eq!(value, id);
    }
}

#[tokio::test]
async fn chunks_never_exceed_chunk_rows() {
    let (store, _) = store_with_events(3_000).await;
    let scanner = DatasetScanner::new(store.op.clone(), DATASET);
    let predicate = Predicate::parse(&["country=IN"]).unwrap();

    let mut stream = scanner
        .chunks(ScanRequest::new(["user_id", "value"], predicate, 64))
        .await
        .unwrap();

    let mut sizes = Vec::new();
    while let Some(chunk) = stream.next_chunk().await.unwrap() {
        sizes.push(chunk.num_rows());
    }

    assert_eq!(sizes.iter().sum::<usize>(), 300);
    assert!(sizes.iter().all(|&n| n > 0 && n <= 64));
    // Small per-file results are coalesced: only the last chunk may be short.
    assert!(sizes[..sizes.len() - 1].iter().all(|&n| n == 64));
    assert_eq!(stream.stats().chunks, sizes.len());
    assert!(stream.next_chunk().await.unwrap().is_none());
}

#[tokio::test]
async fn partition_columns_come_from_paths() {
    let (store, _) = store_with_events(2_000).await;
    let scanner = DatasetScanner::new(store.op.clone(), DATASET);

    let output = scanner
        .to_table(ScanRequest::new(
            ["country", "event_date"],
            Predicate::parse(&["country=DE", "event_date=2025-01-02"]).unwrap(),
            128,
        ))
        .await
        .unwrap();

    // rows 1440..1999 on day 2, every 10th one in DE
    assert_eq!(output.batch.num_rows(), 56);
    let normalized = eventlake::normalize_columns(&output.batch).unwrap();
    let countries = harness::text_values(&normalized.batch, "country");
    let dates = harness::text_values(&normalized.batch, "event_date");
    assert!(countries.iter().all(|c| c == "DE"));
    assert!(dates.iter().all(|d| d == "2025-01-02"));
}

#[tokio::test]
async fn missing_dataset_is_storage_not_found() {
    let store = harness::fs_store();
    let scanner = DatasetScanner::new(store.op.clone(), "nowhere");

    let err = scanner
        .to_table(ScanRequest::new(["event_id"], Predicate::all(), 128))
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::StorageNotFound { .. }));
    assert_eq!(err.code(), "E001");
}

#[tokio::test]
async fn invalid_queries_are_rejected() {
    let (store, _) = store_with_events(1_000).await;
    let scanner = DatasetScanner::new(store.op.clone(), DATASET);

    let bad_column = Predicate::eq("bogus", Value::Int(1));
    let err = scanner.plan(&bad_column).await.unwrap_err();
    assert!(matches!(err, DatasetError::InvalidPredicate { .. }));

    let bad_kind = Predicate::eq("country", Value::Int(1));
    assert!(scanner.plan(&bad_kind).await.is_err());

    let err = scanner
        .to_table(ScanRequest::new(["nope"], Predicate::all(), 128))
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::InvalidProjection { .. }));

    let err = scanner
        .chunks(ScanRequest::new(["event_id"], Predicate::all(), 0))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DatasetError::InvalidConfig { .. }));
}

fn foreign_parquet() -> Vec<u8> {
    let schema = Arc::new(Schema::new(vec![Field::new("other", DataType::Int64, false)]));
    let batch = RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2]))]).unwrap();
    encoding::encode_parquet(&batch, encoding::writer_properties(1024)).unwrap()
}

#[tokio::test]
async fn scanning_an_incompatible_leaf_is_schema_mismatch() {
    let (store, _) = store_with_events(1_000).await;
    storage::write_bytes(
        &store.op,
        "events/event_date=2025-01-01/country=US/part-0.parquet",
        foreign_parquet(),
    )
    .await
    .unwrap();

    let scanner = DatasetScanner::new(store.op.clone(), DATASET);
    let err = scanner
        .to_table(ScanRequest::new(["event_id"], Predicate::parse(&["country=US"]).unwrap(), 128))
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::SchemaMismatch { .. }));
}

#[tokio::test]
async fn generator_refuses_populated_destination() {
    let (store, _) = store_with_events(2_000).await;

    let err = generator::generate(&store.op, DATASET, &spec(2_000), false, 4096)
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::DestinationNotEmpty { .. }));
    assert_eq!(err.code(), "E003");

    // Overwrite replaces every old partition.
    let summary = generator::generate(&store.op, DATASET, &spec(100), true, 4096)
        .await
        .unwrap();
    assert_eq!(summary.partitions, 10);

    let scanner = DatasetScanner::new(store.op.clone(), DATASET);
    let output = scanner
        .to_table(ScanRequest::new(["event_id"], Predicate::all(), 1000))
        .await
        .unwrap();
    assert_eq!(output.batch.num_rows(), 100);
    assert_eq!(output.stats.files_read, 10);
}

#[tokio::test]
async fn generator_reports_incompatible_destination() {
    let store = harness::fs_store();
    storage::write_bytes(&store.op, "events/stray.parquet", foreign_parquet())
        .await
        .unwrap();

    let err = generator::generate(&store.op, DATASET, &spec(100), false, 4096)
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::SchemaMismatch { .. }));
    assert_eq!(err.code(), "E002");
}
