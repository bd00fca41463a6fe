//! Range-replace loader tests
//!
//! The hosted warehouse is stood in for by a DuckDB file attached to the
//! loader's session, which exercises the same statements.

use super::*;
use crate::database::{LocalStore, StoreLocation};
use crate::error::Error;
use crate::output::json_to_arrow;
use crate::schema::{FieldDef, FieldType, RecordSchema, SchemaDeriver};
use crate::source::MemorySource;
use crate::types::DateRange;
use arrow::array::AsArray;
use arrow::datatypes::Int64Type;
use arrow::record_batch::RecordBatch;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::tempdir;
use test_case::test_case;

fn events() -> RecordSchema {
    RecordSchema::new(
        "Events",
        vec![
            FieldDef::required("ts", FieldType::timestamp()),
            FieldDef::required("id", FieldType::integer()),
        ],
    )
}

fn april() -> DateRange {
    DateRange::parse("2023-04-01", "2023-04-03").unwrap()
}

fn batch(rows: &[(&str, i64)]) -> RecordBatch {
    let schema = SchemaDeriver::default().arrow_schema(&events());
    let records: Vec<Value> = rows
        .iter()
        .map(|(ts, id)| json!({"ts": ts, "id": id}))
        .collect();
    json_to_arrow(&records, &schema).unwrap()
}

fn numbered(n: i64) -> RecordBatch {
    let rows: Vec<(String, i64)> = (0..n)
        .map(|i| (format!("2023-04-01 {:02}:00:00", i % 24), i))
        .collect();
    let rows: Vec<(&str, i64)> = rows.iter().map(|(ts, id)| (ts.as_str(), *id)).collect();
    batch(&rows)
}

fn loader(path: &Path, config: RangeReplaceConfig) -> RangeReplaceLoader {
    RangeReplaceLoader::connect(
        WarehouseTarget::Attached {
            path: path.to_path_buf(),
        },
        &events(),
        config,
    )
    .unwrap()
}

fn config() -> RangeReplaceConfig {
    RangeReplaceConfig::new("wh", "events", "ts", april())
}

fn remote_ids(loader: &RangeReplaceLoader) -> Vec<i64> {
    let (_, batches) = loader
        .store()
        .query_arrow(&format!("SELECT id FROM {} ORDER BY id", loader.remote_table()))
        .unwrap();
    batches
        .iter()
        .flat_map(|b| b.column(0).as_primitive::<Int64Type>().values().to_vec())
        .collect()
}

/// Create the remote table in its own session and fill it
fn seed_remote(path: &Path, rows: &[(&str, i64)]) {
    let store = LocalStore::open(StoreLocation::File(path.to_path_buf())).unwrap();
    let table = SchemaDeriver::default()
        .table_schema(&events(), Some("events"), None)
        .unwrap();
    store.execute_batch(&format!("{};", table.ddl())).unwrap();
    store.insert_batch("events", &batch(rows), false).unwrap();
}

// ============================================================================
// Chunk Planning Tests
// ============================================================================

#[test_case(10, 3, &[(0, 3), (3, 6), (6, 9), (9, 10)] ; "uneven split")]
#[test_case(6, 3, &[(0, 3), (3, 6)] ; "even split")]
#[test_case(2, 100, &[(0, 2)] ; "single short chunk")]
#[test_case(0, 5, &[] ; "no rows")]
#[test_case(3, 0, &[(0, 1), (1, 2), (2, 3)] ; "zero chunk size")]
fn test_plan_chunks(total: u64, chunk_size: u64, expected: &[(u64, u64)]) {
    let chunks: Vec<(u64, u64)> = plan_chunks(total, chunk_size)
        .iter()
        .map(|c| (c.start, c.end))
        .collect();
    assert_eq!(chunks, expected);
}

#[test]
fn test_plan_chunks_cover_every_row_once() {
    let chunks = plan_chunks(1_000_001, DEFAULT_CHUNK_SIZE);
    assert_eq!(chunks.len(), 11);
    assert_eq!(chunks.iter().map(ChunkRange::len).sum::<u64>(), 1_000_001);
    assert!(chunks.windows(2).all(|w| w[0].end == w[1].start));
    assert_eq!(chunks[10].len(), 1);
}

#[test]
fn test_chunk_range_predicate() {
    let chunk = ChunkRange { start: 3, end: 6 };
    assert_eq!(chunk.rowid_predicate(), "rowid BETWEEN 3 AND 5");
    assert_eq!(chunk.to_string(), "[3, 6)");
    assert!(!chunk.is_empty());
}

// ============================================================================
// Range Replace Tests
// ============================================================================

#[test]
fn test_chunked_copy_moves_every_row() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("remote.db");
    let loader = loader(&path, config().with_chunk_size(3));

    let summary = loader.load_batches(&[numbered(10)]).unwrap();

    assert_eq!(summary.staged_rows, 10);
    assert_eq!(summary.chunks, 4);
    assert_eq!(summary.copied_rows, 10);
    assert_eq!(summary.deleted_rows, 0);
    assert_eq!(remote_ids(&loader), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_rows_outside_range_are_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("remote.db");
    seed_remote(
        &path,
        &[
            ("2023-03-31 23:59:59", 100),
            ("2023-04-01 00:00:00", 101),
            ("2023-04-02 12:00:00", 102),
            ("2023-04-03 00:00:00", 103),
        ],
    );

    let loader = loader(&path, config());
    let summary = loader
        .load_batches(&[batch(&[("2023-04-01 08:00:00", 1), ("2023-04-02 08:00:00", 2)])])
        .unwrap();

    assert_eq!(summary.deleted_rows, 2);
    assert_eq!(summary.copied_rows, 2);
    assert_eq!(remote_ids(&loader), vec![1, 2, 100, 103]);
}

#[test]
fn test_reloading_a_range_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("remote.db");
    let loader = loader(&path, config().with_chunk_size(4));

    loader.load_batches(&[numbered(7)]).unwrap();
    let summary = loader.load_batches(&[numbered(7)]).unwrap();

    assert_eq!(summary.deleted_rows, 7);
    assert_eq!(summary.copied_rows, 7);
    assert_eq!(remote_ids(&loader).len(), 7);
}

#[test]
fn test_missing_remote_table_is_created() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("remote.db");
    let loader = loader(&path, config());

    assert!(!loader.store().table_exists(Some("wh"), "events").unwrap());
    let summary = loader.load_batches(&[numbered(2)]).unwrap();

    assert_eq!(summary.deleted_rows, 0);
    assert!(loader.store().table_exists(Some("wh"), "events").unwrap());
    assert!(!loader
        .store()
        .table_exists(None, "pypi_ingest_staging")
        .unwrap());
}

#[test]
fn test_dry_run_leaves_remote_alone() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("remote.db");
    let loader = loader(&path, config().with_dry_run(true));

    let summary = loader.load_batches(&[numbered(5)]).unwrap();

    assert_eq!(summary.staged_rows, 5);
    assert_eq!(summary.copied_rows, 0);
    assert_eq!(summary.chunks, 0);
    assert!(!loader.store().table_exists(Some("wh"), "events").unwrap());
}

#[test]
fn test_mismatched_columns_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("remote.db");
    let loader = loader(&path, config());

    let swapped = numbered(2).project(&[1, 0]).unwrap();
    let err = loader.load_batches(&[swapped]).unwrap_err();

    assert!(matches!(err, Error::SchemaMismatch { .. }));
    assert!(!loader.store().table_exists(Some("wh"), "events").unwrap());
}

#[tokio::test]
async fn test_load_from_source_records_estimate() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("remote.db");
    let loader = loader(&path, config().with_chunk_size(2));

    let source = MemorySource::new(vec![numbered(3), numbered(2)]);
    let summary = loader.load(&source).await.unwrap();

    assert_eq!(summary.estimated_rows, Some(5));
    assert_eq!(summary.staged_rows, 5);
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.copied_rows, 5);
}

#[test]
fn test_remote_table_and_debug() {
    let dir = tempdir().unwrap();
    let loader = loader(&dir.path().join("remote.db"), config());
    assert_eq!(loader.remote_table(), "wh.main.events");

    let target = WarehouseTarget::MotherDuck {
        token: "md-secret".to_string(),
    };
    assert!(!format!("{target:?}").contains("md-secret"));
}
