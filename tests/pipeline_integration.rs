//! End-to-end job tests against local sinks
//!
//! Every destination except MotherDuck itself runs here: the local DuckDB
//! file, a local directory standing in for object storage, and a DuckDB file
//! attached as the warehouse.

use arrow::array::AsArray;
use arrow::datatypes::Int64Type;
use arrow::record_batch::RecordBatch;
use pypi_ingest::database::{LocalStore, StoreLocation};
use pypi_ingest::output::json_to_arrow;
use pypi_ingest::source::{MemorySource, ParquetFileSource};
use pypi_ingest::warehouse::WarehouseTarget;
use pypi_ingest::{
    file_downloads, run_job, Destination, Error, JobContext, JobParameters, SchemaDeriver,
};
use serde_json::{json, Value};
use std::path::Path;
use tempfile::tempdir;

fn download(ts: &str, version: &str) -> Value {
    json!({
        "timestamp": ts,
        "country_code": "NL",
        "url": "/packages/duckdb.whl",
        "project": "duckdb",
        "file": {"filename": "duckdb.whl", "project": "duckdb", "version": version, "type": "bdist_wheel"},
        "details": {
            "installer": {"name": "pip", "version": "23.1"},
            "python": "3.11.4",
            "distro": {"name": "Ubuntu", "libc": {"lib": "glibc", "version": "2.35"}},
            "ci": false
        },
        "tls_protocol": "TLSv1.3",
        "tls_cipher": "TLS_AES_128_GCM_SHA256"
    })
}

fn downloads(rows: &[Value]) -> RecordBatch {
    let schema = SchemaDeriver::default().arrow_schema(&file_downloads());
    json_to_arrow(rows, &schema).unwrap()
}

fn april_batch() -> RecordBatch {
    downloads(&[
        download("2023-04-01 10:00:00", "0.7.1"),
        download("2023-04-01 18:30:00", "0.8.0"),
        download("2023-04-02 09:15:00", "0.8.0"),
    ])
}

fn params(start: &str, end: &str, destination: Vec<Destination>) -> JobParameters {
    JobParameters {
        start_date: start.to_string(),
        end_date: end.to_string(),
        destination,
        ..JobParameters::default()
    }
}

fn local_store(dir: &Path) -> LocalStore {
    LocalStore::open(StoreLocation::File(dir.join("duckdb_stats.db"))).unwrap()
}

fn versions(store: &LocalStore) -> Vec<String> {
    let (_, batches) = store
        .query_arrow(
            "SELECT struct_extract(\"file\", 'version') FROM pypi_file_downloads \
             ORDER BY \"timestamp\"",
        )
        .unwrap();
    batches
        .iter()
        .flat_map(|b| {
            let col = b.column(0).as_string::<i32>();
            (0..b.num_rows())
                .map(|i| col.value(i).to_string())
                .collect::<Vec<_>>()
        })
        .collect()
}

// ============================================================================
// Local destination
// ============================================================================

#[tokio::test]
async fn test_local_job_loads_every_row() {
    let dir = tempdir().unwrap();
    let params = params("2023-04-01", "2023-04-03", vec![Destination::Local]);
    let source = MemorySource::new(vec![april_batch()]);

    let summary = run_job(&params, &source, &JobContext::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(summary.fetched_rows, 3);
    assert_eq!(summary.local_loaded_rows, 3);
    assert!(summary.export.is_none());
    assert!(summary.warehouse.is_none());

    let store = local_store(dir.path());
    assert_eq!(store.count_rows("pypi_file_downloads").unwrap(), 3);
    assert_eq!(versions(&store), vec!["0.7.1", "0.8.0", "0.8.0"]);
}

#[tokio::test]
async fn test_rerunning_a_range_replaces_it() {
    let dir = tempdir().unwrap();
    let context = JobContext::new(dir.path());
    let params = params("2023-04-01", "2023-04-03", vec![Destination::Local]);

    run_job(&params, &MemorySource::new(vec![april_batch()]), &context)
        .await
        .unwrap();
    let summary = run_job(&params, &MemorySource::new(vec![april_batch()]), &context)
        .await
        .unwrap();

    assert_eq!(summary.local_deleted_rows, 3);
    assert_eq!(local_store(dir.path()).count_rows("pypi_file_downloads").unwrap(), 3);
}

#[tokio::test]
async fn test_narrower_rerun_keeps_rows_outside_its_range() {
    let dir = tempdir().unwrap();
    let context = JobContext::new(dir.path());

    run_job(
        &params("2023-04-01", "2023-04-03", vec![Destination::Local]),
        &MemorySource::new(vec![april_batch()]),
        &context,
    )
    .await
    .unwrap();

    let replacement = downloads(&[download("2023-04-02 11:00:00", "0.9.0")]);
    let summary = run_job(
        &params("2023-04-02", "2023-04-03", vec![Destination::Local]),
        &MemorySource::new(vec![replacement]),
        &context,
    )
    .await
    .unwrap();

    assert_eq!(summary.local_deleted_rows, 1);
    assert_eq!(
        versions(&local_store(dir.path())),
        vec!["0.7.1", "0.8.0", "0.9.0"]
    );
}

#[tokio::test]
async fn test_rows_outside_the_range_are_never_loaded() {
    let dir = tempdir().unwrap();
    let context = JobContext::new(dir.path());
    let params = params("2023-04-01", "2023-04-03", vec![Destination::Local]);
    let fetched = || {
        downloads(&[
            download("2023-04-01 10:00:00", "0.7.1"),
            download("2023-04-02 09:15:00", "0.8.0"),
            download("2023-04-03 00:00:00", "0.8.1"),
            download("2023-05-20 12:00:00", "0.9.0"),
        ])
    };

    run_job(&params, &MemorySource::new(vec![fetched()]), &context)
        .await
        .unwrap();
    let summary = run_job(&params, &MemorySource::new(vec![fetched()]), &context)
        .await
        .unwrap();

    assert_eq!(summary.fetched_rows, 4);
    assert_eq!(summary.skipped_rows, 2);
    assert_eq!(summary.local_deleted_rows, 2);
    assert_eq!(summary.local_loaded_rows, 2);
    assert_eq!(versions(&local_store(dir.path())), vec!["0.7.1", "0.8.0"]);
}

#[tokio::test]
async fn test_rows_of_other_projects_are_skipped() {
    let dir = tempdir().unwrap();
    let params = params("2023-04-01", "2023-04-03", vec![Destination::Local]);

    let mut polars = download("2023-04-01 12:00:00", "0.19.0");
    polars["project"] = json!("polars");
    let batch = downloads(&[download("2023-04-01 10:00:00", "0.8.0"), polars]);

    let summary = run_job(&params, &MemorySource::new(vec![batch]), &JobContext::new(dir.path()))
        .await
        .unwrap();

    assert_eq!(summary.skipped_rows, 1);
    assert_eq!(summary.local_loaded_rows, 1);
    assert_eq!(versions(&local_store(dir.path())), vec!["0.8.0"]);
}

#[tokio::test]
async fn test_invalid_rows_abort_before_loading() {
    let dir = tempdir().unwrap();
    let params = params("2023-04-01", "2023-04-03", vec![Destination::Local]);

    let mut missing_ts = download("2023-04-01 10:00:00", "0.8.0");
    missing_ts["timestamp"] = Value::Null;
    let batch = downloads(&[
        download("2023-04-01 10:00:00", "0.8.0"),
        missing_ts.clone(),
        missing_ts,
    ]);

    let err = run_job(&params, &MemorySource::new(vec![batch]), &JobContext::new(dir.path()))
        .await
        .unwrap_err();

    let failures = err.validation_failures().unwrap();
    assert_eq!(failures.iter().map(|f| f.row).collect::<Vec<_>>(), vec![1, 2]);
    assert!(!dir.path().join("duckdb_stats.db").exists());
}

#[tokio::test]
async fn test_invalid_parameters_fail_fast() {
    let dir = tempdir().unwrap();
    let params = params("2023-04-03", "2023-04-01", vec![Destination::Local]);

    let err = run_job(
        &params,
        &MemorySource::new(vec![april_batch()]),
        &JobContext::new(dir.path()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::InvalidConfigValue { .. }));
}

#[tokio::test]
async fn test_dry_run_loads_nothing() {
    let dir = tempdir().unwrap();
    let params = JobParameters {
        dry_run: true,
        ..params("2023-04-01", "2023-04-03", vec![Destination::Local])
    };

    let summary = run_job(
        &params,
        &MemorySource::new(vec![april_batch()]),
        &JobContext::new(dir.path()),
    )
    .await
    .unwrap();

    assert_eq!(summary.fetched_rows, 3);
    assert_eq!(summary.local_loaded_rows, 0);
    assert!(!local_store(dir.path())
        .table_exists(None, "pypi_file_downloads")
        .unwrap());
}

// ============================================================================
// Object storage destination
// ============================================================================

#[tokio::test]
async fn test_s3_destination_exports_partitions() {
    let dir = tempdir().unwrap();
    let exports = tempdir().unwrap();

    let batch_rows = vec![
        download("2023-04-30 23:00:00", "0.8.0"),
        download("2023-05-01 01:00:00", "0.8.1"),
    ];
    let job = JobParameters {
        s3_path: Some(exports.path().display().to_string()),
        ..params("2023-04-30", "2023-05-02", vec![Destination::S3])
    };

    let summary = run_job(
        &job,
        &MemorySource::new(vec![downloads(&batch_rows)]),
        &JobContext::new(dir.path()),
    )
    .await
    .unwrap();

    let export = summary.export.unwrap();
    assert_eq!(export.rows, 2);
    assert_eq!(export.files.len(), 2);

    let table_dir = exports.path().join("pypi_file_downloads");
    assert!(table_dir.join("year=2023/month=4/data_0.parquet").exists());
    assert!(table_dir.join("year=2023/month=5/data_0.parquet").exists());

    // The export replays into a fresh database unchanged
    let replay_dir = tempdir().unwrap();
    let replay = run_job(
        &params("2023-04-30", "2023-05-02", vec![Destination::Local]),
        &ParquetFileSource::new(&table_dir),
        &JobContext::new(replay_dir.path()),
    )
    .await
    .unwrap();
    assert_eq!(replay.local_loaded_rows, 2);
    assert_eq!(versions(&local_store(replay_dir.path())), vec!["0.8.0", "0.8.1"]);
}

// ============================================================================
// Warehouse destination
// ============================================================================

#[tokio::test]
async fn test_md_destination_replaces_remote_range() {
    let dir = tempdir().unwrap();
    let remote = dir.path().join("warehouse.db");
    let context = JobContext::new(dir.path()).with_warehouse(WarehouseTarget::Attached {
        path: remote.clone(),
    });
    let params = JobParameters {
        chunk_size: 2,
        ..params("2023-04-01", "2023-04-03", vec![Destination::Local, Destination::Md])
    };

    run_job(&params, &MemorySource::new(vec![april_batch()]), &context)
        .await
        .unwrap();
    let summary = run_job(&params, &MemorySource::new(vec![april_batch()]), &context)
        .await
        .unwrap();

    let warehouse = summary.warehouse.unwrap();
    assert_eq!(warehouse.deleted_rows, 3);
    assert_eq!(warehouse.copied_rows, 3);
    assert_eq!(warehouse.chunks, 2);
    assert_eq!(summary.local_loaded_rows, 3);

    let store = LocalStore::open(StoreLocation::File(remote)).unwrap();
    let (_, batches) = store
        .query_arrow("SELECT COUNT(*)::BIGINT FROM pypi_file_downloads")
        .unwrap();
    assert_eq!(batches[0].column(0).as_primitive::<Int64Type>().value(0), 3);
}
