//! Job orchestration
//!
//! One job fetches a date range of downloads from a [`RecordSource`],
//! validates every row, keeps only the rows of the job's project inside the
//! range, then replaces that range in each configured sink:
//!
//! - `local`: the DuckDB file `<data_dir>/<database_name>.db`
//! - `s3`: the same local file, exported as partitioned Parquet afterwards
//! - `md`: the hosted warehouse, through the range-replace loader

use crate::config::{motherduck_token_from_env, JobParameters};
use crate::error::{Error, Result};
use crate::loader::{BufferedLoader, ExportSummary, LoaderConfig};
use crate::schema::file_downloads;
use crate::source::RecordSource;
use crate::types::{DateRange, Destination};
use crate::validate::validate_batches;
use crate::warehouse::{RangeReplaceConfig, RangeReplaceLoader, WarehouseSummary, WarehouseTarget};
use arrow::array::{ArrayRef, BooleanArray, StringArray, TimestampMicrosecondArray};
use arrow::compute::kernels::cmp::{eq, gt_eq, lt};
use arrow::compute::{and, cast, filter_record_batch};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// Where a job keeps local state and which warehouse it talks to
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Directory holding the local DuckDB file
    pub data_dir: PathBuf,
    /// Warehouse for the `md` destination; MotherDuck from the environment when unset
    pub warehouse: Option<WarehouseTarget>,
}

impl JobContext {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            warehouse: None,
        }
    }

    #[must_use]
    pub fn with_warehouse(mut self, warehouse: WarehouseTarget) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    /// Path of the local database file for `database_name`
    pub fn local_database(&self, database_name: &str) -> PathBuf {
        self.data_dir.join(format!("{database_name}.db"))
    }
}

impl Default for JobContext {
    fn default() -> Self {
        Self::new(".")
    }
}

/// What a job did
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobSummary {
    /// Rows returned by the source
    pub fetched_rows: usize,
    /// Rows removed from the local table before loading
    pub local_deleted_rows: usize,
    /// Fetched rows outside the range or belonging to another project
    pub skipped_rows: usize,
    /// Rows committed to the local table
    pub local_loaded_rows: usize,
    /// Object-storage export, when `s3` was a destination
    pub export: Option<ExportSummary>,
    /// Warehouse replacement, when `md` was a destination
    pub warehouse: Option<WarehouseSummary>,
    /// Wall-clock duration of the job
    pub elapsed_secs: f64,
}

/// Run one job end to end
pub async fn run_job(
    params: &JobParameters,
    source: &dyn RecordSource,
    context: &JobContext,
) -> Result<JobSummary> {
    let started = Instant::now();
    params.validate()?;
    let range = params.date_range()?;
    let record = file_downloads();

    tracing::info!(
        "Loading {} downloads in {} from {}",
        params.pypi_project,
        range,
        source.name()
    );

    match source.estimate_rows().await {
        Ok(Some(rows)) => tracing::info!("Expected rows: {}", rows),
        Ok(None) => {}
        Err(e) => tracing::warn!("Could not estimate rows from {}: {}", source.name(), e),
    }

    let batches = source.fetch().await?;
    let mut summary = JobSummary {
        fetched_rows: batches.iter().map(RecordBatch::num_rows).sum(),
        ..JobSummary::default()
    };

    validate_batches(&batches, &record)?;

    let batches = restrict_to_job(&batches, params, &range)?;
    let kept: usize = batches.iter().map(RecordBatch::num_rows).sum();
    summary.skipped_rows = summary.fetched_rows - kept;
    if summary.skipped_rows > 0 {
        tracing::warn!(
            "Skipping {} fetched rows outside {} or not from project {}",
            summary.skipped_rows,
            range,
            params.pypi_project
        );
    }
    tracing::info!(
        "Validated {} rows, sinking data to {:?}",
        kept,
        params.destination
    );

    if params.has_destination(Destination::Local) || params.has_destination(Destination::S3) {
        load_local(params, context, &batches, &mut summary).await?;
    }

    if params.has_destination(Destination::Md) {
        let target = match &context.warehouse {
            Some(target) => target.clone(),
            None => WarehouseTarget::MotherDuck {
                token: motherduck_token_from_env()?,
            },
        };
        let config = RangeReplaceConfig::new(
            &params.database_name,
            &params.table_name,
            &params.timestamp_column,
            range,
        )
        .with_chunk_size(params.chunk_size)
        .with_dry_run(params.dry_run);

        let loader = RangeReplaceLoader::connect(target, &record, config)?;
        summary.warehouse = Some(loader.load_batches(&batches)?);
    }

    let elapsed = started.elapsed().as_secs_f64();
    summary.elapsed_secs = elapsed;
    tracing::info!(
        "Total job completed in {} minutes and {:.2} seconds.",
        (elapsed / 60.0).floor(),
        elapsed % 60.0
    );

    Ok(summary)
}

/// Keep the rows whose timestamp falls in `range` and whose project is the job's
///
/// Every sink deletes exactly `range` before inserting, so a row outside it
/// would survive the delete of a rerun and be inserted twice.
fn restrict_to_job(
    batches: &[RecordBatch],
    params: &JobParameters,
    range: &DateRange,
) -> Result<Vec<RecordBatch>> {
    let start = TimestampMicrosecondArray::new_scalar(range.start().and_utc().timestamp_micros());
    let end = TimestampMicrosecondArray::new_scalar(range.end().and_utc().timestamp_micros());
    let project = StringArray::new_scalar(&params.pypi_project);

    let mut kept = Vec::with_capacity(batches.len());
    for batch in batches {
        let ts = cast(
            job_column(batch, &params.timestamp_column)?,
            &DataType::Timestamp(TimeUnit::Microsecond, None),
        )?;
        let in_range: BooleanArray = and(&gt_eq(&ts, &start)?, &lt(&ts, &end)?)?;

        let projects = cast(job_column(batch, "project")?, &DataType::Utf8)?;
        let mask = and(&in_range, &eq(&projects, &project)?)?;

        let filtered = filter_record_batch(batch, &mask)?;
        if filtered.num_rows() > 0 {
            kept.push(filtered);
        }
    }
    Ok(kept)
}

fn job_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::schema_mismatch(format!("fetched data has no '{name}' column")))
}

async fn load_local(
    params: &JobParameters,
    context: &JobContext,
    batches: &[RecordBatch],
    summary: &mut JobSummary,
) -> Result<()> {
    let range = params.date_range()?;
    let mut config = LoaderConfig::local(context.local_database(&params.database_name))
        .with_table_name(&params.table_name)
        .with_flush_threshold(params.flush_threshold)
        .with_dry_run(params.dry_run);
    if let Some(pk) = &params.primary_key {
        config = config.with_primary_key(pk);
    }

    let mut loader = BufferedLoader::new(file_downloads(), config)?;

    tracing::info!(
        "Deleting existing data from {} to {}",
        params.start_date,
        params.end_date
    );
    summary.local_deleted_rows = loader.delete_range(&params.timestamp_column, &range)?;

    for batch in batches {
        loader.insert(batch.clone())?;
    }
    loader.flush()?;
    summary.local_loaded_rows = loader.total_inserted();

    if params.has_destination(Destination::S3) {
        if let Some(s3_path) = &params.s3_path {
            tracing::info!("Writing data to {}", s3_path);
            summary.export = Some(
                loader
                    .write_to_object_storage(
                        s3_path,
                        &params.timestamp_column,
                        params.aws_profile.as_deref(),
                    )
                    .await?,
            );
        }
    }

    Ok(())
}
