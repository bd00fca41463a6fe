//! Buffered loader
//!
//! Accumulates Arrow batches in memory and commits them to the local store
//! once the flush threshold is reached or on request. With a primary key
//! declared, flushes use `INSERT OR REPLACE` so replaying rows never
//! duplicates them; without one, replays append.

use super::types::{ExportSummary, LoaderConfig};
use crate::database::{LocalStore, StoreLocation};
use crate::error::{Error, Result, ValidationFailure};
use crate::load_id::{stamp_batch, LoadIdGranularity};
use crate::output::{
    build_partition_path, encode_parquet, json_to_arrow, CloudDestination, ParquetWriterConfig,
};
use crate::schema::{RecordSchema, SchemaDeriver, TableSchema, LOAD_ID_FIELD};
use crate::types::{DateRange, JsonValue};
use crate::validate::check_record;
use arrow::array::{new_null_array, Array, ArrayRef, AsArray, UInt32Array};
use arrow::compute::{can_cast_types, cast, concat_batches, take};
use arrow::datatypes::{Int64Type, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Buffered, schema-checked bulk loader over one owned DuckDB connection
pub struct BufferedLoader {
    store: LocalStore,
    record: RecordSchema,
    table: TableSchema,
    arrow_schema: SchemaRef,
    /// Accumulated batches awaiting a flush
    buffer: Vec<RecordBatch>,
    buffered_rows: usize,
    total_inserted: usize,
    flush_threshold: usize,
    dry_run: bool,
    last_load_id: Option<String>,
}

impl std::fmt::Debug for BufferedLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedLoader")
            .field("table", &self.table.table_name)
            .field("buffered_rows", &self.buffered_rows)
            .field("total_inserted", &self.total_inserted)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl BufferedLoader {
    /// Open the store and create the target table if needed
    pub fn new(record: RecordSchema, config: LoaderConfig) -> Result<Self> {
        Self::with_deriver(record, config, &SchemaDeriver::default())
    }

    /// Like [`BufferedLoader::new`] with a custom type mapping
    pub fn with_deriver(
        record: RecordSchema,
        config: LoaderConfig,
        deriver: &SchemaDeriver,
    ) -> Result<Self> {
        let table = deriver.table_schema(
            &record,
            config.table_name.as_deref(),
            config.primary_key.as_deref(),
        )?;
        let arrow_schema = Arc::new(deriver.arrow_schema(&record));

        let is_motherduck = matches!(config.location, StoreLocation::MotherDuck { .. });
        let store = LocalStore::open(config.location)?;

        if config.dry_run {
            tracing::info!(
                "Dry run: skipping table setup for {} on {}",
                table.table_name,
                store.location()
            );
        } else {
            if is_motherduck {
                let database = config
                    .database_name
                    .as_deref()
                    .ok_or_else(|| Error::missing_field("database_name"))?;
                store.use_database(database)?;
            }
            store.execute_batch(&table.ddl())?;
            tracing::info!(
                "Initialized loader for {} on {} (primary key: {})",
                table.table_name,
                store.location(),
                table.primary_key.as_deref().unwrap_or("none")
            );
        }

        Ok(Self {
            store,
            record,
            table,
            arrow_schema,
            buffer: Vec::new(),
            buffered_rows: 0,
            total_inserted: 0,
            flush_threshold: config.flush_threshold.max(1),
            dry_run: config.dry_run,
            last_load_id: None,
        })
    }

    // ========================================================================
    // Accumulation
    // ========================================================================

    /// Append a batch, flushing once the threshold is reached
    pub fn insert(&mut self, batch: RecordBatch) -> Result<()> {
        let batch = self.conform(&batch)?;
        if batch.num_rows() == 0 {
            return Ok(());
        }

        self.buffered_rows += batch.num_rows();
        self.buffer.push(batch);

        if self.buffered_rows >= self.flush_threshold {
            tracing::debug!(
                "Buffered {} rows (threshold {}), flushing",
                self.buffered_rows,
                self.flush_threshold
            );
            self.flush()?;
        }
        Ok(())
    }

    /// Append JSON records converted to the accumulator's schema
    ///
    /// Every record is checked against the record schema first; one bad
    /// record rejects the whole call and nothing is buffered.
    pub fn insert_records(&mut self, records: &[JsonValue]) -> Result<()> {
        let failures: Vec<ValidationFailure> = records
            .iter()
            .enumerate()
            .filter_map(|(row, value)| {
                let result = match value {
                    JsonValue::Object(record) => check_record(record, &self.record),
                    _ => Err("expected a JSON object".to_string()),
                };
                result
                    .err()
                    .map(|message| ValidationFailure { row, message })
            })
            .collect();
        if !failures.is_empty() {
            return Err(Error::Validation { failures });
        }

        let batch = json_to_arrow(records, &self.arrow_schema)?;
        self.insert(batch)
    }

    /// Cast an incoming batch onto the accumulator schema
    ///
    /// Columns are matched by name. Missing columns become null; undeclared
    /// columns and uncastable types are a schema mismatch.
    fn conform(&self, batch: &RecordBatch) -> Result<RecordBatch> {
        let incoming = batch.schema();

        if let Some(extra) = incoming
            .fields()
            .iter()
            .find(|f| self.arrow_schema.field_with_name(f.name()).is_err())
        {
            return Err(Error::schema_mismatch(format!(
                "column '{}' is not declared in {}",
                extra.name(),
                self.record.name
            )));
        }

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.arrow_schema.fields().len());
        for field in self.arrow_schema.fields() {
            let column = match incoming.index_of(field.name()) {
                Ok(idx) => {
                    let column = batch.column(idx);
                    if column.data_type() == field.data_type() {
                        Arc::clone(column)
                    } else if can_cast_types(column.data_type(), field.data_type()) {
                        cast(column, field.data_type()).map_err(|e| {
                            Error::schema_mismatch(format!(
                                "column '{}' cannot be cast from {} to {}: {e}",
                                field.name(),
                                column.data_type(),
                                field.data_type()
                            ))
                        })?
                    } else {
                        return Err(Error::schema_mismatch(format!(
                            "column '{}' has type {}, expected {}",
                            field.name(),
                            column.data_type(),
                            field.data_type()
                        )));
                    }
                }
                Err(_) => new_null_array(field.data_type(), batch.num_rows()),
            };
            columns.push(column);
        }

        RecordBatch::try_new(Arc::clone(&self.arrow_schema), columns)
            .map_err(|e| Error::schema_mismatch(e.to_string()))
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Commit the accumulated rows to the local store
    ///
    /// Returns the number of rows committed. The whole flush runs in one
    /// transaction; on failure nothing is cleared and the call can be
    /// repeated. In dry-run mode nothing is written and the rows stay
    /// buffered.
    pub fn flush(&mut self) -> Result<usize> {
        if self.dry_run {
            tracing::info!(
                "Dry run: not flushing {} buffered rows into {}",
                self.buffered_rows,
                self.table.table_name
            );
            return Ok(0);
        }
        if self.buffered_rows == 0 {
            return Ok(0);
        }

        let combined = concat_batches(&self.arrow_schema, &self.buffer)?;

        let granularity = if self.table.primary_key.as_deref() == Some(LOAD_ID_FIELD) {
            LoadIdGranularity::PerRow
        } else {
            LoadIdGranularity::PerBatch
        };
        let (stamped, batch_id) = stamp_batch(&self.record, &combined, granularity, Utc::now())?;

        let rows = match self.table.primary_key.as_deref() {
            Some(key) => keep_last_per_key(&stamped, key)?,
            None => stamped,
        };

        let replace = self.table.has_primary_key();
        let table_name = &self.table.table_name;
        self.store
            .transaction(|store| store.insert_batch(table_name, &rows, replace))?;

        let flushed = rows.num_rows();
        self.total_inserted += flushed;
        if batch_id.is_some() {
            self.last_load_id = batch_id;
        }
        self.buffer.clear();
        self.buffered_rows = 0;

        tracing::info!(
            "Flushed {} records into {} (total {})",
            flushed,
            self.table.table_name,
            self.total_inserted
        );
        Ok(flushed)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Delete rows of the target table whose `column` falls in `range`
    pub fn delete_range(&self, column: &str, range: &DateRange) -> Result<usize> {
        if self.dry_run {
            tracing::info!(
                "Dry run: not deleting {} rows in {}",
                self.table.table_name,
                range
            );
            return Ok(0);
        }

        let deleted = self.store.execute(&format!(
            "DELETE FROM {} WHERE {}",
            self.table.table_name,
            range.sql_predicate(column)
        ))?;
        tracing::info!(
            "Deleted {} rows from {} in {}",
            deleted,
            self.table.table_name,
            range
        );
        Ok(deleted)
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Export the target table as Parquet partitioned by year and month
    ///
    /// Files land at `<path>/<table>/year=<Y>/month=<M>/data_0.parquet`.
    /// Only the partitions present in the table are overwritten.
    pub async fn write_to_object_storage(
        &self,
        path: &str,
        partition_column: &str,
        profile: Option<&str>,
    ) -> Result<ExportSummary> {
        if self.dry_run {
            tracing::info!(
                "Dry run: not exporting {} to {}",
                self.table.table_name,
                path
            );
            return Ok(ExportSummary::default());
        }

        let destination = CloudDestination::parse(path, profile).await?;
        let table = &self.table.table_name;
        let config = ParquetWriterConfig::default();
        let mut summary = ExportSummary::default();

        for (year, month) in self.partitions(partition_column)? {
            let predicate = format!(
                "year(\"{partition_column}\") IS NOT DISTINCT FROM {} \
                 AND month(\"{partition_column}\") IS NOT DISTINCT FROM {}",
                sql_int(year),
                sql_int(month)
            );
            let (schema, batches) = self
                .store
                .query_arrow(&format!("SELECT * FROM {table} WHERE {predicate}"))?;
            let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
            if rows == 0 {
                continue;
            }

            let bytes = encode_parquet(&schema, &batches, &config)?;
            let key = format!("{table}/{}", build_partition_path(year, month));
            let written = destination.write(&key, bytes).await?;
            tracing::info!("Wrote {} rows to {}", rows, written);

            summary.files.push(written);
            summary.rows += rows;
        }

        tracing::info!(
            "Exported {} rows of {} in {} files",
            summary.rows,
            table,
            summary.files.len()
        );
        Ok(summary)
    }

    fn partitions(&self, column: &str) -> Result<Vec<(Option<i64>, Option<i64>)>> {
        let (_, batches) = self.store.query_arrow(&format!(
            "SELECT DISTINCT year(\"{column}\")::BIGINT, month(\"{column}\")::BIGINT \
             FROM {} ORDER BY 1, 2",
            self.table.table_name
        ))?;

        let mut partitions = Vec::new();
        for batch in &batches {
            let years = batch.column(0).as_primitive::<Int64Type>();
            let months = batch.column(1).as_primitive::<Int64Type>();
            for row in 0..batch.num_rows() {
                let value = |a: &arrow::array::Int64Array| a.is_valid(row).then(|| a.value(row));
                partitions.push((value(years), value(months)));
            }
        }
        Ok(partitions)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Rows committed by all flushes so far
    pub fn total_inserted(&self) -> usize {
        self.total_inserted
    }

    /// Rows waiting for the next flush
    pub fn buffered_rows(&self) -> usize {
        self.buffered_rows
    }

    /// Identifier of the most recent per-batch flush
    pub fn last_load_id(&self) -> Option<&str> {
        self.last_load_id.as_deref()
    }

    pub fn table_name(&self) -> &str {
        &self.table.table_name
    }

    pub fn table_schema(&self) -> &TableSchema {
        &self.table
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::clone(&self.arrow_schema)
    }

    pub fn has_primary_key(&self) -> bool {
        self.table.has_primary_key()
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// The owned local store
    pub fn store(&self) -> &LocalStore {
        &self.store
    }
}

fn sql_int(value: Option<i64>) -> String {
    value.map_or_else(|| "NULL".to_string(), |v| v.to_string())
}

/// Collapse rows sharing a key value to their last occurrence
fn keep_last_per_key(batch: &RecordBatch, key: &str) -> Result<RecordBatch> {
    let column = batch.column(batch.schema().index_of(key)?);
    let formatter = ArrayFormatter::try_new(column.as_ref(), &FormatOptions::default())?;

    let mut last: HashMap<Option<String>, usize> = HashMap::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let value = if column.is_valid(row) {
            Some(formatter.value(row).try_to_string()?)
        } else {
            None
        };
        last.insert(value, row);
    }

    if last.len() == batch.num_rows() {
        return Ok(batch.clone());
    }

    let mut keep: Vec<u32> = last.into_values().map(|row| row as u32).collect();
    keep.sort_unstable();
    tracing::debug!(
        "Collapsed {} rows with duplicate {} values",
        batch.num_rows() - keep.len(),
        key
    );

    let indices = UInt32Array::from(keep);
    let columns = batch
        .columns()
        .iter()
        .map(|c| take(c.as_ref(), &indices, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}
