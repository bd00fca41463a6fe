//! Range-replace loader for the hosted warehouse
//!
//! Stages source batches in a local temporary table, deletes the target
//! date range from the remote table, then copies the staged rows across in
//! row-id chunks.

use super::chunk::plan_chunks;
use crate::database::{LocalStore, StoreLocation};
use crate::error::{Error, Result};
use crate::schema::{RecordSchema, SchemaDeriver, TableSchema};
use crate::source::RecordSource;
use crate::types::DateRange;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default rows copied per remote insert
pub const DEFAULT_CHUNK_SIZE: u64 = 100_000;

const STAGING_TABLE: &str = "pypi_ingest_staging";

/// Remote database the loader writes to
#[derive(Clone)]
pub enum WarehouseTarget {
    /// MotherDuck, authenticated with an access token
    MotherDuck { token: String },
    /// A DuckDB database file attached to the session
    Attached { path: PathBuf },
}

impl std::fmt::Debug for WarehouseTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarehouseTarget::MotherDuck { .. } => write!(f, "MotherDuck {{ token: *** }}"),
            WarehouseTarget::Attached { path } => {
                f.debug_struct("Attached").field("path", path).finish()
            }
        }
    }
}

/// Options for one range replacement
#[derive(Debug, Clone)]
pub struct RangeReplaceConfig {
    pub database_name: String,
    pub table_name: String,
    pub timestamp_column: String,
    pub range: DateRange,
    pub chunk_size: u64,
    pub dry_run: bool,
}

impl RangeReplaceConfig {
    pub fn new(
        database_name: impl Into<String>,
        table_name: impl Into<String>,
        timestamp_column: impl Into<String>,
        range: DateRange,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            table_name: table_name.into(),
            timestamp_column: timestamp_column.into(),
            range,
            chunk_size: DEFAULT_CHUNK_SIZE,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// What a range replacement did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseSummary {
    /// Source estimate, when one was available
    pub estimated_rows: Option<u64>,
    /// Rows materialized in the staging table
    pub staged_rows: u64,
    /// Remote rows removed by the range delete
    pub deleted_rows: u64,
    /// Rows copied to the remote table
    pub copied_rows: u64,
    /// Chunk inserts executed
    pub chunks: usize,
}

/// Delete-then-insert loader scoped to one date range
pub struct RangeReplaceLoader {
    store: LocalStore,
    table: TableSchema,
    config: RangeReplaceConfig,
}

impl std::fmt::Debug for RangeReplaceLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeReplaceLoader")
            .field("remote", &self.remote_table())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RangeReplaceLoader {
    /// Connect to the warehouse and prepare the target database
    pub fn connect(
        target: WarehouseTarget,
        record: &RecordSchema,
        config: RangeReplaceConfig,
    ) -> Result<Self> {
        let table =
            SchemaDeriver::default().table_schema(record, Some(config.table_name.as_str()), None)?;

        let store = match target {
            WarehouseTarget::MotherDuck { token } => {
                let store = LocalStore::open(StoreLocation::MotherDuck { token })?;
                if !config.dry_run {
                    store.execute_batch(&format!(
                        "CREATE DATABASE IF NOT EXISTS {};",
                        config.database_name
                    ))?;
                }
                store
            }
            WarehouseTarget::Attached { path } => {
                let store = LocalStore::open_in_memory()?;
                let path = path
                    .to_str()
                    .ok_or_else(|| Error::config("Warehouse path is not valid UTF-8"))?;
                store.attach(path, &config.database_name)?;
                store
            }
        };

        Ok(Self {
            store,
            table,
            config,
        })
    }

    /// Fully qualified remote table name
    pub fn remote_table(&self) -> String {
        format!(
            "{}.main.{}",
            self.config.database_name, self.config.table_name
        )
    }

    /// The session used for staging and remote statements
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Replace the configured range with everything `source` returns
    pub async fn load(&self, source: &dyn RecordSource) -> Result<WarehouseSummary> {
        let estimated_rows = match source.estimate_rows().await {
            Ok(Some(rows)) => {
                tracing::info!("Expected rows from {}: {}", source.name(), rows);
                Some(rows)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Could not estimate rows from {}: {}", source.name(), e);
                None
            }
        };

        let batches = source.fetch().await?;
        let mut summary = self.load_batches(&batches)?;
        summary.estimated_rows = estimated_rows;
        Ok(summary)
    }

    /// Replace the configured range with `batches`
    pub fn load_batches(&self, batches: &[RecordBatch]) -> Result<WarehouseSummary> {
        let staged_rows = self.stage(batches)?;
        let remote = self.remote_table();
        let range = &self.config.range;

        let chunks = plan_chunks(staged_rows, self.config.chunk_size);

        if self.config.dry_run {
            tracing::info!(
                "Dry run: would replace {} in {} with {} rows in {} chunks",
                range,
                remote,
                staged_rows,
                chunks.len()
            );
            self.drop_staging()?;
            return Ok(WarehouseSummary {
                staged_rows,
                ..WarehouseSummary::default()
            });
        }

        let deleted_rows = if self
            .store
            .table_exists(Some(&self.config.database_name), &self.config.table_name)?
        {
            let deleted = self.store.execute(&format!(
                "DELETE FROM {remote} WHERE {}",
                range.sql_predicate(&self.config.timestamp_column)
            ))?;
            tracing::info!("Deleted {} rows from {} in {}", deleted, remote, range);
            deleted as u64
        } else {
            tracing::info!("{} does not exist yet, skipping range delete", remote);
            0
        };

        self.store.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {remote} AS SELECT * FROM {STAGING_TABLE} LIMIT 0;"
        ))?;

        let mut copied_rows = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            let copied = self.store.execute(&format!(
                "INSERT INTO {remote} SELECT * FROM {STAGING_TABLE} WHERE {}",
                chunk.rowid_predicate()
            ))?;
            copied_rows += copied as u64;
            tracing::info!(
                "Copied chunk {}/{} rows {} ({} rows) into {}",
                i + 1,
                chunks.len(),
                chunk,
                copied,
                remote
            );
        }

        self.drop_staging()?;

        tracing::info!(
            "Replaced {} in {}: {} rows deleted, {} rows copied",
            range,
            remote,
            deleted_rows,
            copied_rows
        );

        Ok(WarehouseSummary {
            estimated_rows: None,
            staged_rows,
            deleted_rows,
            copied_rows,
            chunks: chunks.len(),
        })
    }

    /// Materialize the batches in a local temporary table
    fn stage(&self, batches: &[RecordBatch]) -> Result<u64> {
        let expected = self.table.column_names();
        for batch in batches {
            let schema = batch.schema();
            let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();
            if names != expected {
                return Err(Error::schema_mismatch(format!(
                    "staged columns {names:?} do not match {expected:?}"
                )));
            }
        }

        self.store
            .execute_batch(&format!("{};", self.table.temp_ddl(STAGING_TABLE)))?;
        self.store.transaction(|store| {
            for batch in batches {
                store.insert_batch(STAGING_TABLE, batch, false)?;
            }
            Ok(())
        })?;

        let staged = self.store.count_rows(STAGING_TABLE)?;
        tracing::info!("Staged {} rows for {}", staged, self.remote_table());
        Ok(staged)
    }

    fn drop_staging(&self) -> Result<()> {
        self.store
            .execute_batch(&format!("DROP TABLE IF EXISTS {STAGING_TABLE};"))
    }
}
