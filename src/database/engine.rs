//! DuckDB-based local analytical store
//!
//! Owns one DuckDB connection (file, in-memory, or a MotherDuck session)
//! and moves Arrow data in and out of it. Record batches enter through
//! DuckDB's `arrow` table function; query results leave as Arrow batches.

use crate::error::{Error, Result};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use duckdb::vtab::arrow::{arrow_recordbatch_to_query_params, ArrowVTab};
use duckdb::Connection;
use std::path::PathBuf;

/// Rows per Arrow slice handed to the `arrow` table function (one DuckDB vector)
pub const ARROW_SLICE_ROWS: usize = 2048;

/// Where the store's database lives
#[derive(Clone)]
pub enum StoreLocation {
    /// Transient in-memory database
    InMemory,
    /// Database file, created on first open
    File(PathBuf),
    /// Hosted MotherDuck warehouse reached from an in-memory session
    MotherDuck { token: String },
}

impl std::fmt::Debug for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreLocation::InMemory => write!(f, "InMemory"),
            StoreLocation::File(path) => f.debug_tuple("File").field(path).finish(),
            StoreLocation::MotherDuck { .. } => write!(f, "MotherDuck {{ token: *** }}"),
        }
    }
}

impl std::fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreLocation::InMemory => write!(f, ":memory:"),
            StoreLocation::File(path) => write!(f, "{}", path.display()),
            StoreLocation::MotherDuck { .. } => write!(f, "md:"),
        }
    }
}

/// An exclusively owned DuckDB connection
pub struct LocalStore {
    /// DuckDB connection
    conn: Connection,
    /// Location the connection was opened on (for logging)
    location: StoreLocation,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Open (or create) the store
    pub fn open(location: StoreLocation) -> Result<Self> {
        let conn = match &location {
            StoreLocation::InMemory => Connection::open_in_memory()
                .map_err(|e| Error::config(format!("Failed to create DuckDB connection: {e}")))?,
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path).map_err(|e| {
                    Error::config(format!(
                        "Failed to open DuckDB database {}: {e}",
                        path.display()
                    ))
                })?
            }
            StoreLocation::MotherDuck { token } => {
                let conn = Connection::open_in_memory().map_err(|e| {
                    Error::config(format!("Failed to create DuckDB connection: {e}"))
                })?;
                Self::connect_motherduck(&conn, token)?;
                conn
            }
        };

        conn.register_table_function::<ArrowVTab>("arrow")
            .map_err(|e| Error::config(format!("Failed to register arrow table function: {e}")))?;

        tracing::debug!("Opened DuckDB store at {}", location);

        Ok(Self { conn, location })
    }

    /// Open a transient in-memory store
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreLocation::InMemory)
    }

    fn connect_motherduck(conn: &Connection, token: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(Error::config("MotherDuck token is empty"));
        }

        conn.execute_batch("INSTALL md; LOAD md;")
            .map_err(|e| Error::config(format!("Failed to load MotherDuck extension: {e}")))?;

        conn.execute_batch(&format!(
            "SET motherduck_token = '{}';",
            token.replace('\'', "''")
        ))
        .map_err(|_| Error::config("Failed to set MotherDuck token"))?;

        conn.execute_batch("ATTACH 'md:';")
            .map_err(|e| Error::config(format!("Failed to attach MotherDuck: {e}")))?;

        tracing::info!("Connected to MotherDuck");
        Ok(())
    }

    /// Location this store was opened on
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Underlying DuckDB connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Execute one statement, returning the number of changed rows
    pub fn execute(&self, sql: &str) -> Result<usize> {
        tracing::debug!("Executing: {}", sql);
        Ok(self.conn.execute(sql, [])?)
    }

    /// Execute a batch of `;`-separated statements
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        tracing::debug!("Executing batch: {}", sql);
        Ok(self.conn.execute_batch(sql)?)
    }

    /// Run `f` inside one transaction; roll back if it fails
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN TRANSACTION;")?;
        match f(self) {
            Ok(value) => {
                self.conn.execute_batch("COMMIT;")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK;") {
                    tracing::warn!("Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    /// Check whether a table exists, optionally within one catalog (database)
    pub fn table_exists(&self, catalog: Option<&str>, table: &str) -> Result<bool> {
        let count: i64 = match catalog {
            Some(catalog) => self.conn.query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_catalog = ? AND table_name = ?",
                [catalog, table],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
                [table],
                |row| row.get(0),
            )?,
        };
        Ok(count > 0)
    }

    /// Number of rows in a table (any qualified name)
    pub fn count_rows(&self, table: &str) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
        Ok(count.max(0) as u64)
    }

    /// Single integer result of a query; `None` for SQL NULL
    pub fn query_i64(&self, sql: &str) -> Result<Option<i64>> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }

    /// Append a record batch to a table
    ///
    /// Columns are matched by position. With `replace`, rows whose primary
    /// key already exists overwrite the stored row (`INSERT OR REPLACE`).
    /// The caller decides the transaction scope.
    pub fn insert_batch(&self, table: &str, batch: &RecordBatch, replace: bool) -> Result<usize> {
        let verb = if replace {
            "INSERT OR REPLACE INTO"
        } else {
            "INSERT INTO"
        };
        let sql = format!("{verb} {table} SELECT * FROM arrow(?, ?)");
        let mut stmt = self.conn.prepare(&sql)?;

        let mut inserted = 0;
        let mut offset = 0;
        while offset < batch.num_rows() {
            let len = ARROW_SLICE_ROWS.min(batch.num_rows() - offset);
            let params = arrow_recordbatch_to_query_params(batch.slice(offset, len));
            inserted += stmt.execute(params)?;
            offset += len;
        }

        Ok(inserted)
    }

    /// Run a query and collect its result as Arrow batches
    pub fn query_arrow(&self, sql: &str) -> Result<(SchemaRef, Vec<RecordBatch>)> {
        tracing::debug!("Querying: {}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        let arrow = stmt.query_arrow([])?;
        let schema = arrow.get_schema();
        let batches: Vec<RecordBatch> = arrow.collect();
        Ok((schema, batches))
    }

    /// Attach another DuckDB database file under an alias
    pub fn attach(&self, path: &str, alias: &str) -> Result<()> {
        self.execute_batch(&format!(
            "ATTACH '{}' AS {alias};",
            path.replace('\'', "''")
        ))
        .map_err(|e| Error::config(format!("Failed to attach {path}: {e}")))
    }

    /// Create a database if absent and make it the default catalog
    pub fn use_database(&self, database: &str) -> Result<()> {
        self.execute_batch(&format!(
            "CREATE DATABASE IF NOT EXISTS {database}; USE {database};"
        ))
    }
}
