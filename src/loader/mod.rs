//! Buffered loader module
//!
//! The core of the ingest job: accumulate validated Arrow batches, flush
//! them into the local DuckDB store with insert-or-replace semantics when a
//! primary key is declared, and re-export the table to object storage.
//!
//! # Example
//!
//! ```no_run
//! use pypi_ingest::loader::{BufferedLoader, LoaderConfig};
//! use pypi_ingest::schema::file_downloads;
//! use serde_json::json;
//!
//! let config = LoaderConfig::local("duckdb_stats.db").with_flush_threshold(10_000);
//! let mut loader = BufferedLoader::new(file_downloads().with_load_metadata(), config)?;
//! loader.insert_records(&[json!({"timestamp": "2023-04-01 00:00:00", "project": "duckdb"})])?;
//! loader.flush()?;
//! # Ok::<(), pypi_ingest::Error>(())
//! ```

mod buffer;
mod types;

pub use buffer::BufferedLoader;
pub use types::{ExportSummary, LoaderConfig, DEFAULT_FLUSH_THRESHOLD};
