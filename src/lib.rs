// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # pypi-ingest
//!
//! Date-range scoped loader for PyPI download events.
//!
//! One job reads a range of `bigquery-public-data.pypi.file_downloads`,
//! validates every row against the record schema, and replaces that range
//! in a local DuckDB file, in partitioned Parquet on object storage, and in
//! MotherDuck.
//!
//! ## Features
//!
//! - **Schema derivation**: DuckDB DDL and Arrow schema from one record description
//! - **Validation**: every bad row reported at once, never fail-fast
//! - **Buffered loading**: threshold flushes with insert-or-replace on a primary key
//! - **Content hashing**: SHA-256 load identifiers per row or per batch
//! - **Remote sinks**: Hive-partitioned ZSTD Parquet and chunked warehouse copies
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pypi_ingest::config::JobParameters;
//! use pypi_ingest::pipeline::{run_job, JobContext};
//! use pypi_ingest::source::ParquetFileSource;
//!
//! #[tokio::main]
//! async fn main() -> pypi_ingest::Result<()> {
//!     let params = JobParameters::from_file("job.yaml")?;
//!     let source = ParquetFileSource::new("exports/pypi_file_downloads");
//!     let summary = run_job(&params, &source, &JobContext::new("data")).await?;
//!     println!("loaded {} rows", summary.local_loaded_rows);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ RecordSource │ → │ Validator │ → │ BufferedLoader   │ → │ Parquet / S3 │
//! │ BigQuery     │   │           │   │ (local DuckDB)   │   └──────────────┘
//! │ Parquet      │   └───────────┘   └──────────────────┘
//! │ Memory       │         │         ┌──────────────────┐
//! └──────────────┘         └───────→ │ RangeReplace     │ → MotherDuck
//!                                    └──────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Job parameters
pub mod config;

/// Record descriptions and schema derivation
pub mod schema;

/// Content-derived load identifiers
pub mod load_id;

/// Row validation
pub mod validate;

/// Arrow/Parquet conversion and object storage
pub mod output;

/// Local store via DuckDB
pub mod database;

/// Buffered loader
pub mod loader;

/// Range-replace loading for the hosted warehouse
pub mod warehouse;

/// Google authentication for BigQuery
pub mod auth;

/// Record sources
pub mod source;

/// Job orchestration
pub mod pipeline;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use config::JobParameters;
pub use loader::{BufferedLoader, LoaderConfig};
pub use pipeline::{run_job, JobContext, JobSummary};
pub use schema::{file_downloads, RecordSchema, SchemaDeriver};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
