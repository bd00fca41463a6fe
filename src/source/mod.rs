//! Record sources
//!
//! A source produces the Arrow batches one job loads. The production source
//! is BigQuery's public PyPI dataset; Parquet files and in-memory batches
//! cover replays and tests.

mod bigquery;
mod files;
mod memory;
mod query;

pub use bigquery::{BigQuerySource, BIGQUERY_API_URL};
pub use files::ParquetFileSource;
pub use memory::MemorySource;
pub use query::{build_count_query, build_pypi_query, PYPI_DATASET};

use crate::error::Result;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

/// Something that yields the record batches for one job
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Rows the source expects to return, when it can tell cheaply
    async fn estimate_rows(&self) -> Result<Option<u64>>;

    /// Fetch every batch
    async fn fetch(&self) -> Result<Vec<RecordBatch>>;
}
