//! Parquet encoding
//!
//! Encodes Arrow RecordBatches as Parquet, either into any `Write` sink or
//! straight into an in-memory buffer for object-storage uploads.

use crate::error::{Error, Result};
use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::io::Write;
use std::sync::Arc;

/// Row-group size used for object-storage exports
pub const EXPORT_ROW_GROUP_SIZE: usize = 1_000_000;

/// Configuration for Parquet writer
///
/// Exports always use ZSTD with 1M-row groups.
#[derive(Debug, Clone)]
pub struct ParquetWriterConfig {
    compression: Compression,
    row_group_size: usize,
}

impl Default for ParquetWriterConfig {
    fn default() -> Self {
        Self {
            compression: Compression::ZSTD(ZstdLevel::default()),
            row_group_size: EXPORT_ROW_GROUP_SIZE,
        }
    }
}

impl ParquetWriterConfig {
    /// Get compression algorithm
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Get row group size
    #[must_use]
    pub fn row_group_size(&self) -> usize {
        self.row_group_size
    }

    fn build_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_compression(self.compression)
            .set_max_row_group_size(self.row_group_size)
            .build()
    }
}

/// Parquet writer over any byte sink
pub struct ParquetWriter<W: Write + Send> {
    /// Arrow writer
    writer: ArrowWriter<W>,
    /// Number of rows written
    rows_written: usize,
}

impl<W: Write + Send> ParquetWriter<W> {
    /// Create a new Parquet writer
    pub fn new(sink: W, schema: &Schema, config: &ParquetWriterConfig) -> Result<Self> {
        let props = config.build_properties();
        let writer =
            ArrowWriter::try_new(sink, Arc::new(schema.clone()), Some(props)).map_err(|e| {
                Error::Output {
                    message: format!("Failed to create Parquet writer: {e}"),
                }
            })?;

        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    /// Write a RecordBatch
    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer.write(batch).map_err(|e| Error::Output {
            message: format!("Failed to write batch: {e}"),
        })?;

        self.rows_written += batch.num_rows();
        Ok(())
    }

    /// Get the number of rows written so far
    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Finalize the file and hand back the sink
    pub fn finish(self) -> Result<(W, usize)> {
        let rows = self.rows_written;
        let sink = self.writer.into_inner().map_err(|e| Error::Output {
            message: format!("Failed to close Parquet writer: {e}"),
        })?;
        Ok((sink, rows))
    }
}

/// Encode batches sharing one schema into an in-memory Parquet file
pub fn encode_parquet(
    schema: &Schema,
    batches: &[RecordBatch],
    config: &ParquetWriterConfig,
) -> Result<Bytes> {
    let mut writer = ParquetWriter::new(Vec::new(), schema, config)?;
    for batch in batches {
        writer.write(batch)?;
    }
    let (buffer, _) = writer.finish()?;
    Ok(Bytes::from(buffer))
}
