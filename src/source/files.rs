//! Parquet file source
//!
//! Replays one Parquet file, or every `*.parquet` file below a directory
//! (for example a previous object-storage export), in path order.

use super::RecordSource;
use crate::error::{Error, Result, ResultExt};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Reads record batches from Parquet files on disk
#[derive(Debug, Clone)]
pub struct ParquetFileSource {
    path: PathBuf,
}

impl ParquetFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Files this source reads, sorted by path
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if !self.path.exists() {
            return Err(Error::FileNotFound {
                path: self.path.display().to_string(),
            });
        }
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }

        let mut files = Vec::new();
        collect_parquet_files(&self.path, &mut files)?;
        files.sort();
        Ok(files)
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Vec<PathBuf>) -> Result<T> + Send + 'static,
    {
        let files = self.files()?;
        tokio::task::spawn_blocking(move || f(files))
            .await
            .map_err(|e| Error::Other(format!("Parquet reader task failed: {e}")))?
    }
}

fn collect_parquet_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_parquet_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "parquet") {
            out.push(path);
        }
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    tracing::debug!("Read {} batches from {}", batches.len(), path.display());
    Ok(batches)
}

#[async_trait]
impl RecordSource for ParquetFileSource {
    fn name(&self) -> &str {
        "parquet"
    }

    async fn estimate_rows(&self) -> Result<Option<u64>> {
        self.blocking(|files| {
            let mut rows = 0u64;
            for path in &files {
                let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
                rows += builder.metadata().file_metadata().num_rows() as u64;
            }
            Ok(Some(rows))
        })
        .await
    }

    async fn fetch(&self) -> Result<Vec<RecordBatch>> {
        let batches = self
            .blocking(|files| {
                let mut batches = Vec::new();
                for path in &files {
                    batches.extend(
                        read_file(path)
                            .with_context(|| format!("Failed to read {}", path.display()))?,
                    );
                }
                Ok(batches)
            })
            .await?;

        tracing::info!(
            "Read {} rows from {}",
            batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
            self.path.display()
        );
        Ok(batches)
    }
}
