//! In-memory source

use super::RecordSource;
use crate::error::Result;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

/// Serves batches that were built up front
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    batches: Vec<RecordBatch>,
}

impl MemorySource {
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self {
            name: "memory".to_string(),
            batches,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl RecordSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn estimate_rows(&self) -> Result<Option<u64>> {
        Ok(Some(
            self.batches.iter().map(|b| b.num_rows() as u64).sum(),
        ))
    }

    async fn fetch(&self) -> Result<Vec<RecordBatch>> {
        Ok(self.batches.clone())
    }
}
