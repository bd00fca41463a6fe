//! Hosted warehouse loading
//!
//! Replaces one date range of a remote table: the source result is staged
//! locally, the range is deleted remotely, and the staged rows are copied
//! over in sequential row-id chunks.

mod chunk;
mod range;

pub use chunk::{plan_chunks, ChunkRange};
pub use range::{
    RangeReplaceConfig, RangeReplaceLoader, WarehouseSummary, WarehouseTarget, DEFAULT_CHUNK_SIZE,
};

#[cfg(test)]
mod tests;
