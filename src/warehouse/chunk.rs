//! Row-id chunk planning for remote copies

/// Contiguous half-open row-id range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub start: u64,
    pub end: u64,
}

impl ChunkRange {
    /// Number of rows in the chunk
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// `rowid BETWEEN a AND b` predicate (inclusive bounds) for this chunk
    pub fn rowid_predicate(&self) -> String {
        format!(
            "rowid BETWEEN {} AND {}",
            self.start,
            self.end.saturating_sub(1)
        )
    }
}

impl std::fmt::Display for ChunkRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Split `[0, total)` into ascending chunks of `chunk_size` rows
///
/// The last chunk is clipped to `total`. A zero chunk size is treated as one.
pub fn plan_chunks(total: u64, chunk_size: u64) -> Vec<ChunkRange> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(total.div_ceil(chunk_size) as usize);
    let mut start = 0;
    while start < total {
        let end = (start + chunk_size).min(total);
        chunks.push(ChunkRange { start, end });
        start = end;
    }
    chunks
}
