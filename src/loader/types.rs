//! Loader configuration and results

use crate::database::StoreLocation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of buffered rows that triggers an automatic flush
pub const DEFAULT_FLUSH_THRESHOLD: usize = 10_000;

/// Configuration for a [`BufferedLoader`](super::BufferedLoader)
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Where the local store lives
    pub location: StoreLocation,
    /// Database created and selected on a MotherDuck connection
    pub database_name: Option<String>,
    /// Target table; defaults to the record type's snake_case name
    pub table_name: Option<String>,
    /// Primary key column; enables insert-or-replace
    pub primary_key: Option<String>,
    /// Buffered row count at which `insert` flushes on its own
    pub flush_threshold: usize,
    /// Suppress every store mutation
    pub dry_run: bool,
}

impl LoaderConfig {
    fn with_location(location: StoreLocation) -> Self {
        Self {
            location,
            database_name: None,
            table_name: None,
            primary_key: None,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            dry_run: false,
        }
    }

    /// Load into a local DuckDB file
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::with_location(StoreLocation::File(path.into()))
    }

    /// Load into a transient in-memory database
    pub fn in_memory() -> Self {
        Self::with_location(StoreLocation::InMemory)
    }

    /// Load into a MotherDuck database
    pub fn motherduck(database_name: impl Into<String>, token: impl Into<String>) -> Self {
        let mut config = Self::with_location(StoreLocation::MotherDuck {
            token: token.into(),
        });
        config.database_name = Some(database_name.into());
        config
    }

    /// Set the target table name
    #[must_use]
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Declare a primary key
    #[must_use]
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = Some(primary_key.into());
        self
    }

    /// Set the flush threshold
    #[must_use]
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold.max(1);
        self
    }

    /// Enable or disable dry-run mode
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Outcome of an object-storage export
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Written object URLs, one per (year, month) partition
    pub files: Vec<String>,
    /// Rows exported across all files
    pub rows: usize,
}
