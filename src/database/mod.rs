//! Local analytical store via DuckDB
//!
//! This module owns the DuckDB connection used by the loaders. The same
//! store type serves an on-disk database file, a transient in-memory
//! database, and a MotherDuck session.

mod engine;

pub use engine::{LocalStore, StoreLocation, ARROW_SLICE_ROWS};
