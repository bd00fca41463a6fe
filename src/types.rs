//! Common types used throughout pypi-ingest
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Destinations
// ============================================================================

/// Where a job sinks its data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Local DuckDB database file
    Local,
    /// Partitioned Parquet files on object storage (staged through the local file)
    S3,
    /// Hosted MotherDuck warehouse
    Md,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Local => write!(f, "local"),
            Destination::S3 => write!(f, "s3"),
            Destination::Md => write!(f, "md"),
        }
    }
}

// ============================================================================
// Date Range
// ============================================================================

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Half-open timestamp interval `[start, end)` built from string-encoded dates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl DateRange {
    /// Parse a range from `YYYY-MM-DD` (or `YYYY-MM-DD HH:MM:SS`) bounds
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start_ts = parse_bound("start_date", start)?;
        let end_ts = parse_bound("end_date", end)?;

        if start_ts >= end_ts {
            return Err(Error::invalid_value(
                "end_date",
                format!("end date {end} must be after start date {start}"),
            ));
        }

        Ok(Self {
            start: start_ts,
            end: end_ts,
        })
    }

    /// Inclusive lower bound
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Exclusive upper bound
    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// Check whether a timestamp falls inside the range
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        ts >= self.start && ts < self.end
    }

    /// SQL predicate selecting rows of `column` inside the range
    pub fn sql_predicate(&self, column: &str) -> String {
        format!(
            "\"{column}\" >= TIMESTAMP '{}' AND \"{column}\" < TIMESTAMP '{}'",
            self.start.format(DATETIME_FORMAT),
            self.end.format(DATETIME_FORMAT)
        )
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.format(DATETIME_FORMAT),
            self.end.format(DATETIME_FORMAT)
        )
    }
}

fn parse_bound(field: &str, value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT) {
        return Ok(ts);
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| {
            Error::invalid_value(field, format!("'{value}' is not a YYYY-MM-DD date"))
        })
}
