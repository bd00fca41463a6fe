//! Job parameters
//!
//! One run of the loader is described by a [`JobParameters`] value, built
//! from defaults, an optional YAML/JSON file and command-line overrides, and
//! validated once before any work starts. Secrets never live here; they are
//! read from the environment.

use crate::error::{Error, Result};
use crate::types::{DateRange, Destination};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::sync::LazyLock;

/// Valid unquoted SQL identifier
static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

// ============================================================================
// Job Parameters
// ============================================================================

/// Configuration for one load job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobParameters {
    /// Inclusive start of the date range (`YYYY-MM-DD`)
    pub start_date: String,

    /// Exclusive end of the date range (`YYYY-MM-DD`)
    pub end_date: String,

    /// PyPI project to filter downloads on
    pub pypi_project: String,

    /// Target table name
    pub table_name: String,

    /// GCP project that runs (and is billed for) the source query
    pub gcp_project: Option<String>,

    /// Source timestamp column the range applies to
    pub timestamp_column: String,

    /// Sinks; a single value or a list
    #[serde(deserialize_with = "deserialize_destinations")]
    pub destination: Vec<Destination>,

    /// Object-storage root for the `s3` destination
    pub s3_path: Option<String>,

    /// AWS shared-credentials profile for `s3_path`
    pub aws_profile: Option<String>,

    /// Target database name
    pub database_name: String,

    /// Column to dedup on with insert-or-replace
    pub primary_key: Option<String>,

    /// Buffered rows that trigger a flush
    pub flush_threshold: usize,

    /// Rows per remote insert for the `md` destination
    pub chunk_size: u64,

    /// Log what would happen without writing anything
    pub dry_run: bool,
}

impl Default for JobParameters {
    fn default() -> Self {
        Self {
            start_date: "2019-04-01".to_string(),
            end_date: "2023-11-30".to_string(),
            pypi_project: "duckdb".to_string(),
            table_name: "pypi_file_downloads".to_string(),
            gcp_project: None,
            timestamp_column: "timestamp".to_string(),
            destination: vec![Destination::Local],
            s3_path: None,
            aws_profile: None,
            database_name: "duckdb_stats".to_string(),
            primary_key: None,
            flush_threshold: crate::loader::DEFAULT_FLUSH_THRESHOLD,
            chunk_size: crate::warehouse::DEFAULT_CHUNK_SIZE,
            dry_run: false,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Destination),
    Many(Vec<Destination>),
}

fn deserialize_destinations<'de, D>(deserializer: D) -> std::result::Result<Vec<Destination>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(destination) => vec![destination],
        OneOrMany::Many(destinations) => destinations,
    })
}

impl JobParameters {
    /// Load parameters from a YAML or JSON file; absent keys keep defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|_| Error::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_str(&contents)
    }

    /// Parse parameters from YAML (or JSON) text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Check every parameter; run once before the job starts
    pub fn validate(&self) -> Result<()> {
        self.date_range()?;

        check_identifier("database_name", &self.database_name)?;
        check_identifier("table_name", &self.table_name)?;
        check_identifier("timestamp_column", &self.timestamp_column)?;
        if let Some(pk) = &self.primary_key {
            check_identifier("primary_key", pk)?;
        }

        if self.pypi_project.trim().is_empty() {
            return Err(Error::invalid_value("pypi_project", "must not be empty"));
        }

        if self.destination.is_empty() {
            return Err(Error::invalid_value(
                "destination",
                "at least one of local, s3, md is required",
            ));
        }

        if self.has_destination(Destination::S3)
            && self.s3_path.as_deref().map_or(true, |p| p.trim().is_empty())
        {
            return Err(Error::missing_field("s3_path"));
        }

        if self.flush_threshold == 0 {
            return Err(Error::invalid_value("flush_threshold", "must be positive"));
        }
        if self.chunk_size == 0 {
            return Err(Error::invalid_value("chunk_size", "must be positive"));
        }

        Ok(())
    }

    /// The half-open `[start_date, end_date)` range
    pub fn date_range(&self) -> Result<DateRange> {
        DateRange::parse(&self.start_date, &self.end_date)
    }

    /// Whether `destination` is one of the configured sinks
    pub fn has_destination(&self, destination: Destination) -> bool {
        self.destination.contains(&destination)
    }

    /// GCP project for the BigQuery source
    pub fn require_gcp_project(&self) -> Result<&str> {
        self.gcp_project
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| Error::missing_field("gcp_project"))
    }
}

fn check_identifier(field: &str, value: &str) -> Result<()> {
    if IDENTIFIER_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(Error::invalid_value(
            field,
            format!("'{value}' is not a valid SQL identifier"),
        ))
    }
}

/// MotherDuck token from `MOTHERDUCK_TOKEN` (or `motherduck_token`)
pub fn motherduck_token_from_env() -> Result<String> {
    ["MOTHERDUCK_TOKEN", "motherduck_token"]
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| Error::config("MOTHERDUCK_TOKEN is not set"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = JobParameters::default();
        assert_eq!(params.start_date, "2019-04-01");
        assert_eq!(params.end_date, "2023-11-30");
        assert_eq!(params.pypi_project, "duckdb");
        assert_eq!(params.database_name, "duckdb_stats");
        assert_eq!(params.table_name, "pypi_file_downloads");
        assert_eq!(params.destination, vec![Destination::Local]);
        assert_eq!(params.flush_threshold, 10_000);
        assert_eq!(params.chunk_size, 100_000);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml_single_destination() {
        let yaml = r#"
start_date: "2023-04-01"
end_date: "2023-04-02"
pypi_project: polars
destination: s3
s3_path: s3://bucket/pypi
aws_profile: analytics
"#;

        let params = JobParameters::from_str(yaml).unwrap();
        assert_eq!(params.pypi_project, "polars");
        assert_eq!(params.destination, vec![Destination::S3]);
        assert_eq!(params.aws_profile.as_deref(), Some("analytics"));
        assert_eq!(params.table_name, "pypi_file_downloads");
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_parse_destination_list_and_json() {
        let json = r#"{"destination": ["local", "md"], "gcp_project": "my-proj"}"#;
        let params = JobParameters::from_str(json).unwrap();
        assert_eq!(params.destination, vec![Destination::Local, Destination::Md]);
        assert!(params.has_destination(Destination::Md));
        assert_eq!(params.require_gcp_project().unwrap(), "my-proj");
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let err = JobParameters::from_str("table: typo").unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(JobParameters::from_str("").unwrap(), JobParameters::default());
    }

    #[test]
    fn test_s3_requires_path() {
        let params = JobParameters {
            destination: vec![Destination::S3],
            ..JobParameters::default()
        };
        let err = params.validate().unwrap_err();
        assert_eq!(err.to_string(), "Missing required config field: s3_path");
    }

    #[test]
    fn test_bad_identifiers_rejected() {
        let params = JobParameters {
            table_name: "downloads; DROP TABLE x".to_string(),
            ..JobParameters::default()
        };
        assert!(params.validate().unwrap_err().to_string().contains("table_name"));

        let params = JobParameters {
            primary_key: Some("1id".to_string()),
            ..JobParameters::default()
        };
        assert!(params.validate().unwrap_err().to_string().contains("primary_key"));
    }

    #[test]
    fn test_bad_dates_rejected() {
        let params = JobParameters {
            start_date: "2023-05-01".to_string(),
            end_date: "2023-04-01".to_string(),
            ..JobParameters::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_thresholds_must_be_positive() {
        let params = JobParameters {
            flush_threshold: 0,
            ..JobParameters::default()
        };
        assert!(params.validate().unwrap_err().to_string().contains("flush_threshold"));

        let params = JobParameters {
            chunk_size: 0,
            ..JobParameters::default()
        };
        assert!(params.validate().unwrap_err().to_string().contains("chunk_size"));
    }

    #[test]
    fn test_missing_gcp_project() {
        let err = JobParameters::default().require_gcp_project().unwrap_err();
        assert_eq!(err.to_string(), "Missing required config field: gcp_project");
    }
}
