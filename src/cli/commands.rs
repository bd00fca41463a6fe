//! CLI commands and argument parsing

use crate::config::JobParameters;
use crate::error::Result;
use crate::types::Destination;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Load PyPI download events into DuckDB, object storage and MotherDuck
#[derive(Parser, Debug)]
#[command(name = "pypi-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "pretty")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch one date range and replace it in every destination
    Run {
        #[command(flatten)]
        job: JobArgs,

        /// Read records from a Parquet file or directory instead of BigQuery
        #[arg(long)]
        source_file: Option<PathBuf>,

        /// Directory for the local DuckDB file
        #[arg(long, default_value = ".")]
        data_dir: PathBuf,
    },

    /// Print the table definition and Arrow schema of the download record
    Schema {
        /// Primary key column
        #[arg(long)]
        primary_key: Option<String>,

        /// Table name
        #[arg(long, default_value = "pypi_file_downloads")]
        table: String,

        /// Include the load_id / load_timestamp columns
        #[arg(long)]
        load_metadata: bool,
    },

    /// Print the BigQuery SQL a run would execute
    Query {
        #[command(flatten)]
        job: JobArgs,
    },
}

/// Job parameters: an optional file plus per-field overrides
#[derive(Args, Debug, Clone, Default)]
pub struct JobArgs {
    /// Job parameters file (YAML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Inclusive start date (YYYY-MM-DD)
    #[arg(long)]
    pub start_date: Option<String>,

    /// Exclusive end date (YYYY-MM-DD)
    #[arg(long)]
    pub end_date: Option<String>,

    /// PyPI project to load
    #[arg(long)]
    pub pypi_project: Option<String>,

    /// Target table name
    #[arg(long)]
    pub table_name: Option<String>,

    /// GCP project that runs the BigQuery query
    #[arg(long)]
    pub gcp_project: Option<String>,

    /// Source timestamp column
    #[arg(long)]
    pub timestamp_column: Option<String>,

    /// Destinations (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub destination: Vec<Destination>,

    /// Object-storage root for the s3 destination
    #[arg(long)]
    pub s3_path: Option<String>,

    /// AWS credentials profile
    #[arg(long)]
    pub aws_profile: Option<String>,

    /// Target database name
    #[arg(long)]
    pub database_name: Option<String>,

    /// Primary key column (enables insert-or-replace)
    #[arg(long)]
    pub primary_key: Option<String>,

    /// Buffered rows per flush
    #[arg(long)]
    pub flush_threshold: Option<usize>,

    /// Rows per remote insert
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Log actions without writing
    #[arg(long)]
    pub dry_run: bool,
}

impl JobArgs {
    /// Defaults, then the parameters file, then flags
    pub fn to_parameters(&self) -> Result<JobParameters> {
        let mut params = match &self.config {
            Some(path) => JobParameters::from_file(path)?,
            None => JobParameters::default(),
        };

        fn set<T: Clone>(target: &mut T, value: Option<&T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        set(&mut params.start_date, self.start_date.as_ref());
        set(&mut params.end_date, self.end_date.as_ref());
        set(&mut params.pypi_project, self.pypi_project.as_ref());
        set(&mut params.table_name, self.table_name.as_ref());
        set(&mut params.timestamp_column, self.timestamp_column.as_ref());
        set(&mut params.database_name, self.database_name.as_ref());
        set(&mut params.flush_threshold, self.flush_threshold.as_ref());
        set(&mut params.chunk_size, self.chunk_size.as_ref());

        if self.gcp_project.is_some() {
            params.gcp_project.clone_from(&self.gcp_project);
        }
        if self.s3_path.is_some() {
            params.s3_path.clone_from(&self.s3_path);
        }
        if self.aws_profile.is_some() {
            params.aws_profile.clone_from(&self.aws_profile);
        }
        if self.primary_key.is_some() {
            params.primary_key.clone_from(&self.primary_key);
        }
        if !self.destination.is_empty() {
            params.destination.clone_from(&self.destination);
        }
        params.dry_run |= self.dry_run;

        Ok(params)
    }
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Compact JSON
    Json,
    /// Human-readable output
    Pretty,
}
