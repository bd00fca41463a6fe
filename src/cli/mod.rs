//! CLI module
//!
//! Command-line interface for running load jobs.
//!
//! # Commands
//!
//! - `run` - Fetch a date range and replace it in every destination
//! - `schema` - Print the derived table definition and Arrow schema
//! - `query` - Print the BigQuery SQL for a job

mod commands;
mod runner;

pub use commands::{Cli, Commands, JobArgs, OutputFormat};
pub use runner::Runner;
