//! CLI runner - executes commands

use crate::auth::GoogleAuthenticator;
use crate::cli::commands::{Cli, Commands, JobArgs, OutputFormat};
use crate::config::JobParameters;
use crate::error::Result;
use crate::pipeline::{run_job, JobContext};
use crate::schema::{file_downloads, SchemaDeriver};
use crate::source::{
    build_pypi_query, BigQuerySource, ParquetFileSource, RecordSource, PYPI_DATASET,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Run {
                job,
                source_file,
                data_dir,
            } => self.run_load(job, source_file.as_deref(), data_dir).await,
            Commands::Schema {
                primary_key,
                table,
                load_metadata,
            } => self.schema(primary_key.as_deref(), table, *load_metadata),
            Commands::Query { job } => self.query(job),
        }
    }

    async fn run_load(
        &self,
        job: &JobArgs,
        source_file: Option<&Path>,
        data_dir: &Path,
    ) -> Result<()> {
        let params = job.to_parameters()?;
        params.validate()?;

        let source: Box<dyn RecordSource> = match source_file {
            Some(path) => Box::new(ParquetFileSource::new(path)),
            None => Box::new(Self::bigquery_source(&params)?),
        };

        let context = JobContext::new(data_dir);
        let summary = run_job(&params, source.as_ref(), &context).await?;

        self.output(&serde_json::to_value(&summary)?);
        Ok(())
    }

    fn bigquery_source(params: &JobParameters) -> Result<BigQuerySource> {
        let gcp_project = params.require_gcp_project()?;
        let auth = Arc::new(GoogleAuthenticator::from_env()?);
        Ok(BigQuerySource::new(
            auth,
            gcp_project,
            Self::build_query(params)?,
            &file_downloads(),
        ))
    }

    fn build_query(params: &JobParameters) -> Result<String> {
        Ok(build_pypi_query(
            &file_downloads(),
            PYPI_DATASET,
            &params.pypi_project,
            &params.timestamp_column,
            &params.date_range()?,
        ))
    }

    fn schema(&self, primary_key: Option<&str>, table: &str, load_metadata: bool) -> Result<()> {
        let record = if load_metadata {
            file_downloads().with_load_metadata()
        } else {
            file_downloads()
        };

        let deriver = SchemaDeriver::default();
        let table = deriver.table_schema(&record, Some(table), primary_key)?;
        let arrow_schema = deriver.arrow_schema(&record);

        match self.cli.format {
            OutputFormat::Pretty => {
                println!("{};", table.ddl());
                println!();
                for field in arrow_schema.fields() {
                    println!("{}: {}", field.name(), field.data_type());
                }
            }
            OutputFormat::Json => {
                let fields: Vec<Value> = arrow_schema
                    .fields()
                    .iter()
                    .map(|f| json!({"name": f.name(), "type": f.data_type().to_string()}))
                    .collect();
                self.output(&json!({"ddl": table.ddl(), "arrow_schema": fields}));
            }
        }
        Ok(())
    }

    fn query(&self, job: &JobArgs) -> Result<()> {
        let params = job.to_parameters()?;
        params.validate()?;
        let sql = Self::build_query(&params)?;

        match self.cli.format {
            OutputFormat::Pretty => println!("{sql}"),
            OutputFormat::Json => self.output(&json!({"query": sql})),
        }
        Ok(())
    }

    fn output(&self, value: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(value).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
            }
        }
    }
}
