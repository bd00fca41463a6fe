//! BigQuery REST source
//!
//! Runs a standard-SQL query through `jobs.query`, follows `getQueryResults`
//! pages, and decodes BigQuery's `f`/`v` row encoding into typed JSON and
//! then into Arrow batches of the record's columnar schema (one per page).

use super::query::build_count_query;
use super::RecordSource;
use crate::auth::GoogleAuthenticator;
use crate::error::{Error, Result};
use crate::output::json_to_arrow;
use crate::schema::{RecordSchema, SchemaDeriver};
use crate::types::{JsonObject, JsonValue};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use url::Url;

/// BigQuery v2 REST endpoint
pub const BIGQUERY_API_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

const DEFAULT_PAGE_SIZE: u32 = 50_000;

/// How long one request waits server-side for the job to finish
const WAIT_TIMEOUT_MS: u32 = 10_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<ResultSchema>,
    #[serde(default)]
    rows: Vec<JsonValue>,
    page_token: Option<String>,
    total_rows: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResultSchema {
    #[serde(default)]
    fields: Vec<ResultField>,
}

/// Column description from a query result schema
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResultField {
    pub(crate) name: String,
    #[serde(rename = "type")]
    pub(crate) field_type: String,
    #[serde(default)]
    pub(crate) mode: Option<String>,
    #[serde(default)]
    pub(crate) fields: Vec<ResultField>,
}

impl ResultField {
    fn is_repeated(&self) -> bool {
        self.mode.as_deref() == Some("REPEATED")
    }
}

/// Query result source backed by the BigQuery REST API
pub struct BigQuerySource {
    client: Client,
    auth: Arc<GoogleAuthenticator>,
    base_url: String,
    gcp_project: String,
    sql: String,
    arrow_schema: SchemaRef,
    page_size: u32,
}

impl std::fmt::Debug for BigQuerySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQuerySource")
            .field("base_url", &self.base_url)
            .field("gcp_project", &self.gcp_project)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl BigQuerySource {
    /// Create a source that bills queries to `gcp_project`
    pub fn new(
        auth: Arc<GoogleAuthenticator>,
        gcp_project: impl Into<String>,
        sql: impl Into<String>,
        record: &RecordSchema,
    ) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: BIGQUERY_API_URL.to_string(),
            gcp_project: gcp_project.into(),
            sql: sql.into(),
            arrow_schema: Arc::new(SchemaDeriver::default().arrow_schema(record)),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// The query this source runs
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Columnar schema of the fetched batches
    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::clone(&self.arrow_schema)
    }

    /// Resolve `segments` below the API base URL
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|()| Error::config(format!("Invalid BigQuery base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Run `sql` and return its decoded rows page by page
    async fn run_query(&self, sql: &str) -> Result<Vec<Vec<JsonObject>>> {
        let url = self.endpoint(&["projects", &self.gcp_project, "queries"])?;
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "maxResults": self.page_size,
            "timeoutMs": WAIT_TIMEOUT_MS,
            "formatOptions": { "useInt64Timestamp": true },
        });

        tracing::debug!("Submitting query to BigQuery project {}", self.gcp_project);
        let req = self.auth.apply(self.client.post(url)).await?.json(&body);
        let mut response = send(req).await?;

        let job = response
            .job_reference
            .clone()
            .ok_or_else(|| Error::source_query("query response has no jobReference"))?;

        let mut fields: Vec<ResultField> = Vec::new();
        let mut pages = Vec::new();

        loop {
            if !response.job_complete {
                tracing::debug!("Job {} still running", job.job_id);
                response = self.get_results(&job, None).await?;
                continue;
            }

            if fields.is_empty() {
                if let Some(schema) = response.schema.take() {
                    fields = schema.fields;
                }
            }

            let rows = response
                .rows
                .iter()
                .map(|row| decode_row(&fields, row))
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!(
                "Fetched page {} of job {} ({} rows, {} total)",
                pages.len() + 1,
                job.job_id,
                rows.len(),
                response.total_rows.as_deref().unwrap_or("?")
            );
            pages.push(rows);

            match response.page_token.take() {
                Some(token) => response = self.get_results(&job, Some(&token)).await?,
                None => break,
            }
        }

        Ok(pages)
    }

    async fn get_results(&self, job: &JobReference, page_token: Option<&str>) -> Result<QueryResponse> {
        let url = self.endpoint(&["projects", &job.project_id, "queries", &job.job_id])?;

        let mut params: Vec<(&str, String)> = vec![
            ("maxResults", self.page_size.to_string()),
            ("timeoutMs", WAIT_TIMEOUT_MS.to_string()),
            ("formatOptions.useInt64Timestamp", "true".to_string()),
        ];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }

        let req = self
            .auth
            .apply(self.client.get(url))
            .await?
            .query(&params);
        send(req).await
    }
}

async fn send(req: RequestBuilder) -> Result<QueryResponse> {
    let response = req.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::http_status(status.as_u16(), body));
    }
    Ok(response.json().await?)
}

/// Decode one `{"f": [{"v": ..}, ..]}` row against its field list
pub(crate) fn decode_row(fields: &[ResultField], row: &JsonValue) -> Result<JsonObject> {
    let cells = row
        .get("f")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| Error::source_query(format!("row has no 'f' cells: {row}")))?;

    if cells.len() != fields.len() {
        return Err(Error::source_query(format!(
            "row has {} cells but the schema has {} fields",
            cells.len(),
            fields.len()
        )));
    }

    let mut record = JsonObject::new();
    for (field, cell) in fields.iter().zip(cells) {
        let value = cell.get("v").unwrap_or(&JsonValue::Null);
        record.insert(field.name.clone(), decode_value(field, value)?);
    }
    Ok(record)
}

fn decode_value(field: &ResultField, value: &JsonValue) -> Result<JsonValue> {
    if !field.is_repeated() {
        return decode_single(field, value);
    }

    match value {
        JsonValue::Null => Ok(JsonValue::Array(Vec::new())),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| decode_single(field, item.get("v").unwrap_or(&JsonValue::Null)))
            .collect::<Result<Vec<_>>>()
            .map(JsonValue::Array),
        other => Err(Error::source_query(format!(
            "{}: expected a repeated value, got {other}",
            field.name
        ))),
    }
}

fn decode_single(field: &ResultField, value: &JsonValue) -> Result<JsonValue> {
    if value.is_null() {
        return Ok(JsonValue::Null);
    }

    match field.field_type.as_str() {
        "RECORD" | "STRUCT" => decode_row(&field.fields, value).map(JsonValue::Object),
        "INTEGER" | "INT64" => parse_cell(field, value, |s| s.parse::<i64>().ok().map(JsonValue::from)),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => parse_cell(field, value, |s| {
            s.parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(JsonValue::Number)
        }),
        "BOOLEAN" | "BOOL" => parse_cell(field, value, |s| match s {
            "true" => Some(JsonValue::Bool(true)),
            "false" => Some(JsonValue::Bool(false)),
            _ => None,
        }),
        "TIMESTAMP" => parse_cell(field, value, timestamp_micros),
        _ => Ok(value.clone()),
    }
}

fn parse_cell(
    field: &ResultField,
    value: &JsonValue,
    parse: impl Fn(&str) -> Option<JsonValue>,
) -> Result<JsonValue> {
    let text = value.as_str().ok_or_else(|| {
        Error::source_query(format!("{}: expected a string cell, got {value}", field.name))
    })?;
    parse(text).ok_or_else(|| {
        Error::source_query(format!(
            "{}: cannot decode '{text}' as {}",
            field.name, field.field_type
        ))
    })
}

/// Integer microseconds, or float epoch seconds such as `1.6725312E9`
fn timestamp_micros(text: &str) -> Option<JsonValue> {
    if let Ok(micros) = text.parse::<i64>() {
        return Some(JsonValue::from(micros));
    }
    text.parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .map(|secs| JsonValue::from((secs * 1_000_000.0).round() as i64))
}

#[async_trait]
impl RecordSource for BigQuerySource {
    fn name(&self) -> &str {
        "bigquery"
    }

    async fn estimate_rows(&self) -> Result<Option<u64>> {
        let pages = self.run_query(&build_count_query(&self.sql)).await?;
        Ok(pages
            .first()
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("row_count"))
            .and_then(JsonValue::as_u64))
    }

    async fn fetch(&self) -> Result<Vec<RecordBatch>> {
        let pages = self.run_query(&self.sql).await?;

        let mut batches = Vec::with_capacity(pages.len());
        let mut rows = 0;
        for page in pages {
            if page.is_empty() {
                continue;
            }
            let records: Vec<JsonValue> = page.into_iter().map(JsonValue::Object).collect();
            let batch = json_to_arrow(&records, &self.arrow_schema)?;
            rows += batch.num_rows();
            batches.push(batch);
        }

        tracing::info!(
            "Fetched {} rows in {} batches from BigQuery project {}",
            rows,
            batches.len(),
            self.gcp_project
        );
        Ok(batches)
    }
}
