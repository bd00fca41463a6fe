//! PyPI query builder

use crate::schema::RecordSchema;
use crate::types::DateRange;

/// The public PyPI downloads table
pub const PYPI_DATASET: &str = "bigquery-public-data.pypi.file_downloads";

const BQ_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Standard-SQL query selecting one project's downloads inside `range`
///
/// Selects the record's content columns in declaration order. The range is
/// half-open on `timestamp_column`.
pub fn build_pypi_query(
    record: &RecordSchema,
    dataset: &str,
    project: &str,
    timestamp_column: &str,
    range: &DateRange,
) -> String {
    let columns: Vec<String> = record
        .content_fields()
        .map(|f| format!("`{}`", f.name))
        .collect();

    format!(
        "SELECT\n    {}\nFROM `{dataset}`\nWHERE project = '{}'\n    AND `{timestamp_column}` >= TIMESTAMP(\"{}\")\n    AND `{timestamp_column}` < TIMESTAMP(\"{}\")",
        columns.join(",\n    "),
        project.replace('\\', "\\\\").replace('\'', "\\'"),
        range.start().format(BQ_TIMESTAMP_FORMAT),
        range.end().format(BQ_TIMESTAMP_FORMAT),
    )
}

/// Wrap a query so it returns its row count as `row_count`
pub fn build_count_query(sql: &str) -> String {
    format!("SELECT COUNT(*) AS row_count FROM (\n{sql}\n)")
}
