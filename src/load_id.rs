//! Content-derived load identifiers
//!
//! A load identifier is the SHA-256 digest (lowercase hex) of a canonical
//! string form of record content. The canonical form of one record is the
//! compact JSON array of its declared field values in declaration order,
//! load metadata excluded. Nested objects are key-sorted and timestamps
//! render as `YYYY-MM-DDTHH:MM:SS.ffffffZ`. A batch hashes the canonical
//! form of each of its rows, each followed by `\n`.

use crate::error::{Error, Result};
use crate::output::row_to_json;
use crate::schema::{RecordSchema, LOAD_ID_FIELD, LOAD_TIMESTAMP_FIELD};
use crate::types::{JsonObject, JsonValue};
use arrow::array::{Array, ArrayRef, AsArray, StringArray, TimestampMicrosecondArray};
use arrow::compute::cast;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// How load identifiers are attached to a flushed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadIdGranularity {
    /// Every row carries the hash of its own content (row-level dedup key)
    PerRow,
    /// Every row carries the hash of the whole flushed batch (provenance tag)
    PerBatch,
}

/// Canonical string form of a sequence of field values
pub fn canonical_encoding(values: &[JsonValue]) -> String {
    let sorted: Vec<JsonValue> = values.iter().map(sort_keys).collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

// Key order must not depend on serde_json's map feature flags.
fn sort_keys(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<(&String, &JsonValue)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_keys(v)))
                    .collect(),
            )
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Digest a sequence of field values given in declared order
pub fn load_id(values: &[JsonValue]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_encoding(values).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// The content values of one record, in declared order
///
/// Absent fields hash as `null`.
pub fn content_values(schema: &RecordSchema, record: &JsonObject) -> Vec<JsonValue> {
    schema
        .content_fields()
        .map(|f| record.get(&f.name).cloned().unwrap_or(JsonValue::Null))
        .collect()
}

/// Per-row identifier of one record
pub fn record_load_id(schema: &RecordSchema, record: &JsonObject) -> String {
    load_id(&content_values(schema, record))
}

/// Per-batch identifier covering every row of `batch`
pub fn batch_load_id(schema: &RecordSchema, batch: &RecordBatch) -> Result<String> {
    let mut hasher = Sha256::new();
    for row in 0..batch.num_rows() {
        let record = row_to_json(batch, row)?;
        hasher.update(canonical_encoding(&content_values(schema, &record)).as_bytes());
        hasher.update(b"\n");
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fill the load metadata columns of a batch
///
/// Returns the stamped batch and, for [`LoadIdGranularity::PerBatch`], the
/// batch identifier. Batches of a schema without load metadata are returned
/// unchanged. In per-row mode an existing non-null `load_id` is kept.
pub fn stamp_batch(
    schema: &RecordSchema,
    batch: &RecordBatch,
    granularity: LoadIdGranularity,
    loaded_at: DateTime<Utc>,
) -> Result<(RecordBatch, Option<String>)> {
    if !schema.has_load_metadata() {
        return Ok((batch.clone(), None));
    }

    let batch_schema = batch.schema();
    let id_idx = batch_schema.index_of(LOAD_ID_FIELD)?;
    let ts_idx = batch_schema.index_of(LOAD_TIMESTAMP_FIELD)?;
    let rows = batch.num_rows();

    let (ids, batch_id): (StringArray, Option<String>) = match granularity {
        LoadIdGranularity::PerBatch => {
            let id = batch_load_id(schema, batch)?;
            (StringArray::from(vec![id.as_str(); rows]), Some(id))
        }
        LoadIdGranularity::PerRow => {
            let existing = cast(batch.column(id_idx), &arrow::datatypes::DataType::Utf8)?;
            let existing = existing.as_string::<i32>();
            let mut ids = Vec::with_capacity(rows);
            for row in 0..rows {
                if existing.is_valid(row) {
                    ids.push(existing.value(row).to_string());
                } else {
                    ids.push(record_load_id(schema, &row_to_json(batch, row)?));
                }
            }
            (StringArray::from(ids), None)
        }
    };

    let timestamps = TimestampMicrosecondArray::from(vec![loaded_at.timestamp_micros(); rows]);

    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns[id_idx] = cast(&ids, batch_schema.field(id_idx).data_type())?;
    columns[ts_idx] = cast(&timestamps, batch_schema.field(ts_idx).data_type())?;

    let stamped = RecordBatch::try_new(Arc::clone(&batch_schema), columns)
        .map_err(|e| Error::schema_mismatch(format!("Failed to stamp load metadata: {e}")))?;
    Ok((stamped, batch_id))
}
