//! Validator implementation

use crate::error::{Error, Result, ValidationFailure};
use crate::output::{parse_timestamp_micros, row_to_json};
use crate::schema::{FieldDef, FieldType, RecordSchema, ScalarType};
use crate::types::{JsonObject, JsonValue};
use arrow::record_batch::RecordBatch;

/// Validate every row of a batch
///
/// Succeeds without side effects when all rows conform.
pub fn validate_batch(batch: &RecordBatch, schema: &RecordSchema) -> Result<()> {
    validate_batches(std::slice::from_ref(batch), schema)
}

/// Validate a sequence of batches as one table
///
/// Row indices in the failures count across all batches.
pub fn validate_batches(batches: &[RecordBatch], schema: &RecordSchema) -> Result<()> {
    let mut failures = Vec::new();
    let mut offset = 0;

    for batch in batches {
        for row in 0..batch.num_rows() {
            let record = row_to_json(batch, row)?;
            if let Err(message) = check_record(&record, schema) {
                failures.push(ValidationFailure {
                    row: offset + row,
                    message,
                });
            }
        }
        offset += batch.num_rows();
    }

    if failures.is_empty() {
        tracing::debug!("Validated {} rows against {}", offset, schema.name);
        Ok(())
    } else {
        tracing::warn!(
            "{} of {} rows failed validation against {}",
            failures.len(),
            offset,
            schema.name
        );
        Err(Error::Validation { failures })
    }
}

/// Check one record, returning every problem joined with `"; "`
///
/// Columns that the schema does not declare are ignored.
pub fn check_record(record: &JsonObject, schema: &RecordSchema) -> std::result::Result<(), String> {
    let mut problems = Vec::new();
    check_fields(&schema.fields, record, "", &mut problems);

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}

fn check_fields(fields: &[FieldDef], record: &JsonObject, prefix: &str, problems: &mut Vec<String>) {
    for field in fields {
        let path = if prefix.is_empty() {
            field.name.clone()
        } else {
            format!("{prefix}.{}", field.name)
        };

        match record.get(&field.name) {
            None | Some(JsonValue::Null) => {
                if !field.optional {
                    problems.push(format!("{path}: field required"));
                }
            }
            Some(value) => check_value(&field.field_type, value, &path, problems),
        }
    }
}

fn check_value(field_type: &FieldType, value: &JsonValue, path: &str, problems: &mut Vec<String>) {
    match field_type {
        FieldType::Struct(fields) => match value {
            JsonValue::Object(nested) => check_fields(fields, nested, path, problems),
            other => problems.push(format!("{path}: expected object, got {}", kind(other))),
        },
        FieldType::Scalar(scalar) => {
            if !scalar_matches(*scalar, value) {
                problems.push(format!("{path}: expected {scalar}, got {}", kind(value)));
            }
        }
        FieldType::Unknown(_) => {}
    }
}

fn scalar_matches(scalar: ScalarType, value: &JsonValue) -> bool {
    match scalar {
        ScalarType::Timestamp => match value {
            JsonValue::String(s) => parse_timestamp_micros(s).is_some(),
            JsonValue::Number(n) => n.is_i64(),
            _ => false,
        },
        ScalarType::Integer => match value {
            JsonValue::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        ScalarType::Float => value.is_number(),
        ScalarType::String => value.is_string(),
        ScalarType::Boolean => value.is_boolean(),
    }
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
