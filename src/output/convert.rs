//! Arrow ⇄ JSON conversion
//!
//! Converts JSON records into Arrow RecordBatches of a given schema and
//! back. Timestamps are exchanged as microseconds since the Unix epoch and
//! rendered as `YYYY-MM-DDTHH:MM:SS.ffffffZ`.

use crate::error::{Error, Result};
use crate::types::JsonObject;
use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int32Array, Int64Array, ListArray,
    NullArray, StringArray, StructArray, TimestampMicrosecondArray,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Field, Fields, Float32Type, Int16Type, Int32Type, Int64Type,
    Int8Type, Schema, TimeUnit, TimestampMicrosecondType, TimestampMillisecondType,
    TimestampNanosecondType, TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::sync::Arc;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a timestamp string into microseconds since the epoch
///
/// Accepts RFC 3339, naive `YYYY-MM-DD[ T]HH:MM:SS[.f]` (read as UTC), a
/// trailing ` UTC`, and bare dates.
pub fn parse_timestamp_micros(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_micros());
    }

    let naive = value.strip_suffix(" UTC").unwrap_or(value);
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(ts.and_utc().timestamp_micros());
        }
    }

    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc().timestamp_micros())
}

/// Render epoch microseconds in the canonical timestamp form
pub fn format_timestamp_micros(micros: i64) -> String {
    DateTime::from_timestamp_micros(micros).map_or_else(
        || micros.to_string(),
        |dt| dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
    )
}

/// Convert JSON records to an Arrow RecordBatch of the given schema
///
/// Conversion is lenient: values that do not fit a column's type become
/// null. Fields missing from the schema are ignored.
pub fn json_to_arrow(records: &[Value], schema: &Schema) -> Result<RecordBatch> {
    let schema = Arc::new(schema.clone());

    if records.is_empty() {
        return Ok(RecordBatch::new_empty(schema));
    }

    let mut columns: Vec<ArrayRef> = Vec::new();

    for field in schema.fields() {
        let values: Vec<Option<&Value>> = records
            .iter()
            .map(|record| {
                if let Value::Object(obj) = record {
                    obj.get(field.name())
                } else {
                    None
                }
            })
            .collect();

        let array = build_array(&values, field.data_type())?;
        columns.push(array);
    }

    RecordBatch::try_new(schema, columns).map_err(|e| Error::Output {
        message: format!("Failed to create RecordBatch: {e}"),
    })
}

/// Build an Arrow array from JSON values
fn build_array(values: &[Option<&Value>], data_type: &DataType) -> Result<ArrayRef> {
    match data_type {
        DataType::Null => Ok(Arc::new(NullArray::new(values.len()))),

        DataType::Boolean => {
            let arr: BooleanArray = values.iter().map(|v| v.and_then(Value::as_bool)).collect();
            Ok(Arc::new(arr))
        }

        DataType::Int64 => {
            let arr: Int64Array = values.iter().map(|v| v.and_then(Value::as_i64)).collect();
            Ok(Arc::new(arr))
        }

        DataType::Int32 => {
            let arr: Int32Array = values
                .iter()
                .map(|v| v.and_then(Value::as_i64).and_then(|i| i32::try_from(i).ok()))
                .collect();
            Ok(Arc::new(arr))
        }

        DataType::Float64 => {
            #[allow(clippy::cast_precision_loss)]
            let arr: Float64Array = values
                .iter()
                .map(|v| v.and_then(|v| v.as_f64().or_else(|| v.as_i64().map(|i| i as f64))))
                .collect();
            Ok(Arc::new(arr))
        }

        DataType::Utf8 => {
            let arr: StringArray = values
                .iter()
                .map(|v| {
                    v.and_then(|v| match v {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        _ => Some(v.to_string()),
                    })
                })
                .collect();
            Ok(Arc::new(arr))
        }

        DataType::Timestamp(TimeUnit::Microsecond, tz) => {
            let arr: TimestampMicrosecondArray = values
                .iter()
                .map(|v| {
                    v.and_then(|v| match v {
                        Value::Number(n) => n.as_i64(),
                        Value::String(s) => parse_timestamp_micros(s),
                        _ => None,
                    })
                })
                .collect();
            Ok(Arc::new(arr.with_timezone_opt(tz.clone())))
        }

        DataType::List(field) => build_list_array(values, field),

        DataType::Struct(fields) => build_struct_array(values, fields),

        other => Err(Error::output(format!(
            "Unsupported column type for JSON conversion: {other}"
        ))),
    }
}

/// Build a list array from JSON arrays
fn build_list_array(values: &[Option<&Value>], field: &Arc<Field>) -> Result<ArrayRef> {
    let mut all_items: Vec<Option<&Value>> = Vec::new();
    let mut offsets: Vec<i32> = vec![0];
    let mut validity: Vec<bool> = Vec::with_capacity(values.len());

    for value in values {
        if let Some(Value::Array(arr)) = value {
            for item in arr {
                all_items.push(Some(item));
            }
            validity.push(true);
        } else {
            validity.push(false);
        }
        let offset = i32::try_from(all_items.len()).map_err(|_| Error::Output {
            message: "Array too large for i32 offset".to_string(),
        })?;
        offsets.push(offset);
    }

    let items_array = build_array(&all_items, field.data_type())?;
    let offset_buffer = OffsetBuffer::new(offsets.into());

    let list_array = ListArray::try_new(
        Arc::clone(field),
        offset_buffer,
        items_array,
        Some(NullBuffer::from(validity)),
    )?;
    Ok(Arc::new(list_array))
}

/// Build a struct array from JSON objects; non-objects become null structs
fn build_struct_array(values: &[Option<&Value>], fields: &Fields) -> Result<ArrayRef> {
    let mut child_arrays: Vec<ArrayRef> = Vec::new();

    for field in fields {
        let child_values: Vec<Option<&Value>> = values
            .iter()
            .map(|v| {
                v.and_then(|v| {
                    if let Value::Object(obj) = v {
                        obj.get(field.name())
                    } else {
                        None
                    }
                })
            })
            .collect();

        let child_array = build_array(&child_values, field.data_type())?;
        child_arrays.push(child_array);
    }

    let validity: Vec<bool> = values
        .iter()
        .map(|v| matches!(v, Some(Value::Object(_))))
        .collect();

    let struct_array =
        StructArray::try_new(fields.clone(), child_arrays, Some(NullBuffer::from(validity)))?;
    Ok(Arc::new(struct_array))
}

/// Convert an Arrow RecordBatch to JSON records
///
/// Returns a vector of JSON objects, one per row in the batch.
pub fn arrow_to_json(batch: &RecordBatch) -> Result<Vec<Value>> {
    (0..batch.num_rows())
        .map(|row| row_to_json(batch, row).map(Value::Object))
        .collect()
}

/// Convert one row of a RecordBatch to a JSON object keyed by column name
pub fn row_to_json(batch: &RecordBatch, row: usize) -> Result<JsonObject> {
    let schema = batch.schema();
    let mut record = JsonObject::new();

    for (col_idx, field) in schema.fields().iter().enumerate() {
        let value = array_value_to_json(batch.column(col_idx).as_ref(), row)?;
        record.insert(field.name().clone(), value);
    }

    Ok(record)
}

fn primitive_to_json<T>(array: &dyn Array, row: usize) -> Value
where
    T: ArrowPrimitiveType,
    T::Native: Into<serde_json::Number>,
{
    Value::Number(array.as_primitive::<T>().value(row).into())
}

fn timestamp_to_json<T>(array: &dyn Array, row: usize, micros_per_unit: (i64, i64)) -> Value
where
    T: ArrowPrimitiveType<Native = i64>,
{
    let (mul, div) = micros_per_unit;
    let raw = array.as_primitive::<T>().value(row);
    Value::String(format_timestamp_micros(raw.saturating_mul(mul) / div))
}

/// Convert a single array element to JSON
pub fn array_value_to_json(array: &dyn Array, row: usize) -> Result<Value> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }

    let value = match array.data_type() {
        DataType::Null => Value::Null,

        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),

        DataType::Int8 => primitive_to_json::<Int8Type>(array, row),
        DataType::Int16 => primitive_to_json::<Int16Type>(array, row),
        DataType::Int32 => primitive_to_json::<Int32Type>(array, row),
        DataType::Int64 => primitive_to_json::<Int64Type>(array, row),
        DataType::UInt8 => primitive_to_json::<UInt8Type>(array, row),
        DataType::UInt16 => primitive_to_json::<UInt16Type>(array, row),
        DataType::UInt32 => primitive_to_json::<UInt32Type>(array, row),
        DataType::UInt64 => primitive_to_json::<UInt64Type>(array, row),

        DataType::Float32 => {
            let val = f64::from(array.as_primitive::<Float32Type>().value(row));
            serde_json::Number::from_f64(val).map_or(Value::Null, Value::Number)
        }

        DataType::Float64 => {
            let val = array
                .as_primitive::<arrow::datatypes::Float64Type>()
                .value(row);
            serde_json::Number::from_f64(val).map_or(Value::Null, Value::Number)
        }

        DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),

        DataType::LargeUtf8 => Value::String(array.as_string::<i64>().value(row).to_string()),

        DataType::Timestamp(TimeUnit::Second, _) => {
            timestamp_to_json::<TimestampSecondType>(array, row, (1_000_000, 1))
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            timestamp_to_json::<TimestampMillisecondType>(array, row, (1_000, 1))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            timestamp_to_json::<TimestampMicrosecondType>(array, row, (1, 1))
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            timestamp_to_json::<TimestampNanosecondType>(array, row, (1, 1_000))
        }

        DataType::Date32 => {
            let days = array
                .as_primitive::<arrow::datatypes::Date32Type>()
                .value(row);
            // 719_163 days from 0001-01-01 to 1970-01-01
            NaiveDate::from_num_days_from_ce_opt(days + 719_163).map_or_else(
                || Value::Number(days.into()),
                |d| Value::String(d.format("%Y-%m-%d").to_string()),
            )
        }

        DataType::List(_) => {
            let arr = array
                .as_any()
                .downcast_ref::<ListArray>()
                .ok_or_else(|| Error::output("Failed to downcast to ListArray"))?;
            let values = arr.value(row);
            let mut items = Vec::with_capacity(values.len());
            for i in 0..values.len() {
                items.push(array_value_to_json(values.as_ref(), i)?);
            }
            Value::Array(items)
        }

        DataType::Struct(_) => {
            let arr = array
                .as_any()
                .downcast_ref::<StructArray>()
                .ok_or_else(|| Error::output("Failed to downcast to StructArray"))?;
            let mut obj = serde_json::Map::new();
            for (i, field) in arr.fields().iter().enumerate() {
                let val = array_value_to_json(arr.column(i).as_ref(), row)?;
                obj.insert(field.name().clone(), val);
            }
            Value::Object(obj)
        }

        other => {
            return Err(Error::output(format!(
                "Unsupported column type for JSON conversion: {other}"
            )))
        }
    };

    Ok(value)
}
