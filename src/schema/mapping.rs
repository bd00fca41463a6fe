//! Type mapping tables
//!
//! Immutable lookup tables from declared scalar types to DuckDB column types
//! and Arrow data types. A deriver owns one `TypeMapping`; tests can build a
//! substitute with the `with_*` methods.

use super::types::ScalarType;
use arrow::datatypes::{DataType, TimeUnit};
use std::collections::BTreeMap;

/// Scalar type → storage type tables with a shared fallback
#[derive(Debug, Clone, PartialEq)]
pub struct TypeMapping {
    sql: BTreeMap<ScalarType, String>,
    arrow: BTreeMap<ScalarType, DataType>,
    fallback_sql: String,
    fallback_arrow: DataType,
}

impl Default for TypeMapping {
    fn default() -> Self {
        Self::duckdb()
    }
}

impl TypeMapping {
    /// The DuckDB / Arrow mapping used by the loader
    pub fn duckdb() -> Self {
        let sql = BTreeMap::from([
            (ScalarType::Timestamp, "TIMESTAMP".to_string()),
            (ScalarType::Integer, "BIGINT".to_string()),
            (ScalarType::Float, "DOUBLE".to_string()),
            (ScalarType::String, "VARCHAR".to_string()),
            (ScalarType::Boolean, "BOOLEAN".to_string()),
        ]);

        let arrow = BTreeMap::from([
            (
                ScalarType::Timestamp,
                DataType::Timestamp(TimeUnit::Microsecond, None),
            ),
            (ScalarType::Integer, DataType::Int64),
            (ScalarType::Float, DataType::Float64),
            (ScalarType::String, DataType::Utf8),
            (ScalarType::Boolean, DataType::Boolean),
        ]);

        Self {
            sql,
            arrow,
            fallback_sql: "VARCHAR".to_string(),
            fallback_arrow: DataType::Utf8,
        }
    }

    /// Replace the SQL type for one scalar
    #[must_use]
    pub fn with_sql(mut self, scalar: ScalarType, sql_type: impl Into<String>) -> Self {
        self.sql.insert(scalar, sql_type.into());
        self
    }

    /// Replace the Arrow type for one scalar
    #[must_use]
    pub fn with_arrow(mut self, scalar: ScalarType, data_type: DataType) -> Self {
        self.arrow.insert(scalar, data_type);
        self
    }

    /// Drop a scalar from both tables so it maps through the fallback
    #[must_use]
    pub fn without(mut self, scalar: ScalarType) -> Self {
        self.sql.remove(&scalar);
        self.arrow.remove(&scalar);
        self
    }

    /// SQL column type for a scalar
    pub fn sql_type(&self, scalar: ScalarType) -> &str {
        self.sql
            .get(&scalar)
            .map_or(self.fallback_sql.as_str(), String::as_str)
    }

    /// Arrow data type for a scalar
    pub fn arrow_type(&self, scalar: ScalarType) -> DataType {
        self.arrow
            .get(&scalar)
            .cloned()
            .unwrap_or_else(|| self.fallback_arrow.clone())
    }

    /// SQL type used for unrecognised declared types
    pub fn fallback_sql(&self) -> &str {
        &self.fallback_sql
    }

    /// Arrow type used for unrecognised declared types
    pub fn fallback_arrow(&self) -> DataType {
        self.fallback_arrow.clone()
    }
}
