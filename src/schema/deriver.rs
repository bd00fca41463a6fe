//! Schema derivation
//!
//! Derives the DuckDB table definition and the equivalent Arrow schema from
//! a single [`RecordSchema`]. Field order is the declaration order in both.

use super::mapping::TypeMapping;
use super::types::{FieldDef, FieldType, RecordSchema};
use crate::error::{Error, Result};
use arrow::datatypes::{DataType, Field, Fields, Schema};

/// One column of a derived table definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
}

/// Derived table definition
///
/// The primary key travels as a structured value; callers decide between
/// insert and insert-or-replace from [`TableSchema::has_primary_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<String>,
}

impl TableSchema {
    /// Whether a primary key was declared
    pub fn has_primary_key(&self) -> bool {
        self.primary_key.is_some()
    }

    /// Column names in order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table
    pub fn ddl(&self) -> String {
        self.render(&self.table_name, false)
    }

    /// `CREATE TEMP TABLE` statement with the same columns and no key
    pub fn temp_ddl(&self, table_name: &str) -> String {
        self.render(table_name, true)
    }

    fn render(&self, table_name: &str, temporary: bool) -> String {
        let mut lines: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.sql_type))
            .collect();

        if !temporary {
            if let Some(pk) = &self.primary_key {
                lines.push(format!("PRIMARY KEY (\"{pk}\")"));
            }
        }

        let create = if temporary {
            "CREATE OR REPLACE TEMP TABLE"
        } else {
            "CREATE TABLE IF NOT EXISTS"
        };

        format!(
            "{create} {table_name} (\n    {}\n)",
            lines.join(",\n    ")
        )
    }
}

/// Derives table and columnar schemas from record descriptions
#[derive(Debug, Clone, Default)]
pub struct SchemaDeriver {
    mapping: TypeMapping,
}

impl SchemaDeriver {
    /// Create a deriver that owns the given mapping tables
    pub fn new(mapping: TypeMapping) -> Self {
        Self { mapping }
    }

    /// The mapping tables in use
    pub fn mapping(&self) -> &TypeMapping {
        &self.mapping
    }

    /// Derive the table definition
    ///
    /// `table_name` defaults to the record's snake_case name. A primary key
    /// must name a declared top-level field.
    pub fn table_schema(
        &self,
        record: &RecordSchema,
        table_name: Option<&str>,
        primary_key: Option<&str>,
    ) -> Result<TableSchema> {
        if let Some(pk) = primary_key {
            if record.field(pk).is_none() {
                return Err(Error::invalid_value(
                    "primary_key",
                    format!("'{pk}' is not a field of {}", record.name),
                ));
            }
        }

        let columns = record
            .fields
            .iter()
            .map(|f| ColumnDef {
                name: f.name.clone(),
                sql_type: self.sql_type(&f.field_type),
            })
            .collect();

        Ok(TableSchema {
            table_name: table_name.map_or_else(|| record.table_name(), String::from),
            columns,
            primary_key: primary_key.map(String::from),
        })
    }

    /// Derive the Arrow schema
    pub fn arrow_schema(&self, record: &RecordSchema) -> Schema {
        Schema::new(self.arrow_fields(&record.fields))
    }

    /// DuckDB type for a declared type; structs are mapped recursively
    pub fn sql_type(&self, field_type: &FieldType) -> String {
        match field_type {
            FieldType::Scalar(scalar) => self.mapping.sql_type(*scalar).to_string(),
            FieldType::Struct(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|f| format!("\"{}\" {}", f.name, self.sql_type(&f.field_type)))
                    .collect();
                format!("STRUCT({})", inner.join(", "))
            }
            FieldType::Unknown(_) => self.mapping.fallback_sql().to_string(),
        }
    }

    /// Arrow type for a declared type; structs are mapped recursively
    pub fn arrow_type(&self, field_type: &FieldType) -> DataType {
        match field_type {
            FieldType::Scalar(scalar) => self.mapping.arrow_type(*scalar),
            FieldType::Struct(fields) => DataType::Struct(self.arrow_fields(fields)),
            FieldType::Unknown(_) => self.mapping.fallback_arrow(),
        }
    }

    fn arrow_fields(&self, fields: &[FieldDef]) -> Fields {
        fields
            .iter()
            .map(|f| Field::new(&f.name, self.arrow_type(&f.field_type), true))
            .collect::<Vec<_>>()
            .into()
    }
}
