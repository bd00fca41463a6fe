//! Schema module
//!
//! Describes record types explicitly and derives storage schemas from them.
//!
//! # Features
//!
//! - **Record descriptions**: ordered field descriptors with nested records
//! - **Mapping tables**: immutable scalar → DuckDB / Arrow type tables
//! - **Derivation**: `CREATE TABLE` statement and Arrow schema from one source
//! - **PyPI records**: the `file_downloads` record type

mod deriver;
mod mapping;
mod records;
mod types;

pub use deriver::{ColumnDef, SchemaDeriver, TableSchema};
pub use mapping::TypeMapping;
pub use records::file_downloads;
pub use types::{
    camel_to_snake, FieldDef, FieldType, RecordSchema, ScalarType, LOAD_ID_FIELD,
    LOAD_TIMESTAMP_FIELD,
};

#[cfg(test)]
mod tests;
