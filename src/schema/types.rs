//! Record schema description types
//!
//! A record type is described by an explicit, ordered list of field
//! descriptors. Both the table definition and the columnar schema are
//! derived from this one value, so the two never drift.

use serde::{Deserialize, Serialize};

/// Name of the load identifier metadata column
pub const LOAD_ID_FIELD: &str = "load_id";

/// Name of the load timestamp metadata column
pub const LOAD_TIMESTAMP_FIELD: &str = "load_timestamp";

/// Scalar field types understood by the type mapping tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    Timestamp,
    Integer,
    Float,
    String,
    Boolean,
}

impl std::fmt::Display for ScalarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarType::Timestamp => write!(f, "timestamp"),
            ScalarType::Integer => write!(f, "integer"),
            ScalarType::Float => write!(f, "float"),
            ScalarType::String => write!(f, "string"),
            ScalarType::Boolean => write!(f, "boolean"),
        }
    }
}

/// Declared type of a record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// A scalar with an entry in the mapping tables
    Scalar(ScalarType),
    /// A nested record, mapped to a struct column
    Struct(Vec<FieldDef>),
    /// Any other declared type; mapped through the fallback entry
    Unknown(String),
}

impl FieldType {
    pub fn timestamp() -> Self {
        FieldType::Scalar(ScalarType::Timestamp)
    }

    pub fn integer() -> Self {
        FieldType::Scalar(ScalarType::Integer)
    }

    pub fn float() -> Self {
        FieldType::Scalar(ScalarType::Float)
    }

    pub fn string() -> Self {
        FieldType::Scalar(ScalarType::String)
    }

    pub fn boolean() -> Self {
        FieldType::Scalar(ScalarType::Boolean)
    }

    /// Nested record type
    pub fn record(fields: Vec<FieldDef>) -> Self {
        FieldType::Struct(fields)
    }
}

/// One field declaration: name, declared type, optionality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    /// Optional fields accept null or absent values
    pub optional: bool,
}

impl FieldDef {
    /// A field that must be present and non-null
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: false,
        }
    }

    /// A field that may be null or absent
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            optional: true,
        }
    }

    /// Whether this field is load metadata rather than record content
    pub fn is_load_metadata(&self) -> bool {
        self.name == LOAD_ID_FIELD || self.name == LOAD_TIMESTAMP_FIELD
    }
}

/// Explicit description of a record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    /// Type name; the default table name is its snake_case form
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldDef>,
}

impl RecordSchema {
    /// Create a record schema
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Prepend the `load_id` / `load_timestamp` provenance columns
    ///
    /// Calling this twice is a no-op.
    #[must_use]
    pub fn with_load_metadata(mut self) -> Self {
        if self.has_load_metadata() {
            return self;
        }
        let mut fields = vec![
            FieldDef::optional(LOAD_ID_FIELD, FieldType::string()),
            FieldDef::optional(LOAD_TIMESTAMP_FIELD, FieldType::timestamp()),
        ];
        fields.append(&mut self.fields);
        self.fields = fields;
        self
    }

    /// Whether both provenance columns are declared
    pub fn has_load_metadata(&self) -> bool {
        self.field(LOAD_ID_FIELD).is_some() && self.field(LOAD_TIMESTAMP_FIELD).is_some()
    }

    /// Default table name (snake_case of the type name)
    pub fn table_name(&self) -> String {
        camel_to_snake(&self.name)
    }

    /// Look up a top-level field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a top-level field
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Top-level field names in declaration order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Fields that carry record content (load metadata excluded)
    pub fn content_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.is_load_metadata())
    }
}

/// Convert CamelCase to snake_case
pub fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(char::is_lowercase),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}
