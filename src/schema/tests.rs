//! Schema derivation tests

use super::*;
use arrow::datatypes::{DataType, TimeUnit};
use pretty_assertions::assert_eq;
use test_case::test_case;

fn my_model() -> RecordSchema {
    RecordSchema::new(
        "MyModel",
        vec![
            FieldDef::required("my_field", FieldType::string()),
            FieldDef::required("my_int", FieldType::integer()),
        ],
    )
    .with_load_metadata()
}

// ============================================================================
// Record Description Tests
// ============================================================================

#[test_case("MyModel", "my_model")]
#[test_case("FileDownloads", "file_downloads")]
#[test_case("HTTPServerLog", "http_server_log")]
#[test_case("test_table", "test_table")]
#[test_case("Model2Data", "model2_data")]
fn test_camel_to_snake(input: &str, expected: &str) {
    assert_eq!(camel_to_snake(input), expected);
}

#[test]
fn test_table_name_from_type_name() {
    assert_eq!(my_model().table_name(), "my_model");
}

#[test]
fn test_load_metadata_is_prepended_once() {
    let schema = my_model().with_load_metadata();
    assert_eq!(
        schema.field_names(),
        vec!["load_id", "load_timestamp", "my_field", "my_int"]
    );
    assert!(schema.has_load_metadata());

    let content: Vec<&str> = schema.content_fields().map(|f| f.name.as_str()).collect();
    assert_eq!(content, vec!["my_field", "my_int"]);
}

// ============================================================================
// Table Definition Tests
// ============================================================================

#[test]
fn test_table_ddl_with_primary_key() {
    let deriver = SchemaDeriver::default();
    let table = deriver
        .table_schema(&my_model(), None, Some("load_id"))
        .unwrap();

    let expected = "CREATE TABLE IF NOT EXISTS my_model (\n    \
                    \"load_id\" VARCHAR,\n    \
                    \"load_timestamp\" TIMESTAMP,\n    \
                    \"my_field\" VARCHAR,\n    \
                    \"my_int\" BIGINT,\n    \
                    PRIMARY KEY (\"load_id\")\n)";
    assert_eq!(table.ddl(), expected);
    assert!(table.has_primary_key());
}

#[test]
fn test_table_ddl_without_primary_key() {
    let deriver = SchemaDeriver::default();
    let table = deriver
        .table_schema(&my_model(), Some("custom"), None)
        .unwrap();

    assert!(!table.has_primary_key());
    assert!(table.ddl().starts_with("CREATE TABLE IF NOT EXISTS custom ("));
    assert!(!table.ddl().contains("PRIMARY KEY"));
}

#[test]
fn test_primary_key_flag_is_structural() {
    // A column whose name contains the words must not be mistaken for a key.
    let record = RecordSchema::new(
        "Odd",
        vec![FieldDef::optional("NOT_PRIMARY_KEY_COL", FieldType::string())],
    );
    let table = SchemaDeriver::default()
        .table_schema(&record, None, None)
        .unwrap();

    assert!(table.ddl().to_uppercase().contains("PRIMARY_KEY"));
    assert!(!table.has_primary_key());
}

#[test]
fn test_unknown_primary_key_is_rejected() {
    let err = SchemaDeriver::default()
        .table_schema(&my_model(), None, Some("nope"))
        .unwrap_err();
    assert!(err.to_string().contains("primary_key"));
}

#[test]
fn test_temp_ddl_drops_primary_key() {
    let table = SchemaDeriver::default()
        .table_schema(&my_model(), None, Some("load_id"))
        .unwrap();
    let ddl = table.temp_ddl("staging");
    assert!(ddl.starts_with("CREATE OR REPLACE TEMP TABLE staging ("));
    assert!(!ddl.contains("PRIMARY KEY"));
}

#[test]
fn test_nested_struct_ddl() {
    let table = SchemaDeriver::default()
        .table_schema(&file_downloads(), None, None)
        .unwrap();

    let file = &table.columns[4];
    assert_eq!(file.name, "file");
    assert_eq!(
        file.sql_type,
        "STRUCT(\"filename\" VARCHAR, \"project\" VARCHAR, \"version\" VARCHAR, \"type\" VARCHAR)"
    );

    let details = &table.columns[5];
    assert!(details.sql_type.contains(
        "\"distro\" STRUCT(\"name\" VARCHAR, \"version\" VARCHAR, \"id\" VARCHAR, \"libc\" STRUCT(\"lib\" VARCHAR, \"version\" VARCHAR))"
    ));
    assert!(details.sql_type.ends_with("\"ci\" BOOLEAN)"));
}

// ============================================================================
// Columnar Schema Tests
// ============================================================================

#[test]
fn test_arrow_schema() {
    let schema = SchemaDeriver::default().arrow_schema(&my_model());
    let types: Vec<(&str, &DataType)> = schema
        .fields()
        .iter()
        .map(|f| (f.name().as_str(), f.data_type()))
        .collect();

    assert_eq!(
        types,
        vec![
            ("load_id", &DataType::Utf8),
            (
                "load_timestamp",
                &DataType::Timestamp(TimeUnit::Microsecond, None)
            ),
            ("my_field", &DataType::Utf8),
            ("my_int", &DataType::Int64),
        ]
    );
    assert!(schema.fields().iter().all(|f| f.is_nullable()));
}

#[test_case(FieldType::timestamp(), "TIMESTAMP", DataType::Timestamp(TimeUnit::Microsecond, None))]
#[test_case(FieldType::integer(), "BIGINT", DataType::Int64)]
#[test_case(FieldType::float(), "DOUBLE", DataType::Float64)]
#[test_case(FieldType::string(), "VARCHAR", DataType::Utf8)]
#[test_case(FieldType::boolean(), "BOOLEAN", DataType::Boolean)]
#[test_case(FieldType::Unknown("decimal".into()), "VARCHAR", DataType::Utf8)]
fn test_scalar_mapping(field_type: FieldType, sql: &str, arrow: DataType) {
    let deriver = SchemaDeriver::default();
    assert_eq!(deriver.sql_type(&field_type), sql);
    assert_eq!(deriver.arrow_type(&field_type), arrow);
}

#[test]
fn test_substituted_mapping() {
    let mapping = TypeMapping::duckdb()
        .with_sql(ScalarType::Integer, "INTEGER")
        .with_arrow(ScalarType::Integer, DataType::Int32)
        .without(ScalarType::Boolean);
    let deriver = SchemaDeriver::new(mapping);

    assert_eq!(deriver.sql_type(&FieldType::integer()), "INTEGER");
    assert_eq!(deriver.arrow_type(&FieldType::integer()), DataType::Int32);
    assert_eq!(deriver.sql_type(&FieldType::boolean()), "VARCHAR");

    // The default deriver is unaffected.
    assert_eq!(SchemaDeriver::default().sql_type(&FieldType::integer()), "BIGINT");
}

// ============================================================================
// Parity Tests
// ============================================================================

#[test]
fn test_table_and_columnar_schema_enumerate_same_fields() {
    let deriver = SchemaDeriver::default();
    for record in [
        my_model(),
        file_downloads(),
        file_downloads().with_load_metadata(),
    ] {
        let table = deriver.table_schema(&record, None, None).unwrap();
        let arrow = deriver.arrow_schema(&record);

        let arrow_names: Vec<&str> = arrow.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(table.column_names(), arrow_names);
        assert_eq!(table.column_names(), record.field_names());
    }
}

#[test]
fn test_derivation_is_idempotent() {
    let deriver = SchemaDeriver::default();
    let record = file_downloads().with_load_metadata();

    let first = deriver.table_schema(&record, None, Some("load_id")).unwrap();
    let second = deriver.table_schema(&record, None, Some("load_id")).unwrap();
    assert_eq!(first, second);
    assert_eq!(deriver.arrow_schema(&record), deriver.arrow_schema(&record));
}
