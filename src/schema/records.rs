//! Record definitions for the PyPI download dataset

use super::types::{FieldDef, FieldType, RecordSchema};

fn name_version() -> FieldType {
    FieldType::record(vec![
        FieldDef::optional("name", FieldType::string()),
        FieldDef::optional("version", FieldType::string()),
    ])
}

/// One row of `bigquery-public-data.pypi.file_downloads`
///
/// Only `timestamp` is required. Load metadata is not included; add it with
/// [`RecordSchema::with_load_metadata`].
pub fn file_downloads() -> RecordSchema {
    let file = FieldType::record(vec![
        FieldDef::optional("filename", FieldType::string()),
        FieldDef::optional("project", FieldType::string()),
        FieldDef::optional("version", FieldType::string()),
        FieldDef::optional("type", FieldType::string()),
    ]);

    let libc = FieldType::record(vec![
        FieldDef::optional("lib", FieldType::string()),
        FieldDef::optional("version", FieldType::string()),
    ]);

    let distro = FieldType::record(vec![
        FieldDef::optional("name", FieldType::string()),
        FieldDef::optional("version", FieldType::string()),
        FieldDef::optional("id", FieldType::string()),
        FieldDef::optional("libc", libc),
    ]);

    let system = FieldType::record(vec![
        FieldDef::optional("name", FieldType::string()),
        FieldDef::optional("release", FieldType::string()),
    ]);

    let details = FieldType::record(vec![
        FieldDef::optional("installer", name_version()),
        FieldDef::optional("python", FieldType::string()),
        FieldDef::optional("implementation", name_version()),
        FieldDef::optional("distro", distro),
        FieldDef::optional("system", system),
        FieldDef::optional("cpu", FieldType::string()),
        FieldDef::optional("openssl_version", FieldType::string()),
        FieldDef::optional("setuptools_version", FieldType::string()),
        FieldDef::optional("rustc_version", FieldType::string()),
        FieldDef::optional("ci", FieldType::boolean()),
    ]);

    RecordSchema::new(
        "FileDownloads",
        vec![
            FieldDef::required("timestamp", FieldType::timestamp()),
            FieldDef::optional("country_code", FieldType::string()),
            FieldDef::optional("url", FieldType::string()),
            FieldDef::optional("project", FieldType::string()),
            FieldDef::optional("file", file),
            FieldDef::optional("details", details),
            FieldDef::optional("tls_protocol", FieldType::string()),
            FieldDef::optional("tls_cipher", FieldType::string()),
        ],
    )
}
