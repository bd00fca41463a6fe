//! Output module
//!
//! Handles Arrow ⇄ JSON conversion, Parquet encoding and object-storage
//! writes.
//!
//! # Overview
//!
//! This module provides utilities for:
//! - Converting JSON records to Arrow RecordBatches of a known schema and back
//! - Encoding Parquet (ZSTD, large row groups) in memory
//! - Writing Hive-partitioned files to S3 or a local directory

mod cloud;
mod convert;
mod writer;

pub use cloud::{build_partition_path, AwsProfileCredentials, CloudDestination};
pub use convert::{
    array_value_to_json, arrow_to_json, format_timestamp_micros, json_to_arrow,
    parse_timestamp_micros, row_to_json,
};
pub use writer::{encode_parquet, ParquetWriter, ParquetWriterConfig, EXPORT_ROW_GROUP_SIZE};
