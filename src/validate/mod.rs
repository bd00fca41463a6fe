//! Row validation against a record schema
//!
//! Every row is reconstructed as a key/value mapping and checked field by
//! field. All failing rows are collected before a single aggregate
//! [`Error::Validation`](crate::error::Error::Validation) is returned.

mod validator;

pub use validator::{check_record, validate_batch, validate_batches};
