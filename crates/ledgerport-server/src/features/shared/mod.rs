//! Shared utilities for feature modules
//!
//! - **validation**: request field validators and their error types

pub mod validation;

pub use validation::{
    validate_content_type, validate_file_name, validate_file_size, validate_sha256,
    FileSizeValidationError, Sha256ValidationError, TextValidationError,
};
