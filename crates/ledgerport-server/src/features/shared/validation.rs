//! Request validation shared by the import commands
//!
//! ```rust,ignore
//! use ledgerport_server::features::shared::validation::{validate_file_name, validate_file_size};
//!
//! validate_file_name("march.csv", 255)?;
//! validate_file_size(5000, 5 * 1024 * 1024)?;
//! ```

use ledgerport_common::checksum::{is_sha256_hex, SHA256_HEX_LEN};
use thiserror::Error;

use crate::error::ImportError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TextValidationError {
    #[error("{field} is required and cannot be empty")]
    Required { field: &'static str },

    #[error("{field} must be between 1 and {max_length} characters")]
    TooLong {
        field: &'static str,
        max_length: usize,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileSizeValidationError {
    #[error("File size must be greater than 0 bytes.")]
    NotPositive,

    #[error("File size must not exceed {max_bytes} bytes.")]
    TooLarge { max_bytes: i64 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Sha256ValidationError {
    #[error("SHA256 hash is required.")]
    Required,

    #[error("SHA256 hash must be exactly 64 characters.")]
    WrongLength,

    #[error("SHA256 hash must be a valid hexadecimal string.")]
    NotHex,
}

/// Non-blank text of at most `max_length` characters
pub fn validate_text(
    value: &str,
    field: &'static str,
    max_length: usize,
) -> Result<(), TextValidationError> {
    if value.trim().is_empty() {
        return Err(TextValidationError::Required { field });
    }
    if value.chars().count() > max_length {
        return Err(TextValidationError::TooLong { field, max_length });
    }
    Ok(())
}

pub fn validate_file_name(file_name: &str, max_length: usize) -> Result<(), TextValidationError> {
    validate_text(file_name, "File name", max_length)
}

pub fn validate_file_extension(
    extension: &str,
    max_length: usize,
) -> Result<(), TextValidationError> {
    validate_text(extension, "File extension", max_length)
}

pub fn validate_content_type(
    content_type: &str,
    max_length: usize,
) -> Result<(), TextValidationError> {
    validate_text(content_type, "Content type", max_length)
}

pub fn validate_file_size(size: i64, max_bytes: i64) -> Result<(), FileSizeValidationError> {
    if size <= 0 {
        return Err(FileSizeValidationError::NotPositive);
    }
    if size > max_bytes {
        return Err(FileSizeValidationError::TooLarge { max_bytes });
    }
    Ok(())
}

/// 64 hex digits, either case
pub fn validate_sha256(hash: &str) -> Result<(), Sha256ValidationError> {
    if hash.is_empty() {
        return Err(Sha256ValidationError::Required);
    }
    if hash.len() != SHA256_HEX_LEN {
        return Err(Sha256ValidationError::WrongLength);
    }
    if !is_sha256_hex(hash) {
        return Err(Sha256ValidationError::NotHex);
    }
    Ok(())
}

impl From<TextValidationError> for ImportError {
    fn from(err: TextValidationError) -> Self {
        ImportError::Validation(err.to_string())
    }
}

impl From<FileSizeValidationError> for ImportError {
    fn from(err: FileSizeValidationError) -> Self {
        ImportError::Validation(err.to_string())
    }
}

impl From<Sha256ValidationError> for ImportError {
    fn from(err: Sha256ValidationError) -> Self {
        ImportError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_text() {
        assert!(validate_file_name("march.csv", 255).is_ok());
        assert!(validate_file_name("README", 255).is_ok());
        assert_eq!(
            validate_file_name("   ", 255),
            Err(TextValidationError::Required { field: "File name" })
        );
        assert_eq!(
            validate_content_type(&"x".repeat(101), 100),
            Err(TextValidationError::TooLong {
                field: "Content type",
                max_length: 100
            })
        );
    }

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension(".csv", 32).is_ok());
        assert!(validate_file_extension(&format!(".{}", "x".repeat(31)), 32).is_ok());
        assert_eq!(
            validate_file_extension(&format!(".{}", "x".repeat(32)), 32),
            Err(TextValidationError::TooLong {
                field: "File extension",
                max_length: 32
            })
        );
    }

    #[test]
    fn test_validate_file_size_bounds() {
        let max = 5 * 1024 * 1024;
        assert_eq!(validate_file_size(0, max), Err(FileSizeValidationError::NotPositive));
        assert_eq!(validate_file_size(-5, max), Err(FileSizeValidationError::NotPositive));
        assert!(validate_file_size(1, max).is_ok());
        assert!(validate_file_size(max, max).is_ok());
        assert_eq!(
            validate_file_size(max + 1, max),
            Err(FileSizeValidationError::TooLarge { max_bytes: max })
        );
    }

    #[test]
    fn test_validate_sha256() {
        assert!(validate_sha256(&"aB".repeat(32)).is_ok());
        assert_eq!(validate_sha256(""), Err(Sha256ValidationError::Required));
        assert_eq!(validate_sha256("abc"), Err(Sha256ValidationError::WrongLength));
        assert_eq!(validate_sha256(&"g".repeat(64)), Err(Sha256ValidationError::NotHex));
    }
}
