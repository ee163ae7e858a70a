//! Error types shared across Ledgerport crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid SHA-256 digest '{0}': expected 64 hexadecimal characters")]
    InvalidDigest(String),
}
