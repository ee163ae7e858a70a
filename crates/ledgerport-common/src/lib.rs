//! Ledgerport Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the Ledgerport statement import service.
//!
//! - **Error Handling**: [`CommonError`] and the crate [`Result`] alias
//! - **Checksums**: SHA-256 digest validation and the row content-address digest
//! - **Logging**: tracing subscriber setup driven by environment variables
//!
//! # Example
//!
//! ```
//! use ledgerport_common::checksum::RowFingerprint;
//!
//! let fingerprint = RowFingerprint {
//!     line_number: 7,
//!     raw_amount_text: Some("-12.50"),
//!     raw_description: Some("COFFEE SHOP"),
//!     ..RowFingerprint::default()
//! };
//! assert_eq!(fingerprint.digest().len(), 64);
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
