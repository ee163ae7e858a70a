//! Checksum utilities
//!
//! Validation of client-reported file digests and the content-address
//! digest used to de-duplicate imported rows.

use crate::error::{CommonError, Result};
use sha2::{Digest, Sha256};

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Returns true when `value` is exactly 64 hexadecimal characters (either case)
pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == SHA256_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Validate a client-supplied digest and fold it to lowercase
pub fn normalize_sha256_hex(value: &str) -> Result<String> {
    if !is_sha256_hex(value) {
        return Err(CommonError::InvalidDigest(value.to_string()));
    }
    Ok(value.to_ascii_lowercase())
}

/// The salient raw fields of one imported statement record.
///
/// Every text field is length-prefixed and absent fields are tagged
/// separately from empty ones, so `("ab", "c")` and `("a", "bc")` never
/// produce the same byte stream. The payload is hashed in its compact JSON
/// form; `serde_json` keeps object keys sorted, which makes the digest
/// independent of the key order the parser produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowFingerprint<'a> {
    pub line_number: i32,
    pub raw_date: Option<&'a str>,
    pub raw_amount_text: Option<&'a str>,
    pub raw_description: Option<&'a str>,
    pub raw_type: Option<&'a str>,
    pub raw_currency: Option<&'a str>,
    pub raw_counterparty: Option<&'a str>,
    pub raw_reference: Option<&'a str>,
    pub raw_fit_id: Option<&'a str>,
    pub payload: Option<&'a serde_json::Value>,
}

impl RowFingerprint<'_> {
    /// 64 lowercase hex characters
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.line_number.to_be_bytes());

        for field in [
            self.raw_date,
            self.raw_amount_text,
            self.raw_description,
            self.raw_type,
            self.raw_currency,
            self.raw_counterparty,
            self.raw_reference,
            self.raw_fit_id,
        ] {
            update_field(&mut hasher, field.map(str::as_bytes));
        }

        let payload = self.payload.map(|value| value.to_string());
        update_field(&mut hasher, payload.as_deref().map(str::as_bytes));

        hex::encode(hasher.finalize())
    }
}

fn update_field(hasher: &mut Sha256, field: Option<&[u8]>) {
    match field {
        None => hasher.update([0u8]),
        Some(bytes) => {
            hasher.update([1u8]);
            hasher.update((bytes.len() as u64).to_be_bytes());
            hasher.update(bytes);
        },
    }
}
