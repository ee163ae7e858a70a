//! The statement file attached 1:1 to an import batch

use chrono::{DateTime, Utc};
use ledgerport_common::checksum::normalize_sha256_hex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::{ImportError, ImportResult};

/// Width of the stored extension, leading dot included
pub const MAX_EXTENSION_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSnapshot {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub original_file_name: String,
    pub base_name: String,
    pub extension: Option<String>,
    pub content_type: String,
    pub container: String,
    pub object_key: String,
    pub expected_size_bytes: i64,
    pub size_bytes: i64,
    pub sha256: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

/// Integrity fields (`sha256`, observed `size_bytes`) are written once by
/// [`ImportFile::record_integrity`] and frozen afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFile {
    id: Uuid,
    batch_id: Uuid,
    original_file_name: String,
    base_name: String,
    extension: Option<String>,
    content_type: String,
    container: String,
    object_key: String,
    expected_size_bytes: i64,
    size_bytes: i64,
    sha256: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
}

impl ImportFile {
    pub fn new(
        batch_id: Uuid,
        original_file_name: &str,
        content_type: &str,
        container: &str,
        object_key: &str,
        expected_size_bytes: i64,
    ) -> Self {
        let (base_name, extension) = split_file_name(original_file_name);
        Self {
            id: Uuid::now_v7(),
            batch_id,
            original_file_name: original_file_name.to_string(),
            base_name,
            extension,
            content_type: content_type.to_string(),
            container: container.to_string(),
            object_key: object_key.to_string(),
            expected_size_bytes,
            size_bytes: expected_size_bytes,
            sha256: None,
            confirmed_at: None,
        }
    }

    pub fn restore(snapshot: FileSnapshot) -> Self {
        Self {
            id: snapshot.id,
            batch_id: snapshot.batch_id,
            original_file_name: snapshot.original_file_name,
            base_name: snapshot.base_name,
            extension: snapshot.extension,
            content_type: snapshot.content_type,
            container: snapshot.container,
            object_key: snapshot.object_key,
            expected_size_bytes: snapshot.expected_size_bytes,
            size_bytes: snapshot.size_bytes,
            sha256: snapshot.sha256,
            confirmed_at: snapshot.confirmed_at,
        }
    }

    pub fn snapshot(&self) -> FileSnapshot {
        FileSnapshot {
            id: self.id,
            batch_id: self.batch_id,
            original_file_name: self.original_file_name.clone(),
            base_name: self.base_name.clone(),
            extension: self.extension.clone(),
            content_type: self.content_type.clone(),
            container: self.container.clone(),
            object_key: self.object_key.clone(),
            expected_size_bytes: self.expected_size_bytes,
            size_bytes: self.size_bytes,
            sha256: self.sha256.clone(),
            confirmed_at: self.confirmed_at,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    pub fn original_file_name(&self) -> &str {
        &self.original_file_name
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    pub fn expected_size_bytes(&self) -> i64 {
        self.expected_size_bytes
    }

    /// Expected size until confirmation, observed size afterwards
    pub fn size_bytes(&self) -> i64 {
        self.size_bytes
    }

    pub fn sha256(&self) -> Option<&str> {
        self.sha256.as_deref()
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn is_confirmed(&self) -> bool {
        self.sha256.is_some()
    }

    /// Store the client-reported digest (lowercased) and the observed size.
    pub fn record_integrity(&mut self, sha256: &str, observed_size_bytes: i64) -> ImportResult<()> {
        if self.is_confirmed() {
            return Err(ImportError::InvalidState(format!(
                "Integrity of import file {} is already recorded and cannot change.",
                self.id
            )));
        }
        if observed_size_bytes < 0 {
            return Err(ImportError::Validation(format!(
                "Observed file size cannot be negative: {}",
                observed_size_bytes
            )));
        }

        self.sha256 = Some(normalize_sha256_hex(sha256)?);
        self.size_bytes = observed_size_bytes;
        self.confirmed_at = Some(Utc::now());
        Ok(())
    }
}

/// Stored extension of a file name, dot included: `"statement.csv"` -> `Some(".csv")`
pub fn file_extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
}

fn split_file_name(file_name: &str) -> (String, Option<String>) {
    let base_name = Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    (base_name, file_extension(file_name))
}
