//! Seams to the object store and the relational store
//!
//! The import workflow only talks to these traits. Production wires in
//! [`crate::storage::Storage`] and [`crate::db::imports::PgImportRepository`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::{batch::ImportBatch, file::ImportFile, row::ImportRow, status::RowStatus};
use crate::db::DbResult;

/// User metadata attached to a blob object
pub type BlobMetadata = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Object '{key}' not found in container '{container}'")]
    NotFound { container: String, key: String },

    #[error("Blob storage request failed: {0}")]
    Transport(#[from] anyhow::Error),
}

impl BlobError {
    pub fn not_found(container: &str, key: &str) -> Self {
        BlobError::NotFound {
            container: container.to_string(),
            key: key.to_string(),
        }
    }
}

/// What a minted credential lets its holder do with the object.
/// A presigned PUT never grants reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialPermissions {
    pub write: bool,
    pub create: bool,
}

impl CredentialPermissions {
    /// Write and create, as handed to uploading clients
    pub const UPLOAD: Self = Self {
        write: true,
        create: true,
    };

    pub fn allows_write(&self) -> bool {
        self.write || self.create
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCredential {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait BlobGateway: Send + Sync {
    async fn object_exists(&self, container: &str, key: &str) -> Result<bool, BlobError>;

    async fn object_size(&self, container: &str, key: &str) -> Result<i64, BlobError>;

    /// Create a zero-byte object and return its key
    async fn create_empty_object(
        &self,
        container: &str,
        key: &str,
        content_type: &str,
        metadata: &BlobMetadata,
    ) -> Result<String, BlobError>;

    async fn get_metadata(&self, container: &str, key: &str) -> Result<BlobMetadata, BlobError>;

    /// Replace the object's metadata with `metadata`
    async fn set_metadata(
        &self,
        container: &str,
        key: &str,
        metadata: &BlobMetadata,
    ) -> Result<(), BlobError>;

    async fn issue_write_credential(
        &self,
        container: &str,
        key: &str,
        ttl: Duration,
        permissions: CredentialPermissions,
    ) -> Result<WriteCredential, BlobError>;
}

/// Batch, file and row persistence.
///
/// Batch writes are compare-and-swap on [`ImportBatch::version`] and return
/// the new version; a stale version yields [`crate::db::DbError::Conflict`].
/// Row inserts enforce uniqueness of line number, FIT id and raw hash within
/// a batch and report violations as [`crate::db::DbError::Duplicate`].
#[async_trait]
pub trait ImportRepository: Send + Sync {
    async fn account_exists(&self, account_id: Uuid) -> DbResult<bool>;

    /// Insert a new batch together with its file in one transaction
    async fn insert_batch(&self, batch: &ImportBatch, file: &ImportFile) -> DbResult<()>;

    async fn find_batch(&self, batch_id: Uuid) -> DbResult<Option<ImportBatch>>;

    async fn find_file(&self, batch_id: Uuid) -> DbResult<Option<ImportFile>>;

    async fn update_batch(&self, batch: &ImportBatch) -> DbResult<i64>;

    /// Persist a confirmed upload: batch (version-checked) and file integrity together
    async fn save_confirmation(&self, batch: &ImportBatch, file: &ImportFile) -> DbResult<i64>;

    async fn insert_row(&self, row: &ImportRow) -> DbResult<()>;

    async fn find_row(&self, row_id: Uuid) -> DbResult<Option<ImportRow>>;

    /// Rejected when the stored row is already terminal
    async fn update_row(&self, row: &ImportRow) -> DbResult<()>;

    async fn count_rows_by_status(&self, batch_id: Uuid) -> DbResult<BTreeMap<RowStatus, i64>>;
}
