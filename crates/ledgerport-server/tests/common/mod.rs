//! In-memory gateways for import workflow tests
//!
//! [`InMemoryImportRepository`] enforces the same guarantees the PostgreSQL
//! repository gets from its schema: version compare-and-swap on batches,
//! write-once file integrity, per-batch row uniqueness and frozen terminal
//! rows. [`FakeBlobGateway`] keeps objects in a map and lets tests play the
//! client by "uploading" bytes of a given size.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use ledgerport_server::{
    config::ImportConfig,
    db::{DbError, DbResult},
    imports::{
        BatchSnapshot, BlobError, BlobGateway, BlobMetadata, CredentialPermissions, FileSnapshot,
        ImportBatch, ImportFile, ImportRepository, ImportRow, ImportServices, RowSnapshot,
        RowStatus, WriteCredential,
    },
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const TEST_CONTAINER: &str = "statement-imports";

/// A syntactically valid digest in upper case, stored lower-cased on confirm
pub const UPPERCASE_SHA256: &str =
    "ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789";

pub fn import_config() -> ImportConfig {
    ImportConfig {
        container: TEST_CONTAINER.to_string(),
        credential_ttl_secs: 2 * 60 * 60,
        max_file_size_bytes: 5 * 1024 * 1024,
    }
}

// ============================================================================
// Repository
// ============================================================================

#[derive(Default)]
struct RepositoryState {
    accounts: HashSet<Uuid>,
    batches: HashMap<Uuid, BatchSnapshot>,
    /// Keyed by batch id
    files: HashMap<Uuid, FileSnapshot>,
    rows: HashMap<Uuid, RowSnapshot>,
}

#[derive(Default)]
pub struct InMemoryImportRepository {
    state: Mutex<RepositoryState>,
}

impl InMemoryImportRepository {
    pub fn add_account(&self) -> Uuid {
        let account_id = Uuid::now_v7();
        self.state.lock().unwrap().accounts.insert(account_id);
        account_id
    }

    pub fn batch(&self, batch_id: Uuid) -> Option<BatchSnapshot> {
        self.state.lock().unwrap().batches.get(&batch_id).cloned()
    }

    pub fn file(&self, batch_id: Uuid) -> Option<FileSnapshot> {
        self.state.lock().unwrap().files.get(&batch_id).cloned()
    }

    pub fn batch_count(&self) -> usize {
        self.state.lock().unwrap().batches.len()
    }

    pub fn rows_for(&self, batch_id: Uuid) -> Vec<RowSnapshot> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<_> = state
            .rows
            .values()
            .filter(|row| row.batch_id == batch_id)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.raw.line_number);
        rows
    }
}

fn check_version(state: &RepositoryState, batch: &ImportBatch) -> DbResult<i64> {
    match state.batches.get(&batch.id()) {
        Some(stored) if stored.version == batch.version() => Ok(stored.version + 1),
        _ => Err(DbError::Conflict(format!(
            "Import batch {} was modified concurrently (expected version {}).",
            batch.id(),
            batch.version()
        ))),
    }
}

fn with_version(batch: &ImportBatch, version: i64) -> BatchSnapshot {
    BatchSnapshot {
        version,
        ..batch.snapshot()
    }
}

#[async_trait]
impl ImportRepository for InMemoryImportRepository {
    async fn account_exists(&self, account_id: Uuid) -> DbResult<bool> {
        Ok(self.state.lock().unwrap().accounts.contains(&account_id))
    }

    async fn insert_batch(&self, batch: &ImportBatch, file: &ImportFile) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.accounts.contains(&batch.account_id()) {
            return Err(DbError::NotFound(format!(
                "Account with ID {} was not found.",
                batch.account_id()
            )));
        }
        if state.files.values().any(|f| {
            f.container == file.container() && f.object_key == file.object_key()
        }) {
            return Err(DbError::duplicate("Import file", file.object_key()));
        }
        state.batches.insert(batch.id(), batch.snapshot());
        state.files.insert(batch.id(), file.snapshot());
        Ok(())
    }

    async fn find_batch(&self, batch_id: Uuid) -> DbResult<Option<ImportBatch>> {
        let state = self.state.lock().unwrap();
        Ok(state.batches.get(&batch_id).cloned().map(ImportBatch::restore))
    }

    async fn find_file(&self, batch_id: Uuid) -> DbResult<Option<ImportFile>> {
        let state = self.state.lock().unwrap();
        Ok(state.files.get(&batch_id).cloned().map(ImportFile::restore))
    }

    async fn update_batch(&self, batch: &ImportBatch) -> DbResult<i64> {
        let mut state = self.state.lock().unwrap();
        let version = check_version(&state, batch)?;
        state.batches.insert(batch.id(), with_version(batch, version));
        Ok(version)
    }

    async fn save_confirmation(&self, batch: &ImportBatch, file: &ImportFile) -> DbResult<i64> {
        let mut state = self.state.lock().unwrap();
        let version = check_version(&state, batch)?;
        match state.files.get(&batch.id()) {
            Some(stored) if stored.sha256.is_none() => {},
            _ => {
                return Err(DbError::Conflict(format!(
                    "Integrity of import file {} is already recorded.",
                    file.id()
                )))
            },
        }
        state.batches.insert(batch.id(), with_version(batch, version));
        state.files.insert(batch.id(), file.snapshot());
        Ok(version)
    }

    async fn insert_row(&self, row: &ImportRow) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        let siblings = state.rows.values().filter(|r| r.batch_id == row.batch_id());
        for existing in siblings {
            if existing.raw.line_number == row.line_number() {
                return Err(DbError::Duplicate(format!(
                    "Import batch {} already has a row for line {}.",
                    row.batch_id(),
                    row.line_number()
                )));
            }
            if let (Some(a), Some(b)) = (&existing.raw.fit_id, &row.raw().fit_id) {
                if a == b {
                    return Err(DbError::Duplicate(format!(
                        "Import batch {} already has a row with FIT id '{}'.",
                        row.batch_id(),
                        b
                    )));
                }
            }
            if existing.raw_hash == row.raw_hash() {
                return Err(DbError::Duplicate(format!(
                    "Import batch {} already contains a row with hash {}.",
                    row.batch_id(),
                    row.raw_hash()
                )));
            }
        }
        state.rows.insert(row.id(), row.snapshot());
        Ok(())
    }

    async fn find_row(&self, row_id: Uuid) -> DbResult<Option<ImportRow>> {
        let state = self.state.lock().unwrap();
        Ok(state.rows.get(&row_id).cloned().map(ImportRow::restore))
    }

    async fn update_row(&self, row: &ImportRow) -> DbResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.rows.get(&row.id()) {
            None => Err(DbError::not_found("Import row", &row.id().to_string())),
            Some(stored) if stored.status.is_terminal() => Err(DbError::Conflict(format!(
                "Import row {} is already {} and cannot change.",
                row.id(),
                stored.status
            ))),
            Some(_) => {
                if let Some(canonical) = row.duplicate_of_row_id() {
                    if !state.rows.contains_key(&canonical) {
                        return Err(DbError::NotFound(format!(
                            "Canonical import row with ID {} was not found.",
                            canonical
                        )));
                    }
                }
                state.rows.insert(row.id(), row.snapshot());
                Ok(())
            },
        }
    }

    async fn count_rows_by_status(&self, batch_id: Uuid) -> DbResult<BTreeMap<RowStatus, i64>> {
        let state = self.state.lock().unwrap();
        let mut counts = BTreeMap::new();
        for row in state.rows.values().filter(|r| r.batch_id == batch_id) {
            *counts.entry(row.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

// ============================================================================
// Blob gateway
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeObject {
    pub size: i64,
    pub content_type: String,
    pub metadata: BlobMetadata,
}

#[derive(Default)]
pub struct FakeBlobGateway {
    objects: Mutex<HashMap<(String, String), FakeObject>>,
}

impl FakeBlobGateway {
    /// Play the client: overwrite the object with `size` bytes
    pub fn upload(&self, container: &str, key: &str, size: i64) {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .entry((container.to_string(), key.to_string()))
            .or_insert_with(|| FakeObject {
                size: 0,
                content_type: "application/octet-stream".to_string(),
                metadata: BlobMetadata::new(),
            });
        object.size = size;
    }

    pub fn remove(&self, container: &str, key: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(container.to_string(), key.to_string()));
    }

    pub fn object(&self, container: &str, key: &str) -> Option<FakeObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobGateway for FakeBlobGateway {
    async fn object_exists(&self, container: &str, key: &str) -> Result<bool, BlobError> {
        Ok(self.object(container, key).is_some())
    }

    async fn object_size(&self, container: &str, key: &str) -> Result<i64, BlobError> {
        self.object(container, key)
            .map(|object| object.size)
            .ok_or_else(|| BlobError::not_found(container, key))
    }

    async fn create_empty_object(
        &self,
        container: &str,
        key: &str,
        content_type: &str,
        metadata: &BlobMetadata,
    ) -> Result<String, BlobError> {
        self.objects.lock().unwrap().insert(
            (container.to_string(), key.to_string()),
            FakeObject {
                size: 0,
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
            },
        );
        Ok(key.to_string())
    }

    async fn get_metadata(&self, container: &str, key: &str) -> Result<BlobMetadata, BlobError> {
        self.object(container, key)
            .map(|object| object.metadata)
            .ok_or_else(|| BlobError::not_found(container, key))
    }

    async fn set_metadata(
        &self,
        container: &str,
        key: &str,
        metadata: &BlobMetadata,
    ) -> Result<(), BlobError> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(container.to_string(), key.to_string()))
            .ok_or_else(|| BlobError::not_found(container, key))?;
        object.metadata = metadata.clone();
        Ok(())
    }

    async fn issue_write_credential(
        &self,
        container: &str,
        key: &str,
        ttl: Duration,
        permissions: CredentialPermissions,
    ) -> Result<WriteCredential, BlobError> {
        if !permissions.allows_write() {
            return Err(BlobError::Transport(anyhow::anyhow!(
                "credential for {} would not allow writing",
                key
            )));
        }
        let ttl = chrono::Duration::from_std(ttl).map_err(anyhow::Error::from)?;
        let expires_at = Utc::now() + ttl;
        Ok(WriteCredential {
            url: format!(
                "https://blobs.test/{}/{}?expires={}",
                container,
                key,
                expires_at.timestamp()
            ),
            expires_at,
        })
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestImports {
    pub repository: Arc<InMemoryImportRepository>,
    pub blobs: Arc<FakeBlobGateway>,
    pub services: ImportServices,
    pub account_id: Uuid,
}

impl TestImports {
    pub fn new() -> Self {
        let repository = Arc::new(InMemoryImportRepository::default());
        let blobs = Arc::new(FakeBlobGateway::default());
        let account_id = repository.add_account();
        let services = ImportServices::new(repository.clone(), blobs.clone(), import_config());
        Self {
            repository,
            blobs,
            services,
            account_id,
        }
    }

    /// Object key recorded for `batch_id`
    pub fn object_key(&self, batch_id: Uuid) -> String {
        self.repository
            .file(batch_id)
            .map(|file| file.object_key)
            .unwrap_or_else(|| panic!("batch {} has no file", batch_id))
    }

    pub fn upload(&self, batch_id: Uuid, size: i64) {
        self.blobs.upload(TEST_CONTAINER, &self.object_key(batch_id), size);
    }
}
