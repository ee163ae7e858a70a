//! Prepare upload command
//!
//! First half of the upload handoff. Reserves a batch for an account,
//! creates a zero-byte placeholder object and hands the caller a presigned
//! URL to PUT the statement bytes to.

use chrono::{DateTime, Utc};
use mediator::Request;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ImportError, ImportResult};
use crate::features::shared::validation::{
    validate_content_type, validate_file_extension, validate_file_name, validate_file_size,
};
use crate::imports::file::{file_extension, MAX_EXTENSION_LENGTH};
use crate::imports::{
    cancellable, BlobMetadata, CredentialPermissions, ImportBatch, ImportFile, ImportServices,
};
use crate::storage::build_import_key;

pub const MAX_FILE_NAME_LENGTH: usize = 255;
pub const MAX_CONTENT_TYPE_LENGTH: usize = 100;

/// ```rust,ignore
/// let command = PrepareUploadCommand {
///     account_id,
///     file_name: "march.csv".to_string(),
///     content_type: "text/csv".to_string(),
///     file_size: 5000,
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareUploadCommand {
    pub account_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    /// Declared size in bytes
    pub file_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareUploadResponse {
    pub import_batch_id: Uuid,
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

impl Request<ImportResult<PrepareUploadResponse>> for PrepareUploadCommand {}

impl crate::cqrs::middleware::Command for PrepareUploadCommand {}

impl PrepareUploadCommand {
    pub fn validate(&self, max_file_size_bytes: i64) -> ImportResult<()> {
        validate_file_name(&self.file_name, MAX_FILE_NAME_LENGTH)?;
        if let Some(extension) = file_extension(&self.file_name) {
            validate_file_extension(&extension, MAX_EXTENSION_LENGTH)?;
        }
        validate_content_type(&self.content_type, MAX_CONTENT_TYPE_LENGTH)?;
        validate_file_size(self.file_size, max_file_size_bytes)?;
        Ok(())
    }

    fn metadata(&self, initiated_at: DateTime<Utc>) -> BlobMetadata {
        BlobMetadata::from([
            ("account-id".to_string(), self.account_id.to_string()),
            ("original-file-name".to_string(), self.file_name.clone()),
            ("expected-file-size".to_string(), self.file_size.to_string()),
            ("upload-initiated-at".to_string(), initiated_at.to_rfc3339()),
        ])
    }
}

/// Handles the prepare upload command
///
/// 1. Checks the account exists
/// 2. Creates the placeholder object with upload metadata
/// 3. Mints a write credential for the placeholder
/// 4. Inserts the batch (`PendingFileUpload`) and its file in one transaction
///
/// The blob writes and the insert are not atomic. A failed insert leaves an
/// orphaned placeholder, which is logged with its key.
#[tracing::instrument(
    skip(services, command, cancel),
    fields(account_id = %command.account_id, file_name = %command.file_name)
)]
pub async fn handle(
    services: &ImportServices,
    command: PrepareUploadCommand,
    cancel: &CancellationToken,
) -> ImportResult<PrepareUploadResponse> {
    command.validate(services.settings.max_file_size_bytes)?;

    let account_exists =
        cancellable(cancel, services.repository.account_exists(command.account_id)).await?;
    if !account_exists {
        return Err(ImportError::not_found("Account", command.account_id));
    }

    let container = services.settings.container.as_str();
    let batch = ImportBatch::new(command.account_id);

    let extension = Path::new(&command.file_name)
        .extension()
        .and_then(|ext| ext.to_str());
    let requested_key = build_import_key(command.account_id, Uuid::now_v7(), extension);

    let object_key = cancellable(
        cancel,
        services.blobs.create_empty_object(
            container,
            &requested_key,
            &command.content_type,
            &command.metadata(Utc::now()),
        ),
    )
    .await?;

    let credential = cancellable(
        cancel,
        services.blobs.issue_write_credential(
            container,
            &object_key,
            services.settings.credential_ttl(),
            CredentialPermissions::UPLOAD,
        ),
    )
    .await?;

    let file = ImportFile::new(
        batch.id(),
        &command.file_name,
        &command.content_type,
        container,
        &object_key,
        command.file_size,
    );

    if let Err(e) = cancellable(cancel, services.repository.insert_batch(&batch, &file)).await {
        tracing::warn!(
            container,
            object_key = %object_key,
            error = %e,
            "Import batch was not saved; placeholder object is orphaned"
        );
        return Err(e);
    }

    tracing::info!(
        batch_id = %batch.id(),
        object_key = %object_key,
        expires_at = %credential.expires_at,
        "Prepared statement upload"
    );

    Ok(PrepareUploadResponse {
        import_batch_id: batch.id(),
        upload_url: credential.url,
        expires_at: credential.expires_at,
    })
}
