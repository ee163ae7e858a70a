//! Confirm upload command
//!
//! Second half of the upload handoff. Checks the object the client PUT
//! against what prepare declared, then either records the file's integrity
//! and moves the batch to `FileUploaded`, or fails the batch for good.

use chrono::{DateTime, Utc};
use mediator::Request;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ImportError, ImportResult, VerificationFailure};
use crate::features::shared::validation::validate_sha256;
use crate::imports::{
    cancellable, BatchStatus, BlobError, ImportBatch, ImportFile, ImportServices,
    SIZE_TOLERANCE_BYTES,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUploadCommand {
    pub import_batch_id: Uuid,
    /// Client-computed SHA-256 of the uploaded bytes, hex in either case
    pub sha256_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmUploadResponse {
    pub import_batch_id: Uuid,
    pub status: BatchStatus,
    pub size_bytes: i64,
    pub sha256: String,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Request<ImportResult<ConfirmUploadResponse>> for ConfirmUploadCommand {}

impl crate::cqrs::middleware::Command for ConfirmUploadCommand {}

impl ConfirmUploadCommand {
    pub fn validate(&self) -> ImportResult<()> {
        validate_sha256(&self.sha256_hash)?;
        Ok(())
    }
}

/// Handles the confirm upload command
///
/// Verification runs in order: object exists, object is non-empty, observed
/// size is within [`SIZE_TOLERANCE_BYTES`] of the declared size. The first
/// failing check fails the batch, which is persisted before the
/// verification error is returned.
#[tracing::instrument(skip(services, command, cancel), fields(batch_id = %command.import_batch_id))]
pub async fn handle(
    services: &ImportServices,
    command: ConfirmUploadCommand,
    cancel: &CancellationToken,
) -> ImportResult<ConfirmUploadResponse> {
    command.validate()?;

    let batch_id = command.import_batch_id;
    let mut batch = cancellable(cancel, services.repository.find_batch(batch_id))
        .await?
        .ok_or_else(|| ImportError::not_found("Import batch", batch_id))?;

    let mut file = cancellable(cancel, services.repository.find_file(batch_id))
        .await?
        .ok_or_else(|| {
            ImportError::InvalidState("Import batch does not have an associated file.".to_string())
        })?;

    if batch.status() != BatchStatus::PendingFileUpload {
        return Err(ImportError::InvalidState(format!(
            "Import batch is in '{}' status. Expected '{}' status.",
            batch.status(),
            BatchStatus::PendingFileUpload
        )));
    }

    let observed_size = match verify_upload(services, &file, cancel).await {
        Ok(size) => size,
        Err(ImportError::Verification(failure)) => {
            return Err(fail_batch(services, batch, failure, cancel).await);
        }
        Err(e) => return Err(e),
    };

    file.record_integrity(&command.sha256_hash, observed_size)?;

    let container = file.container();
    let key = file.object_key();
    let mut metadata = cancellable(cancel, services.blobs.get_metadata(container, key)).await?;
    metadata.insert("confirmed-at".to_string(), Utc::now().to_rfc3339());
    metadata.insert("sha256".to_string(), file.sha256().unwrap_or_default().to_string());
    metadata.insert("actual-file-size".to_string(), observed_size.to_string());
    cancellable(cancel, services.blobs.set_metadata(container, key, &metadata)).await?;

    batch.clear_error()?;
    batch.transition(BatchStatus::FileUploaded, None)?;

    let version = cancellable(cancel, services.repository.save_confirmation(&batch, &file)).await?;
    batch.set_persisted_version(version);

    tracing::info!(
        size_bytes = observed_size,
        expected_size_bytes = file.expected_size_bytes(),
        "Statement upload confirmed"
    );

    Ok(ConfirmUploadResponse {
        import_batch_id: batch.id(),
        status: batch.status(),
        size_bytes: file.size_bytes(),
        sha256: file.sha256().unwrap_or_default().to_string(),
        uploaded_at: batch.timeline().uploaded_at,
        version: batch.version(),
    })
}

/// Observed size of the uploaded object, or a [`ImportError::Verification`]
async fn verify_upload(
    services: &ImportServices,
    file: &ImportFile,
    cancel: &CancellationToken,
) -> ImportResult<i64> {
    let container = file.container();
    let key = file.object_key();

    if !cancellable(cancel, services.blobs.object_exists(container, key)).await? {
        return Err(VerificationFailure::NotUploaded.into());
    }

    let size = match cancellable(cancel, services.blobs.object_size(container, key)).await {
        Ok(size) => size,
        Err(ImportError::Blob(BlobError::NotFound { .. })) => {
            return Err(VerificationFailure::NotUploaded.into());
        }
        Err(e) => return Err(e),
    };

    check_size(file.expected_size_bytes(), size)?;
    Ok(size)
}

/// An empty object is always reported as empty, never as a size mismatch
pub(crate) fn check_size(expected: i64, actual: i64) -> Result<(), VerificationFailure> {
    if actual == 0 {
        return Err(VerificationFailure::EmptyFile { expected });
    }
    if (actual - expected).abs() > SIZE_TOLERANCE_BYTES {
        return Err(VerificationFailure::SizeMismatch { expected, actual });
    }
    Ok(())
}

/// Record the failure on the batch, move it to `Failed` and persist it.
/// Returns the error the caller should see.
async fn fail_batch(
    services: &ImportServices,
    mut batch: ImportBatch,
    failure: VerificationFailure,
    cancel: &CancellationToken,
) -> ImportError {
    let persisted: ImportResult<i64> = async {
        batch.set_error(failure.batch_error())?;
        batch.transition(BatchStatus::Failed, None)?;
        cancellable(cancel, services.repository.update_batch(&batch)).await
    }
    .await;

    match persisted {
        Ok(version) => {
            tracing::warn!(
                batch_id = %batch.id(),
                version,
                reason = %failure,
                "Statement upload failed verification"
            );
            ImportError::Verification(failure)
        }
        Err(e) => e,
    }
}
