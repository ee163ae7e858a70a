//! Transition batch command
//!
//! Used by the worker that queues, runs and closes batches. Every write is
//! checked against the version the caller last read.

use mediator::Request;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ImportError, ImportResult};
use crate::features::imports::types::BatchView;
use crate::imports::{cancellable, BatchStatus, ImportBatch, ImportServices};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionBatchCommand {
    /// Taken from the request path
    #[serde(default)]
    pub batch_id: Uuid,
    pub target: BatchStatus,
    pub expected_version: i64,
    /// Recorded on the batch before the move, typically with `Failed`
    #[serde(default)]
    pub error: Option<String>,
}

impl Request<ImportResult<BatchView>> for TransitionBatchCommand {}

impl crate::cqrs::middleware::Command for TransitionBatchCommand {}

impl TransitionBatchCommand {
    pub fn validate(&self) -> ImportResult<()> {
        // Confirmation is the only way into FileUploaded: it records the file's integrity
        if self.target == BatchStatus::FileUploaded {
            return Err(ImportError::InvalidState(format!(
                "Import batch can only reach '{}' through upload confirmation.",
                BatchStatus::FileUploaded
            )));
        }
        Ok(())
    }
}

/// Load a batch and check the caller's version token
pub(crate) async fn load_batch_at_version(
    services: &ImportServices,
    batch_id: Uuid,
    expected_version: i64,
    cancel: &CancellationToken,
) -> ImportResult<ImportBatch> {
    let batch = cancellable(cancel, services.repository.find_batch(batch_id))
        .await?
        .ok_or_else(|| ImportError::not_found("Import batch", batch_id))?;

    if batch.version() != expected_version {
        return Err(ImportError::ConcurrencyConflict(format!(
            "Import batch {} is at version {} but version {} was expected.",
            batch_id,
            batch.version(),
            expected_version
        )));
    }

    Ok(batch)
}

#[tracing::instrument(
    skip(services, command, cancel),
    fields(batch_id = %command.batch_id, target = %command.target)
)]
pub async fn handle(
    services: &ImportServices,
    command: TransitionBatchCommand,
    cancel: &CancellationToken,
) -> ImportResult<BatchView> {
    command.validate()?;

    let mut batch =
        load_batch_at_version(services, command.batch_id, command.expected_version, cancel).await?;
    let from = batch.status();

    if let Some(error) = command.error {
        batch.set_error(error)?;
    }
    batch.transition(command.target, None)?;

    let version = cancellable(cancel, services.repository.update_batch(&batch)).await?;
    batch.set_persisted_version(version);

    tracing::info!(%from, to = %batch.status(), version, "Import batch transitioned");

    Ok(BatchView::from(&batch))
}
