//! Retry batch command
//!
//! Bumps the passive retry counter. Whether and when to retry is decided by
//! the worker; this only records that it did.

use mediator::Request;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::transition_batch::load_batch_at_version;
use crate::error::ImportResult;
use crate::features::imports::types::BatchView;
use crate::imports::{cancellable, ImportServices};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryBatchCommand {
    #[serde(default)]
    pub batch_id: Uuid,
    pub expected_version: i64,
}

impl Request<ImportResult<BatchView>> for RetryBatchCommand {}

impl crate::cqrs::middleware::Command for RetryBatchCommand {}

#[tracing::instrument(skip(services, command, cancel), fields(batch_id = %command.batch_id))]
pub async fn handle(
    services: &ImportServices,
    command: RetryBatchCommand,
    cancel: &CancellationToken,
) -> ImportResult<BatchView> {
    let mut batch =
        load_batch_at_version(services, command.batch_id, command.expected_version, cancel).await?;

    let retry_count = batch.increment_retry();
    let version = cancellable(cancel, services.repository.update_batch(&batch)).await?;
    batch.set_persisted_version(version);

    tracing::info!(retry_count, version, status = %batch.status(), "Import batch retry recorded");

    Ok(BatchView::from(&batch))
}
