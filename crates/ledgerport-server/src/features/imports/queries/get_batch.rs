//! Get batch query
//!
//! Returns a batch with its file and a count of its rows per status.

use mediator::Request;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ImportError, ImportResult};
use crate::features::imports::types::BatchView;
use crate::imports::{cancellable, FileSnapshot, ImportServices, RowStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBatchQuery {
    pub batch_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetBatchResponse {
    #[serde(flatten)]
    pub batch: BatchView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileSnapshot>,
    /// Statuses with no rows are omitted
    pub row_counts: BTreeMap<RowStatus, i64>,
}

impl Request<ImportResult<GetBatchResponse>> for GetBatchQuery {}

impl crate::cqrs::middleware::Query for GetBatchQuery {}

#[tracing::instrument(skip(services, query, cancel), fields(batch_id = %query.batch_id))]
pub async fn handle(
    services: &ImportServices,
    query: GetBatchQuery,
    cancel: &CancellationToken,
) -> ImportResult<GetBatchResponse> {
    let batch = cancellable(cancel, services.repository.find_batch(query.batch_id))
        .await?
        .ok_or_else(|| ImportError::not_found("Import batch", query.batch_id))?;

    let file = cancellable(cancel, services.repository.find_file(query.batch_id)).await?;
    let row_counts =
        cancellable(cancel, services.repository.count_rows_by_status(query.batch_id)).await?;

    Ok(GetBatchResponse {
        batch: BatchView::from(&batch),
        file: file.map(|f| f.snapshot()),
        row_counts,
    })
}
