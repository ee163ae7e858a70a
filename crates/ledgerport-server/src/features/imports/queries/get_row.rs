//! Get row query

use mediator::Request;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ImportError, ImportResult};
use crate::imports::{cancellable, ImportServices, RowSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRowQuery {
    pub row_id: Uuid,
}

impl Request<ImportResult<RowSnapshot>> for GetRowQuery {}

impl crate::cqrs::middleware::Query for GetRowQuery {}

#[tracing::instrument(skip(services, query, cancel), fields(row_id = %query.row_id))]
pub async fn handle(
    services: &ImportServices,
    query: GetRowQuery,
    cancel: &CancellationToken,
) -> ImportResult<RowSnapshot> {
    let row = cancellable(cancel, services.repository.find_row(query.row_id))
        .await?
        .ok_or_else(|| ImportError::not_found("Import row", query.row_id))?;

    Ok(row.snapshot())
}
