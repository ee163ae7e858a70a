//! Stage rows command
//!
//! Writes parsed statement records into a batch as `Unprocessed` rows. A
//! record that fails validation or collides with an existing row (same
//! line, FIT id or content hash) is reported back instead of aborting the
//! whole request.

use mediator::Request;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ImportError, ImportResult};
use crate::imports::{
    cancellable, BatchStatus, ImportBatch, ImportRow, ImportServices, RawImportRecord,
};

pub const MAX_ROWS_PER_REQUEST: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRowsCommand {
    #[serde(default)]
    pub batch_id: Uuid,
    pub records: Vec<RawImportRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedRow {
    pub row_id: Uuid,
    pub line_number: i32,
    pub raw_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedRecord {
    pub line_number: i32,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRowsResponse {
    pub import_batch_id: Uuid,
    pub staged: Vec<StagedRow>,
    pub rejected: Vec<RejectedRecord>,
}

impl Request<ImportResult<StageRowsResponse>> for StageRowsCommand {}

impl crate::cqrs::middleware::Command for StageRowsCommand {}

impl StageRowsCommand {
    pub fn validate(&self) -> ImportResult<()> {
        if self.records.is_empty() {
            return Err(ImportError::Validation("At least one record is required".to_string()));
        }
        if self.records.len() > MAX_ROWS_PER_REQUEST {
            return Err(ImportError::Validation(format!(
                "At most {} records can be staged per request, got {}",
                MAX_ROWS_PER_REQUEST,
                self.records.len()
            )));
        }
        Ok(())
    }
}

/// Rows are only written while their batch is `Processing`
pub(crate) async fn load_processing_batch(
    services: &ImportServices,
    batch_id: Uuid,
    cancel: &CancellationToken,
) -> ImportResult<ImportBatch> {
    let batch = cancellable(cancel, services.repository.find_batch(batch_id))
        .await?
        .ok_or_else(|| ImportError::not_found("Import batch", batch_id))?;

    if batch.status() != BatchStatus::Processing {
        return Err(ImportError::InvalidState(format!(
            "Import batch is in '{}' status. Expected '{}' status.",
            batch.status(),
            BatchStatus::Processing
        )));
    }

    Ok(batch)
}

#[tracing::instrument(
    skip(services, command, cancel),
    fields(batch_id = %command.batch_id, records = command.records.len())
)]
pub async fn handle(
    services: &ImportServices,
    command: StageRowsCommand,
    cancel: &CancellationToken,
) -> ImportResult<StageRowsResponse> {
    command.validate()?;
    let batch = load_processing_batch(services, command.batch_id, cancel).await?;

    let mut staged = Vec::with_capacity(command.records.len());
    let mut rejected = Vec::new();

    for record in command.records {
        let line_number = record.line_number;

        let row = match ImportRow::new(batch.id(), record) {
            Ok(row) => row,
            Err(ImportError::Validation(reason)) => {
                rejected.push(RejectedRecord { line_number, reason });
                continue;
            }
            Err(e) => return Err(e),
        };

        match cancellable(cancel, services.repository.insert_row(&row)).await {
            Ok(()) => staged.push(StagedRow {
                row_id: row.id(),
                line_number,
                raw_hash: row.raw_hash().to_string(),
            }),
            Err(ImportError::Duplicate(reason)) => {
                tracing::debug!(line_number, %reason, "Record collides with a staged row");
                rejected.push(RejectedRecord { line_number, reason });
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!(staged = staged.len(), rejected = rejected.len(), "Staged import rows");

    Ok(StageRowsResponse {
        import_batch_id: batch.id(),
        staged,
        rejected,
    })
}
