//! Advance row command
//!
//! Applies one row lifecycle step (parse, normalize, or one of the four
//! dispositions) and persists the result.

use mediator::Request;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::stage_rows::load_processing_batch;
use crate::error::{ImportError, ImportResult};
use crate::imports::{cancellable, ImportRow, ImportServices, NormalizedFields, RowSnapshot};

/// One step in a row's lifecycle, tagged by `action`
///
/// ```json
/// { "action": "reject", "errorCode": "BAD_DATE", "errorMessage": "Date is not valid" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RowAdvance {
    Parse {
        #[serde(default)]
        fields: NormalizedFields,
    },
    Normalize {
        #[serde(default)]
        fields: NormalizedFields,
    },
    Duplicate {
        duplicate_of_row_id: Uuid,
        #[serde(default)]
        confidence: Option<f64>,
    },
    Reject {
        #[serde(default)]
        error_code: Option<String>,
        #[serde(default)]
        error_message: Option<String>,
        #[serde(default)]
        error_log: Option<serde_json::Value>,
    },
    Skip {
        #[serde(default)]
        reason: Option<String>,
    },
    Import {
        transaction_id: Uuid,
    },
}

impl RowAdvance {
    pub fn apply(self, row: &mut ImportRow) -> ImportResult<()> {
        match self {
            RowAdvance::Parse { fields } => row.mark_parsed(fields),
            RowAdvance::Normalize { fields } => row.apply_normalization(fields),
            RowAdvance::Duplicate {
                duplicate_of_row_id,
                confidence,
            } => row.mark_duplicate(duplicate_of_row_id, confidence),
            RowAdvance::Reject {
                error_code,
                error_message,
                error_log,
            } => row.mark_rejected(error_code, error_message, error_log),
            RowAdvance::Skip { reason } => row.mark_skipped(reason),
            RowAdvance::Import { transaction_id } => row.mark_imported(transaction_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRowCommand {
    pub row_id: Uuid,
    pub advance: RowAdvance,
}

impl Request<ImportResult<RowSnapshot>> for AdvanceRowCommand {}

impl crate::cqrs::middleware::Command for AdvanceRowCommand {}

#[tracing::instrument(skip(services, command, cancel), fields(row_id = %command.row_id))]
pub async fn handle(
    services: &ImportServices,
    command: AdvanceRowCommand,
    cancel: &CancellationToken,
) -> ImportResult<RowSnapshot> {
    let mut row = cancellable(cancel, services.repository.find_row(command.row_id))
        .await?
        .ok_or_else(|| ImportError::not_found("Import row", command.row_id))?;

    load_processing_batch(services, row.batch_id(), cancel).await?;

    let from = row.status();
    command.advance.apply(&mut row)?;
    cancellable(cancel, services.repository.update_row(&row)).await?;

    tracing::debug!(%from, to = %row.status(), "Import row advanced");

    Ok(row.snapshot())
}
