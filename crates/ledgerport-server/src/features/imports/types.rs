//! Response shapes shared by several import endpoints

use serde::{Deserialize, Serialize};

use crate::imports::{BatchSnapshot, BatchStatus, ImportBatch};

/// A batch as returned over the API, with the statuses it may move to next
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    #[serde(flatten)]
    pub batch: BatchSnapshot,
    pub allowed_next: Vec<BatchStatus>,
}

impl From<&ImportBatch> for BatchView {
    fn from(batch: &ImportBatch) -> Self {
        Self {
            batch: batch.snapshot(),
            allowed_next: batch.allowed_next().to_vec(),
        }
    }
}
