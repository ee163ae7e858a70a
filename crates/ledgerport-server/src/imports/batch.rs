//! Import batch aggregate
//!
//! A batch is created in `PendingFileUpload` and only moves through
//! [`ImportBatch::transition`]. Each status owns one timestamp that is
//! written the first time the status is entered and never again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::BatchStatus;
use crate::error::{ImportError, ImportResult};

/// Maximum stored length of a batch error message, in characters.
pub const MAX_BATCH_ERROR_LENGTH: usize = 2000;

/// Per-status timestamps. `imported_at` is the creation stamp for
/// `PendingFileUpload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchTimeline {
    pub imported_at: DateTime<Utc>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub duplicate_at: Option<DateTime<Utc>>,
    pub superseded_at: Option<DateTime<Utc>>,
}

impl BatchTimeline {
    fn starting_at(at: DateTime<Utc>) -> Self {
        Self {
            imported_at: at,
            uploaded_at: None,
            queued_at: None,
            started_at: None,
            completed_at: None,
            failed_at: None,
            canceled_at: None,
            duplicate_at: None,
            superseded_at: None,
        }
    }

    /// The stamp slot for `status`; `None` for the creation status.
    fn slot(&mut self, status: BatchStatus) -> Option<&mut Option<DateTime<Utc>>> {
        match status {
            BatchStatus::PendingFileUpload => None,
            BatchStatus::FileUploaded => Some(&mut self.uploaded_at),
            BatchStatus::Queued => Some(&mut self.queued_at),
            BatchStatus::Processing => Some(&mut self.started_at),
            BatchStatus::Completed => Some(&mut self.completed_at),
            BatchStatus::Failed => Some(&mut self.failed_at),
            BatchStatus::Canceled => Some(&mut self.canceled_at),
            BatchStatus::Duplicate => Some(&mut self.duplicate_at),
            BatchStatus::Superseded => Some(&mut self.superseded_at),
        }
    }

    fn stamp(&mut self, status: BatchStatus, at: DateTime<Utc>) {
        if let Some(slot) = self.slot(status) {
            slot.get_or_insert(at);
        }
    }

    /// Reads the stamp recorded for `status`
    pub fn get(&self, status: BatchStatus) -> Option<DateTime<Utc>> {
        match status {
            BatchStatus::PendingFileUpload => Some(self.imported_at),
            BatchStatus::FileUploaded => self.uploaded_at,
            BatchStatus::Queued => self.queued_at,
            BatchStatus::Processing => self.started_at,
            BatchStatus::Completed => self.completed_at,
            BatchStatus::Failed => self.failed_at,
            BatchStatus::Canceled => self.canceled_at,
            BatchStatus::Duplicate => self.duplicate_at,
            BatchStatus::Superseded => self.superseded_at,
        }
    }
}

/// Plain persisted form of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSnapshot {
    pub id: Uuid,
    pub account_id: Uuid,
    pub status: BatchStatus,
    pub retry_count: i32,
    pub error: Option<String>,
    pub version: i64,
    pub timeline: BatchTimeline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportBatch {
    id: Uuid,
    account_id: Uuid,
    status: BatchStatus,
    retry_count: i32,
    error: Option<String>,
    version: i64,
    timeline: BatchTimeline,
}

impl ImportBatch {
    pub fn new(account_id: Uuid) -> Self {
        Self::new_at(account_id, Utc::now())
    }

    pub fn new_at(account_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            account_id,
            status: BatchStatus::PendingFileUpload,
            retry_count: 0,
            error: None,
            version: 0,
            timeline: BatchTimeline::starting_at(at),
        }
    }

    pub fn restore(snapshot: BatchSnapshot) -> Self {
        Self {
            id: snapshot.id,
            account_id: snapshot.account_id,
            status: snapshot.status,
            retry_count: snapshot.retry_count,
            error: snapshot.error,
            version: snapshot.version,
            timeline: snapshot.timeline,
        }
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        BatchSnapshot {
            id: self.id,
            account_id: self.account_id,
            status: self.status,
            retry_count: self.retry_count,
            error: self.error.clone(),
            version: self.version,
            timeline: self.timeline.clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn retry_count(&self) -> i32 {
        self.retry_count
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Version token the next persisted update must match
    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn timeline(&self) -> &BatchTimeline {
        &self.timeline
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn allowed_next(&self) -> &'static [BatchStatus] {
        self.status.allowed_next()
    }

    /// Move to `next`, stamping its timestamp if it has none yet.
    pub fn transition(&mut self, next: BatchStatus, at: Option<DateTime<Utc>>) -> ImportResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ImportError::IllegalTransition {
                entity: "import batch",
                id: self.id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }

        self.status = next;
        self.timeline.stamp(next, at.unwrap_or_else(Utc::now));
        Ok(())
    }

    /// Record an error message, truncated to [`MAX_BATCH_ERROR_LENGTH`] characters.
    /// An empty message clears the error.
    pub fn set_error(&mut self, message: impl Into<String>) -> ImportResult<()> {
        self.ensure_mutable()?;
        let message: String = message.into();
        self.error = if message.is_empty() {
            None
        } else {
            Some(truncate_chars(message, MAX_BATCH_ERROR_LENGTH))
        };
        Ok(())
    }

    pub fn clear_error(&mut self) -> ImportResult<()> {
        self.ensure_mutable()?;
        self.error = None;
        Ok(())
    }

    /// Passive counter for an external supervisor; valid in any status.
    pub fn increment_retry(&mut self) -> i32 {
        self.retry_count = self.retry_count.saturating_add(1);
        self.retry_count
    }

    /// Adopt the version the store assigned after a successful write
    pub fn set_persisted_version(&mut self, version: i64) {
        self.version = version;
    }

    fn ensure_mutable(&self) -> ImportResult<()> {
        if self.is_terminal() {
            return Err(ImportError::TerminalMutation {
                entity: "import batch",
                id: self.id,
                status: self.status.as_str(),
            });
        }
        Ok(())
    }
}

pub(crate) fn truncate_chars(value: String, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((cut, _)) => value[..cut].to_string(),
        None => value,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn batch() -> ImportBatch {
        ImportBatch::new(Uuid::now_v7())
    }

    #[test]
    fn test_new_batch_is_pending_with_creation_stamp_only() {
        let batch = batch();
        assert_eq!(batch.status(), BatchStatus::PendingFileUpload);
        assert_eq!(batch.version(), 0);
        assert_eq!(batch.retry_count(), 0);
        for status in BatchStatus::ALL {
            let stamped = batch.timeline().get(status).is_some();
            assert_eq!(stamped, status == BatchStatus::PendingFileUpload, "{}", status);
        }
    }

    #[test]
    fn test_ids_are_time_ordered_v7() {
        let first = batch();
        assert_eq!(first.id().get_version_num(), 7);
        assert_ne!(first.id(), batch().id());
    }

    #[test]
    fn test_happy_path_stamps_each_visited_status() {
        let mut batch = batch();
        let t0 = Utc::now();
        let path = [
            BatchStatus::FileUploaded,
            BatchStatus::Queued,
            BatchStatus::Processing,
            BatchStatus::Completed,
        ];
        for (offset, status) in path.into_iter().enumerate() {
            batch.transition(status, Some(t0 + Duration::seconds(offset as i64))).unwrap();
        }

        for status in BatchStatus::ALL {
            let visited = status == BatchStatus::PendingFileUpload || path.contains(&status);
            assert_eq!(batch.timeline().get(status).is_some(), visited, "{}", status);
        }
        assert_eq!(batch.timeline().started_at, Some(t0 + Duration::seconds(2)));
    }

    #[test]
    fn test_stamp_is_first_write_wins() {
        let mut timeline = BatchTimeline::starting_at(Utc::now());
        let first = Utc::now();
        let later = first + Duration::minutes(5);
        timeline.stamp(BatchStatus::Queued, first);
        timeline.stamp(BatchStatus::Queued, later);
        assert_eq!(timeline.queued_at, Some(first));
    }

    #[test]
    fn test_illegal_transition_leaves_batch_unchanged() {
        let mut batch = batch();
        let before = batch.clone();
        let err = batch.transition(BatchStatus::Completed, None).unwrap_err();
        assert!(matches!(
            err,
            ImportError::IllegalTransition {
                from: "PendingFileUpload",
                to: "Completed",
                ..
            }
        ));
        assert_eq!(batch, before);
    }

    #[test]
    fn test_terminal_batch_rejects_every_transition() {
        let mut batch = batch();
        batch.transition(BatchStatus::Canceled, None).unwrap();
        for next in BatchStatus::ALL {
            assert!(batch.transition(next, None).is_err(), "{}", next);
        }
    }

    #[test]
    fn test_error_is_truncated_on_char_boundary() {
        let mut batch = batch();
        batch.set_error("é".repeat(MAX_BATCH_ERROR_LENGTH + 10)).unwrap();
        assert_eq!(batch.error().unwrap().chars().count(), MAX_BATCH_ERROR_LENGTH);

        batch.clear_error().unwrap();
        assert!(batch.error().is_none());
    }

    #[test]
    fn test_error_is_frozen_once_terminal() {
        let mut batch = batch();
        batch.set_error("File was not found in blob storage.").unwrap();
        batch.transition(BatchStatus::Failed, None).unwrap();

        assert!(matches!(batch.clear_error(), Err(ImportError::TerminalMutation { .. })));
        assert!(matches!(batch.set_error("other"), Err(ImportError::TerminalMutation { .. })));
        assert_eq!(batch.error(), Some("File was not found in blob storage."));
    }

    #[test]
    fn test_retry_counter_only_increases() {
        let mut batch = batch();
        batch.transition(BatchStatus::Failed, None).unwrap();
        assert_eq!(batch.increment_retry(), 1);
        assert_eq!(batch.increment_retry(), 2);
    }

    #[test]
    fn test_snapshot_restore_preserves_state() {
        let mut batch = batch();
        batch.transition(BatchStatus::FileUploaded, None).unwrap();
        batch.set_persisted_version(3);
        let restored = ImportBatch::restore(batch.snapshot());
        assert_eq!(restored, batch);
    }
}
