//! Batch and row status enums with their transition tables
//!
//! Both tables are plain `match` expressions over `'static` slices, so
//! they are immutable and need no initialization. A status is terminal
//! exactly when its outgoing set is empty.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} status '{value}'")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

/// Lifecycle of one uploaded statement file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BatchStatus {
    PendingFileUpload,
    FileUploaded,
    Queued,
    Processing,
    Completed,
    Failed,
    Canceled,
    Duplicate,
    Superseded,
}

impl BatchStatus {
    pub const ALL: [BatchStatus; 9] = [
        BatchStatus::PendingFileUpload,
        BatchStatus::FileUploaded,
        BatchStatus::Queued,
        BatchStatus::Processing,
        BatchStatus::Completed,
        BatchStatus::Failed,
        BatchStatus::Canceled,
        BatchStatus::Duplicate,
        BatchStatus::Superseded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::PendingFileUpload => "PendingFileUpload",
            BatchStatus::FileUploaded => "FileUploaded",
            BatchStatus::Queued => "Queued",
            BatchStatus::Processing => "Processing",
            BatchStatus::Completed => "Completed",
            BatchStatus::Failed => "Failed",
            BatchStatus::Canceled => "Canceled",
            BatchStatus::Duplicate => "Duplicate",
            BatchStatus::Superseded => "Superseded",
        }
    }

    /// Statuses reachable in one step.
    ///
    /// `PendingFileUpload -> Failed` is the upload verification failure path.
    pub fn allowed_next(self) -> &'static [BatchStatus] {
        use BatchStatus::*;
        match self {
            PendingFileUpload => &[FileUploaded, Canceled, Failed],
            FileUploaded => &[Queued, Canceled, Duplicate],
            Queued => &[Processing, Canceled],
            Processing => &[Completed, Failed, Canceled, Superseded],
            Completed | Failed | Canceled | Duplicate | Superseded => &[],
        }
    }

    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BatchStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus {
                kind: "batch",
                value: s.to_string(),
            })
    }
}

/// Lifecycle of one record extracted from a statement file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RowStatus {
    Unprocessed,
    Parsed,
    Normalized,
    Duplicate,
    Rejected,
    Skipped,
    Imported,
}

impl RowStatus {
    pub const ALL: [RowStatus; 7] = [
        RowStatus::Unprocessed,
        RowStatus::Parsed,
        RowStatus::Normalized,
        RowStatus::Duplicate,
        RowStatus::Rejected,
        RowStatus::Skipped,
        RowStatus::Imported,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RowStatus::Unprocessed => "Unprocessed",
            RowStatus::Parsed => "Parsed",
            RowStatus::Normalized => "Normalized",
            RowStatus::Duplicate => "Duplicate",
            RowStatus::Rejected => "Rejected",
            RowStatus::Skipped => "Skipped",
            RowStatus::Imported => "Imported",
        }
    }

    pub fn allowed_next(self) -> &'static [RowStatus] {
        use RowStatus::*;
        match self {
            Unprocessed => &[Parsed, Normalized, Duplicate, Rejected, Skipped],
            Parsed => &[Normalized, Duplicate, Rejected, Skipped],
            Normalized => &[Imported, Duplicate, Rejected, Skipped],
            Duplicate | Rejected | Skipped | Imported => &[],
        }
    }

    pub fn can_transition_to(self, next: RowStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RowStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RowStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus {
                kind: "row",
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_table_has_no_self_loops() {
        for status in BatchStatus::ALL {
            assert!(!status.can_transition_to(status), "{} loops to itself", status);
        }
    }

    #[test]
    fn test_row_table_has_no_self_loops() {
        for status in RowStatus::ALL {
            assert!(!status.can_transition_to(status), "{} loops to itself", status);
        }
    }

    #[test]
    fn test_batch_terminal_set() {
        let terminal: Vec<_> = BatchStatus::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![
                BatchStatus::Completed,
                BatchStatus::Failed,
                BatchStatus::Canceled,
                BatchStatus::Duplicate,
                BatchStatus::Superseded,
            ]
        );
    }

    #[test]
    fn test_row_terminal_set() {
        let terminal: Vec<_> = RowStatus::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![RowStatus::Duplicate, RowStatus::Rejected, RowStatus::Skipped, RowStatus::Imported]
        );
    }

    #[test]
    fn test_batch_forward_path() {
        assert!(BatchStatus::PendingFileUpload.can_transition_to(BatchStatus::FileUploaded));
        assert!(BatchStatus::FileUploaded.can_transition_to(BatchStatus::Queued));
        assert!(BatchStatus::Queued.can_transition_to(BatchStatus::Processing));
        assert!(BatchStatus::Processing.can_transition_to(BatchStatus::Completed));
        assert!(!BatchStatus::PendingFileUpload.can_transition_to(BatchStatus::Queued));
        assert!(!BatchStatus::Queued.can_transition_to(BatchStatus::Failed));
        assert!(!BatchStatus::FileUploaded.can_transition_to(BatchStatus::Superseded));
    }

    #[test]
    fn test_row_cannot_import_before_normalization() {
        assert!(!RowStatus::Unprocessed.can_transition_to(RowStatus::Imported));
        assert!(!RowStatus::Parsed.can_transition_to(RowStatus::Imported));
        assert!(RowStatus::Normalized.can_transition_to(RowStatus::Imported));
        assert!(!RowStatus::Normalized.can_transition_to(RowStatus::Parsed));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in BatchStatus::ALL {
            assert_eq!(status.as_str().parse::<BatchStatus>(), Ok(status));
        }
        for status in RowStatus::ALL {
            assert_eq!(status.to_string().parse::<RowStatus>(), Ok(status));
        }
        assert!("Archived".parse::<BatchStatus>().is_err());
        assert!("parsed".parse::<RowStatus>().is_err());
    }
}
