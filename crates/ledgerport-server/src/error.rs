//! Error taxonomy for the import pipeline and its HTTP mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

use crate::api::response::ErrorResponse;
use crate::db::DbError;
use crate::imports::gateway::BlobError;

/// Result type alias for import operations
pub type ImportResult<T> = std::result::Result<T, ImportError>;

/// Why an uploaded object was refused during confirmation.
///
/// `Display` is the caller-facing message; [`VerificationFailure::batch_error`]
/// is the text recorded on the failed batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    #[error("The file was not successfully uploaded to blob storage.")]
    NotUploaded,

    #[error("The uploaded file is empty. Expected size: {expected} bytes.")]
    EmptyFile { expected: i64 },

    #[error("File size mismatch. Expected: {expected} bytes, Actual: {actual} bytes.")]
    SizeMismatch { expected: i64, actual: i64 },
}

impl VerificationFailure {
    pub fn batch_error(&self) -> String {
        match self {
            VerificationFailure::NotUploaded => "File was not found in blob storage.".to_string(),
            VerificationFailure::EmptyFile { expected } => {
                format!("Uploaded file is empty (0 bytes). Expected {} bytes.", expected)
            },
            VerificationFailure::SizeMismatch { .. } => self.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    /// Referenced account, batch or row does not exist
    #[error("{0}")]
    NotFound(String),

    /// Operation attempted against an entity in the wrong source state
    #[error("{0}")]
    InvalidState(String),

    #[error("Illegal transition {from} -> {to} for {entity} {id}")]
    IllegalTransition {
        entity: &'static str,
        id: Uuid,
        from: &'static str,
        to: &'static str,
    },

    #[error(transparent)]
    Verification(#[from] VerificationFailure),

    /// Optimistic version check failed; reload and retry
    #[error("{0}")]
    ConcurrencyConflict(String),

    #[error("Cannot mutate {entity} {id}: status {status} is terminal")]
    TerminalMutation {
        entity: &'static str,
        id: Uuid,
        status: &'static str,
    },

    #[error("{0}")]
    Validation(String),

    /// A row-scoped uniqueness constraint rejected the write
    #[error("{0}")]
    Duplicate(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Blob storage error: {0}")]
    Blob(#[from] BlobError),

    #[error("Database error: {0}")]
    Database(DbError),
}

impl From<DbError> for ImportError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(message) => ImportError::ConcurrencyConflict(message),
            DbError::Duplicate(message) => ImportError::Duplicate(message),
            DbError::NotFound(message) => ImportError::NotFound(message),
            other => ImportError::Database(other),
        }
    }
}

impl From<ledgerport_common::CommonError> for ImportError {
    fn from(err: ledgerport_common::CommonError) -> Self {
        ImportError::Validation(err.to_string())
    }
}

impl ImportError {
    pub fn not_found(entity: &str, id: Uuid) -> Self {
        ImportError::NotFound(format!("{} with ID {} was not found.", entity, id))
    }

    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::NotFound(_) => "NOT_FOUND",
            ImportError::InvalidState(_) => "INVALID_STATE",
            ImportError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            ImportError::Verification(_) => "VERIFICATION_FAILED",
            ImportError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            ImportError::TerminalMutation { .. } => "TERMINAL_STATUS",
            ImportError::Validation(_) => "VALIDATION_ERROR",
            ImportError::Duplicate(_) => "DUPLICATE",
            ImportError::Cancelled => "CANCELLED",
            ImportError::Blob(_) => "STORAGE_ERROR",
            ImportError::Database(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ImportError::NotFound(_) => StatusCode::NOT_FOUND,
            ImportError::InvalidState(_)
            | ImportError::Verification(_)
            | ImportError::Validation(_) => StatusCode::BAD_REQUEST,
            ImportError::IllegalTransition { .. }
            | ImportError::ConcurrencyConflict(_)
            | ImportError::TerminalMutation { .. }
            | ImportError::Duplicate(_) => StatusCode::CONFLICT,
            ImportError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            ImportError::Blob(_) | ImportError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ImportError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            ImportError::Blob(e) => {
                tracing::error!(error = %e, "Blob storage failure");
                "A storage error occurred".to_string()
            },
            ImportError::Database(e) => {
                tracing::error!(error = %e, "Database failure");
                "A database error occurred".to_string()
            },
            ImportError::IllegalTransition { .. } | ImportError::TerminalMutation { .. } => {
                tracing::warn!(error = %self, "Rejected state change");
                self.to_string()
            },
            other => other.to_string(),
        };

        let body = match &self {
            ImportError::IllegalTransition {
                entity,
                id,
                from,
                to,
            } => ErrorResponse::with_details(
                self.code(),
                message,
                serde_json::json!({ "entity": entity, "id": id, "from": from, "to": to }),
            ),
            ImportError::TerminalMutation { entity, id, status } => ErrorResponse::with_details(
                self.code(),
                message,
                serde_json::json!({ "entity": entity, "id": id, "status": status }),
            ),
            _ => ErrorResponse::new(self.code(), message),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_messages() {
        let empty = VerificationFailure::EmptyFile { expected: 5000 };
        assert_eq!(empty.to_string(), "The uploaded file is empty. Expected size: 5000 bytes.");
        assert_eq!(empty.batch_error(), "Uploaded file is empty (0 bytes). Expected 5000 bytes.");

        let mismatch = VerificationFailure::SizeMismatch {
            expected: 5000,
            actual: 10,
        };
        assert_eq!(
            mismatch.batch_error(),
            "File size mismatch. Expected: 5000 bytes, Actual: 10 bytes."
        );
        assert_eq!(
            VerificationFailure::NotUploaded.batch_error(),
            "File was not found in blob storage."
        );
    }

    #[test]
    fn test_db_conflict_maps_to_concurrency_conflict() {
        let err = ImportError::from(DbError::Conflict("stale".to_string()));
        assert!(matches!(err, ImportError::ConcurrencyConflict(_)));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ImportError::not_found("Import batch", Uuid::nil()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ImportError::InvalidState("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ImportError::Cancelled.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ImportError::from(VerificationFailure::NotUploaded).code(),
            "VERIFICATION_FAILED"
        );
    }
}
