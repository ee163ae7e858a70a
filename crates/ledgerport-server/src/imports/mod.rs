//! Statement import domain
//!
//! - **status**: batch and row transition tables
//! - **batch** / **file** / **row**: aggregates with guarded mutators
//! - **gateway**: blob store and repository traits
//!
//! The prepare/confirm workflow and the row commands that drive these types
//! live in [`crate::features::imports`].

pub mod batch;
pub mod file;
pub mod gateway;
pub mod row;
pub mod status;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ImportConfig;
use crate::error::{ImportError, ImportResult};

pub use batch::{BatchSnapshot, BatchTimeline, ImportBatch};
pub use file::{FileSnapshot, ImportFile};
pub use gateway::{
    BlobError, BlobGateway, BlobMetadata, CredentialPermissions, ImportRepository, WriteCredential,
};
pub use row::{ImportRow, NormalizedFields, RawImportRecord, RowSnapshot};
pub use status::{BatchStatus, RowStatus};

/// Largest accepted difference between declared and stored size, in bytes.
pub const SIZE_TOLERANCE_BYTES: i64 = 1024;

/// Collaborators shared by every import command and query
#[derive(Clone)]
pub struct ImportServices {
    pub repository: Arc<dyn ImportRepository>,
    pub blobs: Arc<dyn BlobGateway>,
    pub settings: ImportConfig,
}

impl ImportServices {
    pub fn new(
        repository: Arc<dyn ImportRepository>,
        blobs: Arc<dyn BlobGateway>,
        settings: ImportConfig,
    ) -> Self {
        Self {
            repository,
            blobs,
            settings,
        }
    }
}

/// Race a gateway call against `cancel`.
///
/// A fired token wins even if the call is also ready, so nothing issued
/// after cancellation is observed as a success.
pub async fn cancellable<T, E, F>(cancel: &CancellationToken, operation: F) -> ImportResult<T>
where
    F: Future<Output = Result<T, E>>,
    ImportError: From<E>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ImportError::Cancelled),
        result = operation => result.map_err(ImportError::from),
    }
}

/// Cancel `shutdown` once `grace` has elapsed.
///
/// Used when the server stops accepting connections: requests already in
/// flight get `grace` to finish before their import work is cancelled.
pub fn cancel_after(shutdown: CancellationToken, grace: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => {},
            _ = tokio::time::sleep(grace) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Drain period elapsed, cancelling import work"
                );
                shutdown.cancel();
            },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_waits_for_grace_period() {
        let token = CancellationToken::new();
        let handle = cancel_after(token.clone(), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(!token.is_cancelled());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(token.is_cancelled());
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_cancellable_passes_through_results() {
        let token = CancellationToken::new();
        let value = cancellable(&token, async { Ok::<_, ImportError>(42) }).await;
        assert!(matches!(value, Ok(42)));
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let value = cancellable(&token, async { Ok::<_, ImportError>(42) }).await;
        assert!(matches!(value, Err(ImportError::Cancelled)));
    }
}
