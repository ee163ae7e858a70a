//! Statement import endpoints
//!
//! - `commands/`: prepare and confirm uploads, batch transitions and retries,
//!   row staging and row advancement
//! - `queries/`: batch and row lookups
//! - `routes.rs`: HTTP routes under `/imports`

pub mod commands;
pub mod queries;
pub mod routes;
pub mod types;

pub use commands::{
    AdvanceRowCommand, ConfirmUploadCommand, ConfirmUploadResponse, PrepareUploadCommand,
    PrepareUploadResponse, RejectedRecord, RetryBatchCommand, RowAdvance, StageRowsCommand,
    StageRowsResponse, StagedRow, TransitionBatchCommand,
};
pub use queries::{GetBatchQuery, GetBatchResponse, GetRowQuery};
pub use routes::{imports_routes, ImportsState};
pub use types::BatchView;
