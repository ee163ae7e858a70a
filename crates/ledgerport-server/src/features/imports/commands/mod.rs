pub mod advance_row;
pub mod confirm_upload;
pub mod prepare_upload;
pub mod retry_batch;
pub mod stage_rows;
pub mod transition_batch;

pub use advance_row::{AdvanceRowCommand, RowAdvance};
pub use confirm_upload::{ConfirmUploadCommand, ConfirmUploadResponse};
pub use prepare_upload::{PrepareUploadCommand, PrepareUploadResponse};
pub use retry_batch::RetryBatchCommand;
pub use stage_rows::{RejectedRecord, StageRowsCommand, StageRowsResponse, StagedRow};
pub use transition_batch::TransitionBatchCommand;
