pub mod get_batch;
pub mod get_row;

pub use get_batch::{GetBatchQuery, GetBatchResponse};
pub use get_row::GetRowQuery;
