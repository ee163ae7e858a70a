//! Feature slices of the Ledgerport API
//!
//! Each feature is a vertical slice with `commands/` (writes), `queries/`
//! (reads) and `routes.rs`. Commands and queries implement
//! `mediator::Request` and are registered in [`crate::cqrs::build_mediator`].
//!
//! - **imports**: statement upload handoff, batch supervision and row lifecycle

pub mod imports;
pub mod shared;

use axum::Router;

pub use imports::ImportsState;

/// Mount every feature under its path prefix
pub fn router(state: ImportsState) -> Router<()> {
    Router::new().nest("/imports", imports::imports_routes().with_state(state))
}
