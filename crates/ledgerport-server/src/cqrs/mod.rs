pub use mediator::DefaultAsyncMediator;
use tokio_util::sync::CancellationToken;

use crate::features::imports::{commands, queries};
use crate::imports::ImportServices;

pub mod middleware;

pub type AppMediator = DefaultAsyncMediator;

/// Register every import command and query.
///
/// Each dispatched request runs under its own child of `shutdown`.
///
/// Must be called inside a multi-thread tokio runtime: the mediator builder
/// uses `block_in_place` while registering handlers.
pub fn build_mediator(services: ImportServices, shutdown: CancellationToken) -> AppMediator {
    DefaultAsyncMediator::builder()
        // Upload handoff
        .add_handler({
            let (services, shutdown) = (services.clone(), shutdown.clone());
            move |cmd| {
                let (services, cancel) = (services.clone(), shutdown.child_token());
                async move { commands::prepare_upload::handle(&services, cmd, &cancel).await }
            }
        })
        .add_handler({
            let (services, shutdown) = (services.clone(), shutdown.clone());
            move |cmd| {
                let (services, cancel) = (services.clone(), shutdown.child_token());
                async move { commands::confirm_upload::handle(&services, cmd, &cancel).await }
            }
        })
        // Batch supervision
        .add_handler({
            let (services, shutdown) = (services.clone(), shutdown.clone());
            move |cmd| {
                let (services, cancel) = (services.clone(), shutdown.child_token());
                async move { commands::transition_batch::handle(&services, cmd, &cancel).await }
            }
        })
        .add_handler({
            let (services, shutdown) = (services.clone(), shutdown.clone());
            move |cmd| {
                let (services, cancel) = (services.clone(), shutdown.child_token());
                async move { commands::retry_batch::handle(&services, cmd, &cancel).await }
            }
        })
        .add_handler({
            let (services, shutdown) = (services.clone(), shutdown.clone());
            move |query| {
                let (services, cancel) = (services.clone(), shutdown.child_token());
                async move { queries::get_batch::handle(&services, query, &cancel).await }
            }
        })
        // Rows
        .add_handler({
            let (services, shutdown) = (services.clone(), shutdown.clone());
            move |cmd| {
                let (services, cancel) = (services.clone(), shutdown.child_token());
                async move { commands::stage_rows::handle(&services, cmd, &cancel).await }
            }
        })
        .add_handler({
            let (services, shutdown) = (services.clone(), shutdown.clone());
            move |cmd| {
                let (services, cancel) = (services.clone(), shutdown.child_token());
                async move { commands::advance_row::handle(&services, cmd, &cancel).await }
            }
        })
        .add_handler({
            let (services, shutdown) = (services.clone(), shutdown.clone());
            move |query| {
                let (services, cancel) = (services.clone(), shutdown.child_token());
                async move { queries::get_row::handle(&services, query, &cancel).await }
            }
        })
        .build()
}
