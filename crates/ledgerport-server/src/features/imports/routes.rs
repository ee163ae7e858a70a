use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    commands::{
        AdvanceRowCommand, ConfirmUploadCommand, PrepareUploadCommand, RetryBatchCommand,
        RowAdvance, StageRowsCommand, TransitionBatchCommand,
    },
    queries::{GetBatchQuery, GetRowQuery},
};
use crate::api::response::ApiResponse;
use crate::error::ImportError;
use crate::imports::ImportServices;

/// State for the import routes.
///
/// Each request runs under a child of `shutdown`, so in-flight gateway
/// calls stop when the server begins shutting down.
#[derive(Clone)]
pub struct ImportsState {
    pub services: ImportServices,
    pub shutdown: CancellationToken,
}

impl ImportsState {
    pub fn new(services: ImportServices, shutdown: CancellationToken) -> Self {
        Self { services, shutdown }
    }

    fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

pub fn imports_routes() -> Router<ImportsState> {
    Router::new()
        .route("/prepare", post(prepare_upload))
        .route("/confirm", put(confirm_upload))
        .route("/rows/:row_id", get(get_row))
        .route("/rows/:row_id/advance", post(advance_row))
        .route("/:batch_id", get(get_batch))
        .route("/:batch_id/transition", post(transition_batch))
        .route("/:batch_id/retry", post(retry_batch))
        .route("/:batch_id/rows", post(stage_rows))
}

#[tracing::instrument(skip(state, command), fields(account_id = %command.account_id))]
async fn prepare_upload(
    State(state): State<ImportsState>,
    Json(command): Json<PrepareUploadCommand>,
) -> Result<Response, ImportError> {
    let response =
        super::commands::prepare_upload::handle(&state.services, command, &state.request_token())
            .await?;

    tracing::info!(batch_id = %response.import_batch_id, "Upload prepared via API");

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state, command), fields(batch_id = %command.import_batch_id))]
async fn confirm_upload(
    State(state): State<ImportsState>,
    Json(command): Json<ConfirmUploadCommand>,
) -> Result<Response, ImportError> {
    let response =
        super::commands::confirm_upload::handle(&state.services, command, &state.request_token())
            .await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state))]
async fn get_batch(
    State(state): State<ImportsState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Response, ImportError> {
    let query = GetBatchQuery { batch_id };
    let response =
        super::queries::get_batch::handle(&state.services, query, &state.request_token()).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state, command), fields(target = %command.target))]
async fn transition_batch(
    State(state): State<ImportsState>,
    Path(batch_id): Path<Uuid>,
    Json(mut command): Json<TransitionBatchCommand>,
) -> Result<Response, ImportError> {
    command.batch_id = batch_id;

    let response =
        super::commands::transition_batch::handle(&state.services, command, &state.request_token())
            .await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state, command))]
async fn retry_batch(
    State(state): State<ImportsState>,
    Path(batch_id): Path<Uuid>,
    Json(mut command): Json<RetryBatchCommand>,
) -> Result<Response, ImportError> {
    command.batch_id = batch_id;

    let response =
        super::commands::retry_batch::handle(&state.services, command, &state.request_token())
            .await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state, command), fields(records = command.records.len()))]
async fn stage_rows(
    State(state): State<ImportsState>,
    Path(batch_id): Path<Uuid>,
    Json(mut command): Json<StageRowsCommand>,
) -> Result<Response, ImportError> {
    command.batch_id = batch_id;

    let response =
        super::commands::stage_rows::handle(&state.services, command, &state.request_token())
            .await?;

    let meta = serde_json::json!({
        "staged": response.staged.len(),
        "rejected": response.rejected.len(),
    });

    Ok((StatusCode::CREATED, Json(ApiResponse::success_with_meta(response, meta))).into_response())
}

#[tracing::instrument(skip(state))]
async fn get_row(
    State(state): State<ImportsState>,
    Path(row_id): Path<Uuid>,
) -> Result<Response, ImportError> {
    let query = GetRowQuery { row_id };
    let response =
        super::queries::get_row::handle(&state.services, query, &state.request_token()).await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}

#[tracing::instrument(skip(state, advance))]
async fn advance_row(
    State(state): State<ImportsState>,
    Path(row_id): Path<Uuid>,
    Json(advance): Json<RowAdvance>,
) -> Result<Response, ImportError> {
    let command = AdvanceRowCommand { row_id, advance };

    let response =
        super::commands::advance_row::handle(&state.services, command, &state.request_token())
            .await?;

    Ok((StatusCode::OK, Json(ApiResponse::success(response))).into_response())
}
