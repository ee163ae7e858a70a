//! HTTP tests for the `/api/v1/imports` routes
//!
//! The full router (compression, tracing and CORS layers included) runs over
//! in-memory gateways. The database pool is lazy and never touched because
//! `/health` is not exercised here.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use ledgerport_server::{
    api::{self, AppState},
    config::CorsConfig,
    features::ImportsState,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

mod common;

use common::{TestImports, UPPERCASE_SHA256};

// ============================================================================
// Helper Functions
// ============================================================================

fn create_test_app(imports: &TestImports, shutdown: CancellationToken) -> Router {
    let db = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/ledgerport_test")
        .unwrap();
    let state = AppState {
        db,
        imports: ImportsState::new(imports.services.clone(), shutdown),
    };
    let cors = CorsConfig {
        allowed_origins: vec!["http://localhost:3000".to_string()],
        allow_credentials: true,
    };
    api::create_router(state, &cors)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().uri(uri).method(method);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, json)
}

async fn prepare(app: &Router, account_id: Uuid, file_size: i64) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/api/v1/imports/prepare",
        Some(json!({
            "accountId": account_id,
            "fileName": "statement.ofx",
            "contentType": "application/x-ofx",
            "fileSize": file_size
        })),
    )
    .await
}

fn batch_id_of(body: &Value) -> Uuid {
    body["data"]["importBatchId"]
        .as_str()
        .and_then(|id| id.parse().ok())
        .unwrap_or_else(|| panic!("no importBatchId in {body}"))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_prepare_and_confirm_over_http() {
    let imports = TestImports::new();
    let app = create_test_app(&imports, CancellationToken::new());

    let (status, body) = prepare(&app, imports.account_id, 5000).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert!(body["data"]["uploadUrl"].as_str().is_some());
    assert!(body["data"]["expiresAt"].as_str().is_some());
    let batch_id = batch_id_of(&body);

    imports.upload(batch_id, 5000);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/v1/imports/confirm",
        Some(json!({ "importBatchId": batch_id, "sha256Hash": UPPERCASE_SHA256 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "FileUploaded");
    assert_eq!(body["data"]["sizeBytes"], 5000);
    assert_eq!(body["data"]["sha256"], UPPERCASE_SHA256.to_lowercase());

    let (status, body) = send(&app, "GET", &format!("/api/v1/imports/{batch_id}"), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["id"], batch_id.to_string());
    assert_eq!(body["data"]["status"], "FileUploaded");
    assert_eq!(body["data"]["allowedNext"], json!(["Queued", "Canceled", "Duplicate"]));
    assert_eq!(body["data"]["file"]["extension"], ".ofx");
    assert_eq!(body["data"]["rowCounts"], json!({}));
}

#[tokio::test]
async fn test_prepare_validation_error_envelope() {
    let imports = TestImports::new();
    let app = create_test_app(&imports, CancellationToken::new());

    let (status, body) = prepare(&app, imports.account_id, 0).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unknown_batch_is_404() {
    let imports = TestImports::new();
    let app = create_test_app(&imports, CancellationToken::new());
    let batch_id = Uuid::now_v7();

    let (status, body) = send(&app, "GET", &format!("/api/v1/imports/{batch_id}"), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(
        body["error"]["message"],
        format!("Import batch with ID {} was not found.", batch_id)
    );
}

#[tokio::test]
async fn test_size_mismatch_is_400_and_batch_fails() {
    let imports = TestImports::new();
    let app = create_test_app(&imports, CancellationToken::new());
    let (_, body) = prepare(&app, imports.account_id, 5000).await;
    let batch_id = batch_id_of(&body);
    imports.upload(batch_id, 10);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/v1/imports/confirm",
        Some(json!({ "importBatchId": batch_id, "sha256Hash": UPPERCASE_SHA256 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VERIFICATION_FAILED");
    assert_eq!(
        body["error"]["message"],
        "File size mismatch. Expected: 5000 bytes, Actual: 10 bytes."
    );

    let (_, body) = send(&app, "GET", &format!("/api/v1/imports/{batch_id}"), None).await;
    assert_eq!(body["data"]["status"], "Failed");
    assert_eq!(body["data"]["allowedNext"], json!([]));
}

#[tokio::test]
async fn test_illegal_transition_is_409_with_details() {
    let imports = TestImports::new();
    let app = create_test_app(&imports, CancellationToken::new());
    let (_, body) = prepare(&app, imports.account_id, 5000).await;
    let batch_id = batch_id_of(&body);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/imports/{batch_id}/transition"),
        Some(json!({ "target": "Processing", "expectedVersion": 0 })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ILLEGAL_TRANSITION");
    assert_eq!(body["error"]["details"]["from"], "PendingFileUpload");
    assert_eq!(body["error"]["details"]["to"], "Processing");
}

#[tokio::test]
async fn test_stale_version_is_409() {
    let imports = TestImports::new();
    let app = create_test_app(&imports, CancellationToken::new());
    let (_, body) = prepare(&app, imports.account_id, 5000).await;
    let batch_id = batch_id_of(&body);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/imports/{batch_id}/retry"),
        Some(json!({ "expectedVersion": 7 })),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONCURRENCY_CONFLICT");
}

#[tokio::test]
async fn test_stage_and_advance_rows_over_http() {
    let imports = TestImports::new();
    let app = create_test_app(&imports, CancellationToken::new());
    let (_, body) = prepare(&app, imports.account_id, 5000).await;
    let batch_id = batch_id_of(&body);
    imports.upload(batch_id, 5000);
    let (_, body) = send(
        &app,
        "PUT",
        "/api/v1/imports/confirm",
        Some(json!({ "importBatchId": batch_id, "sha256Hash": UPPERCASE_SHA256 })),
    )
    .await;
    let mut version = body["data"]["version"].as_i64().unwrap();

    for target in ["Queued", "Processing"] {
        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/imports/{batch_id}/transition"),
            Some(json!({ "target": target, "expectedVersion": version })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        version = body["data"]["version"].as_i64().unwrap();
    }

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/imports/{batch_id}/rows"),
        Some(json!({
            "records": [
                { "lineNumber": 1, "payload": { "raw": "2025-03-01;-4.20;Bakery" }, "amountText": "-4.20", "date": "2025-03-01" },
                { "lineNumber": 1, "payload": { "raw": "duplicate line" } }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["meta"], json!({ "staged": 1, "rejected": 1 }));
    let row_id = body["data"]["staged"][0]["rowId"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/imports/rows/{row_id}/advance"),
        Some(json!({ "action": "reject", "errorCode": "BAD_AMOUNT", "errorMessage": "Amount is not numeric" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "Rejected");
    assert_eq!(body["data"]["errorCode"], "BAD_AMOUNT");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/imports/rows/{row_id}/advance"),
        Some(json!({ "action": "skip" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "TERMINAL_STATUS");
    assert_eq!(body["error"]["details"]["status"], "Rejected");

    let (status, body) = send(&app, "GET", &format!("/api/v1/imports/rows/{row_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["raw"]["amountText"], "-4.20");

    let (_, body) = send(&app, "GET", &format!("/api/v1/imports/{batch_id}"), None).await;
    assert_eq!(body["data"]["rowCounts"], json!({ "Rejected": 1 }));
}

#[tokio::test]
async fn test_requests_after_shutdown_are_503() {
    let imports = TestImports::new();
    let shutdown = CancellationToken::new();
    let app = create_test_app(&imports, shutdown.clone());
    shutdown.cancel();

    let (status, body) = prepare(&app, imports.account_id, 5000).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "CANCELLED");
    assert_eq!(imports.repository.batch_count(), 0);
}
