//! HTTP API surface.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;
use tracing::error;
use valet_application::WorkflowOrchestrator;
use valet_core::event_bus::OperationEventBus;
use valet_core::operation::OperationStatus;
use valet_core::session::SessionRepository;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<WorkflowOrchestrator>,
    pub bus: Arc<OperationEventBus>,
    pub sessions: Arc<dyn SessionRepository>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(submit_query))
        .route("/api/sessions/:id/operations", get(session_operations))
        .route(
            "/api/sessions/:id/operations/stream",
            get(session_operations_stream),
        )
        .route("/api/sessions/:id/history", get(session_history))
        .route("/api/operations/:id/status", post(update_operation_status))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error responses stay generic; detail goes to logs only.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    attachment_text: Option<String>,
}

async fn submit_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            "query must not be empty".to_string(),
        ));
    }
    let outcome = state
        .orchestrator
        .submit(
            &request.query,
            request.session_id,
            request.attachment_text,
        )
        .await
        .map_err(|err| {
            error!(target: "valet::api", error = %err, "query submission failed");
            ApiError(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to process query".to_string(),
            )
        })?;
    Ok(Json(outcome))
}

async fn session_operations(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    Json(state.bus.records(&session_id))
}

/// SSE stream of operation events; the first event is always
/// `initial_state`. Dropped connections are pruned on the next publish.
async fn session_operations_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let (_subscriber, receiver) = state.bus.subscribe(&session_id);
    let stream =
        ReceiverStream::new(receiver).map(|event| Event::default().json_data(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .find_by_id(&session_id)
        .await
        .map_err(|err| {
            error!(target: "valet::api", error = %err, "session load failed");
            ApiError(
                StatusCode::INTERNAL_SERVER_ERROR,
                "failed to load session".to_string(),
            )
        })?
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, "session not found".to_string()))?;
    Ok(Json(json!({
        "session_id": session.id,
        "turns": session.turns,
    })))
}

#[derive(Deserialize)]
struct StatusUpdateRequest {
    status: OperationStatus,
}

/// Client-initiated status writes, mainly `cancel_requested`.
async fn update_operation_status(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .bus
        .update(&operation_id, Some(request.status), None)
        .map_err(|err| {
            if err.is_not_found() {
                ApiError(StatusCode::NOT_FOUND, "operation not found".to_string())
            } else {
                error!(target: "valet::api", error = %err, "status update failed");
                ApiError(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to update operation".to_string(),
                )
            }
        })?;
    Ok(Json(record))
}
