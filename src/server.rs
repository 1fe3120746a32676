//! HTTP surface.
//!
//! Hosts the file-arrival trigger and the callables behind one JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/events/object-finalized` | Run the ingestion pipeline for `{name, bucket}` |
//! | `POST` | `/callable/chat` | One chat turn: `{prompt, sessionId?, clientMessageId?}` |
//! | `POST` | `/callable/create_session` | New session for the caller |
//! | `POST` | `/callable/list_sessions` | Caller's sessions |
//! | `POST` | `/callable/delete_session` | Delete `{sessionId}` |
//! | `GET`  | `/status/{user_id}` | Processing status of every file of a user |
//! | `GET`  | `/status/{user_id}/{file_name}` | Processing status of one file |
//!
//! Callables answer `200` with the `{success, message, data}` envelope even
//! when the call fails. The caller's identity is read from the configured
//! identity header (`x-user-id` by default); verifying it is the job of
//! whatever sits in front of this server.
//!
//! Pipeline runs are limited to `server.max_concurrent_runs` at once; extra
//! trigger requests wait for a permit. Shutting down (Ctrl-C) aborts runs
//! that are waiting on remote indexing and answers `503` to trigger requests
//! that have not started yet.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::ChatRequest;
use crate::config::Config;
use crate::models::{Envelope, ProcessingStatus, UploadEvent};
use crate::services::Services;
use crate::sessions;

#[derive(Clone)]
struct AppState {
    services: Services,
    identity_header: Arc<str>,
    runs: Arc<Semaphore>,
    shutdown: CancellationToken,
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    run_server_with_services(config, services).await
}

/// Serve prebuilt [`Services`]; used by custom binaries and tests that
/// substitute remote collaborators.
pub async fn run_server_with_services(config: &Config, services: Services) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let shutdown = CancellationToken::new();
    let app = router(config, services, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
            }
            shutdown.cancel();
        })
        .await?;

    Ok(())
}

pub fn router(config: &Config, services: Services, shutdown: CancellationToken) -> Router {
    let state = AppState {
        services,
        identity_header: Arc::from(config.server.identity_header.as_str()),
        runs: Arc::new(Semaphore::new(config.server.max_concurrent_runs)),
        shutdown,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/events/object-finalized", post(handle_object_finalized))
        .route("/callable/chat", post(handle_chat))
        .route("/callable/create_session", post(handle_create_session))
        .route("/callable/list_sessions", post(handle_list_sessions))
        .route("/callable/delete_session", post(handle_delete_session))
        .route("/status/{user_id}", get(handle_list_status))
        .route("/status/{user_id}/{file_name}", get(handle_get_status))
        .layer(cors)
        .with_state(state)
}

// ============ Errors ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn error(status: StatusCode, code: &'static str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code,
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        format!("{:#}", err),
    )
}

fn caller(state: &AppState, headers: &HeaderMap) -> Option<String> {
    headers
        .get(state.identity_header.as_ref())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ POST /events/object-finalized ============

async fn handle_object_finalized(
    State(state): State<AppState>,
    Json(event): Json<UploadEvent>,
) -> Result<Json<serde_json::Value>, AppError> {
    // Requests still queued for a permit when shutdown begins are refused.
    let permit = tokio::select! {
        biased;
        _ = state.shutdown.cancelled() => None,
        permit = state.runs.acquire() => permit.ok(),
    };
    let Some(_permit) = permit else {
        return Err(error(
            StatusCode::SERVICE_UNAVAILABLE,
            "unavailable",
            "server is shutting down",
        ));
    };

    let outcome = state
        .services
        .pipeline
        .run(&event, &state.shutdown)
        .await;
    Ok(Json(json!({ "result": outcome.to_string() })))
}

// ============ Callables ============

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ChatBody {
    prompt: Option<String>,
    session_id: Option<String>,
    client_message_id: Option<String>,
}

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Json<Envelope<String>> {
    let Some(user_id) = caller(&state, &headers) else {
        return Json(Envelope::failure("Unauthenticated request"));
    };
    let Some(prompt) = body.prompt else {
        return Json(Envelope::failure("No text prompt provided"));
    };

    let request =
        ChatRequest::new(prompt, body.session_id).with_client_message_id(body.client_message_id);
    Json(state.services.chat.respond(&user_id, &request).await)
}

async fn handle_create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Envelope<sessions::SessionRef>> {
    let Some(user_id) = caller(&state, &headers) else {
        return Json(Envelope::failure("Unauthorized"));
    };
    Json(sessions::create_session(state.services.repos.sessions.as_ref(), &user_id).await)
}

async fn handle_list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Envelope<Vec<crate::models::ChatSession>>> {
    let Some(user_id) = caller(&state, &headers) else {
        return Json(Envelope::failure("Unauthorized"));
    };
    Json(sessions::list_sessions(state.services.repos.sessions.as_ref(), &user_id).await)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DeleteSessionBody {
    session_id: Option<String>,
}

async fn handle_delete_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DeleteSessionBody>,
) -> Json<Envelope<sessions::SessionRef>> {
    let Some(user_id) = caller(&state, &headers) else {
        return Json(Envelope::failure("Unauthorized"));
    };
    let Some(session_id) = body.session_id.filter(|s| !s.is_empty()) else {
        return Json(Envelope::failure("Session ID is required"));
    };
    Json(
        sessions::delete_session(
            state.services.repos.sessions.as_ref(),
            &user_id,
            &session_id,
        )
        .await,
    )
}

// ============ GET /status ============

fn authorize_status(state: &AppState, headers: &HeaderMap, user_id: &str) -> Result<(), AppError> {
    match caller(state, headers) {
        None => Err(error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "missing caller identity",
        )),
        Some(caller) if caller != user_id => Err(error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "status belongs to another user",
        )),
        Some(_) => Ok(()),
    }
}

async fn handle_list_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<ProcessingStatus>>, AppError> {
    authorize_status(&state, &headers, &user_id)?;
    let statuses = state
        .services
        .repos
        .statuses
        .list_statuses(&user_id)
        .await
        .map_err(internal)?;
    Ok(Json(statuses))
}

async fn handle_get_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user_id, file_name)): Path<(String, String)>,
) -> Result<Json<ProcessingStatus>, AppError> {
    authorize_status(&state, &headers, &user_id)?;
    state
        .services
        .repos
        .statuses
        .get_status(&user_id, &file_name)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or_else(|| {
            error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("no status for {}", file_name),
            )
        })
}
