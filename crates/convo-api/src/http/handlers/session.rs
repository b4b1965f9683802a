//! Session HTTP handlers.
//!
//! Endpoints:
//! - GET    /api/v1/sessions                - List every session
//! - POST   /api/v1/sessions                - Start a session
//! - GET    /api/v1/sessions/{id}           - Get a single session
//! - PUT    /api/v1/sessions/{id}           - Rename a session
//! - DELETE /api/v1/sessions/{id}           - Delete a session and its messages
//! - POST   /api/v1/sessions/{id}/summarize - Regenerate the session label

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use convo_core::store::conversation::DeleteReport;
use convo_types::chat::Session;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Body of `POST /sessions`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of `PUT /sessions/{id}`.
#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub name: String,
}

fn session_links(resp: ApiResponse<Session>) -> ApiResponse<Session> {
    let id = resp
        .data
        .as_ref()
        .map(|s| s.id.clone())
        .unwrap_or_default();
    resp.with_link("self", &format!("/api/v1/sessions/{id}"))
        .with_link("messages", &format!("/api/v1/sessions/{id}/messages"))
}

/// GET /api/v1/sessions - List every session across all partitions.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Session>>>, AppError> {
    let timer = RequestTimer::start();
    let ctx = state.call_context();

    let sessions = state.service.store().list_sessions(&ctx).await?;

    let resp = timer.respond(sessions).with_link("self", "/api/v1/sessions");
    Ok(Json(resp))
}

/// POST /api/v1/sessions - Start a new session.
pub async fn create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<Session>>), AppError> {
    let timer = RequestTimer::start();
    let ctx = state.call_context();
    let request = body.map(|Json(b)| b).unwrap_or_default();

    let session = state.service.start_session(request.name, &ctx).await?;

    Ok((StatusCode::CREATED, Json(session_links(timer.respond(session)))))
}

/// GET /api/v1/sessions/{id} - Get a session by ID.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let timer = RequestTimer::start();
    let ctx = state.call_context();

    let session = state.service.store().get_session(&session_id, &ctx).await?;

    Ok(Json(session_links(timer.respond(session))))
}

/// PUT /api/v1/sessions/{id} - Rename a session.
pub async fn rename_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<RenameSessionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let Json(body) = body?;
    let timer = RequestTimer::start();
    let ctx = state.call_context();

    let session = state
        .service
        .rename_session(&session_id, &body.name, &ctx)
        .await?;

    Ok(Json(session_links(timer.respond(session))))
}

/// DELETE /api/v1/sessions/{id} - Delete a session and all of its messages.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<DeleteReport>>, AppError> {
    let timer = RequestTimer::start();
    let ctx = state.call_context();

    // Deleting an unknown session is a 404, not an empty success.
    state.service.store().get_session(&session_id, &ctx).await?;
    let report = state.service.delete_session(&session_id, &ctx).await?;

    Ok(Json(timer.respond(report)))
}

/// POST /api/v1/sessions/{id}/summarize - Regenerate the session label.
pub async fn summarize_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<Session>>, AppError> {
    let timer = RequestTimer::start();
    let ctx = state.call_context();

    let session = state.service.summarize_session(&session_id, &ctx).await?;

    Ok(Json(session_links(timer.respond(session))))
}
