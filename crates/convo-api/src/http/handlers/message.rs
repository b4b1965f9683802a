//! Message HTTP handlers.
//!
//! Endpoints:
//! - GET  /api/v1/sessions/{id}/messages - Transcript of a session
//! - POST /api/v1/sessions/{id}/messages - Run one conversation turn

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;

use convo_core::conversation::service::TurnOutcome;
use convo_types::chat::Message;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

/// Body of `POST /sessions/{id}/messages`.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// GET /api/v1/sessions/{id}/messages - Messages in timestamp order.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<Message>>>, AppError> {
    let timer = RequestTimer::start();
    let ctx = state.call_context();

    state.service.store().get_session(&session_id, &ctx).await?;
    let messages = state.service.store().list_messages(&session_id, &ctx).await?;

    let resp = timer
        .respond(messages)
        .with_link("self", &format!("/api/v1/sessions/{session_id}/messages"))
        .with_link("session", &format!("/api/v1/sessions/{session_id}"));
    Ok(Json(resp))
}

/// POST /api/v1/sessions/{id}/messages - Send a user message and get the reply.
pub async fn send_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<TurnOutcome>>), AppError> {
    let Json(body) = body?;
    let timer = RequestTimer::start();
    let ctx = state.call_context();

    let outcome = state
        .service
        .send_message(&session_id, &body.text, &ctx)
        .await?;

    let resp = timer
        .respond(outcome)
        .with_link("messages", &format!("/api/v1/sessions/{session_id}/messages"));
    Ok((StatusCode::CREATED, Json(resp)))
}
