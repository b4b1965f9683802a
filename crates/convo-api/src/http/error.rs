//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use convo_core::conversation::service::ConversationError;
use convo_types::error::StoreError;
use convo_types::llm::CompletionError;

use super::response::{ApiErrorDetail, ApiResponse};

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Errors from the conversation service (store or completion).
    Conversation(ConversationError),
    /// Request body rejected before reaching the service.
    Validation(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<ConversationError> for AppError {
    fn from(e: ConversationError) -> Self {
        AppError::Conversation(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Conversation(ConversationError::Store(e))
    }
}

fn store_status(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::Validation { .. } => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        StoreError::Conflict { .. } => (StatusCode::CONFLICT, "CONFLICT"),
        StoreError::BatchAborted { .. } => (StatusCode::CONFLICT, "BATCH_ABORTED"),
        StoreError::Cancelled { .. } | StoreError::TimedOut { .. } => {
            (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT")
        }
        StoreError::MissingResource { .. }
        | StoreError::Transport { .. }
        | StoreError::Unauthorized { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, Option<serde_json::Value>) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None),
            AppError::Conversation(ConversationError::Store(e)) => {
                let (status, code) = store_status(e);
                (status, code, None)
            }
            AppError::Conversation(ConversationError::Completion { source, .. }) => match source {
                CompletionError::Cancelled | CompletionError::TimedOut { .. } => {
                    (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", None)
                }
                _ => (StatusCode::BAD_GATEWAY, "COMPLETION_ERROR", None),
            },
            AppError::Conversation(ConversationError::PersistCompletion {
                text,
                completion_tokens,
                source,
                ..
            }) => {
                let (status, code) = store_status(source);
                let details = json!({
                    "text": text,
                    "completionTokens": completion_tokens,
                });
                (status, code, Some(details))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, details) = self.parts();
        let message = match &self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Conversation(e) => e.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(code, error = %message, "Request failed");
        }

        let body = ApiResponse::error(ApiErrorDetail {
            code: code.to_string(),
            message,
            details,
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_store_errors_map_to_status() {
        assert_eq!(
            status_of(StoreError::validation("upsert_batch", "empty").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                StoreError::NotFound {
                    operation: "get_session",
                    partition_key: "s1".to_string(),
                    id: "s1".to_string(),
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                StoreError::BatchAborted {
                    operation: "execute_batch",
                    partition_key: "s1".to_string(),
                    operation_index: 1,
                    reason: "precondition failed".to_string(),
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                StoreError::TimedOut {
                    operation: "read_item",
                    partition_key: None,
                    timeout_ms: 10,
                }
                .into()
            ),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(StoreError::transport("read_item", None, "disk gone").into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_completion_failure_is_bad_gateway() {
        let err = AppError::from(ConversationError::Completion {
            session_id: "s1".to_string(),
            source: CompletionError::EmptyResponse,
        });
        assert_eq!(status_of(err), StatusCode::BAD_GATEWAY);

        let err = AppError::from(ConversationError::Completion {
            session_id: "s1".to_string(),
            source: CompletionError::TimedOut { timeout_ms: 50 },
        });
        assert_eq!(status_of(err), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_persist_failure_keeps_completion_text() {
        let err = AppError::from(ConversationError::PersistCompletion {
            session_id: "s1".to_string(),
            text: "Hello!".to_string(),
            completion_tokens: 3,
            source: StoreError::BatchAborted {
                operation: "execute_batch",
                partition_key: "s1".to_string(),
                operation_index: 0,
                reason: "conflict".to_string(),
            },
        });
        let (status, code, details) = err.parts();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "BATCH_ABORTED");
        assert_eq!(details.unwrap()["text"], "Hello!");
    }
}
