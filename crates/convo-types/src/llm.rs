//! Completion request/response types for Convo.
//!
//! These model the narrow contract with the hosted completion endpoint:
//! role-tagged messages plus sampling settings in, generated text plus
//! token usage out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::chat::Sender;

/// Role of a message in a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for ChatRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(ChatRole::System),
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(format!("invalid chat role: '{other}'")),
        }
    }
}

impl From<Sender> for ChatRole {
    fn from(sender: Sender) -> Self {
        match sender {
            Sender::User => ChatRole::User,
            Sender::Assistant => ChatRole::Assistant,
        }
    }
}

/// A single role-tagged message sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurnMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurnMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling configuration for one completion call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Nucleus sampling factor.
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl SamplingSettings {
    /// Settings used for conversational replies.
    pub const fn chat() -> Self {
        Self {
            max_tokens: 4000,
            temperature: 0.3,
            top_p: 0.5,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }

    /// Settings used for one-line session summaries.
    pub const fn summary() -> Self {
        Self {
            max_tokens: 200,
            temperature: 0.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Request to the completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatTurnMessage>,
    pub settings: SamplingSettings,
    /// End-user identifier forwarded for abuse monitoring (the session id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Generated text and token usage for one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Errors from completion endpoint calls.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("completion returned no choices")]
    EmptyResponse,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("completion call cancelled")]
    Cancelled,

    #[error("completion call timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}
