//! Instructions and request builders for completion calls.

use convo_types::chat::Message;
use convo_types::llm::{ChatTurnMessage, CompletionRequest, SamplingSettings};

/// System instruction sent with every conversational turn.
pub const SYSTEM_PROMPT: &str = "You are an AI assistant that helps people find information. \
Provide concise answers that are polite and professional.";

/// System instruction for the one-line session label.
pub const SUMMARY_PROMPT: &str = "Summarize this prompt in one or two words to use as a label \
in a button on a web page. Do not use any punctuation.";

/// Build the request for one turn.
///
/// Only the last `history_window` messages of `history` are sent, followed
/// by the new user text. The session id is forwarded as the end-user id.
pub fn turn_request(
    session_id: &str,
    history: &[Message],
    history_window: usize,
    user_text: &str,
) -> CompletionRequest {
    let start = history.len().saturating_sub(history_window);
    let mut messages = Vec::with_capacity(history.len() - start + 2);
    messages.push(ChatTurnMessage::system(SYSTEM_PROMPT));
    messages.extend(history[start..].iter().map(|m| ChatTurnMessage {
        role: m.sender.into(),
        content: m.text.clone(),
    }));
    messages.push(ChatTurnMessage::user(user_text));

    CompletionRequest {
        messages,
        settings: SamplingSettings::chat(),
        user: Some(session_id.to_string()),
    }
}

/// Build the request that labels a session from its first user prompt.
pub fn summary_request(session_id: &str, prompt: &str) -> CompletionRequest {
    CompletionRequest {
        messages: vec![
            ChatTurnMessage::system(SUMMARY_PROMPT),
            ChatTurnMessage::user(prompt),
        ],
        settings: SamplingSettings::summary(),
        user: Some(session_id.to_string()),
    }
}
