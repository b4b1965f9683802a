//! Session label generation via the completion endpoint.
//!
//! `generate_summary` asks for a one- or two-word label for the first user
//! prompt of a session, at zero temperature. The raw text is cleaned of
//! surrounding whitespace, quotes and punctuation before use.

use convo_types::llm::CompletionError;
use tracing::{Instrument, info_span};

use crate::completion::client::CompletionClient;

use super::prompts::summary_request;

/// Longest label kept, in characters.
const MAX_SUMMARY_CHARS: usize = 64;

#[tracing::instrument(name = "generate_summary", skip(client, prompt), fields(session_id = %session_id))]
pub async fn generate_summary<C: CompletionClient>(
    client: &C,
    session_id: &str,
    prompt: &str,
) -> Result<String, CompletionError> {
    let request = summary_request(session_id, prompt);

    let span = info_span!(
        "gen_ai.complete",
        gen_ai.system = client.name(),
        gen_ai.request.model = client.model(),
        gen_ai.request.max_tokens = request.settings.max_tokens,
        gen_ai.request.temperature = request.settings.temperature,
        gen_ai.operation.name = "summary",
    );
    let response = client.complete(&request).instrument(span).await?;

    clean_summary(&response.text).ok_or(CompletionError::EmptyResponse)
}

/// Normalize a raw label; `None` when nothing usable remains.
pub fn clean_summary(raw: &str) -> Option<String> {
    let label: String = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`')
        .chars()
        .filter(|c| !c.is_ascii_punctuation() || *c == '-')
        .collect();
    let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
    if label.is_empty() {
        return None;
    }
    Some(label.chars().take(MAX_SUMMARY_CHARS).collect())
}
