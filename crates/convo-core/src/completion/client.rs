//! CompletionClient trait definition.

use convo_types::llm::{CompletionError, CompletionRequest, CompletionResponse};

/// Port to a hosted chat-completion endpoint.
///
/// One request/response call: role-tagged messages plus sampling settings
/// in, generated text plus token usage out. Implementations live in
/// convo-infra (e.g., `OpenAiCompletionClient`). Uses native async fn in
/// traits (RPITIT, Rust 2024 edition).
pub trait CompletionClient: Send + Sync {
    /// Backend name recorded on tracing spans (e.g., "azure_openai").
    fn name(&self) -> &str;

    /// Deployment or model the requests are sent to.
    fn model(&self) -> &str;

    /// Send a completion request and receive the full response.
    ///
    /// Returns `EmptyResponse` when the endpoint produced no choices.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, CompletionError>> + Send;
}
