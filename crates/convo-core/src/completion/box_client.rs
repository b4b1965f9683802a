//! BoxCompletionClient -- object-safe dynamic dispatch wrapper for CompletionClient.
//!
//! 1. `CompletionClientDyn` is an object-safe mirror with boxed futures
//! 2. Blanket impl of `CompletionClientDyn` for all `T: CompletionClient`
//! 3. `BoxCompletionClient` wraps `Box<dyn CompletionClientDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use convo_types::llm::{CompletionError, CompletionRequest, CompletionResponse};

use super::client::CompletionClient;

/// Object-safe version of [`CompletionClient`] with boxed futures.
pub trait CompletionClientDyn: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, CompletionError>> + Send + 'a>>;
}

impl<T: CompletionClient> CompletionClientDyn for T {
    fn name(&self) -> &str {
        CompletionClient::name(self)
    }

    fn model(&self) -> &str {
        CompletionClient::model(self)
    }

    fn complete_boxed<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<CompletionResponse, CompletionError>> + Send + 'a>> {
        Box::pin(self.complete(request))
    }
}

/// Type-erased completion client for runtime backend selection
/// (Azure OpenAI vs OpenAI).
pub struct BoxCompletionClient {
    inner: Box<dyn CompletionClientDyn + Send + Sync>,
}

impl BoxCompletionClient {
    pub fn new<T: CompletionClient + 'static>(client: T) -> Self {
        Self {
            inner: Box::new(client),
        }
    }
}

impl CompletionClient for BoxCompletionClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        self.inner.complete_boxed(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Scripted, ScriptedCompletionClient};
    use convo_types::llm::{ChatTurnMessage, SamplingSettings};

    #[tokio::test]
    async fn test_box_delegates_to_inner() {
        let boxed = BoxCompletionClient::new(ScriptedCompletionClient::new([Scripted::reply(
            "Hello!", 3,
        )]));
        assert_eq!(CompletionClient::name(&boxed), "scripted");
        assert_eq!(CompletionClient::model(&boxed), "scripted-model");

        let request = CompletionRequest {
            messages: vec![ChatTurnMessage::user("hi")],
            settings: SamplingSettings::chat(),
            user: None,
        };
        let response = boxed.complete(&request).await.unwrap();
        assert_eq!(response.text, "Hello!");
        assert_eq!(response.completion_tokens, 3);
    }
}
