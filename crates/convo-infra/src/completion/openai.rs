//! OpenAI and Azure OpenAI completion client.
//!
//! One [`OpenAiCompletionClient`] type serves both backends through
//! `async_openai`'s `Config` trait: [`AzureConfig`] routes requests to a
//! deployment on an Azure resource, [`OpenAIConfig`] to a model on an
//! OpenAI-compatible base URL.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::{AzureConfig, Config, OpenAIConfig};
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use convo_core::completion::client::CompletionClient;
use convo_types::llm::{
    ChatRole, ChatTurnMessage, CompletionError, CompletionRequest, CompletionResponse,
};

/// Chat-completion client over an OpenAI-style HTTP API.
///
/// Does NOT derive Debug: the inner `async_openai::Client` holds the API key.
pub struct OpenAiCompletionClient<C: Config> {
    client: Client<C>,
    backend: &'static str,
    model: String,
}

impl OpenAiCompletionClient<AzureConfig> {
    /// Client for an Azure OpenAI deployment.
    ///
    /// `endpoint` is the resource URL (e.g. `https://my-resource.openai.azure.com`).
    pub fn azure(
        endpoint: &str,
        key: &SecretString,
        deployment: &str,
        api_version: &str,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let config = AzureConfig::new()
            .with_api_base(endpoint.trim_end_matches('/'))
            .with_api_version(api_version)
            .with_deployment_id(deployment)
            .with_api_key(key.expose_secret());

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client(timeout)?),
            backend: "azure_openai",
            model: deployment.to_string(),
        })
    }
}

impl OpenAiCompletionClient<OpenAIConfig> {
    /// Client for OpenAI or any OpenAI-compatible base URL.
    pub fn openai(
        base_url: &str,
        key: &SecretString,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let config = OpenAIConfig::new()
            .with_api_base(base_url.trim_end_matches('/'))
            .with_api_key(key.expose_secret());

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client(timeout)?),
            backend: "openai",
            model: model.to_string(),
        })
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, CompletionError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CompletionError::Transport(e.to_string()))
}

fn to_openai_message(message: &ChatTurnMessage) -> ChatCompletionRequestMessage {
    match message.role {
        ChatRole::System => ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
            content: ChatCompletionRequestSystemMessageContent::Text(message.content.clone()),
            name: None,
        }),
        ChatRole::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(message.content.clone()),
            name: None,
        }),
        ChatRole::Assistant => {
            #[allow(deprecated)]
            ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                    message.content.clone(),
                )),
                refusal: None,
                name: None,
                audio: None,
                tool_calls: None,
                function_call: None,
            })
        }
    }
}

/// Build a [`CreateChatCompletionRequest`] from a [`CompletionRequest`].
fn build_request(model: &str, request: &CompletionRequest) -> CreateChatCompletionRequest {
    let settings = &request.settings;
    #[allow(deprecated)]
    CreateChatCompletionRequest {
        model: model.to_string(),
        messages: request.messages.iter().map(to_openai_message).collect(),
        max_completion_tokens: Some(settings.max_tokens),
        temperature: Some(settings.temperature),
        top_p: Some(settings.top_p),
        frequency_penalty: Some(settings.frequency_penalty),
        presence_penalty: Some(settings.presence_penalty),
        user: request.user.clone(),
        ..Default::default()
    }
}

impl<C: Config + Send + Sync + 'static> CompletionClient for OpenAiCompletionClient<C> {
    fn name(&self) -> &str {
        self.backend
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        if request.messages.is_empty() {
            return Err(CompletionError::InvalidRequest(
                "completion request has no messages".to_string(),
            ));
        }
        let oai_request = build_request(&self.model, request);

        let response = self
            .client
            .chat()
            .create(oai_request)
            .await
            .map_err(map_openai_error)?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        let (prompt_tokens, completion_tokens) = response
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        debug!(
            backend = self.backend,
            prompt_tokens, completion_tokens, "Completion received"
        );

        Ok(CompletionResponse {
            text,
            prompt_tokens,
            completion_tokens,
        })
    }
}

/// Map an `async_openai::error::OpenAIError` to a [`CompletionError`].
fn map_openai_error(err: async_openai::error::OpenAIError) -> CompletionError {
    use async_openai::error::OpenAIError;

    match &err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "invalid_api_key"
                || code == "401"
                || error_type == "authentication_error"
                || api_err.message.contains("Incorrect API key")
                || api_err.message.contains("Access denied")
            {
                CompletionError::AuthenticationFailed
            } else if code == "rate_limit_exceeded"
                || code == "429"
                || error_type == "rate_limit_error"
                || error_type == "insufficient_quota"
            {
                CompletionError::RateLimited {
                    retry_after_ms: None,
                }
            } else if error_type == "invalid_request_error" {
                CompletionError::InvalidRequest(api_err.message.clone())
            } else {
                CompletionError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::Reqwest(reqwest_err) => match reqwest_err.status().map(|s| s.as_u16()) {
            Some(401 | 403) => CompletionError::AuthenticationFailed,
            Some(429) => CompletionError::RateLimited {
                retry_after_ms: None,
            },
            Some(_) => CompletionError::Provider {
                message: err.to_string(),
            },
            None => CompletionError::Transport(err.to_string()),
        },
        OpenAIError::JSONDeserialize(_, content) => CompletionError::Provider {
            message: format!("failed to parse response: {content}"),
        },
        OpenAIError::InvalidArgument(msg) => CompletionError::InvalidRequest(msg.clone()),
        _ => CompletionError::Provider {
            message: err.to_string(),
        },
    }
}
