//! Completion client implementations.
//!
//! Concrete implementations of the [`CompletionClient`] trait defined in
//! `convo-core`, plus a factory ([`create_completion_client`]) that picks the
//! backend from a [`CompletionConfig`].
//!
//! [`CompletionClient`]: convo_core::completion::client::CompletionClient

pub mod openai;

use std::time::Duration;

use convo_core::completion::box_client::BoxCompletionClient;
use convo_types::config::{CompletionConfig, CompletionKind};
use convo_types::llm::CompletionError;

use self::openai::OpenAiCompletionClient;

/// Create a [`BoxCompletionClient`] from a [`CompletionConfig`].
///
/// # Errors
///
/// `AuthenticationFailed` if no key is configured, `Transport` if the HTTP
/// client cannot be built.
pub fn create_completion_client(
    config: &CompletionConfig,
) -> Result<BoxCompletionClient, CompletionError> {
    let key = config.key.as_ref().ok_or(CompletionError::AuthenticationFailed)?;
    let timeout = Duration::from_secs(config.request_timeout_secs);

    match config.kind {
        CompletionKind::Azure => {
            let client = OpenAiCompletionClient::azure(
                &config.endpoint,
                key,
                &config.deployment,
                &config.api_version,
                timeout,
            )?;
            Ok(BoxCompletionClient::new(client))
        }
        CompletionKind::OpenAi => {
            let client =
                OpenAiCompletionClient::openai(&config.endpoint, key, &config.deployment, timeout)?;
            Ok(BoxCompletionClient::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convo_core::completion::client::CompletionClient;
    use secrecy::SecretString;

    fn config(kind: CompletionKind) -> CompletionConfig {
        CompletionConfig {
            endpoint: "https://example.openai.azure.com".to_string(),
            key: Some(SecretString::from("test-key")),
            deployment: "gpt-4o".to_string(),
            kind,
            ..CompletionConfig::default()
        }
    }

    #[test]
    fn test_factory_selects_azure() {
        let client = create_completion_client(&config(CompletionKind::Azure)).unwrap();
        assert_eq!(client.name(), "azure_openai");
        assert_eq!(client.model(), "gpt-4o");
    }

    #[test]
    fn test_factory_selects_openai() {
        let client = create_completion_client(&config(CompletionKind::OpenAi)).unwrap();
        assert_eq!(client.name(), "openai");
    }

    #[test]
    fn test_factory_requires_key() {
        let mut cfg = config(CompletionKind::Azure);
        cfg.key = None;
        assert!(matches!(
            create_completion_client(&cfg),
            Err(CompletionError::AuthenticationFailed)
        ));
    }
}
