//! Configuration types for Convo.
//!
//! `AppConfig` represents the `config.toml` in the data directory. The seven
//! connection parameters (four for the document store, three for the
//! completion endpoint) are required; everything else has a default.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub conversation: ConversationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl AppConfig {
    /// Reject absent or empty connection parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.completion.validate()
    }
}

/// Document store connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub key: Option<SecretString>,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub container_name: String,
    /// Maximum items requested per query page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Deadline applied to every store operation.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            key: None,
            database_name: String::new(),
            container_name: String::new(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("store.endpoint", &self.endpoint)?;
        require_secret("store.key", self.key.as_ref())?;
        require("store.database_name", &self.database_name)?;
        require("store.container_name", &self.container_name)?;
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "store.page_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Which flavour of OpenAI-compatible endpoint to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    #[default]
    Azure,
    OpenAi,
}

impl std::str::FromStr for CompletionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "azure" => Ok(CompletionKind::Azure),
            "openai" => Ok(CompletionKind::OpenAi),
            other => Err(format!("unknown completion kind: '{other}'")),
        }
    }
}

/// Completion endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub key: Option<SecretString>,
    /// Azure deployment name, or the model name for plain OpenAI.
    #[serde(default)]
    pub deployment: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub kind: CompletionKind,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            key: None,
            deployment: String::new(),
            api_version: default_api_version(),
            kind: CompletionKind::default(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl CompletionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("completion.endpoint", &self.endpoint)?;
        require_secret("completion.key", self.key.as_ref())?;
        require("completion.deployment", &self.deployment)
    }
}

/// Tuning for the per-turn workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationConfig {
    /// Number of prior messages sent to the model with each turn.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_true")]
    pub summarize_first_exchange: bool,
    /// Add prompt tokens to the assistant message and the session total.
    #[serde(default)]
    pub meter_prompt_tokens: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            summarize_first_exchange: true,
            meter_prompt_tokens: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(field));
    }
    Ok(())
}

fn require_secret(field: &'static str, value: Option<&SecretString>) -> Result<(), ConfigError> {
    match value {
        Some(secret) if !secret.expose_secret().trim().is_empty() => Ok(()),
        _ => Err(ConfigError::MissingField(field)),
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_history_window() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_api_version() -> String {
    "2024-10-21".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[store]
endpoint = "/var/lib/convo"
key = "account-key"
database_name = "chat"
container_name = "conversations"

[completion]
endpoint = "https://example.openai.azure.com"
key = "openai-key"
deployment = "gpt-4o"
"#;

    #[test]
    fn test_defaults_applied() {
        let config: AppConfig = toml::from_str(FULL).unwrap();
        assert_eq!(config.store.page_size, 100);
        assert_eq!(config.store.request_timeout_secs, 30);
        assert_eq!(config.completion.api_version, "2024-10-21");
        assert_eq!(config.completion.kind, CompletionKind::Azure);
        assert_eq!(config.conversation.history_window, 10);
        assert!(config.conversation.summarize_first_exchange);
        assert!(!config.conversation.meter_prompt_tokens);
        assert_eq!(config.server.port, 3000);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_field_rejected() {
        let config: AppConfig = toml::from_str("").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("store.endpoint")));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let text = FULL.replace("key = \"openai-key\"", "key = \"  \"");
        let config: AppConfig = toml::from_str(&text).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField("completion.key"))
        ));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config: AppConfig = toml::from_str(FULL).unwrap();
        config.store.page_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "store.page_size", .. })
        ));
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let config: AppConfig = toml::from_str(FULL).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("account-key"));
        assert!(!debug.contains("openai-key"));
    }

    #[test]
    fn test_completion_kind_parse() {
        assert_eq!("OpenAI".parse::<CompletionKind>().unwrap(), CompletionKind::OpenAi);
        assert!("bedrock".parse::<CompletionKind>().is_err());
    }
}
