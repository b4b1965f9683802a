//! Application state wiring the conversation service together.
//!
//! AppState holds the concrete service instance used by both CLI and REST API.
//! The service is generic over the document store and completion client;
//! AppState pins it to the SQLite store and the boxed completion client.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use convo_core::completion::box_client::BoxCompletionClient;
use convo_core::conversation::service::ConversationService;
use convo_core::store::context::CallContext;
use convo_core::store::conversation::{ConversationStore, StoreOptions};
use convo_infra::completion::create_completion_client;
use convo_infra::config::{load_config, resolve_data_dir};
use convo_infra::sqlite::store::SqliteDocumentStore;
use convo_types::config::AppConfig;

/// Concrete type alias for the service generics pinned to infra implementations.
pub type ConcreteConversationService = ConversationService<SqliteDocumentStore, BoxCompletionClient>;

/// Shared application state.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConcreteConversationService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Resolve the data directory and load its configuration.
    pub async fn load() -> anyhow::Result<(PathBuf, AppConfig)> {
        let data_dir = resolve_data_dir();
        let config = load_config(&data_dir)
            .await
            .with_context(|| format!("Failed to load configuration from {}", data_dir.display()))?;
        Ok((data_dir, config))
    }

    /// Validate configuration, connect to the store and build the completion client.
    ///
    /// Missing connection settings and an unprovisioned store are fatal.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        config.validate().context("Invalid configuration")?;

        let documents = SqliteDocumentStore::connect(&config.store)
            .await
            .context("Failed to connect to the document store (run `convo init` first?)")?;
        let store = ConversationStore::new(documents, store_options(&config));

        let completion = create_completion_client(&config.completion)
            .context("Failed to create the completion client")?;

        let service = ConversationService::new(store, completion, config.conversation.clone());
        Ok(Self::new(service, config))
    }

    pub fn new(service: ConcreteConversationService, config: AppConfig) -> Self {
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
        }
    }

    /// Fresh cancellation context for one command or request.
    pub fn call_context(&self) -> CallContext {
        CallContext::new()
    }
}

/// Store paging and deadline settings taken from configuration.
pub fn store_options(config: &AppConfig) -> StoreOptions {
    StoreOptions {
        page_size: config.store.page_size,
        timeout: std::time::Duration::from_secs(config.store.request_timeout_secs),
    }
}
