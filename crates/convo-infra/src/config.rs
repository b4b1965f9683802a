//! Configuration loader for Convo.
//!
//! Reads `config.toml` from the data directory (`~/.convo/` by default) into
//! an [`AppConfig`], then applies `CONVO_*` environment overrides on top.
//! Unlike tuning knobs, connection parameters are required: callers run
//! [`AppConfig::validate`] on the result before building any client.

use std::path::{Path, PathBuf};

use convo_types::config::{AppConfig, CompletionKind};
use convo_types::error::ConfigError;
use secrecy::SecretString;

/// Environment variable naming the data directory.
pub const DATA_DIR_ENV: &str = "CONVO_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `CONVO_DATA_DIR` environment variable
/// 2. `~/.convo/`
/// 3. `.convo` relative to the working directory
pub fn resolve_data_dir() -> PathBuf {
    resolve_data_dir_with(|name| std::env::var(name).ok())
}

fn resolve_data_dir_with(lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = lookup(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".convo"))
        .unwrap_or_else(|| PathBuf::from(".convo"))
}

/// Load configuration from `{data_dir}/config.toml` plus the process environment.
///
/// A missing file yields the defaults (the environment may still supply
/// everything). An unreadable or malformed file is an error: silently
/// falling back would point the service at the wrong store.
pub async fn load_config(data_dir: &Path) -> Result<AppConfig, ConfigError> {
    let config_path = data_dir.join("config.toml");

    let mut config = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => parse_config(&config_path, &content)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                "No config.toml found at {}, using defaults",
                config_path.display()
            );
            AppConfig::default()
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: config_path.display().to_string(),
                source,
            });
        }
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

fn parse_config(path: &Path, content: &str) -> Result<AppConfig, ConfigError> {
    toml::from_str::<AppConfig>(content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// Overlay `CONVO_*` variables onto `config`. Empty values are ignored.
pub fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = var("CONVO_STORE_ENDPOINT") {
        config.store.endpoint = v;
    }
    if let Some(v) = var("CONVO_STORE_KEY") {
        config.store.key = Some(SecretString::from(v));
    }
    if let Some(v) = var("CONVO_STORE_DATABASE") {
        config.store.database_name = v;
    }
    if let Some(v) = var("CONVO_STORE_CONTAINER") {
        config.store.container_name = v;
    }
    if let Some(v) = var("CONVO_OPENAI_ENDPOINT") {
        config.completion.endpoint = v;
    }
    if let Some(v) = var("CONVO_OPENAI_KEY") {
        config.completion.key = Some(SecretString::from(v));
    }
    if let Some(v) = var("CONVO_OPENAI_DEPLOYMENT") {
        config.completion.deployment = v;
    }
    if let Some(v) = var("CONVO_OPENAI_API_VERSION") {
        config.completion.api_version = v;
    }
    if let Some(v) = var("CONVO_OPENAI_KIND") {
        config.completion.kind = v
            .parse::<CompletionKind>()
            .map_err(|reason| ConfigError::Invalid {
                field: "CONVO_OPENAI_KIND",
                reason,
            })?;
    }
    Ok(())
}
