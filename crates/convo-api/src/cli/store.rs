//! `convo init`: provision the document store.

use anyhow::{Context, Result};
use console::style;

use convo_infra::sqlite::store::SqliteDocumentStore;
use convo_types::config::AppConfig;

/// Create the database file and container described by the store config.
///
/// Only the store settings are required here; completion settings may be
/// filled in later.
pub async fn init_store(config: &AppConfig, json: bool) -> Result<()> {
    config.store.validate().context("Invalid store configuration")?;

    let store = SqliteDocumentStore::provision(&config.store)
        .await
        .context("Failed to provision the document store")?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "provisioned": true,
                "database": config.store.database_name,
                "container": store.container(),
            })
        );
        return Ok(());
    }

    println!();
    println!(
        "  {} Document store ready",
        style("✓").green().bold()
    );
    println!();
    println!(
        "  {}  {}",
        style("Database:").bold(),
        style(&config.store.database_name).cyan()
    );
    println!(
        "  {}  {}",
        style("Container:").bold(),
        style(store.container()).cyan()
    );
    println!(
        "  {}  {}",
        style("Location:").bold(),
        style(&config.store.endpoint).dim()
    );
    println!();
    println!(
        "  Start a conversation: {}",
        style("convo new").yellow()
    );
    println!();
    Ok(())
}
