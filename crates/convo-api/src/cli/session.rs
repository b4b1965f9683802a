//! Session management CLI commands: list, new, show, rename, summarize, delete.
//!
//! Provides session browsing with rich tables, Markdown/JSON transcripts,
//! and deletion with a confirmation prompt.

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use convo_types::chat::{Message, Sender, Session};

use crate::state::AppState;

/// List every session in a table.
///
/// # Examples
///
/// ```bash
/// convo sessions
/// convo sessions --json
/// ```
pub async fn list_sessions(state: &AppState, json: bool) -> Result<()> {
    let ctx = state.call_context();
    let sessions = state.service.store().list_sessions(&ctx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if sessions.is_empty() {
        println!();
        println!(
            "  {} No sessions yet. Start one with: {}",
            style("i").blue().bold(),
            style("convo new").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("ID").fg(Color::White),
        Cell::new("Tokens").fg(Color::White),
    ]);

    for session in &sessions {
        table.add_row(vec![
            Cell::new(truncate(&session.name, 40)).fg(Color::Cyan),
            Cell::new(&session.id).fg(Color::DarkGrey),
            Cell::new(session.tokens_used.to_string()).fg(Color::White),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} session{}",
        style(sessions.len()).bold(),
        if sessions.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

/// Start a new session.
pub async fn new_session(state: &AppState, name: Option<String>, json: bool) -> Result<()> {
    let ctx = state.call_context();
    let session = state.service.start_session(name, &ctx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Session started",
        style("✓").green().bold()
    );
    print_session_fields(&session);
    println!(
        "  Say something: {}",
        style(format!("convo send {} \"Hello\"", session.id)).yellow()
    );
    println!();
    Ok(())
}

/// Print a session transcript as Markdown (default) or JSON.
///
/// # Examples
///
/// ```bash
/// convo show <session-id>
/// convo show <session-id> --json
/// ```
pub async fn show_session(state: &AppState, session_id: &str, json: bool) -> Result<()> {
    let ctx = state.call_context();
    let session = state
        .service
        .store()
        .get_session(session_id, &ctx)
        .await
        .with_context(|| format!("Session '{session_id}' not found"))?;
    let messages = state.service.store().list_messages(session_id, &ctx).await?;

    if json {
        let export = serde_json::json!({
            "session": session,
            "messages": messages,
        });
        println!("{}", serde_json::to_string_pretty(&export)?);
        return Ok(());
    }

    print!("{}", render_transcript(&session, &messages));
    Ok(())
}

/// Rename a session.
pub async fn rename_session(state: &AppState, session_id: &str, name: &str, json: bool) -> Result<()> {
    let ctx = state.call_context();
    let session = state.service.rename_session(session_id, name, &ctx).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        println!(
            "  {} Renamed to '{}'",
            style("✓").green().bold(),
            style(&session.name).cyan()
        );
    }
    Ok(())
}

/// Regenerate a session's label.
pub async fn summarize_session(state: &AppState, session_id: &str, json: bool) -> Result<()> {
    let ctx = state.call_context();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message("Summarizing...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));

    let result = state.service.summarize_session(session_id, &ctx).await;
    spinner.finish_and_clear();
    let session = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        println!(
            "  {} Session labelled '{}'",
            style("✓").green().bold(),
            style(&session.name).cyan()
        );
    }
    Ok(())
}

/// Delete a session with confirmation.
///
/// # Examples
///
/// ```bash
/// convo delete <session-id>
/// convo delete <session-id> --force
/// ```
pub async fn delete_session(state: &AppState, session_id: &str, force: bool, json: bool) -> Result<()> {
    let ctx = state.call_context();
    let session = state
        .service
        .store()
        .get_session(session_id, &ctx)
        .await
        .with_context(|| format!("Session '{session_id}' not found"))?;

    if !force && !json {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete session '{}' and all of its messages?",
                style(&session.name).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let report = state.service.delete_session(session_id, &ctx).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "session_id": session_id,
                "deleted": report.deleted,
                "residual": report.residual,
            })
        );
    } else {
        println!(
            "  {} Session '{}' deleted ({} documents).",
            style("x").red().bold(),
            session.name,
            report.deleted
        );
        if report.residual > 0 {
            println!(
                "  {} {} document(s) were written during deletion and remain.",
                style("!").yellow().bold(),
                report.residual
            );
        }
    }

    Ok(())
}

// --- Formatting helpers ---

fn print_session_fields(session: &Session) {
    println!();
    println!(
        "  {}  {}",
        style("Name:").bold(),
        style(&session.name).cyan()
    );
    println!(
        "  {}    {}",
        style("ID:").bold(),
        style(&session.id).dim()
    );
    println!();
}

/// Markdown transcript of a session.
pub(crate) fn render_transcript(session: &Session, messages: &[Message]) -> String {
    let mut out = format!("# {}\n\n", session.name);
    out.push_str(&format!("- **Session:** {}\n", session.id));
    out.push_str(&format!("- **Messages:** {}\n", messages.len()));
    out.push_str(&format!("- **Tokens:** {}\n\n---\n\n", session.tokens_used));

    for msg in messages {
        let role_label = match msg.sender {
            Sender::User => "**You**",
            Sender::Assistant => "**Assistant**",
        };
        let timestamp = msg.timestamp.format("%Y-%m-%d %H:%M");
        out.push_str(&format!("### {role_label} ({timestamp})\n\n{}\n\n", msg.text));
    }
    out
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
