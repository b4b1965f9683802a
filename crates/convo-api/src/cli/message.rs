//! `convo send`: run one conversation turn from the command line.

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use convo_core::conversation::service::{ConversationError, SummaryStatus, TurnOutcome};

use crate::state::AppState;

/// Send `text` to a session and print the assistant's reply.
///
/// Ctrl+C cancels the in-flight turn. A turn whose reply was generated
/// but not stored still prints the reply before returning the error.
///
/// # Examples
///
/// ```bash
/// convo send <session-id> "What is a partition key?"
/// ```
pub async fn send_message(state: &AppState, session_id: &str, text: &str, json: bool) -> Result<()> {
    let ctx = state.call_context();
    let cancel = ctx.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));

    let result = state.service.send_message(session_id, text, &ctx).await;
    spinner.finish_and_clear();
    interrupt.abort();

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(ConversationError::PersistCompletion { text, .. }) if !json => {
            println!("{text}");
            eprintln!(
                "  {} The reply above could not be saved; resending will repeat the turn.",
                style("!").yellow().bold()
            );
            return Err(anyhow::anyhow!("reply for session '{session_id}' was not persisted"));
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    print_outcome(&outcome);
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome) {
    println!();
    println!(
        "  {} {}",
        style("Assistant:").cyan().bold(),
        outcome.assistant_message.text
    );
    println!();
    println!(
        "  {}",
        style(format!(
            "{} completion tokens, {} used in session",
            outcome.assistant_message.tokens, outcome.session.tokens_used
        ))
        .dim()
    );
    match &outcome.summary {
        SummaryStatus::Applied(name) => println!(
            "  {} {}",
            style("Session named:").dim(),
            style(name).cyan()
        ),
        SummaryStatus::Failed(reason) => println!(
            "  {} {}",
            style("Could not name session:").yellow(),
            reason
        ),
        SummaryStatus::NotRequested => {}
    }
    println!();
}
