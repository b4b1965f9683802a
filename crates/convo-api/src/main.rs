//! Convo CLI and REST API entry point.
//!
//! Binary name: `convo`
//!
//! Parses CLI arguments, loads configuration, wires the conversation service,
//! then dispatches to the appropriate command handler or starts the REST API
//! server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use convo_observe::tracing_setup::{default_filter, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(default_filter(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    match cli.command {
        // Shell completions don't need configuration
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "convo", &mut std::io::stdout());
        }
        // Provisioning needs only the store settings
        Commands::Init => {
            let (_, config) = AppState::load().await?;
            cli::store::init_store(&config, json).await?;
        }
        Commands::Sessions => cli::session::list_sessions(&connect().await?, json).await?,
        Commands::New { name } => cli::session::new_session(&connect().await?, name, json).await?,
        Commands::Show { id } => cli::session::show_session(&connect().await?, &id, json).await?,
        Commands::Send { id, text } => {
            cli::message::send_message(&connect().await?, &id, &text, json).await?;
        }
        Commands::Rename { id, name } => {
            cli::session::rename_session(&connect().await?, &id, &name, json).await?;
        }
        Commands::Summarize { id } => {
            cli::session::summarize_session(&connect().await?, &id, json).await?;
        }
        Commands::Delete { id, force } => {
            cli::session::delete_session(&connect().await?, &id, force, json).await?;
        }
        Commands::Serve { port, host } => {
            let state = connect().await?;
            let host = host.unwrap_or_else(|| state.config.server.host.clone());
            let port = port.unwrap_or(state.config.server.port);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Convo API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }
    }

    Ok(())
}

/// Load configuration and wire the service for commands that talk to the store.
async fn connect() -> anyhow::Result<AppState> {
    let (data_dir, config) = AppState::load().await?;
    tracing::debug!(data_dir = %data_dir.display(), "Configuration loaded");
    AppState::init(config).await
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
