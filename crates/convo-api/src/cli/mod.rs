//! CLI command definitions and dispatch for the `convo` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod message;
pub mod session;
pub mod store;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Chat with a hosted model and keep every conversation in a document store.
#[derive(Parser)]
#[command(name = "convo", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision the document store database and container.
    Init,

    /// List every session.
    #[command(alias = "ls")]
    Sessions,

    /// Start a new session.
    New {
        /// Display name (defaults to the placeholder until the first summary).
        #[arg(long)]
        name: Option<String>,
    },

    /// Show a session transcript.
    Show {
        /// Session ID.
        id: String,
    },

    /// Send a message and print the reply.
    Send {
        /// Session ID.
        id: String,

        /// Message text.
        text: String,
    },

    /// Rename a session.
    Rename {
        /// Session ID.
        id: String,

        /// New display name.
        name: String,
    },

    /// Regenerate a session's label from its first message.
    Summarize {
        /// Session ID.
        id: String,
    },

    /// Delete a session and all of its messages.
    #[command(alias = "rm")]
    Delete {
        /// Session ID.
        id: String,

        /// Skip the confirmation prompt.
        #[arg(long, short)]
        force: bool,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on (defaults to `server.port` from config).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (defaults to `server.host` from config).
        #[arg(long)]
        host: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
