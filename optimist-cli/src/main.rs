//! # optimist CLI
//!
//! Replays recorded event logs through the optimistic cache engine.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "optimist")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines event log and print the resulting cache
    Replay {
        /// Event log, one event per line
        events: PathBuf,

        /// Path to engine configuration file
        #[arg(long, env = "OPTIMIST_CONFIG")]
        config: Option<PathBuf>,

        /// Emit a JSON snapshot instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the canonical key of a query
    Key {
        /// Query as JSON, or a plain `collection/doc` path
        query: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::WARN.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Replay {
            events,
            config,
            json,
        } => {
            let opts = commands::ReplayOptions {
                config,
                json,
                verbose: cli.verbose,
            };
            commands::replay_log(&events, opts)
        }
        Commands::Key { query } => commands::print_key(&query),
    }
}
