//! talkstate - review lifecycle for conference talk submissions.
//!
//! One-shot commands over a data directory of talk snapshots.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;
use talkstate_core::notify::create_notifier;
use talkstate_core::{HookRegistry, TransitionEngine, TransitionTable};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "talkstate")]
#[command(about = "Review lifecycle for conference talk submissions")]
#[command(version)]
struct Cli {
    /// Path to a YAML config file (defaults to TALKSTATE_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (overrides config)
    #[arg(short, long)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Print the transition table
    Table {
        /// Print the rules as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the signals legal in a state
    Available {
        /// State name
        state: String,
    },

    /// Show the public label for a stored state value
    Label {
        /// Raw state value
        state: String,
    },

    /// Submit a new talk
    Submit {
        /// Talk title
        #[arg(short, long)]
        title: String,

        /// Talk abstract
        #[arg(short, long = "abstract")]
        abstract_text: Option<String>,
    },

    /// Show a talk
    Show {
        /// Talk ID
        id: String,
    },

    /// List all talks
    List,

    /// Fire a lifecycle signal on a talk
    Fire {
        /// Talk ID
        id: String,

        /// Signal name (e.g. accept, start_review)
        signal: String,

        /// Hook context JSON (or @file.json to read from file)
        #[arg(short, long)]
        ctx: Option<String>,

        /// Expected state (for optimistic concurrency)
        #[arg(long)]
        expected_state: Option<String>,

        /// Expected version (for optimistic concurrency)
        #[arg(long)]
        expected_version: Option<u64>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<String, Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data) = cli.data {
        config.storage.data_dir = data;
    }

    tracing::debug!(data_dir = %config.storage.data_dir.display(), "configuration loaded");

    // Build the table and engine once; everything below shares them.
    let table = Arc::new(TransitionTable::conference()?);
    let notifier = config
        .notifications
        .enabled
        .then(|| create_notifier(config.notifications.channel_capacity));
    let hooks = match &notifier {
        Some(notifier) => HookRegistry::notifying(notifier.clone()),
        None => HookRegistry::placeholders(),
    };
    let engine = Arc::new(TransitionEngine::new(table, &hooks)?);

    let session = commands::Session {
        engine,
        notifier,
        config,
    };
    commands::execute(&session, cli.command)
}
