//! chatcast - turn a Messages group chat into a speech-ready transcript
//!
//! Reads the local Messages database and produces ordered, merged utterances
//! ready for text-to-speech.

mod commands;
mod config;
mod imessage;
mod models;
mod pipeline;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{Overrides, Selection};

#[derive(Parser)]
#[command(name = "chatcast")]
#[command(about = "Turn a Messages group chat into a speech-ready transcript", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to chat.db (overrides config)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Args)]
struct SelectArgs {
    /// Chat ID (from `chats` output)
    chat_id: i64,

    /// Start date: YYYY-MM-DD, "YYYY-MM-DD HH:MM" or "YYYY-MM-DD HH:MM:SS"
    /// (default: start of this month)
    #[arg(short, long)]
    start: Option<String>,

    /// End date, same formats; a bare date includes the whole day
    /// (default: now)
    #[arg(short, long)]
    end: Option<String>,

    /// Leave URLs as they are instead of fetching page titles
    #[arg(long)]
    no_links: bool,

    /// Merge window in seconds for consecutive same-sender messages
    #[arg(short, long)]
    window: Option<u64>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

impl SelectArgs {
    fn split(self) -> (Selection, Overrides, bool) {
        (
            Selection {
                chat_id: self.chat_id,
                start: self.start,
                end: self.end,
            },
            Overrides {
                no_links: self.no_links,
                merge_window_secs: self.window,
            },
            self.json,
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List group chats, most recent first
    Chats,

    /// Print the speech-ready transcript of a chat
    Transcript(SelectArgs),

    /// Estimate text-to-speech cost for a chat
    Estimate(SelectArgs),

    /// Show the effective configuration
    Config {
        /// Write a config file with the current settings if none exists
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = config::Config::load()?;
    let db_path = cli.db_path.as_deref();

    match cli.command {
        Commands::Chats => {
            commands::list_chats(&config, db_path)?;
        }
        Commands::Transcript(args) => {
            let (selection, overrides, json) = args.split();
            commands::transcript(&config, db_path, &selection, &overrides, json).await?;
        }
        Commands::Estimate(args) => {
            let (selection, overrides, json) = args.split();
            commands::estimate_cost(&config, db_path, &selection, &overrides, json).await?;
        }
        Commands::Config { init } => {
            commands::show_config(&config, init)?;
        }
    }

    Ok(())
}
