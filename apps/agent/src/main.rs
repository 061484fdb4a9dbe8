//! patchdoc agent entry point.

mod app;
mod config;
mod daemon;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchdoc-agent", version, about = "Game client log watcher and file repair agent")]
struct Cli {
    /// Configuration file (defaults to the platform config directory).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Tail a game's client log and print events until interrupted.
    Watch {
        #[arg(long)]
        service: String,
        #[arg(long)]
        game: String,
        /// Only consider lines written by this client process.
        #[arg(long)]
        pid: Option<u32>,
    },
    /// Rebuild the failed patch plan from the client log and repair it.
    Repair {
        #[arg(long)]
        service: String,
        #[arg(long)]
        game: String,
        /// Download from this web root instead of the one in the log.
        #[arg(long, value_name = "URL")]
        web_root: Option<String>,
        #[arg(long)]
        pid: Option<u32>,
    },
    /// Re-download the essential executables from a web root.
    Force {
        #[arg(long)]
        service: String,
        #[arg(long)]
        game: String,
        #[arg(long, value_name = "URL")]
        web_root: String,
    },
    /// Put back the files saved by the previous repair.
    Restore {
        #[arg(long)]
        service: String,
        #[arg(long)]
        game: String,
    },
    /// Read JSON-line triggers from stdin and write events to stdout.
    Daemon,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the event stream, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,patchdoc=debug")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting patchdoc agent");

    let config = config::Config::load(cli.config.as_deref())?;
    tracing::info!(
        games = config.games.len(),
        auto_repair = config.auto_repair,
        backup = config.backup_enabled,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli.command, config))?;

    tracing::info!("agent shut down cleanly");
    Ok(())
}
