//! sitesweep CLI - Main Entry Point
//!
//! Captures every configured site, updates it, clears its caches, captures
//! it again and reports how far each page drifted. Interrupted runs resume
//! where they stopped.

use clap::Parser;
use std::path::PathBuf;

mod output;
mod run;

use sitesweep_common::config::DEFAULT_CONFIG_PATH;

/// Resumable fleet updates with before/after regression scoring
#[derive(Parser, Debug)]
#[command(name = "sitesweep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Fleet configuration file
    #[arg(short, long, env = "SITESWEEP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Capture the `before` state only; no update, cache clear or comparison
    #[arg(long)]
    dry_run: bool,

    /// Back up database and files before updating
    #[arg(long)]
    backup: bool,

    /// Keep the backup on the server as well (implies --backup)
    #[arg(long)]
    keep_backup: bool,

    /// Ignore an unfinished previous run and start over
    #[arg(long)]
    fresh: bool,

    /// Summary format
    #[arg(long, default_value = "table")]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let code = run::execute(&cli).await?;
    if code != run::EXIT_OK {
        std::process::exit(code);
    }
    Ok(())
}
