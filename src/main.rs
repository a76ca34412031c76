use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use project_pulse::app::{handle_fatal_error, init_logging, AppConfig};
use project_pulse::{StatisticsEngine, StatsConfig, StatsError};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

/// Project health statistics
#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Collect and track project health statistics", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Project root (default: current directory)
    #[arg(short = 'p', long, global = true)]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect a snapshot, compute metrics and trends, and record it
    Collect {
        /// Print the metrics without recording the snapshot
        #[arg(long)]
        no_save: bool,
    },
    /// Print stored snapshots
    History {
        /// Only entries at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Only entries at or before this RFC 3339 time
        #[arg(long)]
        until: Option<DateTime<Utc>>,
    },
    /// Print the newest stored snapshot
    Latest,
    /// Print trends of the newest stored snapshot against the ones before it
    Trends,
    /// Delete the history log
    Clear,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::new(cli.verbose) {
        Ok(config) => config,
        Err(e) => handle_fatal_error(e, cli.verbose),
    };
    let config = match cli.path {
        Some(path) => config.with_working_dir(path),
        None => config,
    };

    init_logging(&config);

    if let Err(e) = run(cli.command, &config).await {
        handle_fatal_error(e, config.verbose);
    }
}

async fn run(command: Commands, app: &AppConfig) -> Result<()> {
    let stats_config = StatsConfig::load(&app.working_dir)
        .map_err(|e| StatsError::config(format!("{e:#}")))?;
    debug!("Statistics config: {:?}", stats_config);

    let engine = StatisticsEngine::new(&stats_config);
    let storage = engine.storage();

    match command {
        Commands::Collect { no_save } => {
            let metrics = engine.run_with(!no_save).await?;
            print_json(&metrics)
        }
        Commands::History { since, until } => {
            let entries = match (since, until) {
                (None, None) => storage.load_all().await?,
                (Some(since), None) => storage.load_since(since).await?,
                (since, Some(until)) => {
                    let since = since.unwrap_or(DateTime::<Utc>::MIN_UTC);
                    storage.load_range(since, until).await?
                }
            };
            print_json(&entries)
        }
        Commands::Latest => {
            let latest = storage.get_latest().await?;
            print_json(&latest)
        }
        Commands::Trends => {
            let trends = engine.trends().await?;
            print_json(&trends)
        }
        Commands::Clear => {
            storage.clear().await?;
            eprintln!("Cleared statistics history at {}", storage.path().display());
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
