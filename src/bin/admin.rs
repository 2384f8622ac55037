//! CLI administration tool for admetric.
//!
//! Inspects and replays the disk backup and reads stored click totals without
//! going through the HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Count backed-up clicks waiting for replay
//! cargo run --bin admin -- backlog
//!
//! # List them
//! cargo run --bin admin -- backlog --list
//!
//! # Replay the backup into the database now
//! cargo run --bin admin -- replay
//!
//! # Show the stored total of one ad
//! cargo run --bin admin -- count ad-42
//! ```
//!
//! # Environment Variables
//!
//! Same as the service; see `admetric::config`. `replay` and `count` need the
//! database, `backlog` only reads `BACKUP_DIR`.

use admetric::application::backup::DiskBackup;
use admetric::application::circuit_breaker::CircuitBreaker;
use admetric::application::counter_cache::CounterCache;
use admetric::application::sweeper::ReconciliationSweeper;
use admetric::config::{self, Config};
use admetric::domain::repositories::ClickRepository;
use admetric::infrastructure::persistence::PgClickRepository;
use admetric::server::connect_database;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI tool for managing admetric.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backup directory (defaults to BACKUP_DIR)
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show clicks waiting in the disk backup
    Backlog {
        /// Print every file
        #[arg(short, long)]
        list: bool,
    },

    /// Replay the disk backup into the database
    Replay,

    /// Show the stored click total of an ad
    Count {
        /// Ad identifier
        ad_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Backlog { list } => {
            let dir = match cli.backup_dir {
                Some(dir) => dir,
                None => std::env::var("BACKUP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./backup/clicks")),
            };
            handle_backlog(DiskBackup::new(dir), list).await?
        }
        Commands::Replay => {
            let config = config::load_from_env()?;
            let dir = cli.backup_dir.unwrap_or_else(|| config.backup_dir.clone());
            handle_replay(&config, DiskBackup::new(dir)).await?
        }
        Commands::Count { ad_id } => {
            let config = config::load_from_env()?;
            handle_count(&config, &ad_id).await?
        }
    }

    Ok(())
}

async fn repository(config: &Config) -> Result<Arc<dyn ClickRepository>> {
    let pool = connect_database(config).await?;
    Ok(Arc::new(PgClickRepository::new(Arc::new(pool))))
}

/// Prints the number of backup files, optionally listing them.
async fn handle_backlog(backup: DiskBackup, list: bool) -> Result<()> {
    let files = backup
        .list()
        .await
        .with_context(|| format!("Failed to read {}", backup.dir().display()))?;

    println!("{}", "Disk backup".bright_blue().bold());
    println!("  Directory: {}", backup.dir().display());
    let count = files.len().to_string();
    println!(
        "  Pending:   {}",
        if files.is_empty() {
            count.bright_green().bold()
        } else {
            count.bright_yellow().bold()
        }
    );

    if list {
        println!();
        for file in &files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("  {}", name.dimmed());
        }
    }
    println!();

    Ok(())
}

/// Runs one reconciliation sweep against the configured database.
async fn handle_replay(config: &Config, backup: DiskBackup) -> Result<()> {
    println!("{}", "Replaying disk backup...".bright_blue());

    let repository = repository(config).await?;
    let breaker = Arc::new(CircuitBreaker::new(
        "storage",
        config.breaker_threshold,
        config.breaker_reset(),
    ));
    let cache = Arc::new(CounterCache::new(repository.clone()));
    let sweeper = ReconciliationSweeper::new(backup, repository, breaker, cache);

    let report = sweeper.sweep().await.context("Failed to list backup files")?;

    println!(
        "  Replayed:    {}",
        report.replayed.to_string().bright_green().bold()
    );
    println!("  Duplicates:  {}", report.duplicates);
    println!("  Quarantined: {}", report.quarantined);
    println!("  Remaining:   {}", report.remaining);

    if report.stopped_early {
        println!(
            "{}",
            "Replay stopped at a database failure; run again later".red().bold()
        );
    } else {
        println!("{}", "Replay complete".green().bold());
    }

    Ok(())
}

/// Prints an ad's stored running total.
async fn handle_count(config: &Config, ad_id: &str) -> Result<()> {
    let repository = repository(config).await?;

    if !repository.ad_exists(ad_id).await? {
        println!("{} {}", "Unknown ad:".red().bold(), ad_id);
        return Ok(());
    }

    let total = repository.get_ad_total(ad_id).await?;
    println!(
        "  {}: {}",
        ad_id,
        total.to_string().bright_green().bold()
    );

    Ok(())
}
