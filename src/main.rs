//! listensync — keeps a local record of every user's Spotify listening.
//!
//! Each cycle refreshes every provisioned user's access token, persists the
//! new pair before using it, fetches the user's most recent plays and
//! records them idempotently. One user's failure never blocks another.

#![warn(clippy::all)]

mod cli;
mod config;
pub mod retry;
mod shutdown;
mod spotify;
mod store;
mod sync;
mod systemd;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use spotify::{HttpActivityFetcher, HttpTokenRefresher};
use store::{SqliteStore, UserId, WorkerLock};
use sync::{Scheduler, SyncOrchestrator};

/// Open an existing database for a read-only command, or explain why not.
async fn open_existing(db_path: &Path) -> anyhow::Result<Option<SqliteStore>> {
    if !db_path.exists() {
        println!("No database found at {}", db_path.display());
        println!("Run a sync first to create the database.");
        return Ok(None);
    }
    Ok(Some(SqliteStore::open(db_path).await?))
}

/// Run the status command.
async fn run_status(db_path: &Path) -> anyhow::Result<()> {
    let Some(db) = open_existing(db_path).await? else {
        return Ok(());
    };
    let summary = db.get_summary().await?;

    println!("Database: {}", db.path().display());
    println!();
    println!("Users:");
    println!("  Total:       {}", summary.total_users);
    println!("  Provisioned: {}", summary.provisioned_users);
    println!();
    println!("Listens:       {}", summary.total_listens);
    println!();

    match &summary.last_run {
        Some(run) => {
            println!(
                "Last sync started:   {}",
                run.started_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            match &run.completed_at {
                Some(completed) => {
                    println!(
                        "Last sync completed: {}",
                        completed.format("%Y-%m-%d %H:%M:%S UTC")
                    );
                    println!(
                        "  {} users: {} synced, {} skipped, {} new listens{}",
                        run.stats.users_seen,
                        run.stats.users_synced,
                        run.stats.users_skipped,
                        run.stats.listens_recorded,
                        if run.stats.interrupted {
                            " (interrupted)"
                        } else {
                            ""
                        }
                    );
                }
                None => println!("Last sync has not completed"),
            }
        }
        None => println!("No sync has run yet"),
    }

    Ok(())
}

/// Run the listens command.
async fn run_listens(db_path: &Path, args: cli::ListensArgs) -> anyhow::Result<()> {
    let day = NaiveDate::parse_from_str(&args.date, "%Y-%m-%d").map_err(|_| {
        anyhow::anyhow!(
            "Cannot parse '{}' as a date. Expected YYYY-MM-DD",
            args.date
        )
    })?;

    let Some(db) = open_existing(db_path).await? else {
        return Ok(());
    };
    let listens = db.listens_on(UserId(args.user), day).await?;

    if listens.is_empty() {
        println!("No listens for user {} on {}", args.user, day);
        return Ok(());
    }

    println!("Listens for user {} on {}:", args.user, day);
    for listen in &listens {
        println!(
            "  {}  {}",
            listen.played_at.format("%H:%M:%S%.3f"),
            listen.track_id
        );
    }
    println!();
    println!("Total: {}", listens.len());

    Ok(())
}

/// Run the sync worker until shutdown (or after one cycle with `--once`).
async fn run_sync(config: config::Config) -> anyhow::Result<()> {
    tracing::info!(
        db = %config.db_path.display(),
        interval_secs = config.interval.as_secs(),
        once = config.once,
        "Starting listensync"
    );
    tracing::debug!(?config, "Resolved configuration");

    // Held for the life of the worker; dropping it releases the lock.
    let lock = WorkerLock::acquire(&config.db_path)?;
    tracing::debug!(lock = %lock.path().display(), "Worker lock acquired");

    let store = Arc::new(SqliteStore::open(&config.db_path).await?);
    tracing::debug!("Database opened at {}", store.path().display());

    let client = spotify::http_client(config.timeout).context("building HTTP client")?;
    let refresher = HttpTokenRefresher::new(
        client.clone(),
        config.credentials,
        &config.endpoints,
        config.retry.clone(),
    );
    let fetcher = HttpActivityFetcher::new(
        client,
        &config.endpoints,
        config.limit,
        config.retry.clone(),
    );

    let orchestrator = SyncOrchestrator::new(
        store.clone(),
        store.clone(),
        Arc::new(refresher),
        Arc::new(fetcher),
    )
    .with_history(store);

    let shutdown_token = shutdown::install_signal_handler()?;

    let cycles = Scheduler::new(config.interval)
        .once(config.once)
        .with_notifier(systemd::SystemdNotifier::new(config.notify_systemd))
        .run(&orchestrator, shutdown_token)
        .await;

    tracing::info!(cycles, "Sync worker stopped");
    drop(lock);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    let db_path = config::expand_tilde(&cli.db);

    match cli.effective_command() {
        Command::Status => run_status(&db_path).await,
        Command::Listens(args) => run_listens(&db_path, args).await,
        Command::Sync(args) => run_sync(config::Config::from_cli(&cli.db, args)?).await,
    }
}
