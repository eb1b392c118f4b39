use clap::{Args, Parser, Subcommand};

use crate::sync::DEFAULT_INTERVAL;
use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "listensync",
    version,
    about = "Sync Spotify recently-played history into SQLite"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// SQLite database holding users and listens
    #[arg(long, global = true, env = "LISTENSYNC_DB", default_value = "~/.listensync/listens.db")]
    pub db: String,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    #[command(flatten)]
    pub sync: SyncArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Refresh tokens and record recent plays for every user (default)
    Sync(SyncArgs),
    /// Show user and listen counts and the last sync run
    Status,
    /// List a user's recorded plays for one UTC day
    Listens(ListensArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Spotify application client id
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Spotify application client secret.
    /// Prefer the SPOTIFY_CLIENT_SECRET environment variable; flags are
    /// visible in process listings.
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Seconds to wait between sync cycles
    #[arg(long, default_value_t = DEFAULT_INTERVAL.as_secs())]
    pub interval: u64,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Plays requested per user per cycle (1-50)
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u8).range(1..=50))]
    pub limit: u8,

    /// Per-request HTTP timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Retries per upstream call on transient errors
    #[arg(long, default_value_t = 2)]
    pub max_retries: u32,

    /// Base retry delay in seconds
    #[arg(long, default_value_t = 5)]
    pub retry_delay: u64,

    /// Override the accounts token endpoint
    #[arg(long)]
    pub token_url: Option<String>,

    /// Override the recently-played endpoint
    #[arg(long)]
    pub recently_played_url: Option<String>,

    /// Send sd_notify READY/STATUS/STOPPING messages
    #[arg(long)]
    pub notify_systemd: bool,
}

#[derive(Args, Debug)]
pub struct ListensArgs {
    /// User id
    #[arg(long)]
    pub user: i64,

    /// Day to list, as YYYY-MM-DD (UTC)
    #[arg(long)]
    pub date: String,
}

impl Cli {
    /// The subcommand to run; a bare invocation means `sync` with the
    /// top-level sync flags.
    pub fn effective_command(&self) -> Command {
        match &self.command {
            Some(Command::Sync(args)) => Command::Sync(args.clone()),
            Some(Command::Status) => Command::Status,
            Some(Command::Listens(args)) => Command::Listens(ListensArgs {
                user: args.user,
                date: args.date.clone(),
            }),
            None => Command::Sync(self.sync.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_invocation_is_sync() {
        let cli = Cli::try_parse_from([
            "listensync",
            "--client-id",
            "id",
            "--client-secret",
            "secret",
            "--once",
        ])
        .unwrap();
        match cli.effective_command() {
            Command::Sync(args) => {
                assert_eq!(args.client_id.as_deref(), Some("id"));
                assert!(args.once);
                assert_eq!(args.interval, 1800);
                assert_eq!(args.limit, 50);
            }
            other => panic!("expected sync, got {other:?}"),
        }
    }

    #[test]
    fn test_sync_subcommand_flags() {
        let cli = Cli::try_parse_from([
            "listensync",
            "sync",
            "--client-id",
            "id",
            "--interval",
            "60",
            "--limit",
            "20",
            "--max-retries",
            "0",
        ])
        .unwrap();
        match cli.effective_command() {
            Command::Sync(args) => {
                assert_eq!(args.interval, 60);
                assert_eq!(args.limit, 20);
                assert_eq!(args.max_retries, 0);
            }
            other => panic!("expected sync, got {other:?}"),
        }
    }

    #[test]
    fn test_limit_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["listensync", "sync", "--limit", "51"]).is_err());
        assert!(Cli::try_parse_from(["listensync", "sync", "--limit", "0"]).is_err());
    }

    #[test]
    fn test_global_db_after_subcommand() {
        let cli = Cli::try_parse_from(["listensync", "status", "--db", "/tmp/x.db"]).unwrap();
        assert_eq!(cli.db, "/tmp/x.db");
        assert!(matches!(cli.effective_command(), Command::Status));
    }

    #[test]
    fn test_listens_args() {
        let cli = Cli::try_parse_from([
            "listensync",
            "listens",
            "--user",
            "3",
            "--date",
            "2024-01-01",
        ])
        .unwrap();
        match cli.effective_command() {
            Command::Listens(args) => {
                assert_eq!(args.user, 3);
                assert_eq!(args.date, "2024-01-01");
            }
            other => panic!("expected listens, got {other:?}"),
        }
    }
}
