use std::path::PathBuf;
use std::time::Duration;

use crate::cli::SyncArgs;
use crate::retry::RetryConfig;
use crate::spotify::endpoints::MAX_PAGE_LIMIT;
use crate::spotify::{ClientCredentials, Endpoints};

/// Resolved settings for the `sync` command.
pub struct Config {
    pub credentials: ClientCredentials,
    pub endpoints: Endpoints,
    pub db_path: PathBuf,

    pub interval: Duration,
    pub timeout: Duration,
    pub retry: RetryConfig,

    pub limit: u8,

    pub once: bool,
    pub notify_systemd: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("credentials", &self.credentials)
            .field("endpoints", &self.endpoints)
            .field("db_path", &self.db_path)
            .field("interval", &self.interval)
            .field("once", &self.once)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Treat blank values (e.g. `SPOTIFY_CLIENT_ID=` in a unit file) as unset.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_cli(db: &str, args: SyncArgs) -> anyhow::Result<Self> {
        let Some(client_id) = non_empty(args.client_id) else {
            anyhow::bail!("--client-id (or SPOTIFY_CLIENT_ID) is required for sync");
        };
        let Some(client_secret) = non_empty(args.client_secret) else {
            anyhow::bail!("--client-secret (or SPOTIFY_CLIENT_SECRET) is required for sync");
        };
        if args.interval == 0 && !args.once {
            anyhow::bail!("--interval must be at least 1 second");
        }
        if args.timeout == 0 {
            anyhow::bail!("--timeout must be at least 1 second");
        }

        let mut endpoints = Endpoints::default();
        if let Some(url) = non_empty(args.token_url) {
            endpoints.token = url;
        }
        if let Some(url) = non_empty(args.recently_played_url) {
            endpoints.recently_played = url;
        }

        Ok(Self {
            credentials: ClientCredentials {
                client_id,
                client_secret,
            },
            endpoints,
            db_path: expand_tilde(db),
            interval: Duration::from_secs(args.interval),
            timeout: Duration::from_secs(args.timeout),
            retry: RetryConfig {
                max_retries: args.max_retries,
                base_delay: Duration::from_secs(args.retry_delay),
                ..RetryConfig::default()
            },
            limit: args.limit.clamp(1, MAX_PAGE_LIMIT),
            once: args.once,
            notify_systemd: args.notify_systemd,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    fn sync_args(extra: &[&str]) -> SyncArgs {
        let mut argv = vec!["listensync", "sync"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().effective_command() {
            Command::Sync(args) => args,
            other => panic!("expected sync, got {other:?}"),
        }
    }

    fn with_credentials(extra: &[&str]) -> SyncArgs {
        let mut args = sync_args(extra);
        args.client_id = Some("id".into());
        args.client_secret = Some("secret".into());
        args
    }

    #[test]
    fn test_expand_tilde_with_home() {
        let result = expand_tilde("~/.listensync/listens.db");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(result, home.join(".listensync/listens.db"));
        }
    }

    #[test]
    fn test_expand_tilde_no_prefix() {
        assert_eq!(expand_tilde("/var/lib/x.db"), PathBuf::from("/var/lib/x.db"));
        assert_eq!(expand_tilde("rel/x.db"), PathBuf::from("rel/x.db"));
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_cli("/tmp/l.db", with_credentials(&[])).unwrap();
        assert_eq!(cfg.interval, Duration::from_secs(1800));
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.limit, 50);
        assert_eq!(cfg.retry.max_retries, 2);
        assert_eq!(cfg.retry.base_delay, Duration::from_secs(5));
        assert_eq!(cfg.endpoints, Endpoints::default());
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/l.db"));
        assert!(!cfg.once);
        assert!(!cfg.notify_systemd);
    }

    #[test]
    fn test_missing_client_credentials_rejected() {
        let mut args = with_credentials(&[]);
        args.client_id = None;
        assert!(Config::from_cli("/tmp/l.db", args).is_err());

        let mut args = with_credentials(&[]);
        args.client_secret = Some("  ".into());
        assert!(Config::from_cli("/tmp/l.db", args).is_err());
    }

    #[test]
    fn test_zero_interval_only_allowed_with_once() {
        assert!(Config::from_cli("/tmp/l.db", with_credentials(&["--interval", "0"])).is_err());
        assert!(
            Config::from_cli("/tmp/l.db", with_credentials(&["--interval", "0", "--once"])).is_ok()
        );
    }

    #[test]
    fn test_endpoint_overrides() {
        let cfg = Config::from_cli(
            "/tmp/l.db",
            with_credentials(&[
                "--token-url",
                "http://127.0.0.1:9/token",
                "--recently-played-url",
                "http://127.0.0.1:9/recent",
            ]),
        )
        .unwrap();
        assert_eq!(cfg.endpoints.token, "http://127.0.0.1:9/token");
        assert_eq!(cfg.endpoints.recently_played, "http://127.0.0.1:9/recent");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cfg = Config::from_cli("/tmp/l.db", with_credentials(&[])).unwrap();
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("secret\""));
        assert!(debug.contains("<redacted>"));
    }
}
