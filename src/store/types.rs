//! Types for the listen store.

use std::fmt;

use chrono::{DateTime, Utc};

/// Opaque user identity (the `users.id` row id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An access/refresh credential pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .finish()
    }
}

/// A user row as seen by the sync loop.
#[derive(Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub id: UserId,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl UserCredentials {
    /// A user is provisioned once an access token has been stored for them.
    pub fn is_provisioned(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("id", &self.id)
            .field("access_token", &self.access_token.as_deref().map(redact))
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .finish()
    }
}

/// Shorten a secret to a log-safe prefix.
pub fn redact(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}…")
}

/// One play of one track by one user. `(user_id, track_id, played_at)` is the
/// natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenEvent {
    pub user_id: UserId,
    pub track_id: String,
    pub played_at: DateTime<Utc>,
}

/// Counters for one sync cycle, written to `sync_runs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRunStats {
    pub users_seen: u64,
    pub users_synced: u64,
    pub users_skipped: u64,
    pub listens_recorded: u64,
    pub interrupted: bool,
}

/// The most recent row of `sync_runs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRunRecord {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stats: SyncRunStats,
}

/// Summary of the store contents, for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    pub total_users: u64,
    pub provisioned_users: u64,
    pub total_listens: u64,
    pub last_run: Option<SyncRunRecord>,
}
