//! One sync cycle over every known user.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::spotify::{ActivityFetcher, PlayHistoryItem, SpotifyError, TokenRefresher};
use crate::store::{
    CredentialStore, ListenEvent, ListenRecorder, StoreError, SyncHistory, SyncRunStats, TokenPair,
    UserCredentials, UserId,
};

/// Why a user was not synced this cycle.
#[derive(Debug)]
pub enum SkipReason {
    /// No access token on record; the user never completed authorization.
    Unprovisioned,
    /// Access token present but nothing to refresh it with.
    MissingRefreshToken,
    RefreshFailed(SpotifyError),
    /// A fresh token could not be persisted, so it is not used.
    CredentialUpdateFailed(StoreError),
    FetchFailed(SpotifyError),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Unprovisioned => f.write_str("no access token on record"),
            SkipReason::MissingRefreshToken => f.write_str("no refresh token on record"),
            SkipReason::RefreshFailed(e) => write!(f, "{e}"),
            SkipReason::CredentialUpdateFailed(e) => write!(f, "storing refreshed token: {e}"),
            SkipReason::FetchFailed(e) => write!(f, "{e}"),
        }
    }
}

/// Result of processing one user.
#[derive(Debug)]
pub enum UserOutcome {
    Synced {
        token_rotated: bool,
        fetched: usize,
        /// Rows newly written; re-delivered plays are not counted.
        recorded: usize,
        /// Items without a catalog track or with an unreadable timestamp.
        ignored: usize,
        failed: usize,
    },
    Skipped(SkipReason),
}

/// Everything one cycle did, in user order.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub outcomes: Vec<(UserId, UserOutcome)>,
    pub interrupted: bool,
}

impl CycleReport {
    pub fn stats(&self) -> SyncRunStats {
        let mut stats = SyncRunStats {
            users_seen: self.outcomes.len() as u64,
            interrupted: self.interrupted,
            ..SyncRunStats::default()
        };
        for (_, outcome) in &self.outcomes {
            match outcome {
                UserOutcome::Synced { recorded, .. } => {
                    stats.users_synced += 1;
                    stats.listens_recorded += *recorded as u64;
                }
                UserOutcome::Skipped(_) => stats.users_skipped += 1,
            }
        }
        stats
    }

    /// One-line summary for logs and systemd status.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "{} users: {} synced, {} skipped, {} new listens{}",
            stats.users_seen,
            stats.users_synced,
            stats.users_skipped,
            stats.listens_recorded,
            if stats.interrupted { " (interrupted)" } else { "" }
        )
    }
}

/// Drives refresh → fetch → record for each user, one user at a time.
///
/// Every failure is contained to the user (or single listen) it belongs to;
/// only a failure to list users ends a cycle early.
pub struct SyncOrchestrator {
    credentials: Arc<dyn CredentialStore>,
    recorder: Arc<dyn ListenRecorder>,
    history: Option<Arc<dyn SyncHistory>>,
    refresher: Arc<dyn TokenRefresher>,
    fetcher: Arc<dyn ActivityFetcher>,
}

impl SyncOrchestrator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        recorder: Arc<dyn ListenRecorder>,
        refresher: Arc<dyn TokenRefresher>,
        fetcher: Arc<dyn ActivityFetcher>,
    ) -> Self {
        Self {
            credentials,
            recorder,
            history: None,
            refresher,
            fetcher,
        }
    }

    /// Record each cycle in `sync_runs`.
    pub fn with_history(mut self, history: Arc<dyn SyncHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Run one full pass over all users.
    ///
    /// `shutdown` is checked between users; an in-flight user always
    /// finishes.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport, StoreError> {
        let run_id = match &self.history {
            Some(history) => match history.start_sync_run().await {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to record sync run start");
                    None
                }
            },
            None => None,
        };

        let users = match self.credentials.list_users().await {
            Ok(users) => users,
            Err(e) => {
                // Close the run so it does not read as still in progress.
                let aborted = SyncRunStats {
                    interrupted: true,
                    ..SyncRunStats::default()
                };
                self.finish_run(run_id, &aborted).await;
                return Err(e);
            }
        };
        tracing::info!(users = users.len(), "Starting sync cycle");

        let mut report = CycleReport::default();
        for user in users {
            if shutdown.is_cancelled() {
                tracing::info!("Shutdown requested, ending cycle early");
                report.interrupted = true;
                break;
            }
            let outcome = self.sync_user(&user).await;
            log_outcome(user.id, &outcome);
            report.outcomes.push((user.id, outcome));
        }

        tracing::info!("Sync cycle finished: {}", report.summary());
        self.finish_run(run_id, &report.stats()).await;

        Ok(report)
    }

    async fn finish_run(&self, run_id: Option<i64>, stats: &SyncRunStats) {
        if let (Some(history), Some(run_id)) = (&self.history, run_id) {
            if let Err(e) = history.complete_sync_run(run_id, stats).await {
                tracing::warn!(error = %e, "Failed to record sync run completion");
            }
        }
    }

    async fn sync_user(&self, user: &UserCredentials) -> UserOutcome {
        if !user.is_provisioned() {
            return UserOutcome::Skipped(SkipReason::Unprovisioned);
        }
        let stored_access = user.access_token.as_deref().unwrap_or_default();
        let Some(stored_refresh) = user.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
            return UserOutcome::Skipped(SkipReason::MissingRefreshToken);
        };

        let fresh = match self.refresher.refresh(stored_refresh).await {
            Ok(pair) => pair,
            Err(e) => return UserOutcome::Skipped(SkipReason::RefreshFailed(e)),
        };

        let token_rotated =
            fresh.access_token != stored_access || fresh.refresh_token != stored_refresh;
        if token_rotated {
            // The stored pair must match the token about to be used.
            if let Err(e) = self.credentials.update_credentials(user.id, &fresh).await {
                return UserOutcome::Skipped(SkipReason::CredentialUpdateFailed(e));
            }
            tracing::debug!(user_id = %user.id, "Stored refreshed credentials");
        }

        let TokenPair { access_token, .. } = fresh;
        let items = match self.fetcher.fetch_recent(&access_token).await {
            Ok(items) => items,
            Err(e) => return UserOutcome::Skipped(SkipReason::FetchFailed(e)),
        };

        let fetched = items.len();
        let events = normalize(user.id, &items);
        let ignored = fetched - events.len();

        let mut recorded = 0;
        let mut failed = 0;
        for event in &events {
            match self.recorder.record(event).await {
                Ok(true) => recorded += 1,
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        user_id = %user.id,
                        track_id = %event.track_id,
                        played_at = %event.played_at,
                        error = %e,
                        "Failed to record listen"
                    );
                }
            }
        }

        UserOutcome::Synced {
            token_rotated,
            fetched,
            recorded,
            ignored,
            failed,
        }
    }
}

/// Turn a page of play history into listen events, dropping items that have
/// no catalog track or an unreadable `played_at`.
pub fn normalize(user_id: UserId, items: &[PlayHistoryItem]) -> Vec<ListenEvent> {
    items
        .iter()
        .filter_map(|item| {
            let track_id = item.track_id()?;
            let Some(raw) = item.played_at.as_deref() else {
                tracing::warn!(user_id = %user_id, track_id, "Ignoring play without timestamp");
                return None;
            };
            let played_at = match DateTime::parse_from_rfc3339(raw) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(e) => {
                    tracing::warn!(
                        user_id = %user_id,
                        track_id,
                        played_at = raw,
                        error = %e,
                        "Ignoring play with unparsable timestamp"
                    );
                    return None;
                }
            };
            Some(ListenEvent {
                user_id,
                track_id: track_id.to_string(),
                played_at,
            })
        })
        .collect()
}

fn log_outcome(user_id: UserId, outcome: &UserOutcome) {
    match outcome {
        UserOutcome::Synced {
            token_rotated,
            fetched,
            recorded,
            ignored,
            failed,
        } => {
            tracing::info!(
                user_id = %user_id,
                token_rotated,
                fetched,
                recorded,
                ignored,
                failed,
                "User synced"
            );
        }
        UserOutcome::Skipped(SkipReason::Unprovisioned) => {
            tracing::info!(user_id = %user_id, "Skipping user: no access token on record");
        }
        UserOutcome::Skipped(reason) => {
            let (stage, transport) = match reason {
                SkipReason::FetchFailed(e) => ("fetch", e.is_transport()),
                SkipReason::RefreshFailed(e) => ("refresh", e.is_transport()),
                SkipReason::CredentialUpdateFailed(_) => ("store", false),
                _ => ("refresh", false),
            };
            tracing::warn!(user_id = %user_id, stage, transport, "Skipping user: {reason}");
        }
    }
}
