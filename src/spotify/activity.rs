//! Recently-played reads from the Web API.

use async_trait::async_trait;
use reqwest::Client;

use super::endpoints::{Endpoints, MAX_PAGE_LIMIT};
use super::error::{SpotifyError, Stage};
use super::read_json;
use super::responses::{PlayHistoryItem, RecentlyPlayedResponse};
use crate::retry::{retry_with_backoff, RetryAction, RetryConfig};

/// Reads one bounded page of a user's most recent plays.
#[async_trait]
pub trait ActivityFetcher: Send + Sync {
    /// Items come back most recent first, exactly as upstream ordered them.
    async fn fetch_recent(&self, access_token: &str)
        -> Result<Vec<PlayHistoryItem>, SpotifyError>;
}

pub struct HttpActivityFetcher {
    client: Client,
    url: String,
    limit: u8,
    retry: RetryConfig,
}

impl HttpActivityFetcher {
    /// `limit` is clamped to `1..=50`.
    pub fn new(client: Client, endpoints: &Endpoints, limit: u8, retry: RetryConfig) -> Self {
        Self {
            client,
            url: endpoints.recently_played.clone(),
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
            retry,
        }
    }

    async fn fetch_once(&self, access_token: &str) -> Result<Vec<PlayHistoryItem>, SpotifyError> {
        let response = self
            .client
            .get(&self.url)
            .bearer_auth(access_token)
            .query(&[("limit", self.limit)])
            .send()
            .await
            .map_err(|source| SpotifyError::Transport {
                stage: Stage::Fetch,
                source,
            })?;

        let page: RecentlyPlayedResponse = read_json(response, Stage::Fetch).await?;
        Ok(page.items)
    }
}

#[async_trait]
impl ActivityFetcher for HttpActivityFetcher {
    async fn fetch_recent(
        &self,
        access_token: &str,
    ) -> Result<Vec<PlayHistoryItem>, SpotifyError> {
        retry_with_backoff(
            &self.retry,
            "recently-played fetch",
            |e: &SpotifyError| {
                if e.is_retryable() {
                    RetryAction::Retry
                } else {
                    RetryAction::Abort
                }
            },
            || self.fetch_once(access_token),
        )
        .await
    }
}
