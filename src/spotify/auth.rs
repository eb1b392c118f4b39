//! Refresh-token grant against the Spotify accounts service.

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;

use super::endpoints::Endpoints;
use super::error::{SpotifyError, Stage};
use super::read_json;
use super::responses::TokenResponse;
use crate::retry::{retry_with_backoff, RetryAction, RetryConfig};
use crate::store::TokenPair;

/// Process-wide application credentials issued by Spotify.
#[derive(Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    /// `Basic base64(client_id:client_secret)`
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Exchanges a refresh token for a fresh access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// On success the returned pair always carries a refresh token: the
    /// rotated one if upstream sent one, otherwise `refresh_token` itself.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SpotifyError>;
}

pub struct HttpTokenRefresher {
    client: Client,
    credentials: ClientCredentials,
    token_url: String,
    retry: RetryConfig,
}

impl HttpTokenRefresher {
    pub fn new(
        client: Client,
        credentials: ClientCredentials,
        endpoints: &Endpoints,
        retry: RetryConfig,
    ) -> Self {
        Self {
            client,
            credentials,
            token_url: endpoints.token.clone(),
            retry,
        }
    }

    async fn refresh_once(&self, refresh_token: &str) -> Result<TokenPair, SpotifyError> {
        let response = self
            .client
            .post(&self.token_url)
            .header(AUTHORIZATION, self.credentials.basic_auth_header())
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|source| SpotifyError::Transport {
                stage: Stage::Refresh,
                source,
            })?;

        let body: TokenResponse = read_json(response, Stage::Refresh).await?;
        // Storing an empty token would leave the user unprovisioned.
        if body.access_token.is_empty() {
            return Err(SpotifyError::EmptyAccessToken);
        }
        if let Some(expires_in) = body.expires_in {
            tracing::debug!(expires_in, "Access token refreshed");
        }

        let refresh_token = body
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| refresh_token.to_string());
        Ok(TokenPair::new(body.access_token, refresh_token))
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, SpotifyError> {
        if refresh_token.is_empty() {
            return Err(SpotifyError::EmptyRefreshToken);
        }
        retry_with_backoff(
            &self.retry,
            "token refresh",
            |e: &SpotifyError| {
                if e.is_retryable() {
                    RetryAction::Retry
                } else {
                    RetryAction::Abort
                }
            },
            || self.refresh_once(refresh_token),
        )
        .await
    }
}
