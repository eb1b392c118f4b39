//! Spotify upstream: the accounts token endpoint and the recently-played
//! endpoint of the Web API.

pub mod activity;
pub mod auth;
pub mod endpoints;
pub mod error;
pub mod responses;

use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

pub use activity::{ActivityFetcher, HttpActivityFetcher};
pub use auth::{ClientCredentials, HttpTokenRefresher, TokenRefresher};
pub use endpoints::Endpoints;
pub use error::{SpotifyError, Stage};
pub use responses::PlayHistoryItem;

const USER_AGENT: &str = concat!("listensync/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client. The timeout bounds every request end to end, so an
/// unresponsive upstream surfaces as a transport error instead of a hang.
pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .timeout(timeout)
        .build()
}

/// Turn a response into `T`, mapping non-success statuses to `Rejected`.
async fn read_json<T: DeserializeOwned>(
    response: Response,
    stage: Stage,
) -> Result<T, SpotifyError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| SpotifyError::Transport { stage, source })?;

    if !status.is_success() {
        return Err(SpotifyError::Rejected {
            stage,
            status: status.as_u16(),
            message: truncate(&body, 200),
        });
    }

    serde_json::from_str(&body).map_err(|source| SpotifyError::Decode { stage, source })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
        assert_eq!(truncate("", 3), "");
    }

    #[test]
    fn test_http_client_builds() {
        assert!(http_client(Duration::from_secs(1)).is_ok());
    }
}
