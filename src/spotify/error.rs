use thiserror::Error;

/// Which upstream call produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Refresh,
    Fetch,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Refresh => "token refresh",
            Stage::Fetch => "recently-played fetch",
        })
    }
}

/// Errors from the Spotify accounts and Web API endpoints.
///
/// Transport faults (timeouts, connection errors) and upstream rejections
/// are both recoverable; they are kept apart for logging and retry
/// classification.
#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("{stage} failed: {source}")]
    Transport {
        stage: Stage,
        source: reqwest::Error,
    },

    #[error("{stage} rejected (HTTP {status}): {message}")]
    Rejected {
        stage: Stage,
        status: u16,
        message: String,
    },

    #[error("{stage} returned an unreadable body: {source}")]
    Decode {
        stage: Stage,
        source: serde_json::Error,
    },

    #[error("refresh token is empty")]
    EmptyRefreshToken,

    #[error("token refresh returned an empty access token")]
    EmptyAccessToken,
}

impl SpotifyError {
    /// Whether this error is transient and worth retrying within a cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            SpotifyError::Transport { .. } => true,
            SpotifyError::Rejected { status, .. } => *status == 429 || *status >= 500,
            SpotifyError::Decode { .. }
            | SpotifyError::EmptyRefreshToken
            | SpotifyError::EmptyAccessToken => false,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, SpotifyError::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(status: u16) -> SpotifyError {
        SpotifyError::Rejected {
            stage: Stage::Fetch,
            status,
            message: "x".into(),
        }
    }

    #[test]
    fn test_client_errors_not_retryable() {
        assert!(!rejected(400).is_retryable());
        assert!(!rejected(401).is_retryable());
        assert!(!rejected(403).is_retryable());
    }

    #[test]
    fn test_rate_limit_and_server_errors_retryable() {
        assert!(rejected(429).is_retryable());
        assert!(rejected(500).is_retryable());
        assert!(rejected(503).is_retryable());
    }

    #[test]
    fn test_decode_not_retryable() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e = SpotifyError::Decode {
            stage: Stage::Refresh,
            source,
        };
        assert!(!e.is_retryable());
        assert!(!e.is_transport());
    }

    #[tokio::test]
    async fn test_connection_error_is_retryable_transport() {
        let source = reqwest::Client::new()
            .get("http://127.0.0.1:1")
            .send()
            .await
            .unwrap_err();
        let e = SpotifyError::Transport {
            stage: Stage::Refresh,
            source,
        };
        assert!(e.is_retryable());
        assert!(e.is_transport());
        assert!(e.to_string().starts_with("token refresh failed"));
    }

    #[test]
    fn test_rejected_display() {
        assert_eq!(
            rejected(401).to_string(),
            "recently-played fetch rejected (HTTP 401): x"
        );
    }
}
