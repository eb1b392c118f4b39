use serde::Deserialize;

/// Response from the accounts `/api/token` endpoint.
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Only present when Spotify rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Response from `/v1/me/player/recently-played`.
#[derive(Debug, Deserialize)]
pub struct RecentlyPlayedResponse {
    #[serde(default)]
    pub items: Vec<PlayHistoryItem>,
}

/// One entry of the play history, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayHistoryItem {
    /// Absent or null for ads and some local files.
    #[serde(default)]
    pub track: Option<TrackRef>,
    /// Kept optional so one malformed item cannot fail the whole page.
    #[serde(default)]
    pub played_at: Option<String>,
}

/// The subset of a track object the worker stores.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrackRef {
    /// Null for local files.
    #[serde(default)]
    pub id: Option<String>,
}

impl PlayHistoryItem {
    /// The track id, if this item refers to a catalog track.
    pub fn track_id(&self) -> Option<&str> {
        self.track
            .as_ref()
            .and_then(|t| t.id.as_deref())
            .filter(|id| !id.is_empty())
    }
}
