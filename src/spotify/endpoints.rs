//! Spotify URLs used by the sync worker. Overridable so tests and proxies
//! can point the client elsewhere.

pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_RECENTLY_PLAYED_URL: &str =
    "https://api.spotify.com/v1/me/player/recently-played";

/// The Web API caps `recently-played` at 50 items per request.
pub const MAX_PAGE_LIMIT: u8 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub token: String,
    pub recently_played: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token: DEFAULT_TOKEN_URL.to_string(),
            recently_played: DEFAULT_RECENTLY_PLAYED_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Point both endpoints at one base URL (mock servers).
    #[cfg(test)]
    pub fn with_base_url(base: &str) -> Self {
        Self {
            token: format!("{base}/api/token"),
            recently_played: format!("{base}/v1/me/player/recently-played"),
        }
    }
}
