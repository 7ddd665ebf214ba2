//! YouTube Data API error types.

use thiserror::Error;

/// Result type for YouTube API operations.
pub type YouTubeResult<T> = Result<T, YouTubeError>;

/// Errors that can occur while polling the YouTube Data API.
///
/// Quota exhaustion is kept distinct from other API failures because its
/// recovery time is policy-driven (tiered cooldowns) rather than a generic
/// retry.
#[derive(Debug, Error)]
pub enum YouTubeError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The API refused the call because the quota is spent.
    #[error("quota exhausted ({reason})")]
    QuotaExhausted { reason: String },

    /// Any other non-success API response.
    #[error("YouTube API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Failed to parse a response body.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The configured channel reference does not resolve to a channel.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
}

impl YouTubeError {
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExhausted { .. })
    }
}
