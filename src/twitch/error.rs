//! Twitch client error types.

use thiserror::Error;

/// Result type for Twitch API operations.
pub type TwitchResult<T> = Result<T, TwitchError>;

/// Errors that can occur while talking to Twitch or the emote providers.
#[derive(Debug, Error)]
pub enum TwitchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The API returned a non-success status.
    #[error("Twitch API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Credential exchange did not yield a token.
    #[error("credential exchange failed: {0}")]
    TokenExchange(String),

    /// Failed to parse a response body.
    #[error("failed to parse response: {0}")]
    Parse(String),
}
