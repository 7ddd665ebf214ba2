//! The unified chat message shape shared by every source adapter.

use serde::Serialize;

/// Which upstream a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    YouTube,
}

/// A normalized chat message as relayed to subscribers.
///
/// `text` is rendered HTML-safe markup, never raw user input. Messages are
/// immutable once constructed; after posting, the hub owns them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub platform: Platform,
    /// Display name, falling back to the login handle, then "anon".
    pub user: String,
    /// Escaped markup with inline emote/badge images.
    pub text: String,
    pub color: String,
    /// Badge image URLs (Twitch) or glyphs (YouTube), in display order.
    pub badges: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Platform::Twitch).unwrap(), "\"twitch\"");
        assert_eq!(serde_json::to_string(&Platform::YouTube).unwrap(), "\"youtube\"");
    }
}
