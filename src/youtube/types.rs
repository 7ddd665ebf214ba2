//! YouTube Data API v3 response types (the subset this adapter reads).

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
pub struct SearchItem {
    pub id: SearchResultId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultId {
    pub video_id: Option<String>,
    pub channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideosResponse {
    #[serde(default)]
    pub items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
    pub live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamingDetails {
    pub active_live_chat_id: Option<String>,
}

/// One page of live chat messages plus the cursor and cadence for the next
/// poll.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPage {
    pub next_page_token: Option<String>,
    pub polling_interval_millis: Option<u64>,
    #[serde(default)]
    pub items: Vec<ChatItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatItem {
    pub snippet: Option<ChatSnippet>,
    pub author_details: Option<AuthorDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnippet {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub display_message: Option<String>,
    /// Structured text/emoji runs, present on newer payloads.
    #[serde(default)]
    pub message_parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    pub emoji: Option<EmojiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmojiPart {
    pub image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorDetails {
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_chat_owner: bool,
    #[serde(default)]
    pub is_chat_moderator: bool,
    #[serde(default)]
    pub is_chat_sponsor: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_page_parses_cursor_and_cadence() {
        let body = r#"{
            "nextPageToken": "abc",
            "pollingIntervalMillis": 5000,
            "items": [{
                "snippet": {"type": "textMessageEvent", "displayMessage": "hi"},
                "authorDetails": {"displayName": "Nana", "isChatOwner": true}
            }]
        }"#;
        let page: ChatPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
        assert_eq!(page.polling_interval_millis, Some(5000));
        assert_eq!(page.items.len(), 1);
        let author = page.items[0].author_details.as_ref().unwrap();
        assert!(author.is_chat_owner);
        assert!(!author.is_chat_moderator);
    }
}
