//! YouTube Data API v3 HTTP client.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::error::{YouTubeError, YouTubeResult};
use super::types::{ChatPage, SearchResponse, VideosResponse};

const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Error body shape returned by Google APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

/// Client for the YouTube Data API, authenticated with an API key.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: Client,
    api_key: String,
}

impl YouTubeClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            api_key: api_key.into(),
        }
    }

    /// Look up a channel id by free-text query (handle or name).
    pub async fn find_channel(&self, query: &str) -> YouTubeResult<Option<String>> {
        let response: SearchResponse = self
            .get_json(
                &format!("{API_BASE}/search"),
                &[
                    ("part", "id"),
                    ("type", "channel"),
                    ("maxResults", "1"),
                    ("q", query),
                ],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.id.channel_id))
    }

    /// Find the channel's currently-live video, if any.
    pub async fn find_live_video(&self, channel_id: &str) -> YouTubeResult<Option<String>> {
        let response: SearchResponse = self
            .get_json(
                &format!("{API_BASE}/search"),
                &[
                    ("part", "id"),
                    ("channelId", channel_id),
                    ("eventType", "live"),
                    ("type", "video"),
                    ("maxResults", "1"),
                ],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.id.video_id))
    }

    /// Fetch the live chat id attached to a live video.
    pub async fn live_chat_id(&self, video_id: &str) -> YouTubeResult<Option<String>> {
        let response: VideosResponse = self
            .get_json(
                &format!("{API_BASE}/videos"),
                &[("part", "liveStreamingDetails"), ("id", video_id)],
            )
            .await?;
        Ok(response
            .items
            .into_iter()
            .next()
            .and_then(|item| item.live_streaming_details)
            .and_then(|details| details.active_live_chat_id))
    }

    /// List new chat messages from the given cursor.
    pub async fn list_chat_messages(
        &self,
        live_chat_id: &str,
        page_token: Option<&str>,
    ) -> YouTubeResult<ChatPage> {
        let mut params = vec![
            ("part", "snippet,authorDetails"),
            ("liveChatId", live_chat_id),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        self.get_json(&format!("{API_BASE}/liveChatMessages"), &params)
            .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> YouTubeResult<T> {
        let response = self
            .http
            .get(url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| YouTubeError::Parse(e.to_string()))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_api_error(status.as_u16(), &body))
        }
    }
}

/// Split quota exhaustion out from other API failures, using the error
/// reason Google embeds in the body.
fn classify_api_error(status: u16, body: &str) -> YouTubeError {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) {
        let reason = envelope
            .error
            .errors
            .first()
            .map(|e| e.reason.clone())
            .unwrap_or_default();
        if matches!(
            reason.as_str(),
            "quotaExceeded" | "rateLimitExceeded" | "dailyLimitExceeded"
        ) {
            return YouTubeError::QuotaExhausted { reason };
        }
        let message = if envelope.error.message.is_empty() {
            body.to_string()
        } else {
            envelope.error.message
        };
        return YouTubeError::Api { status, message };
    }
    YouTubeError::Api {
        status,
        message: body.to_string(),
    }
}
