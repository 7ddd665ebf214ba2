//! YouTube live chat adapter.
//!
//! There is no push channel for YouTube chat, so this adapter runs an
//! explicit two-phase state machine: *Discovering* finds the channel's
//! active live broadcast and its chat id (with a doubling, capped search
//! backoff), *Draining* polls that chat on a server-suggested cadence until
//! any failure sends it back to discovery. Quota failures get tiered
//! cooldowns instead of the generic retry delay.

mod client;
mod error;
mod types;

pub use client::YouTubeClient;
pub use error::{YouTubeError, YouTubeResult};

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::sleep;

use crate::message::{ChatMessage, Platform};
use crate::render;
use crate::ws::ChatHub;

use types::{AuthorDetails, ChatItem, ChatPage, ChatSnippet};

/// Search backoff starts here and resets here on success.
const SEARCH_INTERVAL_FLOOR: Duration = Duration::from_secs(15);
/// Search backoff never exceeds this.
const SEARCH_INTERVAL_CAP: Duration = Duration::from_secs(30 * 60);
/// The server-suggested poll interval is too aggressive for sustained
/// polling; stretch it and keep a floor.
const POLL_MULTIPLIER: u64 = 4;
const POLL_FLOOR: Duration = Duration::from_secs(15);
const DEFAULT_SERVER_INTERVAL_MS: u64 = 5_000;
/// Consecutive quota failures before switching to the long cooldown.
const QUOTA_ERROR_THRESHOLD: u32 = 3;
const QUOTA_COOLDOWN_MEDIUM: Duration = Duration::from_secs(15 * 60);
const QUOTA_COOLDOWN_LONG: Duration = Duration::from_secs(60 * 60);
/// Cooldown for poll failures that are not quota-related.
const GENERIC_COOLDOWN: Duration = Duration::from_secs(30);

static CHANNEL_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)youtube\.com/(channel/|user/|@)?([^/?#]+)").unwrap());

#[derive(Debug, Clone)]
pub struct YouTubeChatConfig {
    /// Channel id, URL, or handle.
    pub channel: String,
    pub api_key: String,
}

/// Process-wide raw-input -> channel-id cache. Entries are never
/// invalidated; channel ids are immutable for the process lifetime.
#[derive(Debug, Default)]
pub struct ChannelIdCache {
    entries: tokio::sync::Mutex<HashMap<String, String>>,
}

impl ChannelIdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, raw: &str) -> Option<String> {
        self.entries.lock().await.get(raw).cloned()
    }

    pub async fn insert(&self, raw: &str, id: &str) {
        self.entries
            .lock()
            .await
            .insert(raw.to_string(), id.to_string());
    }
}

/// Resolve a channel reference (id, URL, or handle) to a canonical channel
/// id, consulting the cache first so the upstream lookup runs at most once
/// per distinct input string.
pub async fn resolve_channel_id<F, Fut>(
    cache: &ChannelIdCache,
    raw: &str,
    lookup: F,
) -> YouTubeResult<String>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = YouTubeResult<Option<String>>>,
{
    if let Some(id) = cache.get(raw).await {
        return Ok(id);
    }
    if let Some(id) = canonical_channel_id(raw) {
        cache.insert(raw, &id).await;
        return Ok(id);
    }
    match lookup(channel_query(raw)).await? {
        Some(id) => {
            cache.insert(raw, &id).await;
            Ok(id)
        }
        None => Err(YouTubeError::ChannelNotFound(raw.to_string())),
    }
}

/// Already-canonical ids pass through untouched.
fn canonical_channel_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (trimmed.starts_with("UC") && !trimmed.contains('/')).then(|| trimmed.to_string())
}

/// Extract the lookup query from a URL or handle.
fn channel_query(raw: &str) -> String {
    let trimmed = raw.trim();
    let segment = CHANNEL_REF_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);
    segment.trim_start_matches('@').to_string()
}

/// The adapter's phase. Exactly one is active at a time; any drain failure
/// falls back to `Discovering` with the backoff reset to its floor.
#[derive(Debug)]
enum Phase {
    Discovering {
        search_interval: Duration,
    },
    Draining {
        live_chat_id: String,
        page_token: Option<String>,
    },
}

pub struct YouTubeAdapter {
    config: YouTubeChatConfig,
    hub: Arc<ChatHub>,
    channel_ids: Arc<ChannelIdCache>,
    running: AtomicBool,
}

impl YouTubeAdapter {
    pub fn new(
        config: YouTubeChatConfig,
        hub: Arc<ChatHub>,
        channel_ids: Arc<ChannelIdCache>,
    ) -> Self {
        Self {
            config,
            hub,
            channel_ids,
            running: AtomicBool::new(false),
        }
    }

    /// Run the adapter for the process lifetime.
    ///
    /// Returns early only on an unresolvable channel reference or a second
    /// concurrent `run` call on the same instance.
    pub async fn run(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            bail!("youtube adapter is already running");
        }

        let client = YouTubeClient::new(self.config.api_key.clone());
        let channel_id = resolve_channel_id(&self.channel_ids, &self.config.channel, |query| {
            let client = client.clone();
            async move { client.find_channel(&query).await }
        })
        .await
        .context("resolving youtube channel")?;
        info!("youtube: watching channel {channel_id}");

        // Consecutive quota-failed polls. Survives rediscovery; only a
        // successful poll (or the long cooldown firing) clears it.
        let mut quota_errors: u32 = 0;
        let mut phase = Phase::Discovering {
            search_interval: SEARCH_INTERVAL_FLOOR,
        };

        loop {
            phase = match phase {
                Phase::Discovering { search_interval } => {
                    match self.discover(&client, &channel_id).await {
                        Some(live_chat_id) => {
                            info!("youtube: live chat detected ({live_chat_id})");
                            Phase::Draining {
                                live_chat_id,
                                page_token: None,
                            }
                        }
                        None => {
                            debug!(
                                "youtube: no live broadcast, searching again in {}s",
                                search_interval.as_secs()
                            );
                            sleep(search_interval).await;
                            Phase::Discovering {
                                search_interval: next_search_interval(search_interval),
                            }
                        }
                    }
                }
                Phase::Draining {
                    live_chat_id,
                    page_token,
                } => {
                    match client
                        .list_chat_messages(&live_chat_id, page_token.as_deref())
                        .await
                    {
                        Ok(page) => {
                            quota_errors = 0;
                            let delay = poll_delay(page.polling_interval_millis);
                            let next_token = page.next_page_token.clone();
                            self.emit_page(page).await;
                            sleep(delay).await;
                            Phase::Draining {
                                live_chat_id,
                                page_token: next_token,
                            }
                        }
                        Err(err) if err.is_quota() => {
                            let (cooldown, remaining) = quota_cooldown(quota_errors + 1);
                            quota_errors = remaining;
                            warn!(
                                "youtube: {err}; cooling down for {}s",
                                cooldown.as_secs()
                            );
                            sleep(cooldown).await;
                            Phase::Discovering {
                                search_interval: SEARCH_INTERVAL_FLOOR,
                            }
                        }
                        Err(err) => {
                            warn!(
                                "youtube: poll failed ({err}); rediscovering in {}s",
                                GENERIC_COOLDOWN.as_secs()
                            );
                            sleep(GENERIC_COOLDOWN).await;
                            Phase::Discovering {
                                search_interval: SEARCH_INTERVAL_FLOOR,
                            }
                        }
                    }
                }
            };
        }
    }

    /// One discovery attempt: live broadcast search, then the chat id
    /// lookup. Any failure is logged and reported as "not live".
    async fn discover(&self, client: &YouTubeClient, channel_id: &str) -> Option<String> {
        let video_id = match client.find_live_video(channel_id).await {
            Ok(Some(video_id)) => video_id,
            Ok(None) => return None,
            Err(e) => {
                warn!("youtube: live broadcast search failed: {e}");
                return None;
            }
        };
        match client.live_chat_id(&video_id).await {
            Ok(Some(chat_id)) => Some(chat_id),
            Ok(None) => {
                debug!("youtube: live video {video_id} has no active chat");
                None
            }
            Err(e) => {
                warn!("youtube: live chat lookup failed: {e}");
                None
            }
        }
    }

    async fn emit_page(&self, page: ChatPage) {
        for item in page.items {
            if let Some(message) = normalize_item(item) {
                self.hub.post(message).await;
            }
        }
    }
}

/// Double the search interval, capped.
fn next_search_interval(current: Duration) -> Duration {
    (current * 2).min(SEARCH_INTERVAL_CAP)
}

/// Stretch the server-suggested cadence and enforce the floor.
fn poll_delay(server_interval_ms: Option<u64>) -> Duration {
    let suggested = server_interval_ms.unwrap_or(DEFAULT_SERVER_INTERVAL_MS);
    Duration::from_millis(suggested * POLL_MULTIPLIER).max(POLL_FLOOR)
}

/// Tiered quota cooldown: a single quota error is often a window edge, so it
/// gets the medium cooldown; hitting the threshold means the quota is truly
/// spent and earns the long cooldown, clearing the counter.
fn quota_cooldown(consecutive: u32) -> (Duration, u32) {
    if consecutive >= QUOTA_ERROR_THRESHOLD {
        (QUOTA_COOLDOWN_LONG, 0)
    } else {
        (QUOTA_COOLDOWN_MEDIUM, consecutive)
    }
}

/// Normalize one chat item, skipping everything that is not a text message.
fn normalize_item(item: ChatItem) -> Option<ChatMessage> {
    let snippet = item.snippet?;
    if snippet.kind.as_deref() != Some("textMessageEvent") {
        return None;
    }
    let author = item.author_details.unwrap_or_default();

    let user = author
        .display_name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "anon".to_string());

    Some(ChatMessage {
        platform: Platform::YouTube,
        user,
        text: render_snippet(&snippet),
        color: author_color(&author).to_string(),
        badges: author_badges(&author),
    })
}

/// Render text/emoji runs when present, otherwise escape the plain display
/// message.
fn render_snippet(snippet: &ChatSnippet) -> String {
    if snippet.message_parts.is_empty() {
        return render::escape(snippet.display_message.as_deref().unwrap_or_default());
    }

    let mut html = String::new();
    for part in &snippet.message_parts {
        match part.kind.as_deref() {
            Some("text") => html.push_str(&render::escape(part.text.as_deref().unwrap_or_default())),
            Some("emoji") => {
                if let Some(url) = part.emoji.as_ref().and_then(|e| e.image_url.as_deref()) {
                    html.push_str(&render::emote_img(url));
                }
            }
            _ => {}
        }
    }
    html
}

fn author_color(author: &AuthorDetails) -> &'static str {
    if author.is_chat_owner {
        "#FFC700"
    } else if author.is_chat_moderator {
        "#00ADEE"
    } else if author.is_chat_sponsor {
        "#22C55E"
    } else {
        "#FF4D4D"
    }
}

fn author_badges(author: &AuthorDetails) -> Vec<String> {
    let mut badges = Vec::new();
    if author.is_chat_owner {
        badges.push("👑".to_string());
    }
    if author.is_chat_moderator {
        badges.push("🛠️".to_string());
    }
    if author.is_chat_sponsor {
        badges.push("🌟".to_string());
    }
    badges
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn search_backoff_doubles_and_caps() {
        let mut interval = SEARCH_INTERVAL_FLOOR;
        let mut previous = Duration::ZERO;
        for _ in 0..16 {
            assert!(interval >= previous, "backoff must never shrink");
            assert!(interval <= SEARCH_INTERVAL_CAP);
            previous = interval;
            interval = next_search_interval(interval);
        }
        assert_eq!(interval, SEARCH_INTERVAL_CAP);
        assert_eq!(next_search_interval(SEARCH_INTERVAL_CAP), SEARCH_INTERVAL_CAP);
    }

    #[test]
    fn poll_delay_stretches_and_floors() {
        // 5s suggested * 4 = 20s, above the floor.
        assert_eq!(poll_delay(Some(5_000)), Duration::from_secs(20));
        // 1s suggested * 4 = 4s, floored to 15s.
        assert_eq!(poll_delay(Some(1_000)), POLL_FLOOR);
        assert_eq!(poll_delay(None), Duration::from_secs(20));
    }

    #[test]
    fn quota_cooldown_is_tiered() {
        assert_eq!(quota_cooldown(1), (QUOTA_COOLDOWN_MEDIUM, 1));
        assert_eq!(quota_cooldown(2), (QUOTA_COOLDOWN_MEDIUM, 2));
        // The third consecutive failure earns the long cooldown and clears
        // the counter.
        assert_eq!(quota_cooldown(3), (QUOTA_COOLDOWN_LONG, 0));
    }

    #[test]
    fn canonical_ids_pass_through() {
        assert_eq!(
            canonical_channel_id(" UCnd5MQmEvD3w8WfZG95xo2g "),
            Some("UCnd5MQmEvD3w8WfZG95xo2g".to_string())
        );
        assert_eq!(canonical_channel_id("@handle"), None);
        assert_eq!(canonical_channel_id("https://youtube.com/UCx"), None);
    }

    #[test]
    fn channel_queries_are_extracted_from_urls_and_handles() {
        assert_eq!(channel_query("https://youtube.com/@nana"), "nana");
        assert_eq!(channel_query("youtube.com/user/nana"), "nana");
        assert_eq!(channel_query("https://www.youtube.com/channel/UCx?si=1"), "UCx");
        assert_eq!(channel_query("@nana"), "nana");
        assert_eq!(channel_query("nana"), "nana");
    }

    #[tokio::test]
    async fn channel_lookup_runs_at_most_once_per_input() {
        let cache = ChannelIdCache::new();
        let lookups = AtomicU32::new(0);

        for _ in 0..3 {
            let id = resolve_channel_id(&cache, "@nana", |_query| {
                lookups.fetch_add(1, Ordering::SeqCst);
                async { Ok(Some("UCresolved".to_string())) }
            })
            .await
            .unwrap();
            assert_eq!(id, "UCresolved");
        }
        assert_eq!(lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn canonical_input_never_hits_the_lookup() {
        let cache = ChannelIdCache::new();
        let id = resolve_channel_id(&cache, "UCabc", |_query| async {
            panic!("lookup must not run for canonical ids")
        })
        .await
        .unwrap();
        assert_eq!(id, "UCabc");
    }

    #[tokio::test]
    async fn unresolvable_channel_is_fatal() {
        let cache = ChannelIdCache::new();
        let err = resolve_channel_id(&cache, "@ghost", |_query| async { Ok(None) })
            .await
            .unwrap_err();
        assert!(matches!(err, YouTubeError::ChannelNotFound(_)));
    }

    fn text_item(kind: &str, message: &str) -> ChatItem {
        ChatItem {
            snippet: Some(ChatSnippet {
                kind: Some(kind.to_string()),
                display_message: Some(message.to_string()),
                message_parts: Vec::new(),
            }),
            author_details: Some(AuthorDetails {
                display_name: Some("Nana".to_string()),
                ..AuthorDetails::default()
            }),
        }
    }

    #[test]
    fn only_text_message_events_are_emitted() {
        assert!(normalize_item(text_item("textMessageEvent", "hi")).is_some());
        assert!(normalize_item(text_item("superChatEvent", "money")).is_none());
        assert!(normalize_item(ChatItem {
            snippet: None,
            author_details: None
        })
        .is_none());
    }

    #[test]
    fn normalized_text_is_escaped() {
        let message = normalize_item(text_item("textMessageEvent", "a<b & c")).unwrap();
        assert_eq!(message.text, "a&lt;b &amp; c");
        assert_eq!(message.user, "Nana");
        assert_eq!(message.color, "#FF4D4D");
        assert!(message.badges.is_empty());
    }

    #[test]
    fn owner_gets_crown_and_gold() {
        let author = AuthorDetails {
            is_chat_owner: true,
            is_chat_moderator: true,
            ..AuthorDetails::default()
        };
        assert_eq!(author_color(&author), "#FFC700");
        assert_eq!(author_badges(&author), vec!["👑", "🛠️"]);
    }

    #[test]
    fn emoji_parts_become_inline_images() {
        let snippet = ChatSnippet {
            kind: Some("textMessageEvent".to_string()),
            display_message: Some("hi :cat:".to_string()),
            message_parts: vec![
                types::MessagePart {
                    kind: Some("text".to_string()),
                    text: Some("hi ".to_string()),
                    emoji: None,
                },
                types::MessagePart {
                    kind: Some("emoji".to_string()),
                    text: None,
                    emoji: Some(types::EmojiPart {
                        image_url: Some("https://yt3.ggpht.com/cat".to_string()),
                    }),
                },
            ],
        };
        let html = render_snippet(&snippet);
        assert!(html.starts_with("hi <img src=\"https://yt3.ggpht.com/cat\""));
    }
}
