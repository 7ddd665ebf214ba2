//! Twitch chat adapter.
//!
//! Maintains a persistent IRC connection to one channel and normalizes every
//! PRIVMSG into a [`ChatMessage`]. Session metadata (app token, channel id,
//! badge map, extra-emote map) is resolved once at startup; the underlying
//! `twitch-irc` transport owns reconnect and connection backoff.

mod client;
mod emotes;
mod error;
mod types;

pub use client::{AppTokenCache, HelixClient};
pub use error::{TwitchError, TwitchResult};
pub use types::BadgeMap;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use twitch_irc::login::StaticLoginCredentials;
use twitch_irc::message::{Badge, Emote, RGBColor, ServerMessage};
use twitch_irc::{ClientConfig, SecureTCPTransport, TwitchIRCClient};

use crate::message::{ChatMessage, Platform};
use crate::render::{self, EmoteSpan, ExtraEmoteMap};
use crate::ws::ChatHub;

/// Color used when the sender never picked one.
const DEFAULT_COLOR: &str = "#9146FF";

#[derive(Debug, Clone)]
pub struct TwitchChatConfig {
    /// Channel login name, with or without a leading '#'.
    pub channel: String,
    pub client_id: String,
    pub client_secret: String,
    /// Login to authenticate as; anonymous read-only when absent.
    pub login: Option<String>,
    pub user_token: Option<String>,
    /// Path to the static extra-emote catalog.
    pub extra_emotes_path: Option<PathBuf>,
}

pub struct TwitchAdapter {
    config: TwitchChatConfig,
    hub: Arc<ChatHub>,
    tokens: Arc<AppTokenCache>,
}

impl TwitchAdapter {
    pub fn new(config: TwitchChatConfig, hub: Arc<ChatHub>, tokens: Arc<AppTokenCache>) -> Self {
        Self {
            config,
            hub,
            tokens,
        }
    }

    /// Run the adapter for the process lifetime.
    ///
    /// Any startup failure (credential exchange, channel resolution) is
    /// returned to the caller; there is no retry loop at this layer.
    pub async fn run(self) -> Result<()> {
        let channel = normalize_channel(&self.config.channel);

        let token = self
            .tokens
            .get_or_exchange(&self.config.client_id, &self.config.client_secret)
            .await
            .context("exchanging twitch app credentials")?;
        let helix = HelixClient::new(self.config.client_id.clone(), token);

        let channel_id = helix
            .user_id(&channel)
            .await
            .context("resolving twitch channel id")?
            .ok_or_else(|| anyhow!("twitch channel '{channel}' not found"))?;
        debug!("twitch: channel #{channel} has id {channel_id}");

        let badges = fetch_badge_map(&helix, &channel_id).await;
        let extra =
            emotes::build_extra_map(helix.http(), &channel_id, self.config.extra_emotes_path.as_deref())
                .await;
        info!(
            "twitch: session ready for #{channel} ({} extra emotes)",
            extra.len()
        );

        let client_config = match (self.config.login.clone(), self.config.user_token.clone()) {
            (Some(login), token) => ClientConfig::new_simple(StaticLoginCredentials::new(login, token)),
            _ => ClientConfig::default(),
        };
        let (mut incoming, client) =
            TwitchIRCClient::<SecureTCPTransport, StaticLoginCredentials>::new(client_config);
        client
            .join(channel.clone())
            .context("joining twitch channel")?;
        info!("twitch: joined #{channel}");

        while let Some(message) = incoming.recv().await {
            let ServerMessage::Privmsg(msg) = message else {
                continue;
            };
            // Skip our own echoes when running authenticated.
            if self.config.login.as_deref() == Some(msg.sender.login.as_str()) {
                continue;
            }

            let chat = ChatMessage {
                platform: Platform::Twitch,
                user: display_user(&msg.sender.name, &msg.sender.login),
                text: render_message(&msg.message_text, &msg.emotes, &extra),
                color: format_color(msg.name_color),
                badges: resolve_badges(&msg.badges, &badges),
            };
            self.hub.post(chat).await;
        }

        info!("twitch: message stream for #{channel} ended");
        Ok(())
    }
}

fn normalize_channel(raw: &str) -> String {
    raw.trim().trim_start_matches('#').to_lowercase()
}

/// Fetch the global and channel badge listings, tolerating the loss of
/// either half.
async fn fetch_badge_map(helix: &HelixClient, channel_id: &str) -> BadgeMap {
    let mut map = BadgeMap::default();
    let (global, channel) = tokio::join!(helix.global_badges(), helix.channel_badges(channel_id));
    match global {
        Ok(sets) => map.ingest(sets),
        Err(e) => log::warn!("twitch: global badge fetch failed: {e}"),
    }
    match channel {
        Ok(sets) => map.ingest(sets),
        Err(e) => log::warn!("twitch: channel badge fetch failed: {e}"),
    }
    map
}

fn display_user(name: &str, login: &str) -> String {
    if !name.is_empty() {
        name.to_string()
    } else if !login.is_empty() {
        login.to_string()
    } else {
        "anon".to_string()
    }
}

fn format_color(color: Option<RGBColor>) -> String {
    match color {
        Some(c) => format!("#{:02X}{:02X}{:02X}", c.r, c.g, c.b),
        None => DEFAULT_COLOR.to_string(),
    }
}

/// Resolve badge set/version pairs to image URLs, silently dropping pairs
/// the map does not know.
fn resolve_badges(badges: &[Badge], map: &BadgeMap) -> Vec<String> {
    badges
        .iter()
        .filter_map(|b| map.image_url(&b.name, &b.version))
        .map(str::to_owned)
        .collect()
}

fn render_message(text: &str, emotes: &[Emote], extra: &ExtraEmoteMap) -> String {
    let spans: Vec<EmoteSpan> = emotes
        .iter()
        .map(|e| EmoteSpan {
            id: e.id.clone(),
            range: e.char_range.clone(),
        })
        .collect();
    let (markup, consumed) = render::render_emotes(text, &spans);
    render::inject_extra(&markup, extra, &consumed)
}
