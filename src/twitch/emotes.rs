//! Extra-emote catalogs: a static local file plus the BetterTTV and 7TV
//! channel catalogs. Every source degrades to an empty contribution on
//! failure; none of them can abort adapter startup.

use std::path::Path;

use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use crate::render::ExtraEmoteMap;

use super::error::{TwitchError, TwitchResult};

const BTTV_USER_URL: &str = "https://api.betterttv.net/3/cached/users/twitch";
const BTTV_CDN: &str = "https://cdn.betterttv.net/emote";
const SEVENTV_BASE: &str = "https://7tv.io/v3";
const SEVENTV_CDN: &str = "https://cdn.7tv.app/emote";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BttvUser {
    #[serde(default)]
    channel_emotes: Vec<BttvEmote>,
    #[serde(default)]
    shared_emotes: Vec<BttvEmote>,
}

#[derive(Debug, Deserialize)]
struct BttvEmote {
    id: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct SevenTvUser {
    emote_set: Option<SevenTvEmoteSetRef>,
}

#[derive(Debug, Deserialize)]
struct SevenTvEmoteSetRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SevenTvEmoteSet {
    #[serde(default)]
    emotes: Vec<SevenTvEmote>,
}

#[derive(Debug, Deserialize)]
struct SevenTvEmote {
    id: String,
    name: String,
}

/// Read the static token -> URL catalog from disk. Missing or invalid files
/// contribute nothing.
pub async fn load_static_catalog(path: &Path) -> ExtraEmoteMap {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!("twitch: static emote catalog {} is invalid: {e}", path.display());
                ExtraEmoteMap::new()
            }
        },
        Err(e) => {
            debug!("twitch: no static emote catalog at {}: {e}", path.display());
            ExtraEmoteMap::new()
        }
    }
}

/// Channel emotes from BetterTTV (channel + shared).
pub async fn bttv_channel(http: &Client, channel_id: &str) -> TwitchResult<ExtraEmoteMap> {
    let url = format!("{BTTV_USER_URL}/{channel_id}");
    let user: BttvUser = fetch_json(http, &url).await?;

    let mut map = ExtraEmoteMap::new();
    for emote in user.channel_emotes.into_iter().chain(user.shared_emotes) {
        map.insert(emote.code, format!("{BTTV_CDN}/{}/1x", emote.id));
    }
    Ok(map)
}

/// Channel emotes from the channel's active 7TV emote set.
pub async fn seventv_channel(http: &Client, channel_id: &str) -> TwitchResult<ExtraEmoteMap> {
    let user_url = format!("{SEVENTV_BASE}/users/twitch/{channel_id}");
    let user: SevenTvUser = fetch_json(http, &user_url).await?;

    let Some(set_ref) = user.emote_set else {
        return Ok(ExtraEmoteMap::new());
    };

    let set_url = format!("{SEVENTV_BASE}/emote-sets/{}", set_ref.id);
    let set: SevenTvEmoteSet = fetch_json(http, &set_url).await?;

    let mut map = ExtraEmoteMap::new();
    for emote in set.emotes {
        map.insert(emote.name, format!("{SEVENTV_CDN}/{}/1x", emote.id));
    }
    Ok(map)
}

/// Merge the static catalog with both channel providers. Channel entries win
/// on key collision; a failed provider contributes nothing.
pub async fn build_extra_map(
    http: &Client,
    channel_id: &str,
    static_path: Option<&Path>,
) -> ExtraEmoteMap {
    let static_map = match static_path {
        Some(path) => load_static_catalog(path).await,
        None => ExtraEmoteMap::new(),
    };

    let (bttv, seventv) = tokio::join!(
        bttv_channel(http, channel_id),
        seventv_channel(http, channel_id)
    );

    let mut map = static_map;
    match bttv {
        Ok(channel) => merge_channel_emotes(&mut map, channel),
        Err(e) => warn!("twitch: BetterTTV emote fetch failed: {e}"),
    }
    match seventv {
        Ok(channel) => merge_channel_emotes(&mut map, channel),
        Err(e) => warn!("twitch: 7TV emote fetch failed: {e}"),
    }
    map
}

fn merge_channel_emotes(map: &mut ExtraEmoteMap, channel: ExtraEmoteMap) {
    map.extend(channel);
}

async fn fetch_json<T: serde::de::DeserializeOwned>(http: &Client, url: &str) -> TwitchResult<T> {
    let response = http.get(url).send().await?;
    let status = response.status();
    if status.is_success() {
        response
            .json()
            .await
            .map_err(|e| TwitchError::Parse(e.to_string()))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(TwitchError::Api {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn channel_entries_override_static_on_collision() {
        let mut map: ExtraEmoteMap = [
            ("catJAM".to_string(), "https://static/cat".to_string()),
            ("LOCAL".to_string(), "https://static/local".to_string()),
        ]
        .into_iter()
        .collect();

        let channel: ExtraEmoteMap =
            [("catJAM".to_string(), "https://cdn.7tv.app/emote/x/1x".to_string())]
                .into_iter()
                .collect();

        merge_channel_emotes(&mut map, channel);
        assert_eq!(map["catJAM"], "https://cdn.7tv.app/emote/x/1x");
        assert_eq!(map["LOCAL"], "https://static/local");
    }

    #[tokio::test]
    async fn static_catalog_reads_key_value_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"OMEGALUL": "https://example.com/omega"}}"#).unwrap();

        let map = load_static_catalog(file.path()).await;
        assert_eq!(map["OMEGALUL"], "https://example.com/omega");
    }

    #[tokio::test]
    async fn missing_static_catalog_is_empty_not_fatal() {
        let map = load_static_catalog(Path::new("/nonexistent/emotes.json")).await;
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn invalid_static_catalog_is_empty_not_fatal() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let map = load_static_catalog(file.path()).await;
        assert!(map.is_empty());
    }
}
