//! Helix API response types and the per-session badge map.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct UsersResponse {
    #[serde(default)]
    pub data: Vec<HelixUser>,
}

#[derive(Debug, Deserialize)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub struct BadgesResponse {
    #[serde(default)]
    pub data: Vec<BadgeSet>,
}

#[derive(Debug, Deserialize)]
pub struct BadgeSet {
    pub set_id: String,
    #[serde(default)]
    pub versions: Vec<BadgeVersion>,
}

#[derive(Debug, Deserialize)]
pub struct BadgeVersion {
    pub id: String,
    pub image_url_1x: String,
}

/// badge-set-id -> version-id -> image URL, built once per session from the
/// global and channel badge listings. Either listing may be missing without
/// affecting entries contributed by the other.
#[derive(Debug, Default)]
pub struct BadgeMap {
    sets: HashMap<String, HashMap<String, String>>,
}

impl BadgeMap {
    /// Fold a badge listing into the map. Later listings extend earlier ones
    /// and override colliding set/version pairs (channel wins over global
    /// when ingested second).
    pub fn ingest(&mut self, sets: Vec<BadgeSet>) {
        for set in sets {
            let versions = self.sets.entry(set.set_id).or_default();
            for version in set.versions {
                versions.insert(version.id, version.image_url_1x);
            }
        }
    }

    pub fn image_url(&self, set_id: &str, version_id: &str) -> Option<&str> {
        self.sets
            .get(set_id)
            .and_then(|versions| versions.get(version_id))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
