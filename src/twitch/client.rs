//! Helix HTTP client and the process-wide app token cache.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use super::error::{TwitchError, TwitchResult};
use super::types::{BadgeSet, BadgesResponse, TokenResponse, UsersResponse};

const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const HELIX_BASE: &str = "https://api.twitch.tv/helix";

/// Exchange client credentials for an application access token.
pub async fn exchange_app_token(client_id: &str, client_secret: &str) -> TwitchResult<String> {
    let http = Client::new();
    let response = http
        .post(TOKEN_URL)
        .query(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("grant_type", "client_credentials"),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TwitchError::TokenExchange(format!("{status}: {body}")));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| TwitchError::Parse(e.to_string()))?;
    Ok(token.access_token)
}

/// Process-wide application token slot.
///
/// Acquire-once, replace-on-next-empty-read: a token handed in at
/// construction (or exchanged on first use) is reused for the process
/// lifetime and never proactively refreshed.
#[derive(Debug)]
pub struct AppTokenCache {
    slot: tokio::sync::Mutex<Option<String>>,
}

impl AppTokenCache {
    pub fn new(initial: Option<String>) -> Self {
        Self {
            slot: tokio::sync::Mutex::new(initial.filter(|t| !t.is_empty())),
        }
    }

    /// Return the cached token, exchanging client credentials if the slot is
    /// empty.
    pub async fn get_or_exchange(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> TwitchResult<String> {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.clone() {
            return Ok(token);
        }
        let token = exchange_app_token(client_id, client_secret).await?;
        *slot = Some(token.clone());
        Ok(token)
    }
}

/// Client for the Helix REST API.
#[derive(Debug, Clone)]
pub struct HelixClient {
    http: Client,
    client_id: String,
    bearer: String,
}

impl HelixClient {
    pub fn new(client_id: impl Into<String>, bearer: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            client_id: client_id.into(),
            bearer: bearer.into(),
        }
    }

    /// Shared HTTP client, for callers hitting unauthenticated endpoints.
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Resolve a channel login name to its numeric user id.
    pub async fn user_id(&self, login: &str) -> TwitchResult<Option<String>> {
        let users: UsersResponse = self
            .get_json(&format!("{HELIX_BASE}/users"), &[("login", login)])
            .await?;
        Ok(users.data.into_iter().next().map(|u| u.id))
    }

    /// Badge sets shared by every channel.
    pub async fn global_badges(&self) -> TwitchResult<Vec<BadgeSet>> {
        let badges: BadgesResponse = self
            .get_json(&format!("{HELIX_BASE}/chat/badges/global"), &[])
            .await?;
        Ok(badges.data)
    }

    /// Badge sets specific to one channel.
    pub async fn channel_badges(&self, broadcaster_id: &str) -> TwitchResult<Vec<BadgeSet>> {
        let badges: BadgesResponse = self
            .get_json(
                &format!("{HELIX_BASE}/chat/badges"),
                &[("broadcaster_id", broadcaster_id)],
            )
            .await?;
        Ok(badges.data)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> TwitchResult<T> {
        let response = self
            .http
            .get(url)
            .header("Client-ID", &self.client_id)
            .bearer_auth(&self.bearer)
            .query(params)
            .send()
            .await?;

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
}
