//! Discord REST API client (bot-token auth).
//!
//! Only the handful of endpoints a role reconciliation pass needs: guild
//! discovery, the member list, the role list, and member role updates.
//!
//! Every request goes through [`DiscordClient::send`], which waits out an
//! exhausted rate-limit bucket before returning and resends a request once
//! after a 429.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::errors::DiscordError;

/// Page size of `GET /guilds/{id}/members` (the API maximum).
const MEMBER_PAGE_LIMIT: usize = 1000;

/// Longest rate-limit wait honoured before giving up on a request.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialGuild {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildMember {
    pub user: DiscordUser,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildRole {
    pub id: String,
    pub name: String,
    /// Owned by an integration; Discord rejects granting or removing it.
    #[serde(default)]
    pub managed: bool,
}

/// Asynchronous Discord REST API client.
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_url: String,
}

impl DiscordClient {
    pub fn new(
        api_url: impl Into<String>,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, DiscordError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("DiscordBot (rolesync, 0.1)"),
        );
        let mut auth = HeaderValue::from_str(&format!("Bot {}", token))
            .map_err(|_| DiscordError::AuthenticationFailed("token is not a valid header value".into()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        info!(api_url = %api_url, "created DiscordClient");
        Ok(Self { http, api_url })
    }

    /// Guilds the bot belongs to (first page).
    #[instrument(skip(self))]
    pub async fn get_current_user_guilds(&self) -> Result<Vec<PartialGuild>, DiscordError> {
        let url = format!("{}/users/@me/guilds", self.api_url);
        let resp = self.send(self.http.get(&url)).await?;
        let guilds: Vec<PartialGuild> = resp.json().await?;
        debug!(count = guilds.len(), "fetched bot guilds");
        Ok(guilds)
    }

    /// The first guild the bot belongs to.
    pub async fn first_guild(&self) -> Result<PartialGuild, DiscordError> {
        self.get_current_user_guilds()
            .await?
            .into_iter()
            .next()
            .ok_or(DiscordError::NoGuild)
    }

    #[instrument(skip(self))]
    pub async fn get_guild(&self, guild_id: &str) -> Result<PartialGuild, DiscordError> {
        let url = format!("{}/guilds/{}", self.api_url, guild_id);
        let resp = self.send(self.http.get(&url)).await?;
        let guild: PartialGuild = resp.json().await?;
        debug!(guild = %guild.name, "fetched guild");
        Ok(guild)
    }

    /// Every member of the guild, following `after` pagination.
    #[instrument(skip(self))]
    pub async fn list_members(&self, guild_id: &str) -> Result<Vec<GuildMember>, DiscordError> {
        let url = format!("{}/guilds/{}/members", self.api_url, guild_id);
        let limit = MEMBER_PAGE_LIMIT.to_string();
        let mut members: Vec<GuildMember> = Vec::new();
        let mut after = String::from("0");

        loop {
            let req = self
                .http
                .get(&url)
                .query(&[("limit", limit.as_str()), ("after", after.as_str())]);
            let page: Vec<GuildMember> = self.send(req).await?.json().await?;
            let page_len = page.len();
            if let Some(last) = page.last() {
                after = last.user.id.clone();
            }
            members.extend(page);
            debug!(page = page_len, total = members.len(), "fetched member page");
            if page_len < MEMBER_PAGE_LIMIT {
                break;
            }
        }

        Ok(members)
    }

    #[instrument(skip(self))]
    pub async fn list_roles(&self, guild_id: &str) -> Result<Vec<GuildRole>, DiscordError> {
        let url = format!("{}/guilds/{}/roles", self.api_url, guild_id);
        let resp = self.send(self.http.get(&url)).await?;
        let roles: Vec<GuildRole> = resp.json().await?;
        debug!(count = roles.len(), "fetched guild roles");
        Ok(roles)
    }

    /// Replace a member's role list in one request.
    #[instrument(skip(self))]
    pub async fn set_member_roles(
        &self,
        guild_id: &str,
        user_id: &str,
        role_ids: &[String],
    ) -> Result<(), DiscordError> {
        let url = format!("{}/guilds/{}/members/{}", self.api_url, guild_id, user_id);
        let payload = serde_json::json!({ "roles": role_ids });
        self.send(self.http.patch(&url).json(&payload)).await?;
        debug!(user_id, roles = role_ids.len(), "updated member roles");
        Ok(())
    }

    /// Send a request, resending it once if Discord answers 429.
    ///
    /// A successful response that leaves its bucket empty is held until the
    /// bucket resets, so the next call on the route does not hit a 429.
    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, DiscordError> {
        let retry = req.try_clone();
        let resp = req.send().await?;

        let resp = match (resp.status().as_u16(), retry) {
            (429, Some(retry)) => match rate_limit_wait(resp.headers()) {
                Some(wait) if wait <= MAX_RATE_LIMIT_WAIT => {
                    warn!(wait_ms = wait.as_millis() as u64, "rate limited, retrying once");
                    tokio::time::sleep(wait).await;
                    retry.send().await?
                }
                _ => resp,
            },
            _ => resp,
        };

        let resp = check_response(resp).await?;
        pace(resp.headers()).await;
        Ok(resp)
    }
}

/// Seconds from a header holding a (possibly fractional) number.
fn header_secs(headers: &HeaderMap, name: &str) -> Option<Duration> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

/// How long a 429 asks us to wait.
fn rate_limit_wait(headers: &HeaderMap) -> Option<Duration> {
    header_secs(headers, "retry-after").or_else(|| header_secs(headers, "x-ratelimit-reset-after"))
}

/// Sleep until the bucket resets when the last call drained it.
async fn pace(headers: &HeaderMap) {
    let drained = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    if !drained {
        return;
    }
    if let Some(wait) = header_secs(headers, "x-ratelimit-reset-after") {
        let wait = wait.min(MAX_RATE_LIMIT_WAIT);
        debug!(wait_ms = wait.as_millis() as u64, "rate-limit bucket drained, pausing");
        tokio::time::sleep(wait).await;
    }
}

async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, DiscordError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        return Err(DiscordError::RateLimited { retry_after });
    }
    let body = resp.text().await.unwrap_or_default();
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(DiscordError::AuthenticationFailed(format!("HTTP {}: {}", status, body)));
    }
    Err(DiscordError::ApiError {
        status: status.as_u16(),
        body,
    })
}
