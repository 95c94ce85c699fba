use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Seam for the externally-hosted meeting service.
#[async_trait]
pub trait MeetingProvider: Send + Sync {
    /// Create an instant meeting and return its join URL.
    async fn create_meeting(&self, topic: &str) -> Result<String>;
}

/// Stand-in used when no provider credentials are configured; every
/// attempt surfaces as an upstream failure without charging anything.
pub struct UnconfiguredProvider;

#[async_trait]
impl MeetingProvider for UnconfiguredProvider {
    async fn create_meeting(&self, _topic: &str) -> Result<String> {
        Err(anyhow!("meeting provider is not configured"))
    }
}

const TOKEN_URL: &str = "https://zoom.us/oauth/token";
const API_BASE: &str = "https://api.zoom.us/v2";

/// Re-auth this long before the provider says the token expires.
const TOKEN_REFRESH_LEEWAY: Duration = Duration::from_secs(60);

/// Zoom server-to-server OAuth client. One access token is cached and
/// shared across requests until shortly before its expiry.
pub struct ZoomClient {
    http: reqwest::Client,
    account_id: String,
    client_id: String,
    client_secret: String,
    host_user_id: String,
    token: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct MeetingCreated {
    join_url: String,
}

impl ZoomClient {
    /// Builds the client from PARLEY_MEET_ACCOUNT_ID, PARLEY_MEET_CLIENT_ID,
    /// PARLEY_MEET_CLIENT_SECRET and PARLEY_MEET_HOST_USER_ID. Returns None
    /// when any is missing.
    pub fn from_env() -> Option<Self> {
        let account_id = std::env::var("PARLEY_MEET_ACCOUNT_ID").ok()?;
        let client_id = std::env::var("PARLEY_MEET_CLIENT_ID").ok()?;
        let client_secret = std::env::var("PARLEY_MEET_CLIENT_SECRET").ok()?;
        let host_user_id = std::env::var("PARLEY_MEET_HOST_USER_ID").ok()?;

        Some(Self {
            http: reqwest::Client::new(),
            account_id,
            client_id,
            client_secret,
            host_user_id,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting a fresh meeting-provider access token");
        let resp = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.account_id.as_str()),
            ])
            .send()
            .await
            .context("token request failed")?
            .error_for_status()
            .context("token request rejected")?
            .json::<TokenResponse>()
            .await
            .context("malformed token response")?;

        let lifetime = Duration::from_secs(resp.expires_in).saturating_sub(TOKEN_REFRESH_LEEWAY);
        *cached = Some(CachedToken {
            value: resp.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(resp.access_token)
    }
}

#[async_trait]
impl MeetingProvider for ZoomClient {
    async fn create_meeting(&self, topic: &str) -> Result<String> {
        let token = self.access_token().await?;

        let url = format!("{API_BASE}/users/{}/meetings", self.host_user_id);
        let payload = serde_json::json!({
            "topic": topic,
            "type": 1,
            "settings": {
                "host_video": true,
                "participant_video": true,
                "join_before_host": true,
                "mute_participants_upon_entry": false,
                "waiting_room": false,
            }
        });

        let created = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .context("meeting request failed")?
            .error_for_status()
            .context("meeting request rejected")?
            .json::<MeetingCreated>()
            .await
            .context("malformed meeting response")?;

        Ok(created.join_url)
    }
}
