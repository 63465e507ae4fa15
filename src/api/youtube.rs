use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// YouTube Data API client using an offline refresh token. Uploads are the
/// two-step resumable protocol: metadata POST returns an upload session URL,
/// the video bytes go there in a single PUT.
pub struct YouTubeClient {
    pub client: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl YouTubeClient {
    pub fn new(client_id: &str, client_secret: &str, refresh_token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self::with_client(
            client,
            client_id,
            client_secret,
            refresh_token,
        ))
    }

    pub fn with_client(
        client: reqwest::Client,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Self {
        Self {
            client,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty()
            && !self.client_secret.trim().is_empty()
            && !self.refresh_token.trim().is_empty()
    }

    /// Exchange the refresh token for a short-lived access token.
    pub async fn access_token(&self) -> Result<String> {
        let resp = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("OAuth token request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet = raw.chars().take(300).collect::<String>();
            return Err(anyhow::anyhow!(
                "OAuth token exchange HTTP {}: {}",
                status.as_u16(),
                snippet
            ));
        }

        let body: serde_json::Value =
            serde_json::from_str(&raw).context("OAuth token response parse failed")?;
        body.get("access_token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("OAuth token response missing access_token"))
    }

    /// Upload a video scheduled for future release. The platform requires
    /// the video to stay private until `publish_at`, which must be in the
    /// future. Returns the remote video id.
    pub async fn upload_scheduled(
        &self,
        file: &Path,
        title: &str,
        description: &str,
        tags: &[String],
        publish_at: DateTime<Utc>,
    ) -> Result<String> {
        let token = self.access_token().await?;

        let metadata = json!({
            "snippet": {
                "title": title,
                "description": description,
                "tags": tags,
                "categoryId": "22",
            },
            "status": {
                "privacyStatus": "private",
                "publishAt": publish_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                "selfDeclaredMadeForKids": false,
            },
        });

        let resp = self
            .client
            .post(UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&token)
            .json(&metadata)
            .send()
            .await
            .context("upload session request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            let snippet = raw.chars().take(500).collect::<String>();
            return Err(anyhow::anyhow!(
                "upload session HTTP {}: {}",
                status.as_u16(),
                snippet
            ));
        }

        let session_url = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("upload session response missing Location header"))?;

        let bytes = fs::read(file)
            .await
            .with_context(|| format!("failed to read rendered file {}", file.display()))?;

        let resp = self
            .client
            .put(&session_url)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .body(bytes)
            .timeout(Duration::from_secs(1800))
            .send()
            .await
            .context("video byte upload failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet = raw.chars().take(500).collect::<String>();
            return Err(anyhow::anyhow!(
                "video upload HTTP {}: {}",
                status.as_u16(),
                snippet
            ));
        }

        let body: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "upload response parse failed");
                return Err(anyhow::anyhow!("upload response was not JSON"));
            }
        };
        body.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("upload response missing video id"))
    }
}
