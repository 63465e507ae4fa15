use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

const PEXELS_VIDEO_SEARCH: &str = "https://api.pexels.com/videos/search";
const PEXELS_PHOTO_SEARCH: &str = "https://api.pexels.com/v1/search";

/// Pexels stock-media client. Search failures (HTTP errors, empty result
/// sets, malformed bodies) are soft: the caller gets `None`/an empty list
/// and decides how to degrade.
pub struct PexelsClient {
    pub client: reqwest::Client,
    api_key: String,
}

impl PexelsClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self::with_client(client, api_key))
    }

    pub fn with_client(client: reqwest::Client, api_key: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Find one portrait stock video for a keyword. Returns the download URL
    /// of the best-fitting file, or `None` when nothing usable came back.
    pub async fn search_video(&self, keyword: &str) -> Result<Option<String>> {
        let body = match self.get_json(PEXELS_VIDEO_SEARCH, keyword, 5).await? {
            Some(body) => body,
            None => return Ok(None),
        };

        let videos = match body.get("videos").and_then(|v| v.as_array()) {
            Some(videos) if !videos.is_empty() => videos,
            _ => return Ok(None),
        };

        Ok(pick_video_file(videos))
    }

    /// Find up to `count` portrait photos for a keyword.
    pub async fn search_photos(&self, keyword: &str, count: usize) -> Result<Vec<String>> {
        let body = match self.get_json(PEXELS_PHOTO_SEARCH, keyword, count).await? {
            Some(body) => body,
            None => return Ok(Vec::new()),
        };

        let mut urls = Vec::new();
        if let Some(photos) = body.get("photos").and_then(|v| v.as_array()) {
            for photo in photos.iter().take(count) {
                if let Some(url) = photo
                    .get("src")
                    .and_then(|s| s.get("portrait"))
                    .and_then(|v| v.as_str())
                {
                    urls.push(url.to_string());
                }
            }
        }
        Ok(urls)
    }

    /// Download a media URL to a local file.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<bool> {
        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_secs(300))
            .send()
            .await
            .context("media download request failed")?;

        if !resp.status().is_success() {
            warn!(url, status = resp.status().as_u16(), "media download failed");
            return Ok(false);
        }

        let bytes = resp.bytes().await.context("media download read failed")?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(dest, &bytes).await?;
        Ok(fs::metadata(dest).await.is_ok())
    }

    async fn get_json(
        &self,
        base: &str,
        keyword: &str,
        per_page: usize,
    ) -> Result<Option<serde_json::Value>> {
        let resp = self
            .client
            .get(base)
            .query(&[
                ("query", keyword),
                ("orientation", "portrait"),
                ("per_page", &per_page.to_string()),
            ])
            .header("Authorization", &self.api_key)
            .send()
            .await
            .context("Pexels request failed")?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let snippet = raw.chars().take(300).collect::<String>();
            warn!(keyword, status = status.as_u16(), body = %snippet, "Pexels HTTP error");
            return Ok(None);
        }

        match serde_json::from_str(&raw) {
            Ok(body) => Ok(Some(body)),
            Err(err) => {
                warn!(keyword, error = %err, "Pexels response parse failed");
                Ok(None)
            }
        }
    }
}

/// From the first video that has usable files, pick the smallest file that
/// is still at least 720 wide (enough to upscale into the 1080 frame
/// without looking soft); video_files are not ordered by size in the API
/// response.
fn pick_video_file(videos: &[serde_json::Value]) -> Option<String> {
    let mut best: Option<(u64, String)> = None;
    for video in videos {
        let files = match video.get("video_files").and_then(|v| v.as_array()) {
            Some(files) => files,
            None => continue,
        };
        for file in files {
            let width = file.get("width").and_then(|v| v.as_u64()).unwrap_or(0);
            let link = match file.get("link").and_then(|v| v.as_str()) {
                Some(link) => link,
                None => continue,
            };
            if width < 720 {
                continue;
            }
            match &best {
                Some((w, _)) if *w <= width => {}
                _ => best = Some((width, link.to_string())),
            }
        }
        if best.is_some() {
            break;
        }
    }
    best.map(|(_, link)| link)
}
