use crate::api::youtube::YouTubeClient;
use crate::assemble::RenderedAsset;
use crate::selector::WorkItem;
use anyhow::Result;
use async_trait::async_trait;

/// Uploads a rendered asset with a future-dated release time and returns the
/// platform's identifier for it.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Whether credentials are present. When false the orchestrator defers
    /// every item instead of attempting uploads that can only fail.
    fn is_configured(&self) -> bool;

    async fn publish(&self, asset: &RenderedAsset, item: &WorkItem) -> Result<String>;
}

pub struct YouTubePublisher {
    yt: YouTubeClient,
}

impl YouTubePublisher {
    pub fn new(yt: YouTubeClient) -> Self {
        Self { yt }
    }
}

#[async_trait]
impl Publisher for YouTubePublisher {
    fn is_configured(&self) -> bool {
        self.yt.is_configured()
    }

    async fn publish(&self, asset: &RenderedAsset, item: &WorkItem) -> Result<String> {
        self.yt
            .upload_scheduled(
                asset.path(),
                item.row.title.trim(),
                &build_description(item),
                &build_tags(item),
                item.publish_utc,
            )
            .await
    }
}

/// Description: script, call to action, optional link, then hashtags.
pub fn build_description(item: &WorkItem) -> String {
    let row = &item.row;
    let mut parts: Vec<String> = Vec::new();

    let script = row.script.trim();
    if !script.is_empty() {
        parts.push(script.to_string());
    }
    parts.push(row.call_to_action().to_string());

    let link = row.external_link.trim();
    if !link.is_empty() {
        parts.push(link.to_string());
    }
    let hashtags = row.hashtags.trim();
    if !hashtags.is_empty() {
        parts.push(hashtags.to_string());
    }

    parts.join("\n\n")
}

/// Upload tags: hashtag words (without the `#`) plus the search keywords.
pub fn build_tags(item: &WorkItem) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in item.row.hashtags.split_whitespace() {
        let tag = word.trim_start_matches('#').trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    for keyword in item.row.keywords() {
        if !tags.iter().any(|t| *t == keyword) {
            tags.push(keyword);
        }
    }
    tags
}
