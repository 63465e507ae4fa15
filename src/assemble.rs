use crate::api::pexels::PexelsClient;
use crate::ffmpeg::{self, RenderSpec};
use crate::selector::WorkItem;
use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::OnceCell;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::{debug, info, warn};

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a"];
const MAX_SLIDESHOW_PHOTOS: usize = 5;

/// A rendered video file scoped to one item's processing. Deleted on drop,
/// so every exit path of the orchestrator releases it.
#[derive(Debug)]
pub struct RenderedAsset {
    path: PathBuf,
}

impl RenderedAsset {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RenderedAsset {
    fn drop(&mut self) {
        // Best-effort; a leftover in tmp/ is swept at the next run start.
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Turns a selected row into a rendered vertical video.
#[async_trait]
pub trait MediaAssembler: Send + Sync {
    async fn assemble(&self, item: &WorkItem) -> Result<RenderedAsset>;
}

/// Stock-media assembler: tries a portrait stock video first, then a photo
/// slideshow, then an offline solid-color render. Only the renderer itself
/// failing makes assembly fail; an unreachable or empty media source
/// degrades to the next tier.
pub struct PexelsAssembler {
    pexels: PexelsClient,
    music_dir: PathBuf,
    tmp_dir: PathBuf,
    spec: RenderSpec,
}

impl PexelsAssembler {
    pub fn new(pexels: PexelsClient, music_dir: &Path, tmp_dir: &Path, spec: RenderSpec) -> Self {
        Self {
            pexels,
            music_dir: music_dir.to_path_buf(),
            tmp_dir: tmp_dir.to_path_buf(),
            spec,
        }
    }

    async fn fetch_stock_video(&self, item: &WorkItem) -> Option<PathBuf> {
        for keyword in item.row.keywords() {
            let url = match self.pexels.search_video(&keyword).await {
                Ok(Some(url)) => url,
                Ok(None) => continue,
                Err(err) => {
                    warn!(keyword, error = %err, "stock video search unavailable");
                    return None;
                }
            };
            let dest = self.tmp_dir.join(format!("{}_src.mp4", slug(&item.key)));
            match self.pexels.download(&url, &dest).await {
                Ok(true) => return Some(dest),
                Ok(false) => continue,
                Err(err) => {
                    warn!(keyword, error = %err, "stock video download failed");
                    return None;
                }
            }
        }
        None
    }

    async fn fetch_stock_photos(&self, item: &WorkItem) -> Vec<PathBuf> {
        for keyword in item.row.keywords() {
            let urls = match self.pexels.search_photos(&keyword, MAX_SLIDESHOW_PHOTOS).await {
                Ok(urls) if !urls.is_empty() => urls,
                Ok(_) => continue,
                Err(err) => {
                    warn!(keyword, error = %err, "stock photo search unavailable");
                    return Vec::new();
                }
            };

            let mut photos = Vec::new();
            for (i, url) in urls.iter().enumerate() {
                let dest = self
                    .tmp_dir
                    .join(format!("{}_photo_{}.jpg", slug(&item.key), i + 1));
                match self.pexels.download(url, &dest).await {
                    Ok(true) => photos.push(dest),
                    Ok(false) => {}
                    Err(err) => {
                        warn!(keyword, error = %err, "stock photo download failed");
                        break;
                    }
                }
            }
            if !photos.is_empty() {
                return photos;
            }
        }
        Vec::new()
    }
}

#[async_trait]
impl MediaAssembler for PexelsAssembler {
    async fn assemble(&self, item: &WorkItem) -> Result<RenderedAsset> {
        let overlay = item.row.overlay().to_string();
        let music = pick_music(&self.music_dir).await;
        let out = self.tmp_dir.join(format!("{}.mp4", slug(&item.key)));

        if self.pexels.is_configured() {
            if let Some(clip) = self.fetch_stock_video(item).await {
                info!(title = %item.row.title, "rendering stock video clip");
                if !ffmpeg::render_vertical_clip(&clip, &overlay, music.as_deref(), self.spec, &out)
                    .await?
                {
                    anyhow::bail!("renderer produced no output for stock clip");
                }
                let duration = ffmpeg::ffprobe_duration_seconds(&out).await?;
                debug!(duration, "stock clip render complete");
                return Ok(RenderedAsset::new(out));
            }

            let photos = self.fetch_stock_photos(item).await;
            if !photos.is_empty() {
                info!(title = %item.row.title, photos = photos.len(), "rendering photo slideshow");
                if !ffmpeg::render_slideshow(&photos, &overlay, music.as_deref(), self.spec, &out)
                    .await?
                {
                    anyhow::bail!("renderer produced no output for slideshow");
                }
                let duration = ffmpeg::ffprobe_duration_seconds(&out).await?;
                debug!(duration, "slideshow render complete");
                return Ok(RenderedAsset::new(out));
            }
        } else {
            debug!("no Pexels API key; using fallback render");
        }

        info!(title = %item.row.title, "rendering offline fallback");
        if !ffmpeg::render_fallback(&overlay, music.as_deref(), self.spec, &out).await? {
            anyhow::bail!("renderer produced no output for fallback");
        }
        Ok(RenderedAsset::new(out))
    }
}

/// Random track from the music directory, if there is one.
pub async fn pick_music(music_dir: &Path) -> Option<PathBuf> {
    let mut entries = match fs::read_dir(music_dir).await {
        Ok(entries) => entries,
        Err(_) => return None,
    };

    let mut tracks = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(OsStr::to_str)
            .map(|e| e.to_ascii_lowercase());
        if let Some(ext) = ext {
            if MUSIC_EXTENSIONS.contains(&ext.as_str()) {
                tracks.push(path);
            }
        }
    }

    if tracks.is_empty() {
        return None;
    }
    let mut rng = rand::rngs::StdRng::seed_from_u64(now_seed());
    let idx = rng.gen_range(0..tracks.len());
    Some(tracks.swap_remove(idx))
}

fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Filesystem-safe name derived from an item key.
pub fn slug(input: &str) -> String {
    static NON_ALNUM: OnceCell<Regex> = OnceCell::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());
    re.replace_all(input, "-")
        .trim_matches('-')
        .to_ascii_lowercase()
}
