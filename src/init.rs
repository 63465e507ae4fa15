use crate::config::Config;
use anyhow::Result;
use std::path::Path;
use tokio::fs;
use walkdir::WalkDir;
use tracing::info;

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in [&cfg.music_dir, &cfg.render_dir, &cfg.tmp_dir] {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir).await?;
            info!(dir, "created directory");
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Sweep leftovers from previous runs out of the scratch directory.
pub async fn clear_tmp(cfg: &Config) -> Result<bool> {
    let dir = Path::new(&cfg.tmp_dir);
    if !dir.exists() {
        return Ok(true);
    }

    for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            fs::remove_dir(path).await.ok();
        } else {
            fs::remove_file(path).await.ok();
        }
    }

    Ok(true)
}
