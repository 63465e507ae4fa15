use anyhow::Result;
use shorts_scheduler::api::pexels::PexelsClient;
use shorts_scheduler::api::youtube::YouTubeClient;
use shorts_scheduler::assemble::PexelsAssembler;
use shorts_scheduler::config::Config;
use shorts_scheduler::ffmpeg::RenderSpec;
use shorts_scheduler::publish::YouTubePublisher;
use shorts_scheduler::state::StateStore;
use shorts_scheduler::{init, runner};
use std::path::Path;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    // Business-level failures are logged per item inside the run; even a
    // top-level fault must not fail the periodic trigger, so the process
    // always exits 0.
    if let Err(err) = run().await {
        error!(error = ?err, "run aborted");
    }
}

async fn run() -> Result<()> {
    let cfg = Config::load("config.json").await?;
    init::ensure_directories(&cfg).await?;
    if !init::clear_tmp(&cfg).await.unwrap_or(false) {
        warn!("failed to fully clear tmp dir; continuing anyway");
    }
    if !init::check_ffmpeg().await {
        warn!("ffmpeg not found in PATH; renders will fail");
    }

    let spec = RenderSpec {
        width: cfg.frame_width,
        height: cfg.frame_height,
        duration_secs: cfg.target_duration_secs,
    };
    let pexels = PexelsClient::new(&cfg.pexels_api_key)?;
    let assembler = PexelsAssembler::new(
        pexels,
        Path::new(&cfg.music_dir),
        Path::new(&cfg.tmp_dir),
        spec,
    );
    let youtube = YouTubeClient::new(&cfg.yt_client_id, &cfg.yt_client_secret, &cfg.yt_refresh_token)?;
    let publisher = YouTubePublisher::new(youtube);
    let store = StateStore::new(&cfg.state_file, cfg.commit_state_to_git);

    runner::run(&cfg, &store, &assembler, &publisher).await?;
    Ok(())
}
