use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Frame geometry and clip length for one render.
#[derive(Debug, Clone, Copy)]
pub struct RenderSpec {
    pub width: u32,
    pub height: u32,
    pub duration_secs: u32,
}

const MUSIC_VOLUME: f64 = 0.15;
const FALLBACK_BG_COLOR: &str = "0x1c2331";

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd.status().await.context("Command execution failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("Command failed: {:?}", args));
    }

    Ok(())
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration"));
    }
    Ok(duration)
}

/// Escape a string for use inside an ffmpeg drawtext filter argument.
fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            ':' => out.push_str("\\:"),
            '%' => out.push_str("\\%"),
            ',' => out.push_str("\\,"),
            '\n' | '\r' => out.push(' '),
            _ => out.push(ch),
        }
    }
    out
}

fn overlay_filter(text: &str, height: u32) -> String {
    format!(
        "drawtext=text='{}':fontcolor=white:fontsize=h/22:borderw=3:bordercolor=black:\
         x=(w-text_w)/2:y={}",
        escape_drawtext(text),
        height / 8
    )
}

fn fit_filter(spec: RenderSpec) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1",
        w = spec.width,
        h = spec.height,
    )
}

fn ffmpeg_base() -> Vec<String> {
    vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
    ]
}

/// Maps [vout] (and [aout] when music is present), appends encoder settings
/// and the output path.
fn finish_args(args: &mut Vec<String>, filter: String, with_audio: bool, out_mp4: &Path) {
    args.extend(["-filter_complex".to_string(), filter]);
    args.extend(["-map".to_string(), "[vout]".to_string()]);
    if with_audio {
        args.extend([
            "-map".to_string(),
            "[aout]".to_string(),
            "-shortest".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
        ]);
    } else {
        args.push("-an".to_string());
    }
    args.extend([
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ]);
}

fn music_leg(music_input_index: usize) -> String {
    format!(";[{music_input_index}:a]volume={MUSIC_VOLUME}[aout]")
}

/// Crop/scale a stock clip to the vertical frame, loop it out to the target
/// duration, and burn the overlay text in.
pub async fn render_vertical_clip(
    input_mp4: &Path,
    overlay_text: &str,
    music: Option<&Path>,
    spec: RenderSpec,
    out_mp4: &Path,
) -> Result<bool> {
    let args = vertical_clip_args(input_mp4, overlay_text, music, spec, out_mp4);
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

fn vertical_clip_args(
    input_mp4: &Path,
    overlay_text: &str,
    music: Option<&Path>,
    spec: RenderSpec,
    out_mp4: &Path,
) -> Vec<String> {
    let mut args = ffmpeg_base();
    args.extend([
        "-stream_loop".to_string(),
        "-1".to_string(),
        "-i".to_string(),
        input_mp4.display().to_string(),
    ]);

    let mut filter = format!(
        "[0:v]{},{}[vout]",
        fit_filter(spec),
        overlay_filter(overlay_text, spec.height),
    );
    if let Some(track) = music {
        args.extend(["-i".to_string(), track.display().to_string()]);
        filter.push_str(&music_leg(1));
    }
    // -t must come after every -i: as an input option it would bound the
    // music track instead of the output, and a short track would then cut
    // the video down with it.
    args.extend(["-t".to_string(), spec.duration_secs.to_string()]);
    finish_args(&mut args, filter, music.is_some(), out_mp4);
    args
}

/// Build a slideshow from still photos, evenly timed across the target
/// duration, with the overlay burned in.
pub async fn render_slideshow(
    photos: &[PathBuf],
    overlay_text: &str,
    music: Option<&Path>,
    spec: RenderSpec,
    out_mp4: &Path,
) -> Result<bool> {
    if photos.is_empty() {
        return Ok(false);
    }

    let per_image = f64::from(spec.duration_secs) / photos.len() as f64;

    let mut args = ffmpeg_base();
    for photo in photos {
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-t".to_string(),
            format!("{per_image:.3}"),
            "-i".to_string(),
            photo.display().to_string(),
        ]);
    }

    let mut filter = String::new();
    for i in 0..photos.len() {
        filter.push_str(&format!("[{i}:v]{},fps=30[v{i}];", fit_filter(spec)));
    }
    for i in 0..photos.len() {
        filter.push_str(&format!("[v{i}]"));
    }
    filter.push_str(&format!(
        "concat=n={}:v=1:a=0,{}[vout]",
        photos.len(),
        overlay_filter(overlay_text, spec.height),
    ));

    if let Some(track) = music {
        args.extend(["-i".to_string(), track.display().to_string()]);
        filter.push_str(&music_leg(photos.len()));
    }
    finish_args(&mut args, filter, music.is_some(), out_mp4);

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// No-network render: solid background plus the overlay text. Always
/// available, so a due item never ends a run with zero output just because
/// the media source was down.
pub async fn render_fallback(
    overlay_text: &str,
    music: Option<&Path>,
    spec: RenderSpec,
    out_mp4: &Path,
) -> Result<bool> {
    let mut args = ffmpeg_base();
    args.extend([
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!(
            "color=c={}:s={}x{}:d={}",
            FALLBACK_BG_COLOR, spec.width, spec.height, spec.duration_secs
        ),
    ]);

    let mut filter = format!("[0:v]{}[vout]", overlay_filter(overlay_text, spec.height));
    if let Some(track) = music {
        args.extend(["-i".to_string(), track.display().to_string()]);
        filter.push_str(&music_leg(1));
    }
    finish_args(&mut args, filter, music.is_some(), out_mp4);

    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}
