use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Runtime configuration, loaded from `config.json` with environment-variable
/// fallback for the secrets (`PEXELS_API_KEY`, `YT_CLIENT_ID`,
/// `YT_CLIENT_SECRET`, `YT_REFRESH_TOKEN`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pexels_api_key: String,
    #[serde(default)]
    pub yt_client_id: String,
    #[serde(default)]
    pub yt_client_secret: String,
    #[serde(default)]
    pub yt_refresh_token: String,

    #[serde(default = "default_schedule_csv")]
    pub schedule_csv: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_music_dir")]
    pub music_dir: String,
    #[serde(default = "default_render_dir")]
    pub render_dir: String,
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: String,

    /// IANA name of the zone all schedule timestamps are written in.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Maximum number of items processed in one run.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Minimum gap between now and a scheduled publish time before an upload
    /// is attempted.
    #[serde(default = "default_min_lead_minutes")]
    pub min_lead_minutes: i64,

    #[serde(default = "default_target_duration_secs")]
    pub target_duration_secs: u32,
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,

    /// Commit the state file to git after each successful publish (for runs
    /// driven by a CI cron that pushes state back to the repository).
    #[serde(default)]
    pub commit_state_to_git: bool,
}

fn default_schedule_csv() -> String {
    "prompts.csv".to_string()
}

fn default_state_file() -> String {
    "posted_state.json".to_string()
}

fn default_music_dir() -> String {
    "music".to_string()
}

fn default_render_dir() -> String {
    "renders".to_string()
}

fn default_tmp_dir() -> String {
    "tmp".to_string()
}

fn default_time_zone() -> String {
    "America/Los_Angeles".to_string()
}

fn default_capacity() -> usize {
    10
}

fn default_min_lead_minutes() -> i64 {
    2
}

fn default_target_duration_secs() -> u32 {
    32
}

fn default_frame_width() -> u32 {
    1080
}

fn default_frame_height() -> u32 {
    1920
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pexels_api_key: String::new(),
            yt_client_id: String::new(),
            yt_client_secret: String::new(),
            yt_refresh_token: String::new(),
            schedule_csv: default_schedule_csv(),
            state_file: default_state_file(),
            music_dir: default_music_dir(),
            render_dir: default_render_dir(),
            tmp_dir: default_tmp_dir(),
            time_zone: default_time_zone(),
            capacity: default_capacity(),
            min_lead_minutes: default_min_lead_minutes(),
            target_duration_secs: default_target_duration_secs(),
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            commit_state_to_git: false,
        }
    }
}

impl Config {
    /// Load configuration. A missing file is not an error: defaults plus
    /// environment variables apply (the original cron setup had no config
    /// file at all).
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str::<Config>(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(err) => return Err(err.into()),
        };
        config.fill_secrets_from_env();
        config.validate()?;
        Ok(config)
    }

    fn fill_secrets_from_env(&mut self) {
        fill_from_env(&mut self.pexels_api_key, "PEXELS_API_KEY");
        fill_from_env(&mut self.yt_client_id, "YT_CLIENT_ID");
        fill_from_env(&mut self.yt_client_secret, "YT_CLIENT_SECRET");
        fill_from_env(&mut self.yt_refresh_token, "YT_REFRESH_TOKEN");
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule_csv.trim().is_empty() {
            return Err(ConfigError::Invalid("schedule_csv must be non-empty"));
        }
        if self.state_file.trim().is_empty() {
            return Err(ConfigError::Invalid("state_file must be non-empty"));
        }
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("capacity must be > 0"));
        }
        if self.min_lead_minutes < 0 {
            return Err(ConfigError::Invalid("min_lead_minutes must be >= 0"));
        }
        if self.target_duration_secs == 0 {
            return Err(ConfigError::Invalid("target_duration_secs must be > 0"));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::Invalid("frame dimensions must be > 0"));
        }
        if self.time_zone.parse::<Tz>().is_err() {
            return Err(ConfigError::Invalid(
                "time_zone must be a valid IANA zone name",
            ));
        }
        Ok(())
    }

    /// The reference zone all schedule timestamps are interpreted in.
    /// Validated at load time.
    pub fn tz(&self) -> Tz {
        self.time_zone
            .parse()
            .unwrap_or(chrono_tz::America::Los_Angeles)
    }
}

fn fill_from_env(field: &mut String, var: &str) {
    if field.trim().is_empty() {
        if let Ok(value) = std::env::var(var) {
            *field = value;
        }
    }
}
