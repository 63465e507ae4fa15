use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Keywords used when a row has no `broll_keywords` of its own.
pub const DEFAULT_KEYWORDS: &[&str] = &["nature", "city", "ocean"];

const DEFAULT_CALL_TO_ACTION: &str = "Follow for more!";

/// One planned post, as written by the operator in the schedule CSV.
/// Rows are append-only; this system never writes the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRow {
    #[serde(default)]
    pub title: String,
    /// Local wall-clock time, `YYYY-MM-DD HH:MM`, in the configured
    /// reference zone.
    #[serde(default)]
    pub publish_time: String,
    #[serde(default)]
    pub overlay_text: String,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub hashtags: String,
    #[serde(default)]
    pub call_to_action: String,
    /// `;`-delimited stock-footage search keywords.
    #[serde(default)]
    pub broll_keywords: String,
    #[serde(default)]
    pub external_link: String,
}

impl ScheduleRow {
    /// Text drawn over the video; falls back to the title.
    pub fn overlay(&self) -> &str {
        let trimmed = self.overlay_text.trim();
        if trimmed.is_empty() {
            self.title.trim()
        } else {
            trimmed
        }
    }

    pub fn call_to_action(&self) -> &str {
        let trimmed = self.call_to_action.trim();
        if trimmed.is_empty() {
            DEFAULT_CALL_TO_ACTION
        } else {
            trimmed
        }
    }

    /// Search keywords, in the order the operator listed them.
    pub fn keywords(&self) -> Vec<String> {
        let own: Vec<String> = self
            .broll_keywords
            .split(';')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        if own.is_empty() {
            DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
        } else {
            own
        }
    }
}

/// Read the schedule CSV. A missing file means "nothing to do" (empty
/// schedule), not an error. A row that fails to deserialize is dropped with a
/// warning; it never takes the rest of the schedule down with it.
pub fn load_schedule<P: AsRef<Path>>(path: P) -> Result<Vec<ScheduleRow>> {
    let path = path.as_ref();
    if !path.exists() {
        info!(path = %path.display(), "schedule file absent; nothing to do");
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open schedule: {}", path.display()))?;

    let mut rows = Vec::new();
    for (idx, record) in reader.deserialize::<ScheduleRow>().enumerate() {
        match record {
            Ok(row) => rows.push(row),
            Err(err) => {
                warn!(row = idx + 1, error = %err, "skipping unreadable schedule row");
            }
        }
    }
    Ok(rows)
}
