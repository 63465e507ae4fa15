use crate::schedule::ScheduleRow;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Source timestamp format: minute precision, zone implied by configuration.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A schedule row selected for this run, with its parsed publish times.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub row: ScheduleRow,
    pub publish_local: DateTime<Tz>,
    pub publish_utc: DateTime<Utc>,
    /// Identity used against the posted-state set.
    pub key: String,
}

/// Identity of a row: its publish time reformatted canonically, plus the
/// title. Normalizing through the parse means two source strings that denote
/// the same minute map to the same key even if the file was regenerated with
/// stray whitespace.
pub fn dedupe_key(publish_local: NaiveDateTime, title: &str) -> String {
    format!("{}|{}", publish_local.format(TIME_FORMAT), title.trim())
}

/// Compute the ordered work list for one run.
///
/// Pure in its inputs: same rows, posted set, clock and capacity always yield
/// the same list. Rows that fail to parse are dropped with a warning and do
/// not count against `capacity`. Only rows strictly in the future survive;
/// ties keep their schedule order; at most `capacity` items are returned.
pub fn select(
    rows: &[ScheduleRow],
    posted: &HashSet<String>,
    now: DateTime<Utc>,
    zone: Tz,
    capacity: usize,
) -> Vec<WorkItem> {
    let mut items: Vec<WorkItem> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (idx, row) in rows.iter().enumerate() {
        if row.title.trim().is_empty() {
            warn!(row = idx + 1, "skipping row with empty title");
            continue;
        }

        let raw = row.publish_time.trim();
        let naive = match NaiveDateTime::parse_from_str(raw, TIME_FORMAT) {
            Ok(naive) => naive,
            Err(err) => {
                warn!(
                    row = idx + 1,
                    title = %row.title,
                    publish_time = raw,
                    error = %err,
                    "skipping row with unparsable publish time"
                );
                continue;
            }
        };

        // Ambiguous local times (fall-back DST hour) resolve to the earlier
        // instant; nonexistent ones (spring-forward gap) drop the row.
        let publish_local = match zone.from_local_datetime(&naive).earliest() {
            Some(t) => t,
            None => {
                warn!(
                    row = idx + 1,
                    title = %row.title,
                    publish_time = raw,
                    "skipping row whose local time does not exist in the reference zone"
                );
                continue;
            }
        };

        let key = dedupe_key(naive, &row.title);
        if posted.contains(&key) {
            debug!(key = %key, "already posted; skipping");
            continue;
        }
        if !seen.insert(key.clone()) {
            debug!(key = %key, "duplicate key within schedule; keeping first occurrence");
            continue;
        }

        let publish_utc = publish_local.with_timezone(&Utc);
        if publish_utc <= now {
            debug!(key = %key, "publish time not in the future; skipping");
            continue;
        }

        items.push(WorkItem {
            row: row.clone(),
            publish_local,
            publish_utc,
            key,
        });
    }

    // Stable sort keeps schedule order for identical timestamps.
    items.sort_by_key(|item| item.publish_utc);
    items.truncate(capacity);
    items
}
