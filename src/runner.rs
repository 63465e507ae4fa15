use crate::assemble::MediaAssembler;
use crate::config::Config;
use crate::publish::Publisher;
use crate::schedule;
use crate::selector::{self, WorkItem};
use crate::state::{PostedState, StateStore};
use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::{info, warn};

/// Terminal state of one work item. Exactly one per selected item; failures
/// are recorded here instead of propagating, so one bad item never takes the
/// rest of the run down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Published { video_id: String },
    AssemblyFailed,
    PublishDeferred,
    PublishFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub selected: usize,
    pub published: usize,
    pub assembly_failed: usize,
    pub deferred: usize,
    pub publish_failed: usize,
}

impl RunReport {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Published { .. } => self.published += 1,
            ItemOutcome::AssemblyFailed => self.assembly_failed += 1,
            ItemOutcome::PublishDeferred => self.deferred += 1,
            ItemOutcome::PublishFailed => self.publish_failed += 1,
        }
    }
}

/// One batch run: select due items, then process them strictly in order.
/// After each successful publish the item's key is committed to the store
/// before the next item starts, so an interrupted run never re-publishes
/// what it already finished.
pub async fn run(
    cfg: &Config,
    store: &StateStore,
    assembler: &dyn MediaAssembler,
    publisher: &dyn Publisher,
) -> Result<RunReport> {
    let rows = schedule::load_schedule(&cfg.schedule_csv)?;
    let mut state = store.load().await?;

    let items = selector::select(&rows, &state.key_set(), Utc::now(), cfg.tz(), cfg.capacity);
    let mut report = RunReport {
        selected: items.len(),
        ..RunReport::default()
    };
    info!(
        rows = rows.len(),
        selected = items.len(),
        "scheduling this run"
    );

    if !publisher.is_configured() {
        if !items.is_empty() {
            warn!(
                deferred = items.len(),
                "publisher credentials absent; deferring all items"
            );
            report.deferred = items.len();
        }
        return Ok(report);
    }

    for item in &items {
        let outcome = process_item(cfg, store, &mut state, assembler, publisher, item).await;
        report.record(&outcome);
    }

    info!(
        selected = report.selected,
        published = report.published,
        assembly_failed = report.assembly_failed,
        deferred = report.deferred,
        publish_failed = report.publish_failed,
        "run complete"
    );
    Ok(report)
}

/// Drive one item through assemble -> lead-time check -> publish -> commit.
/// The rendered asset is dropped (and its file deleted) on every path out of
/// this function.
async fn process_item(
    cfg: &Config,
    store: &StateStore,
    state: &mut PostedState,
    assembler: &dyn MediaAssembler,
    publisher: &dyn Publisher,
    item: &WorkItem,
) -> ItemOutcome {
    info!(title = %item.row.title, publish_at = %item.publish_local, "processing item");

    let asset = match assembler.assemble(item).await {
        Ok(asset) => asset,
        Err(err) => {
            warn!(title = %item.row.title, error = ?err, "assembly failed; skipping item");
            return ItemOutcome::AssemblyFailed;
        }
    };

    // Re-check against a fresh clock: rendering takes time, and the platform
    // rejects publish times that are not comfortably in the future.
    let min_lead = Duration::minutes(cfg.min_lead_minutes);
    if item.publish_utc <= Utc::now() + min_lead {
        info!(
            title = %item.row.title,
            publish_at = %item.publish_utc,
            "publish time within minimum lead; deferring to a later run"
        );
        return ItemOutcome::PublishDeferred;
    }

    match publisher.publish(&asset, item).await {
        Ok(video_id) => {
            state.record(&item.key);
            // Best-effort commit: the in-memory set already has the key, so
            // this run cannot double-publish. If the commit never reached
            // durable storage a later run may retry the item.
            let message = format!("posted: {}", item.row.title);
            if let Err(err) = store.commit(state, &message).await {
                warn!(
                    key = %item.key,
                    error = %err,
                    "state commit failed; a later run may re-publish this item"
                );
            }
            info!(title = %item.row.title, video_id = %video_id, "published");
            ItemOutcome::Published { video_id }
        }
        Err(err) => {
            warn!(
                title = %item.row.title,
                error = ?err,
                "publish failed; item stays eligible for the next run"
            );
            ItemOutcome::PublishFailed
        }
    }
}
