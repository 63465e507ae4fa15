//! End-to-end orchestrator tests with in-memory assembler/publisher fakes
//! and a real file-backed state store in a temp directory.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use chrono_tz::America::Los_Angeles;
use shorts_scheduler::assemble::{MediaAssembler, RenderedAsset};
use shorts_scheduler::config::Config;
use shorts_scheduler::publish::Publisher;
use shorts_scheduler::runner;
use shorts_scheduler::selector::WorkItem;
use shorts_scheduler::state::StateStore;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

struct FakeAssembler {
    tmp_dir: PathBuf,
    fail_titles: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeAssembler {
    fn new(tmp_dir: PathBuf) -> Self {
        Self {
            tmp_dir,
            fail_titles: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, title: &str) -> Self {
        self.fail_titles.insert(title.to_string());
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaAssembler for FakeAssembler {
    async fn assemble(&self, item: &WorkItem) -> anyhow::Result<RenderedAsset> {
        self.calls.lock().unwrap().push(item.row.title.clone());
        if self.fail_titles.contains(&item.row.title) {
            anyhow::bail!("no media found from any source");
        }
        let path = self
            .tmp_dir
            .join(format!("{}.mp4", item.row.title.replace(' ', "_")));
        std::fs::write(&path, b"fake video")?;
        Ok(RenderedAsset::new(path))
    }
}

struct FakePublisher {
    configured: bool,
    fail_titles: HashSet<String>,
    published: Mutex<Vec<String>>,
}

impl FakePublisher {
    fn new() -> Self {
        Self {
            configured: true,
            fail_titles: HashSet::new(),
            published: Mutex::new(Vec::new()),
        }
    }

    fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    fn failing_on(mut self, title: &str) -> Self {
        self.fail_titles.insert(title.to_string());
        self
    }

    fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn publish(&self, asset: &RenderedAsset, item: &WorkItem) -> anyhow::Result<String> {
        assert!(asset.path().exists(), "asset must exist while publishing");
        if self.fail_titles.contains(&item.row.title) {
            anyhow::bail!("quota exceeded");
        }
        let mut published = self.published.lock().unwrap();
        published.push(item.row.title.clone());
        Ok(format!("vid-{}", published.len()))
    }
}

/// Publisher that snapshots the on-disk state document at each publish call,
/// so tests can see exactly what was durable when an item started.
struct StateSnapshotPublisher {
    state_path: PathBuf,
    snapshots: Mutex<Vec<String>>,
}

impl StateSnapshotPublisher {
    fn new(state_path: PathBuf) -> Self {
        Self {
            state_path,
            snapshots: Mutex::new(Vec::new()),
        }
    }

    fn snapshots(&self) -> Vec<String> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for StateSnapshotPublisher {
    fn is_configured(&self) -> bool {
        true
    }

    async fn publish(&self, _asset: &RenderedAsset, _item: &WorkItem) -> anyhow::Result<String> {
        let on_disk = std::fs::read_to_string(&self.state_path).unwrap_or_default();
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.push(on_disk);
        Ok(format!("vid-{}", snapshots.len()))
    }
}

struct Harness {
    _td: TempDir,
    cfg: Config,
    store_path: PathBuf,
    tmp_dir: PathBuf,
}

impl Harness {
    /// `rows` are (title, minutes-from-now) pairs, written in the given
    /// order with timestamps in the reference zone.
    fn new(rows: &[(&str, i64)], capacity: usize) -> Self {
        let td = TempDir::new().unwrap();
        let schedule = td.path().join("prompts.csv");
        let state = td.path().join("posted_state.json");
        let tmp_dir = td.path().join("tmp");
        std::fs::create_dir_all(&tmp_dir).unwrap();

        let mut csv = String::from("title,publish_time,broll_keywords\n");
        for (title, offset_min) in rows {
            let local = (Utc::now() + Duration::minutes(*offset_min)).with_timezone(&Los_Angeles);
            csv.push_str(&format!(
                "{},{},\n",
                title,
                local.format("%Y-%m-%d %H:%M")
            ));
        }
        std::fs::write(&schedule, csv).unwrap();

        let mut cfg = Config::default();
        cfg.schedule_csv = schedule.to_string_lossy().to_string();
        cfg.state_file = state.to_string_lossy().to_string();
        cfg.tmp_dir = tmp_dir.to_string_lossy().to_string();
        cfg.capacity = capacity;

        Self {
            _td: td,
            cfg,
            store_path: state,
            tmp_dir,
        }
    }

    fn store(&self) -> StateStore {
        StateStore::new(&self.store_path, false)
    }

    fn assembler(&self) -> FakeAssembler {
        FakeAssembler::new(self.tmp_dir.clone())
    }

    fn leftover_assets(&self) -> usize {
        std::fs::read_dir(&self.tmp_dir).unwrap().count()
    }
}

#[tokio::test]
async fn publishes_all_due_items_in_time_order() {
    let h = Harness::new(&[("late", 300), ("early", 60), ("middle", 120)], 5);
    let assembler = h.assembler();
    let publisher = FakePublisher::new();

    let report = runner::run(&h.cfg, &h.store(), &assembler, &publisher)
        .await
        .unwrap();

    assert_eq!(report.selected, 3);
    assert_eq!(report.published, 3);
    assert_eq!(publisher.published(), vec!["early", "middle", "late"]);

    let state = h.store().load().await.unwrap();
    assert_eq!(state.posted.len(), 3);
    assert_eq!(h.leftover_assets(), 0, "assets must be released after the run");
}

#[tokio::test]
async fn second_run_publishes_nothing_new() {
    let h = Harness::new(&[("a", 60), ("b", 120)], 5);
    let store = h.store();

    let first = runner::run(&h.cfg, &store, &h.assembler(), &FakePublisher::new())
        .await
        .unwrap();
    assert_eq!(first.published, 2);

    let publisher = FakePublisher::new();
    let second = runner::run(&h.cfg, &store, &h.assembler(), &publisher)
        .await
        .unwrap();
    assert_eq!(second.selected, 0);
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn assembly_failure_does_not_stop_the_run() {
    let h = Harness::new(&[("a", 60), ("b", 120), ("c", 180)], 5);
    let assembler = h.assembler().failing_on("b");
    let publisher = FakePublisher::new();

    let report = runner::run(&h.cfg, &h.store(), &assembler, &publisher)
        .await
        .unwrap();

    assert_eq!(report.published, 2);
    assert_eq!(report.assembly_failed, 1);
    assert_eq!(publisher.published(), vec!["a", "c"]);

    // The failed item stays out of the posted state.
    let state = h.store().load().await.unwrap();
    assert_eq!(state.posted.len(), 2);
    assert!(!state.posted.iter().any(|k| k.ends_with("|b")));
}

#[tokio::test]
async fn publish_failure_keeps_item_eligible_for_next_run() {
    let h = Harness::new(&[("flaky", 60)], 5);
    let store = h.store();

    let report = runner::run(
        &h.cfg,
        &store,
        &h.assembler(),
        &FakePublisher::new().failing_on("flaky"),
    )
    .await
    .unwrap();
    assert_eq!(report.publish_failed, 1);
    assert_eq!(store.load().await.unwrap().posted.len(), 0);
    assert_eq!(h.leftover_assets(), 0);

    let publisher = FakePublisher::new();
    let retry = runner::run(&h.cfg, &store, &h.assembler(), &publisher)
        .await
        .unwrap();
    assert_eq!(retry.published, 1);
    assert_eq!(publisher.published(), vec!["flaky"]);
}

#[tokio::test]
async fn too_soon_items_are_deferred_not_published() {
    // Two minutes out truncates to a wall-clock minute inside the default
    // two-minute lead, while still being strictly in the future at selection.
    let h = Harness::new(&[("soon", 2), ("later", 60)], 5);
    let publisher = FakePublisher::new();

    let report = runner::run(&h.cfg, &h.store(), &h.assembler(), &publisher)
        .await
        .unwrap();

    assert_eq!(report.deferred, 1);
    assert_eq!(report.published, 1);
    assert_eq!(publisher.published(), vec!["later"]);
}

#[tokio::test]
async fn capacity_spills_remainder_to_the_next_run() {
    let rows: Vec<(String, i64)> = (0..12).map(|i| (format!("v{i}"), 60 + i * 10)).collect();
    let borrowed: Vec<(&str, i64)> = rows.iter().map(|(t, o)| (t.as_str(), *o)).collect();
    let h = Harness::new(&borrowed, 10);
    let store = h.store();

    let first = runner::run(&h.cfg, &store, &h.assembler(), &FakePublisher::new())
        .await
        .unwrap();
    assert_eq!(first.selected, 10);
    assert_eq!(first.published, 10);

    let publisher = FakePublisher::new();
    let second = runner::run(&h.cfg, &store, &h.assembler(), &publisher)
        .await
        .unwrap();
    assert_eq!(second.selected, 2);
    assert_eq!(publisher.published(), vec!["v10", "v11"]);

    assert_eq!(store.load().await.unwrap().posted.len(), 12);
}

#[tokio::test]
async fn commit_failure_keeps_item_published_and_run_going() {
    let mut h = Harness::new(&[("a", 60), ("b", 120)], 5);
    // A state file inside a directory that does not exist makes every
    // commit fail at the atomic-replace step.
    let broken = h._td.path().join("no-such-dir").join("posted_state.json");
    h.cfg.state_file = broken.to_string_lossy().to_string();
    let store = StateStore::new(&broken, false);
    let publisher = FakePublisher::new();

    let report = runner::run(&h.cfg, &store, &h.assembler(), &publisher)
        .await
        .unwrap();

    // Best-effort commit: the failure is logged, the outcome stays
    // published, and the next item is still processed.
    assert_eq!(report.published, 2);
    assert_eq!(publisher.published(), vec!["a", "b"]);
    assert!(!broken.exists());
    assert_eq!(h.leftover_assets(), 0);
}

#[tokio::test]
async fn published_key_is_durable_before_next_item_starts() {
    let h = Harness::new(&[("first", 60), ("second", 120)], 5);
    let publisher = StateSnapshotPublisher::new(h.store_path.clone());

    let report = runner::run(&h.cfg, &h.store(), &h.assembler(), &publisher)
        .await
        .unwrap();
    assert_eq!(report.published, 2);

    let snapshots = publisher.snapshots();
    assert_eq!(snapshots.len(), 2);
    // Nothing is committed before the first upload...
    assert!(!snapshots[0].contains("|first"));
    // ...but by the time the second item reaches the publisher, the first
    // item's key is already on disk.
    assert!(snapshots[1].contains("|first"));
    assert!(!snapshots[1].contains("|second"));
}

#[tokio::test]
async fn unconfigured_publisher_defers_without_rendering() {
    let h = Harness::new(&[("a", 60), ("b", 120)], 5);
    let assembler = h.assembler();
    let publisher = FakePublisher::unconfigured();

    let report = runner::run(&h.cfg, &h.store(), &assembler, &publisher)
        .await
        .unwrap();

    assert_eq!(report.selected, 2);
    assert_eq!(report.deferred, 2);
    assert!(assembler.calls().is_empty());
    assert!(publisher.published().is_empty());
}

#[tokio::test]
async fn missing_schedule_file_is_an_empty_run() {
    let h = Harness::new(&[], 5);
    std::fs::remove_file(&h.cfg.schedule_csv).unwrap();

    let report = runner::run(&h.cfg, &h.store(), &h.assembler(), &FakePublisher::new())
        .await
        .unwrap();
    assert_eq!(report, runner::RunReport::default());
}

#[tokio::test]
async fn malformed_row_does_not_reduce_valid_selection() {
    let h = Harness::new(&[("good", 60)], 5);
    // Append a row with an unparsable timestamp.
    let mut csv = std::fs::read_to_string(&h.cfg.schedule_csv).unwrap();
    csv.push_str("bad,not-a-date,\n");
    std::fs::write(&h.cfg.schedule_csv, csv).unwrap();

    let publisher = FakePublisher::new();
    let report = runner::run(&h.cfg, &h.store(), &h.assembler(), &publisher)
        .await
        .unwrap();
    assert_eq!(report.selected, 1);
    assert_eq!(publisher.published(), vec!["good"]);
}
