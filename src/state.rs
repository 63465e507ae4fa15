use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("atomic replace failed: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("git {stage} exited with status {status}")]
    Git { stage: &'static str, status: i32 },
}

/// Durable record of which schedule rows have been published. Membership
/// only; insertion order is preserved so rewrites of the file stay diffable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostedState {
    #[serde(default)]
    pub posted: Vec<String>,
}

impl PostedState {
    pub fn contains(&self, key: &str) -> bool {
        self.posted.iter().any(|k| k == key)
    }

    /// Append a key; a second record of the same key is a no-op.
    pub fn record(&mut self, key: &str) {
        if !self.contains(key) {
            self.posted.push(key.to_string());
        }
    }

    pub fn key_set(&self) -> HashSet<String> {
        self.posted.iter().cloned().collect()
    }
}

/// File-backed posted-state store. `commit` replaces the file atomically so
/// a crash mid-write can never leave a half-updated record behind.
pub struct StateStore {
    path: PathBuf,
    commit_to_git: bool,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P, commit_to_git: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            commit_to_git,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// First-ever run has no file; that is an empty state, not an error.
    pub async fn load(&self) -> Result<PostedState, StateError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(PostedState::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Durably write the full state document. Write-to-temp-then-rename in
    /// the target directory, so readers only ever see the old or the new
    /// document. Optionally commits the file to git afterwards; any failure
    /// along the way is surfaced to the caller.
    pub async fn commit(&self, state: &PostedState, message: &str) -> Result<(), StateError> {
        let json = serde_json::to_vec_pretty(state)?;
        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty());

        let mut tmp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new_in(".")?,
        };
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        if self.commit_to_git {
            self.git_commit(message).await?;
        }
        Ok(())
    }

    async fn git_commit(&self, message: &str) -> Result<(), StateError> {
        run_git("add", Command::new("git").arg("add").arg(&self.path)).await?;
        run_git(
            "commit",
            Command::new("git").args(["commit", "-m", message]),
        )
        .await?;
        run_git("push", Command::new("git").arg("push")).await?;
        Ok(())
    }
}

async fn run_git(stage: &'static str, cmd: &mut Command) -> Result<(), StateError> {
    let status = cmd.status().await?;
    if !status.success() {
        return Err(StateError::Git {
            stage,
            status: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn load_without_file_is_empty() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("posted_state.json"), false);
        let state = store.load().await.unwrap();
        assert!(state.posted.is_empty());
    }

    #[tokio::test]
    async fn commit_then_load_round_trips() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("posted_state.json"), false);

        let mut state = store.load().await.unwrap();
        state.record("2031-06-01 09:00|A");
        store.commit(&state, "posted A").await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert!(reloaded.contains("2031-06-01 09:00|A"));
        assert_eq!(reloaded.posted.len(), 1);
    }

    #[tokio::test]
    async fn commit_replaces_previous_document() {
        let td = tempdir().unwrap();
        let store = StateStore::new(td.path().join("posted_state.json"), false);

        let mut state = PostedState::default();
        state.record("k1");
        store.commit(&state, "one").await.unwrap();
        state.record("k2");
        store.commit(&state, "two").await.unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.posted, vec!["k1".to_string(), "k2".to_string()]);
    }

    #[test]
    fn record_is_idempotent() {
        let mut state = PostedState::default();
        state.record("k");
        state.record("k");
        assert_eq!(state.posted.len(), 1);
    }

    #[test]
    fn key_set_matches_posted_list() {
        let mut state = PostedState::default();
        state.record("a");
        state.record("b");
        let set = state.key_set();
        assert!(set.contains("a") && set.contains("b"));
        assert_eq!(set.len(), 2);
    }
}
