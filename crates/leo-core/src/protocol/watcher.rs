//! Polling watcher over the protocol directory, with its state in
//! `.leo-watcher.json`.

use super::cache::{check, CheckOptions};
use crate::error::Result;
use crate::io::{read_json, write_json};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherState {
    #[serde(default)]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_version: Option<String>,
    #[serde(default)]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl WatcherState {
    pub fn load(root: &Path) -> Self {
        match read_json(&paths::watcher_path(root)) {
            Ok(Some(s)) => s,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("could not read watcher state: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        write_json(&paths::watcher_path(root), self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionChange {
    pub from: Option<String>,
    pub to: String,
}

pub struct Watcher {
    root: PathBuf,
    protocol_dir: PathBuf,
    interval: Duration,
}

impl Watcher {
    pub fn new(root: &Path, protocol_dir: &Path, interval_seconds: u64) -> Self {
        Self {
            root: root.to_path_buf(),
            protocol_dir: protocol_dir.to_path_buf(),
            interval: Duration::from_secs(interval_seconds.max(1)),
        }
    }

    /// One poll. Returns the change when the version moved since the last
    /// recorded one.
    pub fn tick(&self) -> Result<Option<VersionChange>> {
        let mut state = WatcherState::load(&self.root);
        let opts = CheckOptions { quick: false, force: true };
        let report = check(&self.root, &self.protocol_dir, 0, opts)?;

        let change = (state.last_version.as_deref() != Some(report.version.as_str())).then(|| VersionChange {
            from: state.last_version.clone(),
            to: report.version.clone(),
        });
        state.last_check = Some(Utc::now());
        state.last_version = Some(report.version);
        state.stopped_at = None;
        state.save(&self.root)?;
        Ok(change)
    }

    /// Poll until `stop` is set or `max_ticks` polls have run, calling
    /// `on_change` for each version move. Poll errors are logged and the
    /// loop continues. The stop time is recorded on exit.
    pub fn run(
        &self,
        stop: &AtomicBool,
        max_ticks: Option<u64>,
        mut on_change: impl FnMut(&VersionChange),
    ) -> Result<()> {
        let mut ticks = 0u64;
        while !stop.load(Ordering::SeqCst) {
            match self.tick() {
                Ok(Some(change)) => on_change(&change),
                Ok(None) => {}
                Err(e) => tracing::warn!("protocol poll failed: {e}"),
            }
            ticks += 1;
            if max_ticks.is_some_and(|m| ticks >= m) {
                break;
            }
            std::thread::sleep(self.interval);
        }
        let mut state = WatcherState::load(&self.root);
        state.stopped_at = Some(Utc::now());
        state.save(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::protocol_filename;
    use tempfile::TempDir;

    fn write(dir: &Path, version: &str) {
        std::fs::write(
            dir.join(protocol_filename(version)),
            format!("# LEO\n**Version**: {version}\n**Status**: ACTIVE\n"),
        )
        .unwrap();
    }

    #[test]
    fn tick_reports_version_moves_once() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "4.1.0");
        let w = Watcher::new(dir.path(), dir.path(), 60);

        let first = w.tick().unwrap().unwrap();
        assert_eq!(first.from, None);
        assert_eq!(first.to, "4.1.0");
        assert!(w.tick().unwrap().is_none());

        write(dir.path(), "4.2.0");
        let moved = w.tick().unwrap().unwrap();
        assert_eq!(moved.from.as_deref(), Some("4.1.0"));

        let state = WatcherState::load(dir.path());
        assert_eq!(state.last_version.as_deref(), Some("4.2.0"));
        assert!(state.last_check.is_some());
    }

    #[test]
    fn run_records_stop_time() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "4.1.0");
        let w = Watcher::new(dir.path(), dir.path(), 1);
        let mut seen = Vec::new();
        w.run(&AtomicBool::new(false), Some(1), |c| seen.push(c.to.clone()))
            .unwrap();
        assert_eq!(seen, vec!["4.1.0"]);
        assert!(WatcherState::load(dir.path()).stopped_at.is_some());
    }

    #[test]
    fn stop_flag_prevents_polling() {
        let dir = TempDir::new().unwrap();
        let w = Watcher::new(dir.path(), dir.path(), 1);
        w.run(&AtomicBool::new(true), None, |_| panic!("no polls expected"))
            .unwrap();
        let state = WatcherState::load(dir.path());
        assert!(state.last_check.is_none());
        assert!(state.stopped_at.is_some());
    }
}
