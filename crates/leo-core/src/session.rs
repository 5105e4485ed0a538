//! Session record of which protocol files have been read, persisted at
//! `.leo/session-state.json`.
//!
//! Reads are fingerprinted with a 16-hex SHA-256 prefix of the file so that
//! an edited file counts as unread. A compaction event clears every read.

use crate::error::Result;
use crate::io::{read_json, short_hash, write_json};
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRead {
    pub trigger: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub file_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub sd_run_id: Option<String>,
    #[serde(default)]
    pub last_compaction_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub compaction_count: u32,
    #[serde(default)]
    pub file_reads: BTreeMap<String, FileRead>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadStatus {
    FileNotFound,
    NeverRead,
    FileChanged,
    AlreadyRead,
}

impl ReadStatus {
    pub fn needs_read(self) -> bool {
        self != ReadStatus::AlreadyRead
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReadStatus::FileNotFound => "FILE_NOT_FOUND",
            ReadStatus::NeverRead => "NEVER_READ",
            ReadStatus::FileChanged => "FILE_CHANGED",
            ReadStatus::AlreadyRead => "ALREADY_READ",
        }
    }
}

/// Hash of a protocol file relative to `root`, `None` if it does not exist.
pub fn file_hash(root: &Path, filename: &str) -> Option<String> {
    let data = std::fs::read(root.join(filename)).ok()?;
    Some(short_hash(&data))
}

impl SessionState {
    /// Load the session file. A missing or unreadable file is an empty
    /// session.
    pub fn load(root: &Path) -> Self {
        match read_json(&paths::session_state_path(root)) {
            Ok(Some(s)) => s,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("could not read session state: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        write_json(&paths::session_state_path(root), self)
    }

    /// Record a read of `filename` with its current hash. Returns the
    /// recorded hash, `None` when the file does not exist.
    pub fn record_read(&mut self, root: &Path, filename: &str, trigger: &str) -> Option<String> {
        let hash = file_hash(root, filename);
        self.file_reads.insert(
            filename.to_string(),
            FileRead {
                trigger: trigger.to_string(),
                timestamp: Utc::now(),
                file_hash: hash.clone(),
            },
        );
        hash
    }

    /// Clear every recorded read; protocol files must be read again.
    pub fn record_compaction(&mut self) {
        self.last_compaction_at = Some(Utc::now());
        self.compaction_count += 1;
        self.file_reads.clear();
    }

    pub fn check(&self, root: &Path, filename: &str) -> ReadStatus {
        let Some(current) = file_hash(root, filename) else {
            return ReadStatus::FileNotFound;
        };
        let Some(read) = self.file_reads.get(filename) else {
            return ReadStatus::NeverRead;
        };
        match &read.file_hash {
            Some(h) if *h != current => ReadStatus::FileChanged,
            _ => ReadStatus::AlreadyRead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_then_check_then_change() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("CLAUDE_CORE.md"), "# core v1").unwrap();

        let mut s = SessionState::load(dir.path());
        assert_eq!(s.check(dir.path(), "CLAUDE_CORE.md"), ReadStatus::NeverRead);

        let hash = s.record_read(dir.path(), "CLAUDE_CORE.md", "SD_START").unwrap();
        assert_eq!(hash.len(), 16);
        assert_eq!(s.check(dir.path(), "CLAUDE_CORE.md"), ReadStatus::AlreadyRead);

        std::fs::write(dir.path().join("CLAUDE_CORE.md"), "# core v2").unwrap();
        assert_eq!(s.check(dir.path(), "CLAUDE_CORE.md"), ReadStatus::FileChanged);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let s = SessionState::default();
        assert_eq!(
            s.check(dir.path(), "CLAUDE_LEAD.md"),
            ReadStatus::FileNotFound
        );
        assert!(ReadStatus::FileNotFound.needs_read());
    }

    #[test]
    fn compaction_clears_reads_and_persists() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("CLAUDE_LEAD.md"), "# lead").unwrap();
        let mut s = SessionState::default();
        s.record_read(dir.path(), "CLAUDE_LEAD.md", "HANDOFF");
        s.record_compaction();
        s.save(dir.path()).unwrap();

        let loaded = SessionState::load(dir.path());
        assert_eq!(loaded.compaction_count, 1);
        assert!(loaded.last_compaction_at.is_some());
        assert_eq!(
            loaded.check(dir.path(), "CLAUDE_LEAD.md"),
            ReadStatus::NeverRead
        );
    }

    #[test]
    fn corrupt_state_loads_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".leo")).unwrap();
        std::fs::write(dir.path().join(".leo/session-state.json"), "{oops").unwrap();
        assert_eq!(SessionState::load(dir.path()), SessionState::default());
    }
}
