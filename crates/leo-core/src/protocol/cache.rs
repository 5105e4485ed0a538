//! `.leo-cache.json`: the last protocol version seen, its content hash, and
//! when it was checked.

use super::document::{find_latest, scan};
use crate::error::{LeoError, Result};
use crate::io::{read_json, short_hash, write_json};
use crate::paths;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolCache {
    pub version: String,
    pub file: String,
    pub content_hash: String,
    pub timestamp: DateTime<Utc>,
}

impl ProtocolCache {
    pub fn load(root: &Path) -> Option<Self> {
        match read_json(&paths::cache_path(root)) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("ignoring unreadable protocol cache: {e}");
                None
            }
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        write_json(&paths::cache_path(root), self)
    }

    pub fn is_fresh(&self, ttl_seconds: u64, now: DateTime<Utc>) -> bool {
        let ttl = Duration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX));
        now.signed_duration_since(self.timestamp) < ttl
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions {
    /// Trust a fresh cache without reading the protocol directory.
    pub quick: bool,
    /// Ignore the cache entirely.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub version: String,
    pub file: String,
    pub content_hash: String,
    pub from_cache: bool,
    /// Version or content differs from the previous cache entry.
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
}

/// Resolve the current protocol version, using and refreshing the cache.
pub fn check(root: &Path, protocol_dir: &Path, ttl_seconds: u64, opts: CheckOptions) -> Result<CheckReport> {
    let now = Utc::now();
    let cached = if opts.force { None } else { ProtocolCache::load(root) };

    if opts.quick {
        if let Some(c) = cached.as_ref().filter(|c| c.is_fresh(ttl_seconds, now)) {
            tracing::debug!(version = %c.version, "protocol cache hit");
            return Ok(CheckReport {
                version: c.version.clone(),
                file: c.file.clone(),
                content_hash: c.content_hash.clone(),
                from_cache: true,
                changed: false,
                previous_version: None,
            });
        }
    }

    let docs = scan(protocol_dir)?;
    let latest = find_latest(&docs).ok_or_else(|| {
        LeoError::Protocol(format!("no protocol documents in {}", protocol_dir.display()))
    })?;
    let hash = short_hash(&std::fs::read(&latest.path)?);
    let version = latest.version.to_string();

    let changed = cached
        .as_ref()
        .map_or(true, |c| c.version != version || c.content_hash != hash);
    let entry = ProtocolCache {
        version: version.clone(),
        file: latest.filename.clone(),
        content_hash: hash.clone(),
        timestamp: now,
    };
    entry.save(root)?;

    Ok(CheckReport {
        version,
        file: latest.filename.clone(),
        content_hash: hash,
        from_cache: false,
        changed,
        previous_version: cached.map(|c| c.version),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::protocol_filename;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(protocol_filename("4.2.0")),
            "# LEO\n**Version**: 4.2.0\n**Status**: ACTIVE\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn first_check_writes_cache() {
        let dir = setup();
        let r = check(dir.path(), dir.path(), 300, CheckOptions::default()).unwrap();
        assert_eq!(r.version, "4.2.0");
        assert!(r.changed);
        assert!(!r.from_cache);
        assert_eq!(r.content_hash.len(), 16);
        assert_eq!(ProtocolCache::load(dir.path()).unwrap().version, "4.2.0");
    }

    #[test]
    fn quick_check_uses_fresh_cache() {
        let dir = setup();
        check(dir.path(), dir.path(), 300, CheckOptions::default()).unwrap();
        let quick = CheckOptions { quick: true, force: false };
        assert!(check(dir.path(), dir.path(), 300, quick).unwrap().from_cache);

        let forced = CheckOptions { quick: true, force: true };
        assert!(!check(dir.path(), dir.path(), 300, forced).unwrap().from_cache);
    }

    #[test]
    fn content_change_is_detected() {
        let dir = setup();
        check(dir.path(), dir.path(), 300, CheckOptions::default()).unwrap();
        let again = check(dir.path(), dir.path(), 300, CheckOptions::default()).unwrap();
        assert!(!again.changed);

        std::fs::write(
            dir.path().join(protocol_filename("4.2.0")),
            "# LEO\n**Version**: 4.2.0\n**Status**: ACTIVE\nedited\n",
        )
        .unwrap();
        let r = check(dir.path(), dir.path(), 300, CheckOptions::default()).unwrap();
        assert!(r.changed);
        assert_eq!(r.previous_version.as_deref(), Some("4.2.0"));
    }

    #[test]
    fn ttl_expiry() {
        let c = ProtocolCache {
            version: "4.2.0".into(),
            file: "f".into(),
            content_hash: "h".into(),
            timestamp: Utc::now() - Duration::seconds(301),
        };
        assert!(!c.is_fresh(300, Utc::now()));
        assert!(c.is_fresh(600, Utc::now()));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            check(dir.path(), dir.path(), 300, CheckOptions::default()),
            Err(LeoError::Protocol(_))
        ));
    }
}
