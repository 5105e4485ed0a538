use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const LEO_DIR: &str = ".leo";
pub const DB_DIR: &str = ".leo/db";

pub const CONFIG_FILE: &str = ".leo/config.yaml";
pub const SESSION_STATE_FILE: &str = ".leo/session-state.json";

pub const CACHE_FILE: &str = ".leo-cache.json";
pub const WATCHER_FILE: &str = ".leo-watcher.json";

pub const DEFAULT_PROTOCOL_DIR: &str = "docs/protocol";

pub const CLAUDE_CORE_MD: &str = "CLAUDE_CORE.md";
pub const CLAUDE_LEAD_MD: &str = "CLAUDE_LEAD.md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn leo_dir(root: &Path) -> PathBuf {
    root.join(LEO_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn db_dir(root: &Path) -> PathBuf {
    root.join(DB_DIR)
}

pub fn table_path(root: &Path, table: &str) -> PathBuf {
    db_dir(root).join(format!("{table}.json"))
}

pub fn session_state_path(root: &Path) -> PathBuf {
    root.join(SESSION_STATE_FILE)
}

pub fn cache_path(root: &Path) -> PathBuf {
    root.join(CACHE_FILE)
}

pub fn watcher_path(root: &Path) -> PathBuf {
    root.join(WATCHER_FILE)
}

// ---------------------------------------------------------------------------
// Protocol document filenames
// ---------------------------------------------------------------------------

static PROTOCOL_FILE_RE: OnceLock<Regex> = OnceLock::new();

fn protocol_file_re() -> &'static Regex {
    PROTOCOL_FILE_RE.get_or_init(|| {
        Regex::new(r"^leo_protocol_v(\d+\.\d+(?:\.\d+)?)(?:_[A-Za-z0-9_\-]+)?\.md$")
            .expect("static regex")
    })
}

/// Extract the version from a protocol document filename, e.g.
/// `leo_protocol_v4.2.0_story_gates.md` → `4.2.0`.
pub fn protocol_version_from_filename(name: &str) -> Option<&str> {
    protocol_file_re()
        .captures(name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn protocol_filename(version: &str) -> String {
    format!("leo_protocol_v{version}.md")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
