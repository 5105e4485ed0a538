//! Versioned LEO protocol documents: version ordering, document headers and
//! deprecation notices, the version cache, and the directory watcher.

pub mod cache;
pub mod document;
pub mod version;
pub mod watcher;

pub use cache::{check, CheckOptions, CheckReport, ProtocolCache};
pub use document::{
    create_new_version, find_latest, fix_superseding, scan, supersede, validate_all, DocIssue,
    NewVersion, ProtocolDocument, SupersedeFix,
};
pub use version::{is_newer_version, Version};
pub use watcher::{VersionChange, Watcher, WatcherState};
