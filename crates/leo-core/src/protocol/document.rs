//! Protocol documents on disk: scanning, validation, superseding, and new
//! versions.
//!
//! Headers are plain markdown lines (`**Version**: 4.2.0`). Edits are regex
//! rewrites of those lines plus one delimited deprecation block, never a
//! markdown parse.

use super::version::Version;
use crate::error::{LeoError, Result};
use crate::io::atomic_write;
use crate::paths::{protocol_filename, protocol_version_from_filename};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_SUPERSEDED: &str = "SUPERSEDED";

pub const DEPRECATION_HEADING: &str = "## ⚠️ DEPRECATION NOTICE";

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

fn header_re(field: &'static str, cell: &'static OnceLock<Regex>) -> &'static Regex {
    cell.get_or_init(|| {
        Regex::new(&format!(r"(?m)^\*\*{field}\*\*:[ \t]*(.*?)[ \t]*$")).expect("static regex")
    })
}

static VERSION_RE: OnceLock<Regex> = OnceLock::new();
static STATUS_RE: OnceLock<Regex> = OnceLock::new();
static DATE_RE: OnceLock<Regex> = OnceLock::new();

fn version_re() -> &'static Regex {
    header_re("Version", &VERSION_RE)
}

fn status_re() -> &'static Regex {
    header_re("Status", &STATUS_RE)
}

fn date_re() -> &'static Regex {
    header_re("Date", &DATE_RE)
}

const NOTICE_END: &str = "\n---\n";

/// Byte range of the deprecation block: from its heading through the
/// closing rule, or to the next `## ` heading for hand-written notices.
fn notice_span(content: &str) -> Option<(usize, usize)> {
    let start = content
        .match_indices(DEPRECATION_HEADING)
        .map(|(i, _)| i)
        .find(|&i| i == 0 || content[..i].ends_with('\n'))?;
    let body = start + DEPRECATION_HEADING.len();
    let end = match content[body..].find(NOTICE_END) {
        Some(i) => body + i + NOTICE_END.len(),
        None => content[body..]
            .find("\n## ")
            .map_or(content.len(), |i| body + i + 1),
    };
    Some((start, end))
}

fn replace_notice(content: &str, block: &str) -> Option<String> {
    let (start, end) = notice_span(content)?;
    Some(format!("{}{block}{}", &content[..start], &content[end..]))
}

fn header(re: &Regex, content: &str) -> Option<String> {
    re.captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}

fn set_header(re: &Regex, content: &str, field: &str, value: &str) -> String {
    let line = format!("**{field}**: {value}");
    if re.is_match(content) {
        re.replace(content, regex::NoExpand(&line)).into_owned()
    } else {
        insert_after_title(content, &format!("{line}\n"))
    }
}

/// Insert `block` after the first `# ` title line, or at the top.
fn insert_after_title(content: &str, block: &str) -> String {
    match content.find('\n').filter(|_| content.starts_with("# ")) {
        Some(end) => format!("{}\n{block}{}", &content[..end], &content[end + 1..]),
        None => format!("{block}{content}"),
    }
}

// ---------------------------------------------------------------------------
// ProtocolDocument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ProtocolDocument {
    pub path: PathBuf,
    pub filename: String,
    /// Version from the filename; the authoritative one.
    pub version: Version,
    pub header_version: Option<String>,
    pub status: Option<String>,
    pub date: Option<String>,
    pub has_deprecation_notice: bool,
}

impl ProtocolDocument {
    pub fn parse(path: &Path, content: &str) -> Option<Self> {
        let filename = path.file_name()?.to_str()?.to_string();
        let version = protocol_version_from_filename(&filename)?.parse().ok()?;
        Some(Self {
            path: path.to_path_buf(),
            filename,
            version,
            header_version: header(version_re(), content),
            status: header(status_re(), content),
            date: header(date_re(), content),
            has_deprecation_notice: notice_span(content).is_some(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(STATUS_ACTIVE))
    }

    pub fn is_superseded(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.to_ascii_uppercase().starts_with(STATUS_SUPERSEDED))
    }
}

/// Every protocol document in `dir`, oldest version first. Other files are
/// ignored; a missing directory is empty.
pub fn scan(dir: &Path) -> Result<Vec<ProtocolDocument>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut docs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if protocol_version_from_filename(name).is_none() {
            continue;
        }
        let content = std::fs::read_to_string(&path)?;
        if let Some(doc) = ProtocolDocument::parse(&path, &content) {
            docs.push(doc);
        }
    }
    docs.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.filename.cmp(&b.filename)));
    Ok(docs)
}

pub fn find_latest(docs: &[ProtocolDocument]) -> Option<&ProtocolDocument> {
    docs.iter().max_by(|a, b| a.version.cmp(&b.version))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocIssue {
    pub file: String,
    pub message: String,
}

/// Exactly one ACTIVE document, and it is the latest; header versions
/// match filenames; every older document is superseded.
pub fn validate_all(docs: &[ProtocolDocument]) -> Vec<DocIssue> {
    let mut issues = Vec::new();
    let issue = |file: &str, message: String| DocIssue {
        file: file.to_string(),
        message,
    };

    let Some(latest) = find_latest(docs) else {
        return vec![issue("-", "No protocol documents found".to_string())];
    };

    let active: Vec<&ProtocolDocument> = docs.iter().filter(|d| d.is_active()).collect();
    match active.as_slice() {
        [] => issues.push(issue("-", "No ACTIVE protocol document".to_string())),
        [one] if one.version != latest.version => issues.push(issue(
            &one.filename,
            format!("ACTIVE document is v{} but the latest is v{}", one.version, latest.version),
        )),
        [_] => {}
        many => issues.push(issue(
            "-",
            format!(
                "{} documents are ACTIVE: {}",
                many.len(),
                many.iter().map(|d| d.filename.as_str()).collect::<Vec<_>>().join(", ")
            ),
        )),
    }

    for d in docs {
        match &d.header_version {
            None => issues.push(issue(&d.filename, "Missing **Version** header".to_string())),
            Some(h) if h.parse::<Version>().ok().as_ref() != Some(&d.version) => issues.push(issue(
                &d.filename,
                format!("Header version {h} does not match filename version {}", d.version),
            )),
            Some(_) => {}
        }
        if d.version < latest.version && !d.is_superseded() {
            issues.push(issue(
                &d.filename,
                format!(
                    "Older document has status {} instead of {STATUS_SUPERSEDED}",
                    d.status.as_deref().unwrap_or("(none)")
                ),
            ));
        }
    }
    issues
}

// ---------------------------------------------------------------------------
// Superseding
// ---------------------------------------------------------------------------

fn notice_block(by: &Version, date: &str) -> String {
    format!(
        "{DEPRECATION_HEADING}\n\n\
         This version is superseded by **v{by}** ({file}) as of {date}.\n\
         Do not follow it for new work.\n\n---\n",
        file = protocol_filename(&by.to_string()),
    )
}

/// Mark `content` superseded by `by`: rewrite the status header and insert
/// or replace the deprecation block. Applying it twice with the same
/// arguments changes nothing.
pub fn supersede(content: &str, by: &Version, date: &str) -> String {
    let status = format!("{STATUS_SUPERSEDED} by v{by}");
    let content = set_header(status_re(), content, "Status", &status);
    let block = notice_block(by, date);
    replace_notice(&content, &block).unwrap_or_else(|| insert_after_title(&content, &format!("\n{block}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupersedeFix {
    pub file: String,
    pub from_status: Option<String>,
    pub superseded_by: String,
    pub applied: bool,
}

/// Find older documents that are not superseded (or lack the notice) and,
/// when `apply`, rewrite them against the latest version.
pub fn fix_superseding(dir: &Path, date: &str, apply: bool) -> Result<Vec<SupersedeFix>> {
    let docs = scan(dir)?;
    let Some(latest) = find_latest(&docs) else {
        return Ok(Vec::new());
    };
    let mut fixes = Vec::new();
    for d in docs.iter().filter(|d| d.version < latest.version) {
        if d.is_superseded() && d.has_deprecation_notice {
            continue;
        }
        if apply {
            let content = std::fs::read_to_string(&d.path)?;
            atomic_write(&d.path, supersede(&content, &latest.version, date).as_bytes())?;
            tracing::info!(file = %d.filename, by = %latest.version, "superseded");
        }
        fixes.push(SupersedeFix {
            file: d.filename.clone(),
            from_status: d.status.clone(),
            superseded_by: latest.version.to_string(),
            applied: apply,
        });
    }
    Ok(fixes)
}

// ---------------------------------------------------------------------------
// New version
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct NewVersion {
    pub path: PathBuf,
    pub version: String,
    pub previous: Option<String>,
}

/// Write `leo_protocol_v{new}.md` as the ACTIVE document, seeded from the
/// latest one, and supersede the latest. `new` must be newer than every
/// existing document.
pub fn create_new_version(dir: &Path, new: &str, date: &str) -> Result<NewVersion> {
    let version: Version = new.parse()?;
    let docs = scan(dir)?;
    let latest = find_latest(&docs);
    if let Some(l) = latest {
        if version <= l.version {
            return Err(LeoError::InvalidVersion(format!(
                "{new} is not newer than the latest protocol v{}",
                l.version
            )));
        }
    }

    let base = match latest {
        Some(l) => {
            let old = std::fs::read_to_string(&l.path)?;
            replace_notice(&old, "").unwrap_or(old)
        }
        None => format!("# LEO Protocol v{version}\n"),
    };
    let mut content = set_header(version_re(), &base, "Version", &version.to_string());
    content = set_header(status_re(), &content, "Status", STATUS_ACTIVE);
    content = set_header(date_re(), &content, "Date", date);

    let path = dir.join(protocol_filename(&version.to_string()));
    atomic_write(&path, content.as_bytes())?;
    tracing::info!(version = %version, "created protocol version");

    if let Some(l) = latest {
        let old = std::fs::read_to_string(&l.path)?;
        atomic_write(&l.path, supersede(&old, &version, date).as_bytes())?;
    }
    Ok(NewVersion {
        path,
        version: version.to_string(),
        previous: latest.map(|l| l.version.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(version: &str, status: &str) -> String {
        format!("# LEO Protocol v{version}\n**Version**: {version}\n**Status**: {status}\n**Date**: 2026-01-01\n\n## Phases\nLEAD, PLAN, EXEC.\n")
    }

    fn write(dir: &TempDir, version: &str, status: &str) -> PathBuf {
        let path = dir.path().join(protocol_filename(version));
        std::fs::write(&path, doc(version, status)).unwrap();
        path
    }

    #[test]
    fn scan_parses_headers_and_sorts() {
        let dir = TempDir::new().unwrap();
        write(&dir, "4.10.0", "ACTIVE");
        write(&dir, "4.9.1", "SUPERSEDED");
        std::fs::write(dir.path().join("README.md"), "# not a protocol").unwrap();

        let docs = scan(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].version.to_string(), "4.9.1");
        assert_eq!(docs[1].status.as_deref(), Some("ACTIVE"));
        assert_eq!(docs[1].date.as_deref(), Some("2026-01-01"));
        assert_eq!(find_latest(&docs).unwrap().filename, "leo_protocol_v4.10.0.md");
        assert!(validate_all(&docs).is_empty());
    }

    #[test]
    fn validate_reports_each_problem() {
        let dir = TempDir::new().unwrap();
        write(&dir, "4.1.0", "ACTIVE");
        let p = write(&dir, "4.2.0", "ACTIVE");
        std::fs::write(&p, doc("4.2.0", "ACTIVE").replace("**Version**: 4.2.0", "**Version**: 4.1.9")).unwrap();

        let issues = validate_all(&scan(dir.path()).unwrap());
        let text: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();
        assert!(text.iter().any(|m| m.contains("2 documents are ACTIVE")));
        assert!(text.iter().any(|m| m.contains("does not match filename")));
        assert!(text.iter().any(|m| m.contains("instead of SUPERSEDED")));
    }

    #[test]
    fn supersede_is_idempotent() {
        let by: Version = "4.2.0".parse().unwrap();
        let once = supersede(&doc("4.1.0", "ACTIVE"), &by, "2026-02-01");
        assert!(once.contains("**Status**: SUPERSEDED by v4.2.0"));
        assert!(once.contains(DEPRECATION_HEADING));
        assert!(once.contains("## Phases"));
        assert_eq!(supersede(&once, &by, "2026-02-01"), once);
        assert_eq!(once.matches(DEPRECATION_HEADING).count(), 1);

        let newer: Version = "4.3.0".parse().unwrap();
        let again = supersede(&once, &newer, "2026-03-01");
        assert_eq!(again.matches(DEPRECATION_HEADING).count(), 1);
        assert!(again.contains("v4.3.0"));
        assert!(!again.contains("as of 2026-02-01"));
    }

    #[test]
    fn fix_superseding_dry_run_then_apply() {
        let dir = TempDir::new().unwrap();
        write(&dir, "4.1.0", "ACTIVE");
        write(&dir, "4.2.0", "ACTIVE");

        let dry = fix_superseding(dir.path(), "2026-02-01", false).unwrap();
        assert_eq!(dry.len(), 1);
        assert!(!dry[0].applied);

        let applied = fix_superseding(dir.path(), "2026-02-01", true).unwrap();
        assert!(applied[0].applied);
        assert!(fix_superseding(dir.path(), "2026-02-01", false).unwrap().is_empty());
        assert!(validate_all(&scan(dir.path()).unwrap()).is_empty());
    }

    #[test]
    fn create_new_version_activates_and_supersedes() {
        let dir = TempDir::new().unwrap();
        write(&dir, "4.2.0", "ACTIVE");

        let created = create_new_version(dir.path(), "4.3.0", "2026-05-01").unwrap();
        assert_eq!(created.previous.as_deref(), Some("4.2.0"));
        let body = std::fs::read_to_string(&created.path).unwrap();
        assert!(body.contains("**Version**: 4.3.0"));
        assert!(body.contains("**Status**: ACTIVE"));
        assert!(body.contains("## Phases"));

        let docs = scan(dir.path()).unwrap();
        assert!(validate_all(&docs).is_empty(), "{:?}", validate_all(&docs));

        assert!(matches!(
            create_new_version(dir.path(), "4.3.0", "2026-05-02"),
            Err(LeoError::InvalidVersion(_))
        ));
    }

    #[test]
    fn first_version_in_empty_dir() {
        let dir = TempDir::new().unwrap();
        let created = create_new_version(dir.path(), "1.0", "2026-01-01").unwrap();
        assert!(created.previous.is_none());
        let docs = scan(dir.path()).unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].is_active());
    }
}
