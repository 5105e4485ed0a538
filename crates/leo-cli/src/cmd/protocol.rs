use crate::output::{print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use leo_core::config::Config;
use leo_core::paths::{CLAUDE_CORE_MD, CLAUDE_LEAD_MD};
use leo_core::protocol::{
    self, create_new_version, find_latest, fix_superseding, scan, validate_all, CheckOptions,
    VersionChange, Watcher,
};
use leo_core::session::SessionState;
use std::path::Path;
use std::sync::atomic::AtomicBool;

#[derive(Subcommand)]
pub enum ProtocolSubcommand {
    /// List protocol documents, or create, validate, or fix them
    Version {
        /// Create this version as the new ACTIVE document and supersede the latest
        #[arg(long, value_name = "X.Y.Z", conflicts_with_all = ["validate_all", "fix_superseding"])]
        new_version: Option<String>,
        /// Check headers, filenames, and superseding across all documents
        #[arg(long, conflicts_with = "fix_superseding")]
        validate_all: bool,
        /// Report older documents missing their SUPERSEDED status or notice
        #[arg(long)]
        fix_superseding: bool,
        /// With --fix-superseding, rewrite the reported documents
        #[arg(long, requires = "fix_superseding")]
        fix: bool,
    },

    /// Resolve the current protocol version through the cache
    Check {
        /// Trust a fresh cache without reading the documents
        #[arg(long)]
        quick: bool,
        /// Ignore the cache
        #[arg(long)]
        force: bool,
    },

    /// Record that a protocol file was read in this session
    RecordRead {
        /// File path relative to the project root (e.g. CLAUDE_CORE.md)
        file: String,
        /// What prompted the read
        #[arg(long, default_value = "manual")]
        trigger: String,
    },

    /// Record a context compaction; every protocol file must be read again
    RecordCompaction,

    /// Show whether the core protocol files need reading
    Reads,

    /// Poll the protocol directory for version changes
    Watch {
        /// Keep polling until interrupted; otherwise poll once
        #[arg(long)]
        daemon: bool,
        /// Seconds between polls (default from config)
        #[arg(long)]
        interval: Option<u64>,
        /// Print nothing on change
        #[arg(long)]
        silent: bool,
    },
}

pub fn run(root: &Path, subcmd: ProtocolSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ProtocolSubcommand::Version {
            new_version,
            validate_all,
            fix_superseding,
            fix,
        } => {
            let config = Config::load(root).context("failed to load config")?;
            let dir = config.protocol_dir(root);
            if let Some(v) = new_version {
                new_version_cmd(&dir, &v, json)
            } else if validate_all {
                validate_cmd(&dir, json)
            } else if fix_superseding {
                fix_cmd(&dir, fix, json)
            } else {
                list_cmd(&dir, json)
            }
        }
        ProtocolSubcommand::Check { quick, force } => check_cmd(root, quick, force, json),
        ProtocolSubcommand::RecordRead { file, trigger } => record_read(root, &file, &trigger, json),
        ProtocolSubcommand::RecordCompaction => record_compaction(root, json),
        ProtocolSubcommand::Reads => reads(root, json),
        ProtocolSubcommand::Watch {
            daemon,
            interval,
            silent,
        } => watch(root, daemon, interval, silent, json),
    }
}

fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

fn list_cmd(dir: &Path, json: bool) -> anyhow::Result<()> {
    let docs = scan(dir)?;
    let latest = find_latest(&docs).map(|d| d.version.to_string());
    if json {
        return print_json(&serde_json::json!({ "latest": latest, "documents": docs }));
    }
    if docs.is_empty() {
        println!("No protocol documents in {}", dir.display());
        return Ok(());
    }
    let rows = docs
        .iter()
        .map(|d| {
            vec![
                d.version.to_string(),
                d.status.clone().unwrap_or_else(|| "-".to_string()),
                d.date.clone().unwrap_or_else(|| "-".to_string()),
                d.filename.clone(),
            ]
        })
        .collect();
    print_table(&["VERSION", "STATUS", "DATE", "FILE"], rows);
    if let Some(l) = latest {
        println!("\nLatest: v{l}");
    }
    Ok(())
}

fn new_version_cmd(dir: &Path, version: &str, json: bool) -> anyhow::Result<()> {
    let created = create_new_version(dir, version, &today())?;
    if json {
        return print_json(&created);
    }
    println!("created: {}", created.path.display());
    if let Some(prev) = &created.previous {
        println!("superseded: v{prev}");
    }
    Ok(())
}

fn validate_cmd(dir: &Path, json: bool) -> anyhow::Result<()> {
    let docs = scan(dir)?;
    let issues = validate_all(&docs);
    if json {
        print_json(&serde_json::json!({ "documents": docs.len(), "issues": issues }))?;
    } else if issues.is_empty() {
        println!("{} protocol documents valid.", docs.len());
    } else {
        for i in &issues {
            println!("[{}] {}", i.file, i.message);
        }
    }
    if !issues.is_empty() {
        anyhow::bail!("{} protocol document issue(s)", issues.len());
    }
    Ok(())
}

fn fix_cmd(dir: &Path, apply: bool, json: bool) -> anyhow::Result<()> {
    let fixes = fix_superseding(dir, &today(), apply)?;
    if json {
        return print_json(&fixes);
    }
    if fixes.is_empty() {
        println!("All older protocol documents are superseded.");
        return Ok(());
    }
    let verb = if apply { "fixed" } else { "needs fix" };
    for f in &fixes {
        println!(
            "{verb}: {} (status {}) -> SUPERSEDED by v{}",
            f.file,
            f.from_status.as_deref().unwrap_or("-"),
            f.superseded_by
        );
    }
    if !apply {
        println!("\nRe-run with --fix to rewrite these documents.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn check_cmd(root: &Path, quick: bool, force: bool, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let report = protocol::check(
        root,
        &config.protocol_dir(root),
        config.protocol.cache_ttl_seconds,
        CheckOptions { quick, force },
    )?;
    if json {
        return print_json(&report);
    }
    let source = if report.from_cache { "cache" } else { "documents" };
    println!("Protocol v{} ({}, from {source})", report.version, report.file);
    if report.changed {
        match &report.previous_version {
            Some(prev) => println!("Changed since last check (was v{prev})"),
            None => println!("First check recorded"),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// session reads
// ---------------------------------------------------------------------------

fn record_read(root: &Path, file: &str, trigger: &str, json: bool) -> anyhow::Result<()> {
    let mut state = SessionState::load(root);
    let hash = state.record_read(root, file, trigger);
    state.save(root).context("failed to save session state")?;
    if json {
        return print_json(&serde_json::json!({ "file": file, "file_hash": hash }));
    }
    match hash {
        Some(h) => println!("recorded read: {file} ({h})"),
        None => println!("recorded read: {file} (file not found)"),
    }
    Ok(())
}

fn record_compaction(root: &Path, json: bool) -> anyhow::Result<()> {
    let mut state = SessionState::load(root);
    state.record_compaction();
    state.save(root).context("failed to save session state")?;
    if json {
        return print_json(&state);
    }
    println!(
        "compaction #{} recorded; protocol files must be read again",
        state.compaction_count
    );
    Ok(())
}

fn reads(root: &Path, json: bool) -> anyhow::Result<()> {
    let state = SessionState::load(root);
    let statuses: Vec<(&str, &str)> = [CLAUDE_CORE_MD, CLAUDE_LEAD_MD]
        .into_iter()
        .map(|f| (f, state.check(root, f).as_str()))
        .collect();
    if json {
        let map: serde_json::Map<String, serde_json::Value> = statuses
            .iter()
            .map(|(f, s)| (f.to_string(), serde_json::Value::from(*s)))
            .collect();
        return print_json(&map);
    }
    let rows = statuses
        .iter()
        .map(|(f, s)| vec![f.to_string(), s.to_string()])
        .collect();
    print_table(&["FILE", "STATUS"], rows);
    Ok(())
}

// ---------------------------------------------------------------------------
// watch
// ---------------------------------------------------------------------------

fn watch(root: &Path, daemon: bool, interval: Option<u64>, silent: bool, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let interval = interval.unwrap_or(config.protocol.watch_interval_seconds);
    let watcher = Watcher::new(root, &config.protocol_dir(root), interval);

    let report = |change: &VersionChange| {
        if silent {
            return;
        }
        if json {
            if let Ok(s) = serde_json::to_string(change) {
                println!("{s}");
            }
            return;
        }
        match &change.from {
            Some(from) => println!("protocol changed: v{from} -> v{}", change.to),
            None => println!("protocol at v{}", change.to),
        }
    };

    if !daemon {
        if let Some(change) = watcher.tick()? {
            report(&change);
        } else if !silent && !json {
            println!("protocol unchanged");
        }
        return Ok(());
    }

    tracing::info!(interval, "watching protocol documents");
    let stop = AtomicBool::new(false);
    watcher.run(&stop, None, report)?;
    Ok(())
}
