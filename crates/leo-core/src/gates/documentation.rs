use crate::gate::{Gate, GateContext, GateResult};
use crate::records::str_list;
use crate::types::SdType;
use serde_json::json;
use std::path::{Component, Path, PathBuf};

const LINKS_KEY: &str = "documentation_links";

fn is_url(link: &str) -> bool {
    link.starts_with("http://") || link.starts_with("https://")
}

/// `link` resolved against `root`, or `None` when it is absolute or climbs
/// out of `root`. Symlinks are followed for links that exist.
fn resolve_under(root: &Path, link: &str) -> Option<PathBuf> {
    let mut rel = PathBuf::new();
    for c in Path::new(link).components() {
        match c {
            Component::CurDir => {}
            Component::Normal(part) => rel.push(part),
            Component::ParentDir => {
                if !rel.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    let path = root.join(rel);
    if let (Ok(real), Ok(real_root)) = (path.canonicalize(), root.canonicalize()) {
        if !real.starts_with(real_root) {
            return None;
        }
    }
    Some(path)
}

enum LinkState {
    Ok,
    Missing,
    Outside,
}

fn link_state(root: &Path, link: &str) -> LinkState {
    if is_url(link) {
        return LinkState::Ok;
    }
    match resolve_under(root, link) {
        None => LinkState::Outside,
        Some(p) if p.exists() => LinkState::Ok,
        Some(_) => LinkState::Missing,
    }
}

/// Documentation links on the SD or its PRD must resolve: URLs are taken
/// as given, paths must exist under the project root and may not leave it.
pub struct DocumentationLinkGate;

impl Gate for DocumentationLinkGate {
    fn name(&self) -> &'static str {
        "DOCUMENTATION_LINK"
    }

    fn validate(&self, ctx: &GateContext) -> GateResult {
        let sd = ctx.sd();
        let mut links = sd.metadata_str_list(LINKS_KEY);
        match ctx.db().prd_for_sd(&sd.id) {
            Ok(Some(prd)) => links.extend(str_list(prd.metadata.get(LINKS_KEY))),
            Ok(None) => {}
            Err(e) => tracing::warn!(sd = %sd.key(), "PRD lookup failed: {e}"),
        }
        links.sort();
        links.dedup();

        if links.is_empty() {
            if ctx.subject.sd_type == SdType::Documentation {
                return GateResult::fail(0, "Documentation SD has no documentation links")
                    .with_remediation(format!("Add {LINKS_KEY} to the SD or PRD metadata"));
            }
            return GateResult::pass(100).with_warning("No documentation links recorded");
        }

        let root = ctx.subject.root;
        let mut broken: Vec<&String> = Vec::new();
        let mut issues = Vec::new();
        for l in &links {
            match link_state(root, l) {
                LinkState::Ok => {}
                LinkState::Missing => {
                    broken.push(l);
                    issues.push(format!("missing: {l}"));
                }
                LinkState::Outside => {
                    broken.push(l);
                    issues.push(format!("outside project root: {l}"));
                }
            }
        }
        let details = json!({"links": links, "broken": broken});

        if broken.is_empty() {
            return GateResult::pass(100).with_details(details);
        }
        let ok = links.len() - broken.len();
        let score = (ok * 100 / links.len()) as u32;
        let mut r = GateResult::fail(score, format!("{} documentation link(s) do not resolve", broken.len()))
            .with_remediation("Fix or remove broken documentation links");
        for i in issues {
            r = r.with_issue(i);
        }
        r.with_details(details)
    }
}
