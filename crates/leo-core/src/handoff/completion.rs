//! State transitions once every gate has passed.
//!
//! Writes are independent calls with no rollback. A failed write is logged,
//! reported as a warning, and the sequence carries on.

use super::verification::{validate_plan_verification, PlanVerification};
use crate::error::Result;
use crate::gate::OrchestratorView;
use crate::records::{ProductRequirement, StrategicDirective, PRD_STATUS_COMPLETED};
use crate::sd_type::TypeProfile;
use crate::store::{fields, Db, Row};
use crate::types::{HandoffType, SdStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPath {
    Orchestrator,
    NoPrd,
    Standard,
}

impl CompletionPath {
    pub fn as_str(self) -> &'static str {
        match self {
            CompletionPath::Orchestrator => "orchestrator",
            CompletionPath::NoPrd => "no_prd",
            CompletionPath::Standard => "standard",
        }
    }
}

pub(crate) fn best_effort<T>(warnings: &mut Vec<String>, what: &str, result: Result<T>) {
    if let Err(e) = result {
        tracing::warn!("{what} failed: {e}");
        warnings.push(format!("{what} failed: {e}"));
    }
}

/// Every child done: the parent completes without PRD or story checks.
pub fn complete_orchestrator(db: &Db, sd: &StrategicDirective, view: &OrchestratorView) -> Vec<String> {
    let mut warnings = Vec::new();
    tracing::info!(sd = %sd.key(), children = view.children.len(), "completing orchestrator");
    best_effort(
        &mut warnings,
        "orchestrator status update",
        db.update_sd(
            &sd.id,
            fields(json!({
                "status": SdStatus::Completed.as_str(),
                "progress_percentage": 100,
                "current_phase": "COMPLETED",
            })),
        ),
    );
    warnings
}

/// No PRD and none required: finalize stories by SD and move to LEAD
/// approval.
pub fn complete_without_prd(db: &Db, sd: &StrategicDirective) -> Vec<String> {
    let mut warnings = Vec::new();
    best_effort(&mut warnings, "user story finalization", db.finalize_stories("sd_id", &sd.id));
    best_effort(
        &mut warnings,
        "SD status update",
        db.update_sd(
            &sd.id,
            fields(json!({
                "status": SdStatus::PendingApproval.as_str(),
                "current_phase": "LEAD",
            })),
        ),
    );
    warnings
}

/// PRD path: finalize stories by PRD, score plan verification, and on
/// success complete the PRD (embedding `gate_snapshot` in its metadata) and
/// move the SD to LEAD approval.
pub fn complete_standard(
    db: &Db,
    sd: &StrategicDirective,
    prd: &ProductRequirement,
    profile: &TypeProfile,
    threshold: u32,
    gate_snapshot: Row,
) -> (PlanVerification, Vec<String>) {
    let mut warnings = Vec::new();
    best_effort(&mut warnings, "user story finalization", db.finalize_stories("prd_id", &prd.id));

    let stories = db.stories_for_prd(&prd.id).unwrap_or_else(|e| {
        warnings.push(format!("user story lookup failed: {e}"));
        Vec::new()
    });
    let exec_accepted = db
        .latest_handoff(&sd.id, HandoffType::ExecToPlan, true)
        .map(|h| h.is_some())
        .unwrap_or_else(|e| {
            warnings.push(format!("EXEC-TO-PLAN lookup failed: {e}"));
            false
        });
    let verification = validate_plan_verification(
        prd,
        exec_accepted || profile.validation.is_non_code,
        &stories,
        profile.validation.requires_user_stories,
        threshold,
    );
    if !verification.complete {
        return (verification, warnings);
    }

    let mut metadata = match &prd.metadata {
        Value::Object(m) => m.clone(),
        _ => Row::new(),
    };
    metadata.extend(gate_snapshot);
    metadata.insert(
        "plan_verification".into(),
        serde_json::to_value(&verification).unwrap_or_default(),
    );
    best_effort(
        &mut warnings,
        "PRD completion",
        db.update_prd(
            &prd.id,
            fields(json!({
                "status": PRD_STATUS_COMPLETED,
                "phase": "LEAD_APPROVAL",
                "metadata": metadata,
            })),
        ),
    );
    best_effort(
        &mut warnings,
        "SD status update",
        db.update_sd(
            &sd.id,
            fields(json!({
                "status": SdStatus::PendingApproval.as_str(),
                "current_phase": "LEAD",
            })),
        ),
    );
    (verification, warnings)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Cascade {
    /// Keys of parents completed, nearest first.
    pub completed: Vec<String>,
    pub warnings: Vec<String>,
}

fn sibling_done(s: &StrategicDirective) -> bool {
    matches!(s.status, SdStatus::Completed | SdStatus::PendingApproval)
}

/// Walk up from `sd`: while every child of the parent is completed or
/// pending approval, complete the parent and continue with its parent.
pub fn cascade_parents(db: &Db, sd: &StrategicDirective) -> Cascade {
    let mut out = Cascade::default();
    let mut seen = HashSet::new();
    let mut next = sd.parent_sd_id.clone();

    while let Some(parent_id) = next.take() {
        if !seen.insert(parent_id.clone()) {
            out.warnings.push(format!("parent cycle at {parent_id}"));
            break;
        }
        let parent = match db.find_sd(&parent_id) {
            Ok(Some(p)) => p,
            Ok(None) => {
                out.warnings.push(format!("parent SD {parent_id} not found"));
                break;
            }
            Err(e) => {
                out.warnings.push(format!("parent lookup failed: {e}"));
                break;
            }
        };
        let children = match db.children(&parent.id) {
            Ok(c) => c,
            Err(e) => {
                out.warnings.push(format!("child lookup for {} failed: {e}", parent.key()));
                break;
            }
        };
        if children.is_empty() || !children.iter().all(sibling_done) {
            tracing::debug!(parent = %parent.key(), "siblings still open");
            break;
        }

        tracing::info!(parent = %parent.key(), "all children done, completing parent");
        best_effort(
            &mut out.warnings,
            "parent completion",
            db.update_sd(
                &parent.id,
                fields(json!({
                    "status": SdStatus::Completed.as_str(),
                    "progress_percentage": 100,
                    "current_phase": "COMPLETED",
                })),
            ),
        );
        out.completed.push(parent.key().to_string());
        next = parent.parent_sd_id.clone();
    }
    out
}

/// Ordered follow-up commands for the operator. Orchestrators have nothing
/// of their own to ship.
pub fn next_commands(path: CompletionPath, completed_parents: &[String]) -> Vec<String> {
    let mut cmds: Vec<String> = match path {
        CompletionPath::Orchestrator => vec!["learn".into(), "document".into()],
        _ => vec!["ship".into(), "learn".into(), "document".into()],
    };
    for p in completed_parents {
        cmds.push(format!("learn {p}"));
        cmds.push(format!("document {p}"));
    }
    cmds.push("leo next".into());
    cmds
}
