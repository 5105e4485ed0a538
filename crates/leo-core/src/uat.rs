//! UAT run summaries and conversion of failed test results into corrective
//! strategic directives.

use crate::error::{LeoError, Result};
use crate::llm::{complete_json, LlmClient};
use crate::records::{StrategicDirective, UatCase, UatResult, UatStatus};
use crate::store::{fields, Db};
use serde::Serialize;
use serde_json::{json, Value};

const PRIORITIES: &[&str] = &["critical", "high", "medium", "low"];

const DRAFT_SYSTEM: &str = "You turn failed user acceptance tests into strategic directives. \
Reply with a JSON object: {\"title\": string, \"description\": string, \
\"priority\": \"critical\"|\"high\"|\"medium\"|\"low\"}.";

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub blocked: usize,
    /// Percent of all results that passed; 0 for an empty run.
    pub pass_rate: f64,
}

pub fn run_summary(db: &Db, run_id: &str) -> Result<RunSummary> {
    let results = db.uat_results_for_run(run_id)?;
    let count = |s: UatStatus| results.iter().filter(|r| r.status == s).count();
    let total = results.len();
    let passed = count(UatStatus::Pass);
    let pass_rate = if total == 0 {
        0.0
    } else {
        (passed as f64 / total as f64 * 1000.0).round() / 10.0
    };
    Ok(RunSummary {
        run_id: run_id.to_string(),
        total,
        passed,
        failed: count(UatStatus::Fail),
        blocked: count(UatStatus::Blocked),
        pass_rate,
    })
}

// ---------------------------------------------------------------------------
// Failure conversion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdDraft {
    pub title: String,
    pub description: String,
    pub priority: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Conversion {
    pub result_id: String,
    pub sd_id: String,
    pub sd_key: String,
    pub draft: SdDraft,
    /// The draft came from the model rather than the fallback template.
    pub drafted_by_llm: bool,
}

/// Template draft used when no model is configured or the model fails.
pub fn fallback_draft(case: Option<&UatCase>, result: &UatResult) -> SdDraft {
    let title = case.map_or(result.case_id.as_str(), |c| c.title.as_str());
    let mut description = format!("UAT case {} failed in run {}.", result.case_id, result.run_id);
    if let Some(section) = case.and_then(|c| c.section.as_deref()) {
        description.push_str(&format!(" Section: {section}."));
    }
    if let Some(expected) = case.and_then(|c| c.description.as_deref()) {
        description.push_str(&format!("\n\nExpected: {expected}"));
    }
    if let Some(notes) = result.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        description.push_str(&format!("\n\nObserved: {notes}"));
    }
    if let Some(url) = result.evidence_url.as_deref() {
        description.push_str(&format!("\n\nEvidence: {url}"));
    }
    SdDraft {
        title: format!("Fix UAT failure: {title}"),
        description,
        priority: case
            .and_then(|c| c.priority.as_deref())
            .map(normalize_priority)
            .unwrap_or_else(|| "high".to_string()),
    }
}

fn normalize_priority(p: &str) -> String {
    let p = p.trim().to_ascii_lowercase();
    if PRIORITIES.contains(&p.as_str()) {
        p
    } else {
        "high".to_string()
    }
}

fn draft_prompt(case: Option<&UatCase>, result: &UatResult) -> String {
    let mut prompt = format!("Failed UAT case {} (run {}).\n", result.case_id, result.run_id);
    if let Some(c) = case {
        prompt.push_str(&format!("Title: {}\n", c.title));
        for (label, v) in [
            ("Section", &c.section),
            ("Priority", &c.priority),
            ("Expected behaviour", &c.description),
        ] {
            if let Some(v) = v {
                prompt.push_str(&format!("{label}: {v}\n"));
            }
        }
    }
    if let Some(notes) = &result.notes {
        prompt.push_str(&format!("Tester notes: {notes}\n"));
    }
    if let Some(url) = &result.evidence_url {
        prompt.push_str(&format!("Evidence: {url}\n"));
    }
    prompt
}

fn parse_draft(v: &Value) -> Option<SdDraft> {
    let text = |k: &str| {
        v.get(k)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    Some(SdDraft {
        title: text("title")?,
        description: text("description")?,
        priority: normalize_priority(&text("priority").unwrap_or_default()),
    })
}

/// Turn a FAIL result into a draft corrective bugfix SD and link the SD id
/// back into the result row.
pub fn convert_failure(db: &Db, result_id: &str, llm: Option<&dyn LlmClient>) -> Result<Conversion> {
    let result = db.uat_result(result_id)?;
    if result.status != UatStatus::Fail {
        return Err(LeoError::UatNotFailed {
            id: result_id.to_string(),
            status: result.status.as_str().to_string(),
        });
    }
    if let Some(sd_id) = result.generated_sd_id.as_deref().filter(|s| !s.is_empty()) {
        return Err(LeoError::UatAlreadyConverted {
            id: result.id.clone(),
            sd_id: sd_id.to_string(),
        });
    }
    let short: String = result.id.chars().filter(char::is_ascii_alphanumeric).take(8).collect();
    let sd_key = format!("SD-UAT-{}", short.to_ascii_uppercase());
    if let Some(existing) = db.find_sd(&sd_key)? {
        return Err(LeoError::SdKeyTaken { key: sd_key, sd_id: existing.id });
    }
    let case = db.uat_case(&result.case_id)?;

    let llm_draft = llm.and_then(|llm| {
        match complete_json(llm, DRAFT_SYSTEM, &draft_prompt(case.as_ref(), &result)) {
            Ok(v) => {
                let draft = parse_draft(&v);
                if draft.is_none() {
                    tracing::warn!(result = result_id, "model draft missing title or description");
                }
                draft
            }
            Err(e) => {
                tracing::warn!(result = result_id, "model draft failed, using template: {e}");
                None
            }
        }
    });
    let drafted_by_llm = llm_draft.is_some();
    let draft = llm_draft.unwrap_or_else(|| fallback_draft(case.as_ref(), &result));

    let sd: StrategicDirective = db.insert_sd(fields(json!({
        "sd_key": sd_key,
        "title": draft.title,
        "description": draft.description,
        "priority": draft.priority,
        "sd_type": "bugfix",
        "category": "corrective",
        "status": "draft",
        "current_phase": "LEAD",
        "metadata": {
            "source": "uat",
            "uat_result_id": result.id,
            "uat_case_id": result.case_id,
            "uat_run_id": result.run_id,
        },
    })))?;

    db.update_uat_result(&result.id, fields(json!({"generated_sd_id": sd.id})))?;
    tracing::info!(result = result_id, sd = %sd.key(), "converted UAT failure");

    Ok(Conversion {
        result_id: result.id,
        sd_key: sd.key().to_string(),
        sd_id: sd.id,
        draft,
        drafted_by_llm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlm;
    use crate::store::{tables, MemoryStore, Query};
    use crate::types::SdStatus;
    use std::sync::Arc;

    fn seeded() -> Db {
        let db = Db::new(Arc::new(MemoryStore::new()));
        db.insert(
            tables::UAT_CASES,
            fields(json!({
                "id": "case-login",
                "title": "Login with SSO",
                "section": "Auth",
                "priority": "Critical",
                "description": "User lands on dashboard",
            })),
        )
        .unwrap();
        for (id, status) in [("r1", "PASS"), ("r2", "FAIL"), ("r3", "PASS"), ("r4", "BLOCKED")] {
            db.insert(
                tables::UAT_RESULTS,
                fields(json!({
                    "id": id,
                    "run_id": "run-1",
                    "case_id": "case-login",
                    "status": status,
                    "notes": "spinner never stops",
                })),
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn summary_counts_and_rate() {
        let db = seeded();
        let s = run_summary(&db, "run-1").unwrap();
        assert_eq!((s.total, s.passed, s.failed, s.blocked), (4, 2, 1, 1));
        assert_eq!(s.pass_rate, 50.0);

        let empty = run_summary(&db, "run-missing").unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.pass_rate, 0.0);
    }

    #[test]
    fn only_failures_convert() {
        let db = seeded();
        assert!(matches!(
            convert_failure(&db, "r1", None),
            Err(LeoError::UatNotFailed { .. })
        ));
        assert!(matches!(
            convert_failure(&db, "nope", None),
            Err(LeoError::UatResultNotFound(_))
        ));
    }

    #[test]
    fn template_conversion_links_back() {
        let db = seeded();
        let c = convert_failure(&db, "r2", None).unwrap();
        assert!(!c.drafted_by_llm);
        assert_eq!(c.draft.title, "Fix UAT failure: Login with SSO");
        assert_eq!(c.draft.priority, "critical");
        assert!(c.draft.description.contains("spinner never stops"));
        assert_eq!(c.sd_key, "SD-UAT-R2");

        let sd = db.sd(&c.sd_id).unwrap();
        assert_eq!(sd.sd_type.as_deref(), Some("bugfix"));
        assert!(sd.is_corrective());
        assert_eq!(sd.status, SdStatus::Draft);

        let r = db.uat_result("r2").unwrap();
        assert_eq!(r.generated_sd_id.as_deref(), Some(c.sd_id.as_str()));
    }

    #[test]
    fn model_draft_is_used() {
        let db = seeded();
        let llm = ScriptedLlm::replying(
            r#"{"title": "Restore SSO login", "description": "Dashboard never loads after SSO", "priority": "HIGH"}"#,
        );
        let c = convert_failure(&db, "r2", Some(&llm)).unwrap();
        assert!(c.drafted_by_llm);
        assert_eq!(c.draft.title, "Restore SSO login");
        assert_eq!(c.draft.priority, "high");
        assert_eq!(llm.call_count(), 1);
    }

    #[test]
    fn model_failure_falls_back() {
        let db = seeded();
        let llm = ScriptedLlm::failing("timeout");
        let c = convert_failure(&db, "r2", Some(&llm)).unwrap();
        assert!(!c.drafted_by_llm);
        assert!(c.draft.title.starts_with("Fix UAT failure"));

        let incomplete = ScriptedLlm::replying(r#"{"title": "only a title"}"#);
        let c = convert_failure(&seeded(), "r2", Some(&incomplete)).unwrap();
        assert!(!c.drafted_by_llm);
    }

    #[test]
    fn second_conversion_is_refused() {
        let db = seeded();
        let first = convert_failure(&db, "r2", None).unwrap();
        match convert_failure(&db, "r2", None) {
            Err(LeoError::UatAlreadyConverted { id, sd_id }) => {
                assert_eq!(id, "r2");
                assert_eq!(sd_id, first.sd_id);
            }
            other => panic!("expected UatAlreadyConverted, got {other:?}"),
        }
        let rows = db
            .store()
            .select(tables::STRATEGIC_DIRECTIVES, &Query::new().eq("sd_key", "SD-UAT-R2"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(db.uat_result("r2").unwrap().generated_sd_id, Some(first.sd_id));
    }

    #[test]
    fn taken_sd_key_is_not_reused() {
        let db = seeded();
        db.insert_sd(fields(json!({"id": "legacy", "sd_key": "SD-UAT-R2"}))).unwrap();
        assert!(matches!(
            convert_failure(&db, "r2", None),
            Err(LeoError::SdKeyTaken { sd_id, .. }) if sd_id == "legacy"
        ));
        assert!(db.uat_result("r2").unwrap().generated_sd_id.is_none());
    }
}
