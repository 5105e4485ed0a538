//! AI quality judge for protocol improvements.
//!
//! Constitution rules run first; a CRITICAL violation rejects the
//! improvement without calling the model. Otherwise the model scores five
//! criteria on 0–10 and the weighted aggregate picks the recommendation.

use crate::config::{JudgeConfig, CRITERIA};
use crate::constitution::{self, ConstitutionReport, RuleInput, Violation};
use crate::error::{LeoError, Result};
use crate::llm::{complete_json, LlmClient};
use crate::records::{
    CriterionScore, Improvement, QualityAssessment, IMPROVEMENT_STATUS_APPROVED,
    IMPROVEMENT_STATUS_REJECTED,
};
use crate::score::{weighted_score, ScoreBand};
use crate::store::{fields, now_timestamp, tables, Db};
use crate::types::Recommendation;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

const JUDGE_SYSTEM: &str = "You are the quality judge for LEO protocol improvements. Score the \
improvement on each criterion from 0 to 10 and reply with a JSON object \
{\"safety\": {\"score\": n, \"reasoning\": string}, \"specificity\": {...}, \"necessity\": {...}, \
\"evidence\": {...}, \"atomicity\": {...}, \"reasoning\": string}.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Judgement {
    pub improvement_id: String,
    pub score: u32,
    pub recommendation: Recommendation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub band: Option<ScoreBand>,
    pub criteria: BTreeMap<String, CriterionScore>,
    pub violations: Vec<Violation>,
    /// Rejected by a CRITICAL constitution violation before scoring.
    pub short_circuited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub warnings: Vec<String>,
}

pub struct QualityJudge {
    db: Db,
    llm: Arc<dyn LlmClient>,
    config: JudgeConfig,
}

impl QualityJudge {
    pub fn new(db: Db, llm: Arc<dyn LlmClient>, config: JudgeConfig) -> Self {
        Self { db, llm, config }
    }

    fn violations_table(&self) -> &'static str {
        if self.config.aegis_enabled() {
            tables::AEGIS_VIOLATIONS
        } else {
            tables::CONSTITUTION_VIOLATIONS
        }
    }

    pub fn evaluate(&self, improvement_id: &str) -> Result<Judgement> {
        let imp = self.db.improvement(improvement_id)?;
        let mut warnings = Vec::new();

        let recent = match self.db.count_auto_applied_since(Utc::now() - Duration::hours(24)) {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!(improvement = %imp.id, "AUTO apply count failed: {e}");
                warnings.push(format!("AUTO apply count unavailable: {e}"));
                None
            }
        };
        let report = constitution::validate(&RuleInput {
            improvement: &imp,
            recent_auto_applies: recent,
        });

        if report.has_critical() {
            return Ok(self.reject_on_violation(&imp, report, warnings));
        }

        let prompt = build_prompt(&imp, &report);
        let reply = complete_json(self.llm.as_ref(), JUDGE_SYSTEM, &prompt)?;
        let criteria = parse_criteria(&reply);
        let plain: BTreeMap<String, f64> = criteria.iter().map(|(k, c)| (k.clone(), c.score)).collect();
        let aggregate = weighted_score(&plain, &self.config.weights)
            .ok_or_else(|| LeoError::Llm("judge reply scored no criteria".to_string()))?;
        let score = aggregate.round() as u32;
        let band = ScoreBand::from_score(aggregate);
        let recommendation = band.recommendation();
        let reasoning = reply.get("reasoning").and_then(Value::as_str).map(str::to_string);

        let assessment = QualityAssessment {
            id: None,
            improvement_id: imp.id.clone(),
            evaluator_model: self.llm.model().to_string(),
            score: i64::from(score),
            criteria_scores: criteria.clone(),
            recommendation,
            reasoning: reasoning.clone(),
            created_at: None,
        };
        if let Err(e) = self.db.insert_assessment(&assessment) {
            tracing::warn!(improvement = %imp.id, "assessment insert failed: {e}");
            warnings.push(format!("assessment not stored: {e}"));
        }

        let status = match recommendation {
            Recommendation::Approve => Some(IMPROVEMENT_STATUS_APPROVED),
            Recommendation::Reject => Some(IMPROVEMENT_STATUS_REJECTED),
            Recommendation::NeedsRevision => None,
        };
        if let Some(status) = status {
            if let Err(e) = self.db.set_improvement_status(&imp.id, status) {
                tracing::warn!(improvement = %imp.id, "status update failed: {e}");
                warnings.push(format!("status not updated: {e}"));
            }
        }
        tracing::info!(improvement = %imp.id, score, recommendation = %recommendation, "judged");

        Ok(Judgement {
            improvement_id: imp.id,
            score,
            recommendation,
            band: Some(band),
            criteria,
            violations: report.violations,
            short_circuited: false,
            reasoning,
            warnings,
        })
    }

    fn reject_on_violation(&self, imp: &Improvement, report: ConstitutionReport, mut warnings: Vec<String>) -> Judgement {
        let table = self.violations_table();
        for v in report.critical() {
            let row = fields(json!({
                "improvement_id": imp.id,
                "rule_code": v.rule_code,
                "severity": v.severity,
                "message": v.message,
                "detected_at": now_timestamp(),
            }));
            if let Err(e) = self.db.insert(table, row) {
                tracing::warn!(improvement = %imp.id, "violation record failed: {e}");
                warnings.push(format!("violation not recorded in {table}: {e}"));
            }
        }
        if let Err(e) = self.db.set_improvement_status(&imp.id, IMPROVEMENT_STATUS_REJECTED) {
            tracing::warn!(improvement = %imp.id, "status update failed: {e}");
            warnings.push(format!("status not updated: {e}"));
        }
        let codes: Vec<&str> = report.critical().map(|v| v.rule_code).collect();
        tracing::info!(improvement = %imp.id, rules = ?codes, "rejected by constitution");

        Judgement {
            improvement_id: imp.id.clone(),
            score: 0,
            recommendation: Recommendation::Reject,
            band: None,
            criteria: BTreeMap::new(),
            short_circuited: true,
            reasoning: Some(format!("Critical constitution violation: {}", codes.join(", "))),
            violations: report.violations,
            warnings,
        }
    }
}

fn build_prompt(imp: &Improvement, report: &ConstitutionReport) -> String {
    let mut prompt = format!(
        "Constitution:\n{}\n\nImprovement {}\nTarget: {} {}\nType: {}\nRisk tier: {}\nEvidence count: {}\nDescription: {}\nPayload: {}\n",
        constitution::rules_text(),
        imp.id,
        imp.target_operation.as_deref().unwrap_or("-"),
        imp.table(),
        imp.improvement_type.as_deref().unwrap_or("-"),
        imp.risk_tier.as_deref().unwrap_or("-"),
        imp.evidence_count.unwrap_or(0),
        imp.description.as_deref().unwrap_or("-"),
        imp.payload,
    );
    if !report.violations.is_empty() {
        prompt.push_str("\nNon-critical findings:\n");
        for v in &report.violations {
            prompt.push_str(&format!("- {} ({}): {}\n", v.rule_code, v.severity.as_str(), v.message));
        }
    }
    prompt
}

/// Accepts `{"safety": 8}` or `{"safety": {"score": 8, "reasoning": ..}}`.
/// Criteria missing from the reply are left out, not zeroed.
fn parse_criteria(reply: &Value) -> BTreeMap<String, CriterionScore> {
    CRITERIA
        .iter()
        .filter_map(|name| {
            let v = reply.get(*name)?;
            let (score, reasoning) = match v {
                Value::Object(o) => (
                    o.get("score").and_then(Value::as_f64)?,
                    o.get("reasoning").and_then(Value::as_str).map(str::to_string),
                ),
                other => (other.as_f64()?, None),
            };
            Some((
                name.to_string(),
                CriterionScore {
                    score: score.clamp(0.0, 10.0),
                    reasoning,
                },
            ))
        })
        .collect()
}
