//! Typed views over the rows the governance core reads and writes.
//!
//! Records are deliberately lenient: every field has a default so that rows
//! written by other tools (with extra or missing columns) still deserialize.

use crate::types::{HandoffStatus, Operation, Recommendation, RiskTier, SdStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// StrategicDirective
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategicDirective {
    pub id: String,
    pub sd_key: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub sd_type: Option<String>,
    pub category: Option<String>,
    pub status: SdStatus,
    pub current_phase: Option<String>,
    pub parent_sd_id: Option<String>,
    pub progress_percentage: Option<i64>,
    pub priority: Option<String>,
    pub metadata: Value,
    pub created_at: Option<String>,
}

impl StrategicDirective {
    /// Human key when present, otherwise the UUID.
    pub fn key(&self) -> &str {
        self.sd_key.as_deref().unwrap_or(&self.id)
    }

    /// `metadata.is_parent = true` marks an orchestrator before any child
    /// rows exist.
    pub fn flagged_parent(&self) -> bool {
        self.metadata
            .get("is_parent")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn is_corrective(&self) -> bool {
        self.category
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("corrective"))
    }

    pub fn metadata_str_list(&self, key: &str) -> Vec<String> {
        str_list(self.metadata.get(key))
    }
}

// ---------------------------------------------------------------------------
// ProductRequirement
// ---------------------------------------------------------------------------

pub const PRD_STATUS_VERIFICATION: &str = "verification";
pub const PRD_STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProductRequirement {
    pub id: String,
    pub sd_id: String,
    pub title: String,
    pub status: String,
    pub phase: Option<String>,
    pub metadata: Value,
    pub created_at: Option<String>,
}

// ---------------------------------------------------------------------------
// UserStory
// ---------------------------------------------------------------------------

pub const STORY_STATUS_COMPLETED: &str = "completed";
pub const STORY_VALIDATION_VALIDATED: &str = "validated";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserStory {
    pub id: String,
    pub prd_id: Option<String>,
    pub sd_id: Option<String>,
    pub story_key: Option<String>,
    pub title: String,
    pub status: String,
    pub validation_status: Option<String>,
    pub e2e_test_path: Option<String>,
    pub e2e_test_status: Option<String>,
}

impl UserStory {
    pub fn is_completed(&self) -> bool {
        self.status == STORY_STATUS_COMPLETED
    }
}

// ---------------------------------------------------------------------------
// PhaseHandoff
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhaseHandoff {
    pub id: String,
    pub sd_id: String,
    pub handoff_type: String,
    pub from_phase: Option<String>,
    pub to_phase: Option<String>,
    pub status: HandoffStatus,
    pub validation_score: Option<f64>,
    pub metadata: Value,
    pub created_at: Option<String>,
}

impl PhaseHandoff {
    pub fn is_accepted(&self) -> bool {
        self.status == HandoffStatus::Accepted
    }
}

// ---------------------------------------------------------------------------
// Retrospective
// ---------------------------------------------------------------------------

pub const RETRO_STATUS_PUBLISHED: &str = "PUBLISHED";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Retrospective {
    pub id: String,
    pub sd_id: String,
    pub title: String,
    pub status: String,
    pub quality_score: Option<f64>,
    pub key_learnings: Value,
    pub action_items: Value,
    pub what_went_well: Value,
    pub what_needs_improvement: Value,
    pub generated_by: Option<String>,
    pub metadata: Value,
    pub created_at: Option<String>,
}

impl Retrospective {
    pub fn is_published(&self) -> bool {
        self.status.eq_ignore_ascii_case(RETRO_STATUS_PUBLISHED)
    }

    pub fn learnings(&self) -> Vec<String> {
        str_list(Some(&self.key_learnings))
    }

    pub fn actions(&self) -> Vec<String> {
        str_list(Some(&self.action_items))
    }

    pub fn improvements(&self) -> Vec<String> {
        str_list(Some(&self.what_needs_improvement))
    }
}

// ---------------------------------------------------------------------------
// Improvement
// ---------------------------------------------------------------------------

pub const IMPROVEMENT_STATUS_PENDING: &str = "PENDING";
pub const IMPROVEMENT_STATUS_APPROVED: &str = "APPROVED";
pub const IMPROVEMENT_STATUS_REJECTED: &str = "REJECTED";
pub const IMPROVEMENT_STATUS_APPLIED: &str = "APPLIED";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Improvement {
    pub id: String,
    pub target_table: Option<String>,
    pub target_operation: Option<String>,
    pub improvement_type: Option<String>,
    pub description: Option<String>,
    pub payload: Value,
    pub risk_tier: Option<String>,
    pub auto_applicable: Option<bool>,
    pub status: String,
    pub evidence_count: Option<i64>,
    pub source_retro_id: Option<String>,
    pub applied_at: Option<String>,
    pub created_at: Option<String>,
}

impl Improvement {
    pub fn operation(&self) -> Option<Operation> {
        self.target_operation.as_deref()?.parse().ok()
    }

    pub fn tier(&self) -> Option<RiskTier> {
        match self.risk_tier.as_deref()?.to_ascii_uppercase().as_str() {
            "IMMUTABLE" => Some(RiskTier::Immutable),
            "GOVERNED" => Some(RiskTier::Governed),
            "AUTO" => Some(RiskTier::Auto),
            _ => None,
        }
    }

    pub fn table(&self) -> &str {
        self.target_table.as_deref().unwrap_or("")
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// QualityAssessment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriterionScore {
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityAssessment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub improvement_id: String,
    pub evaluator_model: String,
    pub score: i64,
    #[serde(default)]
    pub criteria_scores: BTreeMap<String, CriterionScore>,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl QualityAssessment {
    /// The safety criterion on its native 0–10 scale.
    pub fn safety(&self) -> Option<f64> {
        self.criteria_scores.get("safety").map(|c| c.score)
    }
}

// ---------------------------------------------------------------------------
// Sub-agent execution results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubAgentResult {
    pub id: String,
    pub sd_id: String,
    pub sub_agent_code: String,
    pub phase: Option<String>,
    pub verdict: String,
    pub confidence: Option<f64>,
    pub metadata: Value,
    pub created_at: Option<String>,
}

// ---------------------------------------------------------------------------
// UAT
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UatStatus {
    Pass,
    Fail,
    Blocked,
}

impl UatStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UatStatus::Pass => "PASS",
            UatStatus::Fail => "FAIL",
            UatStatus::Blocked => "BLOCKED",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UatCase {
    pub id: String,
    pub title: String,
    pub section: Option<String>,
    pub priority: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UatResult {
    pub id: String,
    pub run_id: String,
    pub case_id: String,
    pub status: UatStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub evidence_url: Option<String>,
    #[serde(default)]
    pub generated_sd_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Flatten a JSON value that may be a string, an array of strings, or an
/// array of objects carrying a text field.
pub fn str_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Object(m) => ["learning", "action", "text", "description", "item"]
                    .iter()
                    .find_map(|k| m.get(*k).and_then(Value::as_str))
                    .map(str::to_string),
                _ => None,
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sd_tolerates_sparse_rows() {
        let sd: StrategicDirective =
            serde_json::from_value(json!({"id": "u1", "status": "weird", "extra": 1})).unwrap();
        assert_eq!(sd.key(), "u1");
        assert_eq!(sd.status, SdStatus::Other);
        assert!(!sd.flagged_parent());
    }

    #[test]
    fn sd_parent_flag_and_category() {
        let sd: StrategicDirective = serde_json::from_value(json!({
            "id": "u1",
            "sd_key": "SD-1",
            "category": "Corrective",
            "metadata": {"is_parent": true}
        }))
        .unwrap();
        assert_eq!(sd.key(), "SD-1");
        assert!(sd.flagged_parent());
        assert!(sd.is_corrective());
    }

    #[test]
    fn improvement_tier_and_operation() {
        let imp: Improvement = serde_json::from_value(json!({
            "id": "i1",
            "risk_tier": "auto",
            "target_operation": "insert"
        }))
        .unwrap();
        assert_eq!(imp.tier(), Some(RiskTier::Auto));
        assert_eq!(imp.operation(), Some(Operation::Insert));
    }

    #[test]
    fn str_list_accepts_mixed_shapes() {
        let v = json!(["one", {"learning": "two"}, {"other": 3}, ""]);
        assert_eq!(str_list(Some(&v)), vec!["one", "two"]);
        assert_eq!(str_list(Some(&json!("solo"))), vec!["solo"]);
        assert!(str_list(None).is_empty());
    }
}
