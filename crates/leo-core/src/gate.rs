//! Gate contract and the sequential pipeline runner.
//!
//! A gate sees the SD under review plus a read-only view of the results of
//! the earlier gates it names in [`Gate::reads`]. Nothing else flows between
//! gates. The runner stops at the first failing required gate.

use crate::records::StrategicDirective;
use crate::sd_type::TypeProfile;
use crate::store::Db;
use crate::types::{SdStatus, SdType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// GateResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub passed: bool,
    pub score: u32,
    pub max_score: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl GateResult {
    pub fn pass(score: u32) -> Self {
        Self {
            passed: true,
            score,
            max_score: 100,
            issues: Vec::new(),
            warnings: Vec::new(),
            details: Value::Null,
            remediation: None,
        }
    }

    pub fn fail(score: u32, issue: impl Into<String>) -> Self {
        Self {
            passed: false,
            score,
            max_score: 100,
            issues: vec![issue.into()],
            warnings: Vec::new(),
            details: Value::Null,
            remediation: None,
        }
    }

    /// Auto-pass used when a gate does not apply to the SD.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::pass(100).with_details(serde_json::json!({
            "skipped": true,
            "reason": reason.into(),
        }))
    }

    pub fn with_warning(mut self, w: impl Into<String>) -> Self {
        self.warnings.push(w.into());
        self
    }

    pub fn with_issue(mut self, i: impl Into<String>) -> Self {
        self.issues.push(i.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_remediation(mut self, r: impl Into<String>) -> Self {
        self.remediation = Some(r.into());
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.details
            .get("skipped")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator view
// ---------------------------------------------------------------------------

/// Parent/child facts about the SD, loaded once per handoff.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorView {
    pub is_parent: bool,
    pub children: Vec<StrategicDirective>,
}

impl OrchestratorView {
    pub fn load(db: &Db, sd: &StrategicDirective) -> Self {
        let children = db.children(&sd.id).unwrap_or_else(|e| {
            tracing::warn!(sd = %sd.key(), "child SD lookup failed: {e}");
            Vec::new()
        });
        Self {
            is_parent: !children.is_empty() || sd.flagged_parent(),
            children,
        }
    }

    /// True only for a parent with at least one child, all completed.
    pub fn all_children_completed(&self) -> bool {
        !self.children.is_empty()
            && self
                .children
                .iter()
                .all(|c| c.status == SdStatus::Completed)
    }

    pub fn completed_count(&self) -> usize {
        self.children
            .iter()
            .filter(|c| c.status == SdStatus::Completed)
            .count()
    }
}

// ---------------------------------------------------------------------------
// GateContext
// ---------------------------------------------------------------------------

/// Everything a gate may consult about the SD under review.
pub struct GateSubject<'a> {
    pub sd: &'a StrategicDirective,
    pub sd_type: SdType,
    pub profile: TypeProfile,
    pub orchestrator: &'a OrchestratorView,
    pub db: &'a Db,
    pub root: &'a Path,
}

/// Prior results, filtered to the gates named in [`Gate::reads`].
pub struct PriorResults<'a> {
    results: &'a BTreeMap<String, GateResult>,
    allowed: &'static [&'static str],
}

impl<'a> PriorResults<'a> {
    pub fn get(&self, gate: &str) -> Option<&'a GateResult> {
        if self.allowed.contains(&gate) {
            self.results.get(gate)
        } else {
            None
        }
    }
}

pub struct GateContext<'a> {
    pub subject: &'a GateSubject<'a>,
    pub prior: PriorResults<'a>,
}

impl<'a> GateContext<'a> {
    pub fn sd(&self) -> &'a StrategicDirective {
        self.subject.sd
    }

    pub fn db(&self) -> &'a Db {
        self.subject.db
    }

    pub fn is_orchestrator(&self) -> bool {
        self.subject.orchestrator.is_parent
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

pub trait Gate {
    fn name(&self) -> &'static str;

    /// Earlier gates whose results this gate consumes.
    fn reads(&self) -> &'static [&'static str] {
        &[]
    }

    fn required(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &GateContext) -> GateResult;
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateRecord {
    pub name: String,
    pub required: bool,
    pub result: GateResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub records: Vec<GateRecord>,
    /// Name of the required gate that stopped the run, if any.
    pub failed_gate: Option<String>,
}

impl PipelineOutcome {
    pub fn passed(&self) -> bool {
        self.failed_gate.is_none()
    }

    pub fn get(&self, name: &str) -> Option<&GateResult> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.result)
    }

    pub fn failure(&self) -> Option<&GateRecord> {
        let name = self.failed_gate.as_deref()?;
        self.records.iter().find(|r| r.name == name)
    }

    /// Mean of per-gate percentages, rounded.
    pub fn mean_score(&self) -> u32 {
        if self.records.is_empty() {
            return 0;
        }
        let sum: f64 = self
            .records
            .iter()
            .map(|r| {
                if r.result.max_score == 0 {
                    100.0
                } else {
                    f64::from(r.result.score) * 100.0 / f64::from(r.result.max_score)
                }
            })
            .sum();
        (sum / self.records.len() as f64).round() as u32
    }

    pub fn warnings(&self) -> Vec<String> {
        self.records
            .iter()
            .flat_map(|r| r.result.warnings.iter().map(move |w| format!("[{}] {w}", r.name)))
            .collect()
    }
}

/// Evaluate one gate against `prior`, exposing only what it declares.
pub fn evaluate(
    gate: &dyn Gate,
    subject: &GateSubject,
    prior: &BTreeMap<String, GateResult>,
) -> GateResult {
    let ctx = GateContext {
        subject,
        prior: PriorResults {
            results: prior,
            allowed: gate.reads(),
        },
    };
    gate.validate(&ctx)
}

/// Run gates in order. Stops at the first failing required gate; failing
/// optional gates are recorded and the run continues.
pub fn run_gates(gates: &[Box<dyn Gate>], subject: &GateSubject) -> PipelineOutcome {
    let mut results: BTreeMap<String, GateResult> = BTreeMap::new();
    let mut outcome = PipelineOutcome::default();

    for gate in gates {
        let result = evaluate(gate.as_ref(), subject, &results);
        tracing::debug!(
            gate = gate.name(),
            passed = result.passed,
            score = result.score,
            "gate evaluated"
        );

        let stop = !result.passed && gate.required();
        outcome.records.push(GateRecord {
            name: gate.name().to_string(),
            required: gate.required(),
            result: result.clone(),
        });
        results.insert(gate.name().to_string(), result);

        if stop {
            tracing::info!(gate = gate.name(), sd = %subject.sd.key(), "required gate failed");
            outcome.failed_gate = Some(gate.name().to_string());
            break;
        }
    }

    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
