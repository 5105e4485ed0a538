//! Gate 3 (traceability) and gate 4 (workflow ROI).
//!
//! Both gates gather earlier gate snapshots from handoff metadata
//! (`gate1_validation` on PLAN-TO-EXEC, `gate2_validation` on EXEC-TO-PLAN)
//! plus the PRD and its stories, then hand them to a [`PriorGateValidator`].

use crate::gate::{Gate, GateContext, GateResult};
use crate::records::{ProductRequirement, SubAgentResult, UserStory};
use crate::types::HandoffType;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const GATE3: &str = "GATE3_TRACEABILITY";
pub const GATE4: &str = "GATE4_WORKFLOW_ROI";

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Pass/score/details of an earlier gate, as stored in handoff metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateSnapshot {
    pub passed: bool,
    pub score: f64,
    pub details: Value,
}

impl GateSnapshot {
    pub fn from_value(v: &Value) -> Option<Self> {
        let obj = v.as_object()?;
        Some(Self {
            passed: obj.get("passed").and_then(Value::as_bool).unwrap_or(false),
            score: obj.get("score").and_then(Value::as_f64).unwrap_or(0.0),
            details: obj.get("details").cloned().unwrap_or(Value::Null),
        })
    }

    pub fn from_result(r: &GateResult) -> Self {
        Self {
            passed: r.passed,
            score: f64::from(r.score),
            details: r.details.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriorGateInputs {
    pub gate1: Option<GateSnapshot>,
    pub gate2: Option<GateSnapshot>,
    pub gate3: Option<GateSnapshot>,
    pub prd: Option<ProductRequirement>,
    pub stories: Vec<UserStory>,
    pub sub_agents: Vec<SubAgentResult>,
    pub retro_exists: bool,
}

impl PriorGateInputs {
    fn prd_meta(&self, key: &str) -> Option<&Value> {
        self.prd
            .as_ref()
            .and_then(|p| p.metadata.get(key))
            .filter(|v| !v.is_null())
    }

    pub fn has_design_analysis(&self) -> bool {
        self.prd_meta("design_analysis").is_some()
    }

    pub fn has_database_analysis(&self) -> bool {
        self.prd_meta("database_analysis").is_some()
    }

    fn gate_scores(&self) -> Vec<f64> {
        [&self.gate1, &self.gate2, &self.gate3]
            .into_iter()
            .flatten()
            .map(|g| g.score)
            .collect()
    }
}

fn handoff_snapshot(ctx: &GateContext, kind: HandoffType, key: &str) -> Option<GateSnapshot> {
    let sd = ctx.sd();
    let handoff = ctx
        .db()
        .latest_handoff(&sd.id, kind, false)
        .unwrap_or_else(|e| {
            tracing::warn!(sd = %sd.key(), "{kind} lookup failed: {e}");
            None
        })?;
    handoff.metadata.get(key).and_then(GateSnapshot::from_value)
}

/// Load everything gates 3 and 4 score from. Store failures read as
/// missing data.
pub fn gather_inputs(ctx: &GateContext) -> PriorGateInputs {
    let sd = ctx.sd();
    let db = ctx.db();
    let prd = db.prd_for_sd(&sd.id).unwrap_or_else(|e| {
        tracing::warn!(sd = %sd.key(), "PRD lookup failed: {e}");
        None
    });
    let stories = match &prd {
        Some(p) => db.stories_for_prd(&p.id),
        None => db.stories_for_sd(&sd.id),
    }
    .unwrap_or_default();

    PriorGateInputs {
        gate1: handoff_snapshot(ctx, HandoffType::PlanToExec, "gate1_validation"),
        gate2: handoff_snapshot(ctx, HandoffType::ExecToPlan, "gate2_validation"),
        gate3: ctx
            .prior
            .get(GATE3)
            .map(GateSnapshot::from_result)
            .or_else(|| handoff_snapshot(ctx, HandoffType::PlanToLead, "gate3_validation")),
        prd,
        stories,
        sub_agents: db.sub_agent_results(&sd.id).unwrap_or_default(),
        retro_exists: db.latest_retro(&sd.id).ok().flatten().is_some(),
    }
}

/// Scores a gate from earlier gate snapshots.
pub trait PriorGateValidator: Send + Sync {
    fn validate(&self, inputs: &PriorGateInputs, threshold: u32) -> GateResult;
}

fn finish(score: u32, threshold: u32, label: &str, issues: Vec<String>, warnings: Vec<String>, details: Value) -> GateResult {
    let mut r = if score >= threshold {
        GateResult::pass(score)
    } else {
        GateResult::fail(score, format!("{label} score {score} below threshold {threshold}"))
    };
    r.issues.extend(issues);
    r.warnings.extend(warnings);
    r.with_details(details)
}

fn scaled(raw: u32, raw_max: u32, max: u32) -> u32 {
    (f64::from(raw) * f64::from(max) / f64::from(raw_max)).round() as u32
}

// ---------------------------------------------------------------------------
// Gate 3
// ---------------------------------------------------------------------------

/// Sections: recommendation adherence 30, implementation quality 30,
/// traceability mapping 25, sub-agent effectiveness 10, lessons captured 5.
pub struct TraceabilityScorer;

impl PriorGateValidator for TraceabilityScorer {
    fn validate(&self, inputs: &PriorGateInputs, threshold: u32) -> GateResult {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        let (adherence, quality) = match &inputs.gate2 {
            Some(g2) => {
                let a = if g2.passed {
                    30
                } else if g2.score >= 70.0 {
                    20
                } else {
                    issues.push(format!("Gate 2 scored {:.0} and did not pass", g2.score));
                    10
                };
                let q = match g2.score {
                    s if s >= 90.0 => 30,
                    s if s >= 80.0 => 25,
                    s if s >= 70.0 => 20,
                    _ => 10,
                };
                (a, q)
            }
            None => {
                warnings.push("No Gate 2 results on the EXEC-TO-PLAN handoff".to_string());
                (15, 15)
            }
        };

        let mut mapping = 0;
        if inputs.prd.is_some() {
            mapping += 10;
        } else {
            issues.push("No PRD to trace requirements from".to_string());
        }
        if inputs.stories.is_empty() {
            warnings.push("No user stories mapped to the PRD".to_string());
        } else {
            mapping += 10;
            let untested = inputs
                .stories
                .iter()
                .filter(|s| s.e2e_test_path.as_deref().map_or(true, str::is_empty))
                .count();
            if untested == 0 {
                mapping += 5;
            } else {
                warnings.push(format!("{untested} user stories lack an e2e_test_path"));
            }
        }

        let total_ms: i64 = inputs
            .sub_agents
            .iter()
            .filter_map(|r| r.metadata.get("execution_time_ms").and_then(Value::as_i64))
            .sum();
        let substantial = inputs.sub_agents.iter().any(|r| {
            r.metadata
                .get("recommendations")
                .and_then(Value::as_array)
                .is_some_and(|a| !a.is_empty())
        });
        let ran = if inputs.sub_agents.is_empty() { 0 } else { 5 };
        let effectiveness = ran + if substantial { 5 } else { 0 };

        let lessons = if inputs.retro_exists {
            5
        } else {
            warnings.push("No retrospective captured".to_string());
            0
        };

        let score = adherence + quality + mapping + effectiveness + lessons;
        let details = json!({
            "sections": {
                "recommendation_adherence": adherence,
                "implementation_quality": quality,
                "traceability_mapping": mapping,
                "sub_agent_effectiveness": effectiveness,
                "lessons_captured": lessons,
            },
            "gate2_score": inputs.gate2.as_ref().map(|g| g.score),
            "sub_agent_effectiveness": {
                "total_execution_time_ms": if inputs.sub_agents.is_empty() { Value::Null } else { json!(total_ms) },
                "substantial_recommendations": substantial,
            },
        });
        finish(score, threshold, "Traceability", issues, warnings, details)
    }
}

pub struct TraceabilityGate {
    validator: Arc<dyn PriorGateValidator>,
}

impl TraceabilityGate {
    pub fn new(validator: Arc<dyn PriorGateValidator>) -> Self {
        Self { validator }
    }
}

impl Gate for TraceabilityGate {
    fn name(&self) -> &'static str {
        GATE3
    }

    fn validate(&self, ctx: &GateContext) -> GateResult {
        let inputs = gather_inputs(ctx);
        let applies = ctx.subject.profile.requires_design_database_gates
            || inputs.has_design_analysis()
            || inputs.has_database_analysis();
        if !applies {
            return GateResult::pass(100)
                .with_warning("No design or database analysis; traceability not applicable");
        }
        let threshold = ctx.subject.profile.thresholds.traceability;
        self.validator.validate(&inputs, threshold)
    }
}

// ---------------------------------------------------------------------------
// Gate 4
// ---------------------------------------------------------------------------

fn gate_pattern_points(g: &Option<GateSnapshot>) -> u32 {
    match g {
        Some(g) if g.score >= 90.0 => 6,
        Some(g) if g.score >= 80.0 => 5,
        _ => 3,
    }
}

/// Sections: process adherence 10, value delivered 35, pattern
/// effectiveness 30, executive summary 25.
pub struct WorkflowRoiScorer;

impl PriorGateValidator for WorkflowRoiScorer {
    fn validate(&self, inputs: &PriorGateInputs, threshold: u32) -> GateResult {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        // A: raw out of 25, scaled to 10.
        let mut a_raw = 0;
        if inputs.prd.is_some() {
            a_raw += 5;
        }
        if inputs.has_design_analysis() {
            a_raw += 5;
        }
        if inputs.has_database_analysis() {
            a_raw += 5;
        }
        let design_informed = inputs
            .prd_meta("database_analysis")
            .and_then(|d| d.get("design_informed"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if design_informed {
            a_raw += 5;
        }
        if inputs.gate1.as_ref().is_some_and(|g| g.passed) {
            a_raw += 5;
        }
        let process = scaled(a_raw, 25, 10);

        // B: raw out of 25, scaled to 35.
        let effectiveness = inputs
            .gate3
            .as_ref()
            .and_then(|g| g.details.get("sub_agent_effectiveness"));
        let time_ms = effectiveness
            .and_then(|e| e.get("total_execution_time_ms"))
            .and_then(Value::as_f64);
        let b1 = match time_ms {
            Some(ms) if ms < 15.0 * 60_000.0 => 10,
            Some(ms) if ms < 30.0 * 60_000.0 => 7,
            _ => 5,
        };
        let substantial = effectiveness
            .and_then(|e| e.get("substantial_recommendations"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let b2 = if substantial { 10 } else { 6 };
        let b3 = match &inputs.gate2 {
            Some(g) if g.score >= 80.0 => 5,
            Some(g) if g.score >= 70.0 => 3,
            _ => 2,
        };
        let value = scaled(b1 + b2 + b3, 25, 35);

        // C: raw out of 25, scaled to 30.
        let scores = inputs.gate_scores();
        let avg = (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);
        let c4 = match avg {
            None => 4,
            Some(a) if a >= 90.0 => 7,
            Some(a) if a >= 80.0 => 6,
            Some(a) if a >= 70.0 => 4,
            Some(_) => 2,
        };
        let c_raw = gate_pattern_points(&inputs.gate1)
            + gate_pattern_points(&inputs.gate2)
            + gate_pattern_points(&inputs.gate3)
            + c4;
        let pattern = scaled(c_raw, 25, 30);

        // D: out of 25.
        let passed_gates = [&inputs.gate1, &inputs.gate2, &inputs.gate3]
            .into_iter()
            .flatten()
            .filter(|g| g.passed)
            .count();
        let d1 = match passed_gates {
            3 => 10,
            2 => 6,
            1 => {
                issues.push("Only 1 of 3 prior gates passed".to_string());
                3
            }
            _ => {
                issues.push("No prior gates passed".to_string());
                0
            }
        };
        let d2 = if inputs.retro_exists {
            10
        } else {
            warnings.push("No retrospective captured".to_string());
            5
        };
        let d3 = match avg {
            None => 3,
            Some(a) if a >= 80.0 => 5,
            Some(a) if a >= 70.0 => 3,
            Some(_) => 2,
        };
        let executive = d1 + d2 + d3;

        let score = process + value + pattern + executive;
        let details = json!({
            "sections": {
                "process_adherence": process,
                "value_delivered": value,
                "pattern_effectiveness": pattern,
                "executive_summary": executive,
            },
            "gates_passed": passed_gates,
            "average_gate_score": avg,
        });
        finish(score, threshold, "Workflow ROI", issues, warnings, details)
    }
}

pub struct WorkflowRoiGate {
    validator: Arc<dyn PriorGateValidator>,
}

impl WorkflowRoiGate {
    pub fn new(validator: Arc<dyn PriorGateValidator>) -> Self {
        Self { validator }
    }
}

impl Gate for WorkflowRoiGate {
    fn name(&self) -> &'static str {
        GATE4
    }

    fn reads(&self) -> &'static [&'static str] {
        &[GATE3]
    }

    fn validate(&self, ctx: &GateContext) -> GateResult {
        let inputs = gather_inputs(ctx);
        if !inputs.has_design_analysis() && !inputs.has_database_analysis() {
            return GateResult::pass(100)
                .with_warning("No design or database analysis; workflow ROI not applicable");
        }
        let threshold = ctx.subject.profile.thresholds.workflow_roi;
        self.validator.validate(&inputs, threshold)
    }
}
