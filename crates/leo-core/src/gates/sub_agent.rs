use crate::error::Result;
use crate::gate::{Gate, GateContext, GateResult, GateSubject};
use crate::records::SubAgentResult;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const LEAD_FINAL: &str = "LEAD_FINAL";

/// Sub-agents each phase expects a verdict from.
const PHASE_AGENTS: &[(&str, &[&str])] = &[
    ("LEAD_PRE_APPROVAL", &["VALIDATION", "RISK"]),
    ("PLAN_PRD", &["DATABASE", "STORIES", "DESIGN"]),
    ("EXEC_IMPL", &["TESTING"]),
    (LEAD_FINAL, &["RETRO"]),
];

const PASSING_VERDICTS: &[&str] = &["PASS", "CONDITIONAL_PASS"];

pub fn phase_agents(phase: &str) -> &'static [&'static str] {
    PHASE_AGENTS
        .iter()
        .find(|(p, _)| *p == phase)
        .map(|(_, a)| *a)
        .unwrap_or(&[])
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestrationReport {
    pub can_proceed: bool,
    pub required: Vec<String>,
    pub passed: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<String>,
}

/// Runs or inspects the sub-agents a phase requires.
pub trait SubAgentOrchestrator: Send + Sync {
    fn orchestrate(&self, subject: &GateSubject, phase: &str) -> Result<OrchestrationReport>;
}

/// Judges a phase from verdicts already recorded in
/// `sub_agent_execution_results`. The newest row per sub-agent wins.
pub struct RecordedVerdicts;

impl SubAgentOrchestrator for RecordedVerdicts {
    fn orchestrate(&self, subject: &GateSubject, phase: &str) -> Result<OrchestrationReport> {
        let results = subject.db.sub_agent_results(&subject.sd.id)?;
        let required: Vec<String> = phase_agents(phase)
            .iter()
            .filter(|a| !subject.profile.skipped_sub_agents.contains(a))
            .map(|a| a.to_string())
            .collect();

        let mut report = OrchestrationReport {
            required: required.clone(),
            ..Default::default()
        };
        let mut seen = BTreeSet::new();
        let latest: Vec<&SubAgentResult> = results
            .iter()
            .filter(|r| seen.insert(r.sub_agent_code.to_ascii_uppercase()))
            .collect();

        for code in &required {
            match latest
                .iter()
                .find(|r| r.sub_agent_code.eq_ignore_ascii_case(code))
            {
                None => report.missing.push(code.clone()),
                Some(r) if PASSING_VERDICTS.contains(&r.verdict.to_ascii_uppercase().as_str()) => {
                    report.passed.push(code.clone())
                }
                Some(_) => report.failed.push(code.clone()),
            }
        }
        report.can_proceed = report.missing.is_empty() && report.failed.is_empty();
        Ok(report)
    }
}

pub struct SubAgentGate {
    orchestrator: Arc<dyn SubAgentOrchestrator>,
}

impl SubAgentGate {
    pub fn new(orchestrator: Arc<dyn SubAgentOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

impl Gate for SubAgentGate {
    fn name(&self) -> &'static str {
        "SUB_AGENT_ORCHESTRATION"
    }

    fn validate(&self, ctx: &GateContext) -> GateResult {
        if !ctx.subject.profile.validation.requires_sub_agents {
            return GateResult::skipped(format!(
                "{} SDs do not require sub-agents",
                ctx.subject.sd_type
            ));
        }

        let report = match self.orchestrator.orchestrate(ctx.subject, LEAD_FINAL) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(sd = %ctx.sd().key(), "sub-agent orchestration failed: {e}");
                return GateResult::fail(0, format!("Sub-agent orchestration failed: {e}"));
            }
        };
        let details = serde_json::to_value(&report).unwrap_or_default();

        if report.can_proceed {
            return GateResult::pass(100).with_details(details);
        }

        let total = report.required.len().max(1) as u32;
        let score = report.passed.len() as u32 * 100 / total;
        let mut r = GateResult::fail(score, "Sub-agent verdicts block LEAD_FINAL")
            .with_details(details)
            .with_remediation("Run the missing sub-agents and resolve failing verdicts");
        for m in &report.missing {
            r = r.with_issue(format!("{m} has no recorded verdict"));
        }
        for f in &report.failed {
            r = r.with_issue(format!("{f} verdict is not PASS"));
        }
        r
    }
}
