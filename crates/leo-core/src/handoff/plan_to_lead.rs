use super::completion::{
    cascade_parents, complete_orchestrator, complete_standard, complete_without_prd,
    next_commands, CompletionPath,
};
use super::setup::{prepare_retrospective, HistoryRetroGenerator, RetroGenerator};
use super::verification::PlanVerification;
use crate::config::HandoffConfig;
use crate::error::Result;
use crate::gate::{run_gates, Gate, GateRecord, GateSubject, OrchestratorView, PipelineOutcome};
use crate::gates::traceability::{GATE3, GATE4};
use crate::gates::{
    DocumentationLinkGate, GitCliVerifier, GitCommitGate, GitVerifier, HeuristicRetroScorer,
    LlmRetroScorer, PrerequisiteHandoffGate, PriorGateValidator, ProtocolFileReadGate,
    RecordedVerdicts, RetroScorer, RetrospectiveGate, SdStartGate, SubAgentGate,
    SubAgentOrchestrator, TraceabilityGate, TraceabilityScorer, UserStoryGate, WorkflowRoiGate,
    WorkflowRoiScorer,
};
use crate::llm::LlmClient;
use crate::records::{PhaseHandoff, StrategicDirective};
use crate::sd_type::{profile_for, ResolveOptions, SdTypeChecker, TypeResolution};
use crate::store::{Db, Row};
use crate::types::{HandoffStatus, HandoffType, SdType};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External services the executor and its gates call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub sub_agents: Arc<dyn SubAgentOrchestrator>,
    pub git: Arc<dyn GitVerifier>,
    pub retro_scorer: Arc<dyn RetroScorer>,
    pub retro_generator: Arc<dyn RetroGenerator>,
    pub traceability: Arc<dyn PriorGateValidator>,
    pub workflow_roi: Arc<dyn PriorGateValidator>,
}

impl Collaborators {
    /// Local defaults: recorded sub-agent verdicts, the `git` CLI in `repo`,
    /// heuristic retrospective scoring.
    pub fn local(repo: &Path) -> Self {
        Self {
            sub_agents: Arc::new(RecordedVerdicts),
            git: Arc::new(GitCliVerifier::new(repo)),
            retro_scorer: Arc::new(HeuristicRetroScorer),
            retro_generator: Arc::new(HistoryRetroGenerator),
            traceability: Arc::new(TraceabilityScorer),
            workflow_roi: Arc::new(WorkflowRoiScorer),
        }
    }

    /// Score retrospectives with a model instead of the heuristic.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.retro_scorer = Arc::new(LlmRetroScorer::new(llm));
        self
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HandoffOutcome {
    pub success: bool,
    pub sd_id: String,
    pub sd_key: String,
    pub sd_type: TypeResolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_code: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// Mean gate score.
    pub score: u32,
    pub gates: Vec<GateRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<CompletionPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_verification: Option<PlanVerification>,
    pub completed_parents: Vec<String>,
    pub next_commands: Vec<String>,
    pub warnings: Vec<String>,
}

impl HandoffOutcome {
    fn reject(&mut self, code: &str, message: String, remediation: Option<String>) {
        self.success = false;
        self.reason_code = Some(code.to_string());
        self.message = message;
        self.remediation = remediation;
    }
}

/// Reason code reported when `gate` stops the run.
pub fn reason_code_for(gate: &str) -> String {
    match gate {
        GATE3 => "GATE3_VALIDATION_FAILED".to_string(),
        GATE4 => "GATE4_VALIDATION_FAILED".to_string(),
        other => format!("{other}_FAILED"),
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct PlanToLeadExecutor {
    db: Db,
    root: PathBuf,
    config: HandoffConfig,
    types: Arc<SdTypeChecker>,
    collaborators: Collaborators,
}

impl PlanToLeadExecutor {
    pub fn new(
        db: Db,
        root: impl Into<PathBuf>,
        config: HandoffConfig,
        types: Arc<SdTypeChecker>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            db,
            root: root.into(),
            config,
            types,
            collaborators,
        }
    }

    /// Ordered gate list. Gates 3 and 4 only run for code SDs other than
    /// bugfixes and orchestrators.
    pub fn gates_for(&self, sd_type: SdType, orchestrator: bool) -> Vec<Box<dyn Gate>> {
        let c = &self.collaborators;
        let enforce = self.config.enforce_protocol_reads;
        let mut gates: Vec<Box<dyn Gate>> = vec![
            Box::new(SdStartGate { enforce }),
            Box::new(ProtocolFileReadGate { enforce }),
            Box::new(PrerequisiteHandoffGate),
            Box::new(SubAgentGate::new(c.sub_agents.clone())),
            Box::new(RetrospectiveGate::new(c.retro_scorer.clone())),
            Box::new(GitCommitGate::new(c.git.clone())),
        ];
        if !orchestrator && !sd_type.is_non_code() && sd_type != SdType::Bugfix {
            gates.push(Box::new(TraceabilityGate::new(c.traceability.clone())));
            gates.push(Box::new(WorkflowRoiGate::new(c.workflow_roi.clone())));
        }
        gates.push(Box::new(UserStoryGate));
        gates.push(Box::new(DocumentationLinkGate));
        gates
    }

    /// Run the PLAN-TO-LEAD handoff for an SD (UUID or key). Only a missing
    /// SD is an error; gate and completion failures come back as a
    /// rejected outcome.
    pub fn execute(&self, sd_ref: &str) -> Result<HandoffOutcome> {
        let sd = self.db.sd(sd_ref)?;
        tracing::info!(sd = %sd.key(), "PLAN-TO-LEAD started");

        let mut warnings = prepare_retrospective(&self.db, &sd, self.collaborators.retro_generator.as_ref());

        let resolution = self.types.effective_type(&sd, ResolveOptions::default());
        let sd_type = resolution.sd_type;
        let profile = profile_for(sd_type.as_str());
        let orchestrator = OrchestratorView::load(&self.db, &sd);
        let subject = GateSubject {
            sd: &sd,
            sd_type,
            profile,
            orchestrator: &orchestrator,
            db: &self.db,
            root: &self.root,
        };

        let gates = self.gates_for(sd_type, orchestrator.is_parent);
        let pipeline = run_gates(&gates, &subject);
        warnings.extend(pipeline.warnings());

        let mut outcome = HandoffOutcome {
            success: true,
            sd_id: sd.id.clone(),
            sd_key: sd.key().to_string(),
            sd_type: resolution,
            reason_code: None,
            message: String::new(),
            remediation: None,
            score: pipeline.mean_score(),
            gates: pipeline.records.clone(),
            path: None,
            plan_verification: None,
            completed_parents: Vec::new(),
            next_commands: Vec::new(),
            warnings,
        };

        if let Some(failed) = pipeline.failure() {
            let issues = failed.result.issues.join("; ");
            outcome.reject(
                &reason_code_for(&failed.name),
                format!("{} failed ({}%): {issues}", failed.name, failed.result.score),
                failed.result.remediation.clone(),
            );
            self.record_attempt(&sd, &outcome, &pipeline);
            return Ok(outcome);
        }

        self.complete(&sd, &subject, &pipeline, &mut outcome);
        if outcome.success {
            let cascade = cascade_parents(&self.db, &sd);
            outcome.warnings.extend(cascade.warnings);
            outcome.completed_parents = cascade.completed;
            if let Some(path) = outcome.path {
                outcome.next_commands = next_commands(path, &outcome.completed_parents);
            }
        }
        self.record_attempt(&sd, &outcome, &pipeline);
        tracing::info!(
            sd = %sd.key(),
            success = outcome.success,
            path = ?outcome.path,
            "PLAN-TO-LEAD finished"
        );
        Ok(outcome)
    }

    /// Pick and run one completion path, in priority order: orchestrator,
    /// no PRD, standard.
    fn complete(
        &self,
        sd: &StrategicDirective,
        subject: &GateSubject,
        pipeline: &PipelineOutcome,
        outcome: &mut HandoffOutcome,
    ) {
        let view = subject.orchestrator;
        if view.is_parent && view.all_children_completed() {
            outcome.path = Some(CompletionPath::Orchestrator);
            outcome.warnings.extend(complete_orchestrator(&self.db, sd, view));
            outcome.message = format!(
                "Orchestrator {} completed ({} children)",
                sd.key(),
                view.children.len()
            );
            return;
        }

        let prd = self.db.prd_for_sd(&sd.id).unwrap_or_else(|e| {
            tracing::warn!(sd = %sd.key(), "PRD lookup failed: {e}");
            outcome.warnings.push(format!("PRD lookup failed: {e}"));
            None
        });

        let Some(prd) = prd else {
            if !subject.profile.validation.requires_prd {
                outcome.path = Some(CompletionPath::NoPrd);
                outcome.warnings.extend(complete_without_prd(&self.db, sd));
                outcome.message = format!("{} moved to LEAD approval (no PRD required)", sd.key());
                return;
            }
            outcome.reject(
                "PRD_NOT_FOUND",
                format!("No PRD found for {}", sd.key()),
                Some("Create the PRD before requesting PLAN-TO-LEAD".to_string()),
            );
            return;
        };

        outcome.path = Some(CompletionPath::Standard);
        let (verification, warnings) = complete_standard(
            &self.db,
            sd,
            &prd,
            &subject.profile,
            self.config.plan_verification_threshold,
            gate_snapshot(pipeline),
        );
        outcome.warnings.extend(warnings);
        if verification.complete {
            outcome.message = format!(
                "{} moved to LEAD approval (plan verification {}%)",
                sd.key(),
                verification.score
            );
        } else {
            outcome.reject(
                "PLAN_VERIFICATION_FAILED",
                format!(
                    "Plan verification scored {} (needs {}): {}",
                    verification.score,
                    verification.threshold,
                    verification.issues.join("; ")
                ),
                Some("Complete the PRD, EXEC-TO-PLAN handoff and user stories, then retry".to_string()),
            );
        }
        outcome.plan_verification = Some(verification);
    }

    /// Insert the audit row for this attempt. Best-effort.
    fn record_attempt(&self, sd: &StrategicDirective, outcome: &HandoffOutcome, pipeline: &PipelineOutcome) {
        let mut metadata = gate_snapshot(pipeline);
        metadata.insert("gates".into(), serde_json::to_value(&outcome.gates).unwrap_or_default());
        metadata.insert("reason_code".into(), json!(outcome.reason_code));
        metadata.insert("completion_path".into(), json!(outcome.path));
        metadata.insert("sd_type".into(), json!(outcome.sd_type.sd_type));

        let handoff = PhaseHandoff {
            sd_id: sd.id.clone(),
            handoff_type: HandoffType::PlanToLead.as_str().to_string(),
            from_phase: Some("PLAN".into()),
            to_phase: Some("LEAD".into()),
            status: if outcome.success {
                HandoffStatus::Accepted
            } else {
                HandoffStatus::Rejected
            },
            validation_score: Some(f64::from(outcome.score)),
            metadata: Value::Object(metadata),
            ..Default::default()
        };
        if let Err(e) = self.db.insert_handoff(&handoff) {
            tracing::warn!(sd = %sd.key(), "could not record PLAN-TO-LEAD attempt: {e}");
        }
    }
}

/// Gate 3/4 results under the keys later phases read them from.
fn gate_snapshot(pipeline: &PipelineOutcome) -> Row {
    let mut row = Row::new();
    for (gate, key) in [(GATE3, "gate3_validation"), (GATE4, "gate4_validation")] {
        if let Some(r) = pipeline.get(gate) {
            row.insert(key.into(), serde_json::to_value(r).unwrap_or_default());
        }
    }
    row
}
