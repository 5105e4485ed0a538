use crate::gate::{Gate, GateContext, GateResult};
use crate::types::HandoffType;
use serde_json::json;

/// PLAN-TO-LEAD needs an accepted EXEC-TO-PLAN, unless the SD is an
/// orchestrator with every child completed or a non-code type.
pub struct PrerequisiteHandoffGate;

impl Gate for PrerequisiteHandoffGate {
    fn name(&self) -> &'static str {
        "PREREQUISITE_HANDOFF_CHECK"
    }

    fn validate(&self, ctx: &GateContext) -> GateResult {
        let orch = ctx.subject.orchestrator;
        if orch.is_parent && orch.all_children_completed() {
            return GateResult::pass(100).with_details(json!({
                "path": "orchestrator",
                "children_completed": orch.completed_count(),
            }));
        }

        if ctx.subject.profile.validation.is_non_code {
            return GateResult::pass(100).with_details(json!({
                "path": "non_code_exemption",
                "sd_type": ctx.subject.sd_type.as_str(),
            }));
        }

        let sd = ctx.sd();
        let found = ctx
            .db()
            .latest_handoff(&sd.id, HandoffType::ExecToPlan, true)
            .unwrap_or_else(|e| {
                tracing::warn!(sd = %sd.key(), "handoff lookup failed: {e}");
                None
            });

        match found {
            Some(h) => GateResult::pass(100).with_details(json!({
                "path": "exec_to_plan",
                "handoff_id": h.id,
                "validation_score": h.validation_score,
            })),
            None => {
                let mut r = GateResult::fail(0, "No accepted EXEC-TO-PLAN handoff found")
                    .with_remediation(
                        "Complete the EXEC-TO-PLAN handoff before requesting PLAN-TO-LEAD",
                    );
                if orch.is_parent {
                    r = r.with_warning(format!(
                        "orchestrator has {}/{} children completed",
                        orch.completed_count(),
                        orch.children.len()
                    ));
                }
                r
            }
        }
    }
}
