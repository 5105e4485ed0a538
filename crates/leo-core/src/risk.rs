//! Risk tier classification for protocol improvements.
//!
//! Rules are an ordered table evaluated first-match-wins. The matched rule
//! id is part of the result: callers audit by it, so table order is
//! significant and tested.

use crate::config::AutoApplyConfig;
use crate::records::Improvement;
use crate::types::{Operation, RiskTier};
use serde::Serialize;

pub const CONSTITUTION_TABLE: &str = "protocol_constitution";
pub const SECTIONS_TABLE: &str = "leo_protocol_sections";
pub const VALIDATION_RULES_TABLE: &str = "leo_validation_rules";
pub const SUB_AGENTS_TABLE: &str = "leo_sub_agents";

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

pub struct RiskRule {
    pub id: u8,
    pub name: &'static str,
    pub applies: fn(&Improvement) -> bool,
    pub tier: RiskTier,
    pub confidence: fn(&Improvement) -> u8,
    pub reason: &'static str,
}

fn certain(_: &Improvement) -> u8 {
    100
}

fn strong(_: &Improvement) -> u8 {
    95
}

/// AUTO matches are only fully trusted when the row names its table,
/// operation and type.
fn auto_confidence(imp: &Improvement) -> u8 {
    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if present(&imp.target_table) && present(&imp.target_operation) && present(&imp.improvement_type) {
        90
    } else {
        75
    }
}

fn section_priority(imp: &Improvement) -> Option<String> {
    imp.payload_str("priority").map(str::to_ascii_uppercase)
}

fn is_additive(imp: &Improvement) -> bool {
    matches!(imp.operation(), Some(Operation::Insert | Operation::Upsert))
}

fn writes_constitution(imp: &Improvement) -> bool {
    imp.table().eq_ignore_ascii_case(CONSTITUTION_TABLE)
}

fn edits_const_rule(imp: &Improvement) -> bool {
    ["rule_code", "rule_id"]
        .iter()
        .filter_map(|k| imp.payload_str(k))
        .any(|code| code.to_ascii_uppercase().starts_with("CONST-"))
}

fn edits_core_section(imp: &Improvement) -> bool {
    imp.table().eq_ignore_ascii_case(SECTIONS_TABLE) && section_priority(imp).as_deref() == Some("CORE")
}

fn touches_validation_rules(imp: &Improvement) -> bool {
    imp.table().eq_ignore_ascii_case(VALIDATION_RULES_TABLE)
}

fn touches_sub_agent_config(imp: &Improvement) -> bool {
    imp.table().eq_ignore_ascii_case(SUB_AGENTS_TABLE)
}

fn destructive(imp: &Improvement) -> bool {
    matches!(imp.operation(), Some(Operation::Delete | Operation::Update))
}

fn adds_checklist_item(imp: &Improvement) -> bool {
    imp.improvement_type
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("CHECKLIST_ITEM"))
        && is_additive(imp)
}

fn adds_situational_section(imp: &Improvement) -> bool {
    imp.table().eq_ignore_ascii_case(SECTIONS_TABLE)
        && section_priority(imp).as_deref() == Some("SITUATIONAL")
        && is_additive(imp)
}

fn always(_: &Improvement) -> bool {
    true
}

pub const RULES: &[RiskRule] = &[
    RiskRule {
        id: 1,
        name: "constitution_table",
        applies: writes_constitution,
        tier: RiskTier::Immutable,
        confidence: certain,
        reason: "Writes to the protocol constitution are never automated",
    },
    RiskRule {
        id: 2,
        name: "const_rule_edit",
        applies: edits_const_rule,
        tier: RiskTier::Immutable,
        confidence: certain,
        reason: "Edits a CONST- rule",
    },
    RiskRule {
        id: 3,
        name: "core_section",
        applies: edits_core_section,
        tier: RiskTier::Immutable,
        confidence: certain,
        reason: "Edits a CORE-priority protocol section",
    },
    RiskRule {
        id: 4,
        name: "validation_rules",
        applies: touches_validation_rules,
        tier: RiskTier::Governed,
        confidence: strong,
        reason: "Changes gate validation rules",
    },
    RiskRule {
        id: 5,
        name: "sub_agent_config",
        applies: touches_sub_agent_config,
        tier: RiskTier::Governed,
        confidence: strong,
        reason: "Changes sub-agent configuration",
    },
    RiskRule {
        id: 6,
        name: "destructive_operation",
        applies: destructive,
        tier: RiskTier::Governed,
        confidence: strong,
        reason: "DELETE and UPDATE operations need human review",
    },
    RiskRule {
        id: 7,
        name: "checklist_item",
        applies: adds_checklist_item,
        tier: RiskTier::Auto,
        confidence: auto_confidence,
        reason: "Additive checklist item",
    },
    RiskRule {
        id: 8,
        name: "situational_section",
        applies: adds_situational_section,
        tier: RiskTier::Auto,
        confidence: auto_confidence,
        reason: "Additive SITUATIONAL-priority section",
    },
    RiskRule {
        id: 9,
        name: "default_governed",
        applies: always,
        tier: RiskTier::Governed,
        confidence: certain,
        reason: "No rule matched; safe fallback",
    },
];

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub tier: RiskTier,
    pub rule: u8,
    pub rule_name: &'static str,
    pub confidence: u8,
    pub reason: String,
}

pub fn classify(imp: &Improvement) -> Classification {
    // The last rule always applies, so `find` cannot miss.
    let rule = RULES
        .iter()
        .find(|r| (r.applies)(imp))
        .unwrap_or(&RULES[RULES.len() - 1]);
    tracing::debug!(improvement = %imp.id, rule = rule.id, tier = %rule.tier, "classified");
    Classification {
        tier: rule.tier,
        rule: rule.id,
        rule_name: rule.name,
        confidence: (rule.confidence)(imp),
        reason: rule.reason.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoApplyDecision {
    pub allowed: bool,
    pub classification: Classification,
    pub reason: String,
}

/// AUTO tier, then score, then safety, then operation. The first failing
/// check names the rejection.
pub fn can_auto_apply(imp: &Improvement, score: f64, safety: f64, cfg: &AutoApplyConfig) -> AutoApplyDecision {
    let classification = classify(imp);
    let deny = |classification: Classification, reason: String| AutoApplyDecision {
        allowed: false,
        classification,
        reason,
    };

    if classification.tier != RiskTier::Auto {
        let reason = format!("Risk tier is {}, not AUTO", classification.tier);
        return deny(classification, reason);
    }
    if score < cfg.min_score {
        return deny(classification, format!("Score {score} below minimum {}", cfg.min_score));
    }
    if safety < cfg.min_safety {
        return deny(
            classification,
            format!("Safety score {safety} below minimum {}", cfg.min_safety),
        );
    }
    match imp.operation() {
        Some(op) if cfg.allowed().contains(&op) => AutoApplyDecision {
            allowed: true,
            classification,
            reason: "Eligible for automatic application".to_string(),
        },
        op => {
            let op = op.map_or("none", Operation::as_str);
            deny(
                classification,
                format!("Operation {op} not in allowed operations [{}]", cfg.allowed_operations.join(", ")),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn imp(table: &str, op: &str, kind: Option<&str>, payload: serde_json::Value) -> Improvement {
        Improvement {
            id: "imp-1".into(),
            target_table: Some(table.into()),
            target_operation: Some(op.into()),
            improvement_type: kind.map(String::from),
            payload,
            ..Default::default()
        }
    }

    #[test]
    fn rule_ids_are_sequential_and_end_in_catch_all() {
        for (i, r) in RULES.iter().enumerate() {
            assert_eq!(usize::from(r.id), i + 1);
        }
        assert_eq!(RULES.last().map(|r| r.tier), Some(RiskTier::Governed));
    }

    #[test]
    fn constitution_update_is_immutable_not_governed() {
        let c = classify(&imp(CONSTITUTION_TABLE, "UPDATE", None, json!({})));
        assert_eq!(c.tier, RiskTier::Immutable);
        assert_eq!(c.rule, 1);
        assert_eq!(c.confidence, 100);
    }

    #[test]
    fn const_prefixed_rule_is_immutable() {
        let c = classify(&imp("leo_gate_rules", "INSERT", None, json!({"rule_code": "const-004"})));
        assert_eq!((c.tier, c.rule), (RiskTier::Immutable, 2));
    }

    #[test]
    fn core_section_is_immutable_situational_is_auto() {
        let core = classify(&imp(SECTIONS_TABLE, "INSERT", Some("SECTION"), json!({"priority": "CORE"})));
        assert_eq!((core.tier, core.rule), (RiskTier::Immutable, 3));

        let situational = classify(&imp(SECTIONS_TABLE, "INSERT", Some("SECTION"), json!({"priority": "situational"})));
        assert_eq!((situational.tier, situational.rule), (RiskTier::Auto, 8));
        assert_eq!(situational.confidence, 90);
    }

    #[test]
    fn governed_tables_and_operations() {
        assert_eq!(classify(&imp(VALIDATION_RULES_TABLE, "INSERT", None, json!({}))).rule, 4);
        assert_eq!(classify(&imp(SUB_AGENTS_TABLE, "INSERT", None, json!({}))).rule, 5);
        let del = classify(&imp("leo_checklists", "DELETE", Some("CHECKLIST_ITEM"), json!({})));
        assert_eq!((del.tier, del.rule, del.confidence), (RiskTier::Governed, 6, 95));
    }

    #[test]
    fn checklist_confidence_depends_on_completeness() {
        let full = classify(&imp("leo_checklists", "INSERT", Some("CHECKLIST_ITEM"), json!({})));
        assert_eq!((full.tier, full.rule, full.confidence), (RiskTier::Auto, 7, 90));

        let sparse = Improvement {
            target_operation: Some("UPSERT".into()),
            improvement_type: Some("checklist_item".into()),
            ..Default::default()
        };
        let c = classify(&sparse);
        assert_eq!((c.tier, c.confidence), (RiskTier::Auto, 75));
    }

    #[test]
    fn unmatched_falls_back_to_governed() {
        let c = classify(&Improvement::default());
        assert_eq!((c.tier, c.rule, c.confidence), (RiskTier::Governed, 9, 100));
    }

    #[test]
    fn auto_apply_checks_in_order() {
        let cfg = AutoApplyConfig::default();
        let governed = imp(VALIDATION_RULES_TABLE, "INSERT", None, json!({}));
        let d = can_auto_apply(&governed, 100.0, 10.0, &cfg);
        assert!(!d.allowed);
        assert!(d.reason.contains("GOVERNED"));

        let auto = imp("leo_checklists", "INSERT", Some("CHECKLIST_ITEM"), json!({}));
        assert!(can_auto_apply(&auto, 84.0, 10.0, &cfg).reason.starts_with("Score"));
        assert!(can_auto_apply(&auto, 90.0, 8.0, &cfg).reason.starts_with("Safety"));
        assert!(can_auto_apply(&auto, 85.0, 9.0, &cfg).allowed);

        let upsert = imp("leo_checklists", "UPSERT", Some("CHECKLIST_ITEM"), json!({}));
        let d = can_auto_apply(&upsert, 95.0, 10.0, &cfg);
        assert!(!d.allowed);
        assert!(d.reason.contains("UPSERT"));
    }
}
