//! Constitution rules checked before an improvement reaches the judge.
//!
//! Every rule runs; the table order only fixes the order violations are
//! reported in. Any CRITICAL violation ends the evaluation with a REJECT.

use crate::records::Improvement;
use crate::risk::CONSTITUTION_TABLE;
use crate::score::Severity;
use crate::types::RiskTier;
use serde::Serialize;
use serde_json::Value;

/// AUTO applies allowed in a trailing 24 hours before CONST-005 trips.
pub const AUTO_APPLY_CEILING: usize = 3;

/// What a rule can see: the improvement plus the trailing-24h count of
/// AUTO applies, when it could be loaded.
pub struct RuleInput<'a> {
    pub improvement: &'a Improvement,
    pub recent_auto_applies: Option<usize>,
}

pub struct ConstitutionRule {
    pub code: &'static str,
    pub name: &'static str,
    pub text: &'static str,
    pub severity: Severity,
    /// Returns the violation message when the rule is broken.
    pub check: fn(&RuleInput) -> Option<String>,
}

fn flag(payload: &Value, key: &str) -> Option<bool> {
    payload.get(key).and_then(Value::as_bool)
}

fn oversight(input: &RuleInput) -> Option<String> {
    let imp = input.improvement;
    let tier = imp.tier()?;
    (tier != RiskTier::Auto && imp.auto_applicable == Some(true))
        .then(|| format!("{tier} improvement is marked auto_applicable"))
}

fn auditable(input: &RuleInput) -> Option<String> {
    let imp = input.improvement;
    let evidence = imp.evidence_count.unwrap_or(0);
    (imp.source_retro_id.is_none() && evidence < 1)
        .then(|| "No source retrospective or evidence recorded".to_string())
}

fn database_first(input: &RuleInput) -> Option<String> {
    let table = input.improvement.table().to_ascii_lowercase();
    (table.ends_with(".md") || table.contains("markdown"))
        .then(|| format!("target_table '{table}' is a markdown file, not a database table"))
}

fn no_bypass(input: &RuleInput) -> Option<String> {
    let payload = &input.improvement.payload;
    ["bypass_validation", "skip_gates", "skip_validation"]
        .iter()
        .find(|k| flag(payload, k) == Some(true))
        .map(|k| format!("payload sets {k}"))
}

fn rate_limited(input: &RuleInput) -> Option<String> {
    let n = input.recent_auto_applies?;
    (n > AUTO_APPLY_CEILING)
        .then(|| format!("{n} AUTO improvements applied in the last 24h (ceiling {AUTO_APPLY_CEILING})"))
}

fn atomic(input: &RuleInput) -> Option<String> {
    let n = input
        .improvement
        .payload
        .get("operations")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    (n > 1).then(|| format!("payload bundles {n} operations"))
}

fn constitution_untouched(input: &RuleInput) -> Option<String> {
    input
        .improvement
        .table()
        .eq_ignore_ascii_case(CONSTITUTION_TABLE)
        .then(|| "Targets the constitution table".to_string())
}

fn reversible(input: &RuleInput) -> Option<String> {
    let payload = &input.improvement.payload;
    (flag(payload, "irreversible") == Some(true) || flag(payload, "reversible") == Some(false))
        .then(|| "payload marks itself irreversible".to_string())
}

fn described(input: &RuleInput) -> Option<String> {
    let len = input
        .improvement
        .description
        .as_deref()
        .map_or(0, |d| d.trim().len());
    (len < 20).then(|| "Description missing or shorter than 20 characters".to_string())
}

pub const RULES: &[ConstitutionRule] = &[
    ConstitutionRule {
        code: "CONST-001",
        name: "Human oversight",
        text: "GOVERNED and IMMUTABLE changes always require human approval.",
        severity: Severity::Critical,
        check: oversight,
    },
    ConstitutionRule {
        code: "CONST-002",
        name: "Auditability",
        text: "Every improvement traces back to a retrospective or recorded evidence.",
        severity: Severity::Medium,
        check: auditable,
    },
    ConstitutionRule {
        code: "CONST-003",
        name: "Database first",
        text: "The database is the source of truth; markdown files are never a target.",
        severity: Severity::Critical,
        check: database_first,
    },
    ConstitutionRule {
        code: "CONST-004",
        name: "Process compliance",
        text: "No improvement may bypass or disable protocol gates.",
        severity: Severity::Critical,
        check: no_bypass,
    },
    ConstitutionRule {
        code: "CONST-005",
        name: "Rate limit",
        text: "At most three AUTO improvements are applied per 24 hours.",
        severity: Severity::High,
        check: rate_limited,
    },
    ConstitutionRule {
        code: "CONST-006",
        name: "Atomicity",
        text: "One improvement carries one change.",
        severity: Severity::Medium,
        check: atomic,
    },
    ConstitutionRule {
        code: "CONST-007",
        name: "Constitution is amended by humans",
        text: "The constitution table is never changed through the improvement queue.",
        severity: Severity::Critical,
        check: constitution_untouched,
    },
    ConstitutionRule {
        code: "CONST-008",
        name: "Reversibility",
        text: "Changes must be reversible.",
        severity: Severity::Critical,
        check: reversible,
    },
    ConstitutionRule {
        code: "CONST-009",
        name: "Clear description",
        text: "Improvements state what they change and why.",
        severity: Severity::Low,
        check: described,
    },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub rule_code: &'static str,
    pub rule_name: &'static str,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConstitutionReport {
    pub violations: Vec<Violation>,
}

impl ConstitutionReport {
    pub fn has_critical(&self) -> bool {
        self.violations.iter().any(|v| v.severity == Severity::Critical)
    }

    pub fn critical(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.severity == Severity::Critical)
    }
}

pub fn validate(input: &RuleInput) -> ConstitutionReport {
    let violations = RULES
        .iter()
        .filter_map(|rule| {
            (rule.check)(input).map(|message| Violation {
                rule_code: rule.code,
                rule_name: rule.name,
                severity: rule.severity,
                message,
            })
        })
        .collect();
    ConstitutionReport { violations }
}

/// Rules as prompt text, one per line.
pub fn rules_text() -> String {
    RULES
        .iter()
        .map(|r| format!("{} {} [{}]: {}", r.code, r.name, r.severity.as_str(), r.text))
        .collect::<Vec<_>>()
        .join("\n")
}
