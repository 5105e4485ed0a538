//! AUTO-eligibility checks with an audit trail.
//!
//! Checks run in a fixed order (tier, score, safety, operation, daily
//! limit) and stop at the first failure. Every decision is appended to an
//! in-memory audit log and mirrored into `auto_eligibility_audit`.

use crate::config::AutoApplyConfig;
use crate::error::Result;
use crate::records::Improvement;
use crate::risk::{classify, Classification};
use crate::score::ScoreBand;
use crate::store::{fields, tables, Db};
use crate::types::{Recommendation, RiskTier};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Eligible,
    IneligibleTier,
    IneligibleScore,
    IneligibleSafety,
    IneligibleOperation,
    IneligibleLimit,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Eligible => "ELIGIBLE",
            Decision::IneligibleTier => "INELIGIBLE_TIER",
            Decision::IneligibleScore => "INELIGIBLE_SCORE",
            Decision::IneligibleSafety => "INELIGIBLE_SAFETY",
            Decision::IneligibleOperation => "INELIGIBLE_OPERATION",
            Decision::IneligibleLimit => "INELIGIBLE_LIMIT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scores {
    /// Aggregate quality score, 0–100.
    pub score: f64,
    /// Safety criterion, 0–10.
    pub safety: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Eligibility {
    pub improvement_id: String,
    pub eligible: bool,
    pub decision: Decision,
    pub classification: Classification,
    pub checks: Vec<Check>,
    pub band: ScoreBand,
    pub recommendation: Recommendation,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub improvement_id: String,
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub checks: Vec<Check>,
    pub duration_ms: u64,
}

// ---------------------------------------------------------------------------
// Checker
// ---------------------------------------------------------------------------

pub struct EligibilityChecker {
    db: Db,
    config: AutoApplyConfig,
    audit: Mutex<Vec<AuditEntry>>,
}

impl EligibilityChecker {
    pub fn new(db: Db, config: AutoApplyConfig) -> Self {
        Self {
            db,
            config,
            audit: Mutex::new(Vec::new()),
        }
    }

    /// AUTO applies in the trailing 24 hours. A failed count reads as the
    /// limit being reached.
    fn applied_today(&self) -> std::result::Result<usize, String> {
        self.db
            .count_auto_applied_since(Utc::now() - Duration::hours(24))
            .map_err(|e| e.to_string())
    }

    pub fn check(&self, imp: &Improvement, scores: Scores) -> Eligibility {
        let started = Instant::now();
        let classification = classify(imp);
        let mut checks = Vec::new();

        let decision = self.run_checks(imp, scores, &classification, &mut checks);
        let reason = match checks.iter().find(|c| !c.passed) {
            Some(c) => c.detail.clone(),
            None => "All eligibility checks passed".to_string(),
        };
        let band = ScoreBand::from_score(scores.score);

        let entry = AuditEntry {
            improvement_id: imp.id.clone(),
            timestamp: Utc::now(),
            decision,
            checks: checks.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.mirror(&entry);
        if let Ok(mut log) = self.audit.lock() {
            log.push(entry);
        }
        tracing::info!(improvement = %imp.id, decision = %decision, "eligibility checked");

        Eligibility {
            improvement_id: imp.id.clone(),
            eligible: decision == Decision::Eligible,
            decision,
            classification,
            checks,
            band,
            recommendation: band.recommendation(),
            reason,
        }
    }

    fn run_checks(
        &self,
        imp: &Improvement,
        scores: Scores,
        classification: &Classification,
        checks: &mut Vec<Check>,
    ) -> Decision {
        let mut record = |name, passed, detail: String| {
            checks.push(Check { name, passed, detail });
            passed
        };

        if !record(
            "tier",
            classification.tier == RiskTier::Auto,
            format!("tier {} (rule {})", classification.tier, classification.rule),
        ) {
            return Decision::IneligibleTier;
        }
        if !record(
            "score",
            scores.score >= self.config.min_score,
            format!("score {} (min {})", scores.score, self.config.min_score),
        ) {
            return Decision::IneligibleScore;
        }
        if !record(
            "safety",
            scores.safety >= self.config.min_safety,
            format!("safety {} (min {})", scores.safety, self.config.min_safety),
        ) {
            return Decision::IneligibleSafety;
        }
        let op = imp.operation();
        if !record(
            "operation",
            op.is_some_and(|o| self.config.allowed().contains(&o)),
            format!(
                "operation {} (allowed {})",
                op.map_or("none", |o| o.as_str()),
                self.config.allowed_operations.join(", ")
            ),
        ) {
            return Decision::IneligibleOperation;
        }
        let (under, detail) = match self.applied_today() {
            Ok(n) => (n < self.config.daily_limit, format!("{n} applied in 24h (limit {})", self.config.daily_limit)),
            Err(e) => (false, format!("daily count unavailable: {e}")),
        };
        if !record("daily_limit", under, detail) {
            return Decision::IneligibleLimit;
        }
        Decision::Eligible
    }

    fn mirror(&self, entry: &AuditEntry) {
        let row = fields(json!({
            "improvement_id": entry.improvement_id,
            "decision": entry.decision,
            "checks": entry.checks,
            "duration_ms": entry.duration_ms,
            "checked_at": entry.timestamp.to_rfc3339(),
        }));
        if let Err(e) = self.db.insert(tables::ELIGIBILITY_AUDIT, row) {
            tracing::warn!(improvement = %entry.improvement_id, "audit mirror failed: {e}");
        }
    }

    /// Snapshot of the audit log, oldest first.
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Check every improvement against `provider`. Improvements the
    /// provider has no scores for are reported as skipped.
    pub fn check_batch(&self, improvements: &[Improvement], provider: &dyn ScoreProvider) -> BatchReport {
        let mut report = BatchReport::default();
        for imp in improvements {
            match provider.scores(imp) {
                Ok(Some(scores)) => {
                    let e = self.check(imp, scores);
                    if e.eligible {
                        report.eligible += 1;
                    }
                    report.results.push(e);
                }
                Ok(None) => report.skipped.push(Skipped {
                    improvement_id: imp.id.clone(),
                    reason: "no quality assessment".to_string(),
                }),
                Err(e) => report.skipped.push(Skipped {
                    improvement_id: imp.id.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        report.checked = report.results.len();
        report.eligibility_rate = if report.checked == 0 {
            0.0
        } else {
            report.eligible as f64 / report.checked as f64
        };
        report
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

pub trait ScoreProvider {
    fn scores(&self, imp: &Improvement) -> Result<Option<Scores>>;
}

/// Scores from the newest stored quality assessment.
pub struct StoredAssessmentScores {
    db: Db,
}

impl StoredAssessmentScores {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

impl ScoreProvider for StoredAssessmentScores {
    fn scores(&self, imp: &Improvement) -> Result<Option<Scores>> {
        Ok(self.db.latest_assessment(&imp.id)?.map(|a| Scores {
            score: a.score as f64,
            safety: a.safety().unwrap_or(0.0),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Skipped {
    pub improvement_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub results: Vec<Eligibility>,
    pub skipped: Vec<Skipped>,
    pub checked: usize,
    pub eligible: usize,
    pub eligibility_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{CriterionScore, QualityAssessment, IMPROVEMENT_STATUS_APPLIED};
    use crate::store::MemoryStore;
    use chrono::SecondsFormat;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn db() -> Db {
        Db::new(Arc::new(MemoryStore::new()))
    }

    fn checklist(id: &str, op: &str) -> Improvement {
        Improvement {
            id: id.into(),
            target_table: Some("leo_checklists".into()),
            target_operation: Some(op.into()),
            improvement_type: Some("CHECKLIST_ITEM".into()),
            ..Default::default()
        }
    }

    const GOOD: Scores = Scores { score: 92.0, safety: 9.5 };

    #[test]
    fn eligible_improvement_is_audited() {
        let db = db();
        let checker = EligibilityChecker::new(db.clone(), AutoApplyConfig::default());
        let e = checker.check(&checklist("i1", "INSERT"), GOOD);
        assert!(e.eligible);
        assert_eq!(e.decision, Decision::Eligible);
        assert_eq!(e.checks.len(), 5);
        assert_eq!(e.recommendation, Recommendation::Approve);

        let log = checker.audit_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].improvement_id, "i1");
        assert_eq!(db.store().select(tables::ELIGIBILITY_AUDIT, &Default::default()).unwrap().len(), 1);
    }

    #[test]
    fn tier_is_checked_before_everything() {
        let checker = EligibilityChecker::new(db(), AutoApplyConfig::default());
        let governed = Improvement {
            id: "g".into(),
            target_table: Some("leo_validation_rules".into()),
            target_operation: Some("INSERT".into()),
            ..Default::default()
        };
        let e = checker.check(&governed, Scores { score: 100.0, safety: 10.0 });
        assert_eq!(e.decision, Decision::IneligibleTier);
        assert_eq!(e.checks.len(), 1);
    }

    #[test]
    fn each_check_has_its_own_code() {
        let checker = EligibilityChecker::new(db(), AutoApplyConfig::default());
        let imp = checklist("i", "INSERT");
        assert_eq!(
            checker.check(&imp, Scores { score: 80.0, safety: 10.0 }).decision,
            Decision::IneligibleScore
        );
        assert_eq!(
            checker.check(&imp, Scores { score: 90.0, safety: 8.9 }).decision,
            Decision::IneligibleSafety
        );
        assert_eq!(
            checker.check(&checklist("u", "UPSERT"), GOOD).decision,
            Decision::IneligibleOperation
        );
    }

    #[test]
    fn daily_limit_counts_recent_auto_applies() {
        let db = db();
        let at = (Utc::now() - Duration::hours(2)).to_rfc3339_opts(SecondsFormat::Micros, true);
        for i in 0..3 {
            db.insert(
                tables::IMPROVEMENTS,
                fields(json!({
                    "id": format!("done-{i}"),
                    "risk_tier": "AUTO",
                    "status": IMPROVEMENT_STATUS_APPLIED,
                    "applied_at": at,
                })),
            )
            .unwrap();
        }
        let checker = EligibilityChecker::new(db, AutoApplyConfig::default());
        let e = checker.check(&checklist("i", "INSERT"), GOOD);
        assert_eq!(e.decision, Decision::IneligibleLimit);
        assert!(e.reason.contains("3 applied"));
    }

    #[test]
    fn batch_tallies_rate_from_stored_assessments() {
        let db = db();
        let assess = |id: &str, score: i64, safety: f64| {
            let a = QualityAssessment {
                id: None,
                improvement_id: id.into(),
                evaluator_model: "test".into(),
                score,
                criteria_scores: BTreeMap::from([(
                    "safety".to_string(),
                    CriterionScore { score: safety, reasoning: None },
                )]),
                recommendation: Recommendation::Approve,
                reasoning: None,
                created_at: None,
            };
            db.insert_assessment(&a).unwrap();
        };
        assess("a", 95, 10.0);
        assess("b", 60, 10.0);

        let checker = EligibilityChecker::new(db.clone(), AutoApplyConfig::default());
        let items = [checklist("a", "INSERT"), checklist("b", "INSERT"), checklist("c", "INSERT")];
        let report = checker.check_batch(&items, &StoredAssessmentScores::new(db));
        assert_eq!(report.checked, 2);
        assert_eq!(report.eligible, 1);
        assert_eq!(report.skipped.len(), 1);
        assert!((report.eligibility_rate - 0.5).abs() < 1e-9);
    }
}
