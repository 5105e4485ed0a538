use crate::context::Ctx;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use leo_core::eligibility::{Eligibility, EligibilityChecker, Scores, StoredAssessmentScores};
use std::path::Path;

#[derive(Subcommand)]
pub enum EligibilitySubcommand {
    /// Run every AUTO-eligibility check against one improvement
    Check {
        /// Improvement id
        id: String,
        /// Aggregate quality score, 0-100
        #[arg(long)]
        score: f64,
        /// Safety criterion score, 0-10
        #[arg(long)]
        safety: f64,
    },

    /// Check all pending improvements using their latest stored assessment
    Batch,
}

pub fn run(root: &Path, subcmd: EligibilitySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        EligibilitySubcommand::Check { id, score, safety } => {
            check(root, &id, Scores { score, safety }, json)
        }
        EligibilitySubcommand::Batch => batch(root, json),
    }
}

fn check(root: &Path, id: &str, scores: Scores, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open(root)?;
    let imp = ctx.db.improvement(id)?;
    let checker = EligibilityChecker::new(ctx.db.clone(), ctx.config.auto_apply.clone());
    let result = checker.check(&imp, scores);

    if json {
        print_json(&result)?;
    } else {
        print_eligibility(&result);
    }
    if !result.eligible {
        anyhow::bail!("{id} is not AUTO-eligible: {}", result.decision);
    }
    Ok(())
}

fn print_eligibility(e: &Eligibility) {
    println!(
        "{}: {} (tier {}, band {:?}, recommend {})",
        e.improvement_id, e.decision, e.classification.tier, e.band, e.recommendation
    );
    let rows = e
        .checks
        .iter()
        .map(|c| {
            vec![
                c.name.to_string(),
                if c.passed { "pass" } else { "FAIL" }.to_string(),
                c.detail.clone(),
            ]
        })
        .collect();
    print_table(&["CHECK", "RESULT", "DETAIL"], rows);
}

fn batch(root: &Path, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open(root)?;
    let pending = ctx.db.pending_improvements()?;
    let checker = EligibilityChecker::new(ctx.db.clone(), ctx.config.auto_apply.clone());
    let report = checker.check_batch(&pending, &StoredAssessmentScores::new(ctx.db.clone()));

    if json {
        return print_json(&report);
    }
    if pending.is_empty() {
        println!("No pending improvements.");
        return Ok(());
    }
    let rows = report
        .results
        .iter()
        .map(|e| {
            vec![
                e.improvement_id.clone(),
                e.classification.tier.to_string(),
                e.decision.to_string(),
                e.reason.clone(),
            ]
        })
        .collect();
    print_table(&["IMPROVEMENT", "TIER", "DECISION", "REASON"], rows);
    for s in &report.skipped {
        println!("skipped {}: {}", s.improvement_id, s.reason);
    }
    println!(
        "\n{} of {} checked eligible ({:.0}%)",
        report.eligible,
        report.checked,
        report.eligibility_rate * 100.0
    );
    Ok(())
}
