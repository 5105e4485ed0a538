use crate::context::Ctx;
use crate::output::print_json;
use clap::Subcommand;
use leo_core::risk::{can_auto_apply, classify, Classification};
use std::path::Path;

#[derive(Subcommand)]
pub enum RiskSubcommand {
    /// Classify a queued improvement into IMMUTABLE, GOVERNED, or AUTO
    Classify {
        /// Improvement id
        id: String,
    },

    /// Decide whether an improvement may be applied without review
    CanAutoApply {
        /// Improvement id
        id: String,
        /// Aggregate quality score, 0-100
        #[arg(long)]
        score: f64,
        /// Safety criterion score, 0-10
        #[arg(long)]
        safety: f64,
    },
}

pub fn run(root: &Path, subcmd: RiskSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        RiskSubcommand::Classify { id } => classify_cmd(root, &id, json),
        RiskSubcommand::CanAutoApply { id, score, safety } => {
            can_auto_apply_cmd(root, &id, score, safety, json)
        }
    }
}

fn print_classification(c: &Classification) {
    println!("Tier:       {}", c.tier);
    println!("Rule:       {} ({})", c.rule, c.rule_name);
    println!("Confidence: {}", c.confidence);
    println!("Reason:     {}", c.reason);
}

fn classify_cmd(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open(root)?;
    let imp = ctx.db.improvement(id)?;
    let c = classify(&imp);
    if json {
        return print_json(&c);
    }
    println!(
        "Improvement {} -> {} {}",
        imp.id,
        imp.target_operation.as_deref().unwrap_or("?"),
        imp.table()
    );
    print_classification(&c);
    Ok(())
}

fn can_auto_apply_cmd(root: &Path, id: &str, score: f64, safety: f64, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open(root)?;
    let imp = ctx.db.improvement(id)?;
    let decision = can_auto_apply(&imp, score, safety, &ctx.config.auto_apply);
    if json {
        print_json(&decision)?;
    } else {
        print_classification(&decision.classification);
        let verdict = if decision.allowed { "ALLOWED" } else { "DENIED" };
        println!("\n{verdict}: {}", decision.reason);
    }
    if !decision.allowed {
        anyhow::bail!("auto-apply denied for {id}");
    }
    Ok(())
}
