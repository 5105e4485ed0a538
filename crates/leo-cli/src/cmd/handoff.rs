use crate::cmd::sd::type_checker;
use crate::context::Ctx;
use crate::output::{print_gates, print_json};
use clap::Subcommand;
use leo_core::handoff::{Collaborators, HandoffOutcome, PlanToLeadExecutor};
use std::path::Path;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum HandoffSubcommand {
    /// Run the PLAN-TO-LEAD gates and, when they pass, complete the SD
    PlanToLead {
        /// SD id or key
        sd: String,
        /// Skip model calls (type classification, retrospective scoring)
        #[arg(long)]
        no_ai: bool,
    },
}

pub fn run(root: &Path, subcmd: HandoffSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        HandoffSubcommand::PlanToLead { sd, no_ai } => plan_to_lead(root, &sd, no_ai, json),
    }
}

fn plan_to_lead(root: &Path, sd_ref: &str, no_ai: bool, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open(root)?;
    let repo = ctx.config.handoff.repo_root(root);
    let mut collaborators = Collaborators::local(&repo);
    if !no_ai {
        if let Some(llm) = ctx.llm() {
            collaborators = collaborators.with_llm(llm);
        }
    }

    let executor = PlanToLeadExecutor::new(
        ctx.db.clone(),
        root,
        ctx.config.handoff.clone(),
        Arc::new(type_checker(&ctx, !no_ai)),
        collaborators,
    );
    let outcome = executor.execute(sd_ref)?;

    if json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome);
    }
    if !outcome.success {
        anyhow::bail!(
            "PLAN-TO-LEAD rejected: {}",
            outcome.reason_code.as_deref().unwrap_or("UNKNOWN")
        );
    }
    Ok(())
}

fn print_outcome(o: &HandoffOutcome) {
    println!(
        "PLAN-TO-LEAD {} ({}, {} via {:?})",
        o.sd_key, o.sd_type.sd_type, o.sd_type.confidence, o.sd_type.source
    );
    println!();
    print_gates(&o.gates);
    println!();

    if let Some(pv) = &o.plan_verification {
        println!(
            "Plan verification: {}/{} (prd {} + handoff {} + stories {} [{}/{}])",
            pv.score,
            pv.threshold,
            pv.prd_points,
            pv.handoff_points,
            pv.story_points,
            pv.stories_completed,
            pv.stories_total
        );
    }

    if o.success {
        let path = o.path.map(|p| p.as_str()).unwrap_or("-");
        println!("ACCEPTED via {path} path, score {}%", o.score);
        if !o.completed_parents.is_empty() {
            println!("Completed parents: {}", o.completed_parents.join(", "));
        }
        if !o.next_commands.is_empty() {
            println!("\nNext:");
            for c in &o.next_commands {
                println!("  {c}");
            }
        }
    } else {
        println!(
            "REJECTED [{}]: {}",
            o.reason_code.as_deref().unwrap_or("UNKNOWN"),
            o.message
        );
        if let Some(r) = &o.remediation {
            println!("Remediation: {r}");
        }
    }

    if !o.warnings.is_empty() {
        println!("\nWarnings:");
        for w in &o.warnings {
            println!("  - {w}");
        }
    }
}
