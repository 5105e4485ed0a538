use crate::context::Ctx;
use crate::output::print_json;
use clap::Subcommand;
use leo_core::uat::{convert_failure, run_summary};
use std::path::Path;

#[derive(Subcommand)]
pub enum UatSubcommand {
    /// Pass/fail/blocked counts and pass rate for a run
    Summary {
        /// UAT run id
        run: String,
    },

    /// Turn a FAIL result into a draft corrective SD
    Convert {
        /// UAT result id
        result: String,
        /// Use the template draft even when a model is configured
        #[arg(long)]
        no_ai: bool,
    },
}

pub fn run(root: &Path, subcmd: UatSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        UatSubcommand::Summary { run } => summary(root, &run, json),
        UatSubcommand::Convert { result, no_ai } => convert(root, &result, no_ai, json),
    }
}

fn summary(root: &Path, run_id: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open(root)?;
    let s = run_summary(&ctx.db, run_id)?;
    if json {
        return print_json(&s);
    }
    println!("Run {}: {} results", s.run_id, s.total);
    println!("  pass:    {}", s.passed);
    println!("  fail:    {}", s.failed);
    println!("  blocked: {}", s.blocked);
    println!("  pass rate: {:.1}%", s.pass_rate);
    Ok(())
}

fn convert(root: &Path, result_id: &str, no_ai: bool, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open(root)?;
    let llm = if no_ai { None } else { ctx.llm() };
    let c = convert_failure(&ctx.db, result_id, llm.as_deref())?;
    if json {
        return print_json(&c);
    }
    let source = if c.drafted_by_llm { "model" } else { "template" };
    println!("Created {} from UAT result {} ({source} draft)", c.sd_key, c.result_id);
    println!("  title:    {}", c.draft.title);
    println!("  priority: {}", c.draft.priority);
    Ok(())
}
