use crate::context::Ctx;
use crate::output::print_json;
use clap::Subcommand;
use leo_core::sd_type::{
    profile_for, ClassificationCache, LlmSdClassifier, ResolveOptions, SdClassifier, SdTypeChecker,
};
use std::path::Path;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum SdSubcommand {
    /// Resolve the effective type of an SD and show its validation profile
    Type {
        /// SD id or key
        sd: String,
        /// Skip the AI classifier; use the declared type, category, or default
        #[arg(long)]
        no_ai: bool,
    },
}

pub fn run(root: &Path, subcmd: SdSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SdSubcommand::Type { sd, no_ai } => sd_type(root, &sd, no_ai, json),
    }
}

/// Checker backed by the configured model, or declared-only when there is
/// none or AI is off.
pub fn type_checker(ctx: &Ctx, use_ai: bool) -> SdTypeChecker {
    let classifier = use_ai
        .then(|| ctx.llm())
        .flatten()
        .map(|llm| Arc::new(LlmSdClassifier::new(llm)) as Arc<dyn SdClassifier>);
    SdTypeChecker::new(classifier, Arc::new(ClassificationCache::new()))
}

fn sd_type(root: &Path, sd_ref: &str, no_ai: bool, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open(root)?;
    let sd = ctx.db.sd(sd_ref)?;
    let checker = type_checker(&ctx, !no_ai);
    let resolution = checker.effective_type(
        &sd,
        ResolveOptions {
            use_ai: !no_ai,
            use_cache: true,
        },
    );
    let profile = profile_for(resolution.sd_type.as_str());

    if json {
        return print_json(&serde_json::json!({
            "sd_id": sd.id,
            "sd_key": sd.key(),
            "resolution": resolution,
            "profile": profile,
        }));
    }

    println!(
        "{}: {} (confidence {}, source {:?})",
        sd.key(),
        resolution.sd_type,
        resolution.confidence,
        resolution.source
    );
    if let Some(r) = &resolution.reasoning {
        println!("  reasoning: {r}");
    }
    let w = profile.weights;
    println!(
        "  weights:    requirements {} / implementation {} / testing {} / documentation {}",
        w.requirements, w.implementation, w.testing, w.documentation
    );
    let t = profile.thresholds;
    println!(
        "  thresholds: prd {} / retrospective {} / traceability {} / workflow-roi {}",
        t.prd_quality, t.retrospective, t.traceability, t.workflow_roi
    );
    let v = profile.validation;
    println!(
        "  requires:   prd={} stories={} sub-agents={} non-code={}",
        v.requires_prd, v.requires_user_stories, v.requires_sub_agents, v.is_non_code
    );
    if !profile.skipped_sub_agents.is_empty() {
        println!("  skipped sub-agents: {}", profile.skipped_sub_agents.join(", "));
    }
    Ok(())
}
