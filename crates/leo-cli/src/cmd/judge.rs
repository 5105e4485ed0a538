use crate::context::Ctx;
use crate::output::{print_json, print_table};
use chrono::{Duration, Utc};
use clap::Subcommand;
use leo_core::constitution::{self, RuleInput, Violation};
use leo_core::judge::QualityJudge;
use std::path::Path;

#[derive(Subcommand)]
pub enum JudgeSubcommand {
    /// Check constitution rules, then score the improvement with the model
    Evaluate {
        /// Improvement id
        id: String,
    },

    /// Check constitution rules only; no model call, nothing written
    Constitution {
        /// Improvement id
        id: String,
    },

    /// Print the constitution rules
    Rules,
}

pub fn run(root: &Path, subcmd: JudgeSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        JudgeSubcommand::Evaluate { id } => evaluate(root, &id, json),
        JudgeSubcommand::Constitution { id } => constitution_check(root, &id, json),
        JudgeSubcommand::Rules => {
            println!("{}", constitution::rules_text());
            Ok(())
        }
    }
}

fn print_violations(violations: &[Violation]) {
    let rows = violations
        .iter()
        .map(|v| {
            vec![
                v.rule_code.to_string(),
                v.severity.as_str().to_string(),
                v.message.clone(),
            ]
        })
        .collect();
    print_table(&["RULE", "SEVERITY", "MESSAGE"], rows);
}

fn evaluate(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open(root)?;
    let llm = ctx.require_llm()?;
    let judge = QualityJudge::new(ctx.db.clone(), llm, ctx.config.judge.clone());
    let j = judge.evaluate(id)?;

    if json {
        return print_json(&j);
    }

    if j.short_circuited {
        println!("{}: REJECT (critical constitution violation, not scored)", j.improvement_id);
    } else {
        println!("{}: {} with score {}", j.improvement_id, j.recommendation, j.score);
        let rows = j
            .criteria
            .iter()
            .map(|(name, c)| {
                vec![
                    name.clone(),
                    format!("{}", c.score),
                    c.reasoning.clone().unwrap_or_default(),
                ]
            })
            .collect();
        print_table(&["CRITERION", "SCORE", "REASONING"], rows);
    }
    if !j.violations.is_empty() {
        println!();
        print_violations(&j.violations);
    }
    if let Some(r) = &j.reasoning {
        println!("\n{r}");
    }
    for w in &j.warnings {
        println!("warning: {w}");
    }
    Ok(())
}

fn constitution_check(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let ctx = Ctx::open(root)?;
    let imp = ctx.db.improvement(id)?;
    let recent = ctx
        .db
        .count_auto_applied_since(Utc::now() - Duration::hours(24))
        .ok();
    let report = constitution::validate(&RuleInput {
        improvement: &imp,
        recent_auto_applies: recent,
    });

    if json {
        print_json(&report)?;
    } else if report.violations.is_empty() {
        println!("{id}: no constitution violations");
    } else {
        print_violations(&report.violations);
    }
    if report.has_critical() {
        anyhow::bail!("{id} violates a CRITICAL constitution rule");
    }
    Ok(())
}
