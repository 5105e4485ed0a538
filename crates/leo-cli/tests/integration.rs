#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn leo(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("leo").unwrap();
    cmd.current_dir(dir.path())
        .env("LEO_ROOT", dir.path())
        .env_remove("OPENAI_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn init_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    leo(&dir).arg("init").assert().success();
    dir
}

/// Write a whole table for the file store.
fn seed(dir: &TempDir, table: &str, rows: Value) {
    let path = dir.path().join(".leo/db").join(format!("{table}.json"));
    std::fs::write(path, serde_json::to_string_pretty(&rows).unwrap()).unwrap();
}

fn read_table(dir: &TempDir, table: &str) -> Vec<Value> {
    let path = dir.path().join(".leo/db").join(format!("{table}.json"));
    let data = std::fs::read_to_string(path).unwrap_or_else(|_| "[]".to_string());
    serde_json::from_str(&data).unwrap()
}

fn stdout_json(cmd: &mut Command) -> Value {
    let out = cmd.output().unwrap();
    serde_json::from_slice(&out.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// leo init / config
// ---------------------------------------------------------------------------

#[test]
fn init_creates_layout_and_is_idempotent() {
    let dir = init_project();
    assert!(dir.path().join(".leo/config.yaml").exists());
    assert!(dir.path().join(".leo/db").is_dir());
    assert!(dir.path().join("docs/protocol").is_dir());

    leo(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .leo/config.yaml"));
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    leo(&dir)
        .args(["risk", "classify", "imp-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("leo init"));
}

#[test]
fn fresh_config_validates() {
    let dir = init_project();
    leo(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn broken_judge_weights_fail_validation() {
    let dir = init_project();
    let path = dir.path().join(".leo/config.yaml");
    let cfg = std::fs::read_to_string(&path)
        .unwrap()
        .replace("safety: 25", "safety: 5");
    std::fs::write(&path, cfg).unwrap();

    leo(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("judge.weights sum to"));
}

// ---------------------------------------------------------------------------
// leo sd type
// ---------------------------------------------------------------------------

#[test]
fn sd_type_prefers_declared_then_category() {
    let dir = init_project();
    seed(
        &dir,
        "strategic_directives_v2",
        json!([
            {"id": "u1", "sd_key": "SD-INFRA-1", "title": "CI cache", "sd_type": "infrastructure"},
            {"id": "u2", "sd_key": "SD-CAT-1", "title": "Docs", "category": "documentation"},
            {"id": "u3", "sd_key": "SD-NONE-1", "title": "Mystery"},
        ]),
    );

    leo(&dir)
        .args(["sd", "type", "SD-INFRA-1", "--no-ai"])
        .assert()
        .success()
        .stdout(predicate::str::contains("infrastructure (confidence 100"));

    let v = stdout_json(leo(&dir).args(["--json", "sd", "type", "SD-CAT-1", "--no-ai"]));
    assert_eq!(v["resolution"]["sd_type"], "documentation");
    assert_eq!(v["resolution"]["confidence"], 70);

    let v = stdout_json(leo(&dir).args(["--json", "sd", "type", "SD-NONE-1", "--no-ai"]));
    assert_eq!(v["resolution"]["sd_type"], "feature");
    assert_eq!(v["resolution"]["source"], "default");
}

#[test]
fn sd_type_unknown_sd_fails() {
    let dir = init_project();
    leo(&dir)
        .args(["sd", "type", "SD-MISSING", "--no-ai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("strategic directive not found"));
}

// ---------------------------------------------------------------------------
// leo handoff plan-to-lead
// ---------------------------------------------------------------------------

#[test]
fn plan_to_lead_rejects_without_exec_handoff() {
    let dir = init_project();
    seed(
        &dir,
        "strategic_directives_v2",
        json!([{
            "id": "sd-uuid-1",
            "sd_key": "SD-FEAT-1",
            "title": "Checkout redesign",
            "sd_type": "feature",
            "status": "active",
            "current_phase": "PLAN",
        }]),
    );

    leo(&dir)
        .args(["handoff", "plan-to-lead", "SD-FEAT-1", "--no-ai"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("REJECTED [PREREQUISITE_HANDOFF_CHECK_FAILED]"))
        .stderr(predicate::str::contains("PLAN-TO-LEAD rejected"));

    let handoffs = read_table(&dir, "sd_phase_handoffs");
    assert_eq!(handoffs.len(), 1);
    assert_eq!(handoffs[0]["status"], "rejected");
    assert_eq!(handoffs[0]["handoff_type"], "PLAN-TO-LEAD");
}

// ---------------------------------------------------------------------------
// leo risk / eligibility / judge
// ---------------------------------------------------------------------------

fn seed_improvements(dir: &TempDir) {
    seed(
        dir,
        "protocol_improvement_queue",
        json!([
            {
                "id": "imp-auto",
                "target_table": "leo_checklist_items",
                "target_operation": "INSERT",
                "improvement_type": "CHECKLIST_ITEM",
                "description": "Add a checklist item for verifying RLS policies",
                "payload": {"text": "Verify RLS policies on new tables"},
                "risk_tier": "AUTO",
                "status": "PENDING",
                "evidence_count": 3,
                "created_at": "2026-01-01T00:00:00.000000Z"
            },
            {
                "id": "imp-const",
                "target_table": "protocol_constitution",
                "target_operation": "UPDATE",
                "improvement_type": "RULE_CHANGE",
                "description": "Relax the human oversight rule for small edits",
                "payload": {"rule_code": "CONST-001"},
                "risk_tier": "IMMUTABLE",
                "status": "PENDING",
                "evidence_count": 1,
                "created_at": "2026-01-02T00:00:00.000000Z"
            }
        ]),
    );
}

#[test]
fn risk_classify_tiers() {
    let dir = init_project();
    seed_improvements(&dir);

    let v = stdout_json(leo(&dir).args(["--json", "risk", "classify", "imp-const"]));
    assert_eq!(v["tier"], "IMMUTABLE");
    assert_eq!(v["rule"], 1);

    leo(&dir)
        .args(["risk", "classify", "imp-auto"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AUTO"))
        .stdout(predicate::str::contains("Confidence: 90"));
}

#[test]
fn can_auto_apply_threshold_failures_exit_nonzero() {
    let dir = init_project();
    seed_improvements(&dir);

    leo(&dir)
        .args(["risk", "can-auto-apply", "imp-auto", "--score", "90", "--safety", "9.5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ALLOWED"));

    leo(&dir)
        .args(["risk", "can-auto-apply", "imp-auto", "--score", "80", "--safety", "9.5"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Score 80 below minimum 85"));

    leo(&dir)
        .args(["risk", "can-auto-apply", "imp-const", "--score", "100", "--safety", "10"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("not AUTO"));
}

#[test]
fn eligibility_check_writes_audit_row() {
    let dir = init_project();
    seed_improvements(&dir);

    leo(&dir)
        .args(["eligibility", "check", "imp-auto", "--score", "92", "--safety", "9"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ELIGIBLE"));

    leo(&dir)
        .args(["eligibility", "check", "imp-auto", "--score", "92", "--safety", "8"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("INELIGIBLE_SAFETY"));

    let audit = read_table(&dir, "auto_eligibility_audit");
    assert_eq!(audit.len(), 2);
}

#[test]
fn eligibility_batch_skips_unscored() {
    let dir = init_project();
    seed_improvements(&dir);

    let v = stdout_json(leo(&dir).args(["--json", "eligibility", "batch"]));
    assert_eq!(v["checked"], 0);
    assert_eq!(v["skipped"].as_array().unwrap().len(), 2);
}

#[test]
fn constitution_check_flags_critical() {
    let dir = init_project();
    seed_improvements(&dir);

    leo(&dir)
        .args(["judge", "constitution", "imp-auto"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no constitution violations"));

    leo(&dir)
        .args(["judge", "constitution", "imp-const"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("CONST-007"));
}

#[test]
fn judge_rules_and_missing_model() {
    let dir = init_project();
    seed_improvements(&dir);

    leo(&dir)
        .args(["judge", "rules"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CONST-001"))
        .stdout(predicate::str::contains("CONST-009"));

    leo(&dir)
        .args(["judge", "evaluate", "imp-auto"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no LLM configured"));
}

// ---------------------------------------------------------------------------
// leo protocol
// ---------------------------------------------------------------------------

#[test]
fn protocol_versions_supersede_and_validate() {
    let dir = init_project();
    leo(&dir)
        .args(["protocol", "version", "--new-version", "1.0.0"])
        .assert()
        .success();
    leo(&dir)
        .args(["protocol", "version", "--new-version", "1.1.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("superseded: v1.0.0"));

    let old = std::fs::read_to_string(dir.path().join("docs/protocol/leo_protocol_v1.0.0.md")).unwrap();
    assert!(old.contains("DEPRECATION NOTICE"));
    assert!(old.contains("SUPERSEDED by v1.1.0"));

    leo(&dir)
        .args(["protocol", "version", "--validate-all"])
        .assert()
        .success();
    leo(&dir)
        .args(["protocol", "version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Latest: v1.1.0"));

    leo(&dir)
        .args(["protocol", "version", "--new-version", "1.0.5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not newer"));
}

#[test]
fn fix_superseding_dry_run_then_apply() {
    let dir = init_project();
    let proto = dir.path().join("docs/protocol");
    std::fs::write(
        proto.join("leo_protocol_v1.0.0.md"),
        "# LEO\n**Version**: 1.0.0\n**Status**: ACTIVE\n",
    )
    .unwrap();
    std::fs::write(
        proto.join("leo_protocol_v1.1.0.md"),
        "# LEO\n**Version**: 1.1.0\n**Status**: ACTIVE\n",
    )
    .unwrap();

    leo(&dir)
        .args(["protocol", "version", "--validate-all"])
        .assert()
        .failure();
    leo(&dir)
        .args(["protocol", "version", "--fix-superseding"])
        .assert()
        .success()
        .stdout(predicate::str::contains("needs fix: leo_protocol_v1.0.0.md"));
    leo(&dir)
        .args(["protocol", "version", "--fix-superseding", "--fix"])
        .assert()
        .success();
    leo(&dir)
        .args(["protocol", "version", "--validate-all"])
        .assert()
        .success();
}

#[test]
fn protocol_check_uses_cache_when_quick() {
    let dir = init_project();
    leo(&dir)
        .args(["protocol", "version", "--new-version", "2.0.0"])
        .assert()
        .success();

    let v = stdout_json(leo(&dir).args(["--json", "protocol", "check"]));
    assert_eq!(v["version"], "2.0.0");
    assert_eq!(v["from_cache"], false);
    assert!(dir.path().join(".leo-cache.json").exists());

    let v = stdout_json(leo(&dir).args(["--json", "protocol", "check", "--quick"]));
    assert_eq!(v["from_cache"], true);

    let v = stdout_json(leo(&dir).args(["--json", "protocol", "check", "--quick", "--force"]));
    assert_eq!(v["from_cache"], false);
}

#[test]
fn session_reads_and_compaction() {
    let dir = init_project();
    std::fs::write(dir.path().join("CLAUDE_CORE.md"), "# core").unwrap();
    std::fs::write(dir.path().join("CLAUDE_LEAD.md"), "# lead").unwrap();

    leo(&dir)
        .args(["protocol", "record-read", "CLAUDE_CORE.md"])
        .assert()
        .success();
    let v = stdout_json(leo(&dir).args(["--json", "protocol", "reads"]));
    assert_eq!(v["CLAUDE_CORE.md"], "ALREADY_READ");
    assert_eq!(v["CLAUDE_LEAD.md"], "NEVER_READ");

    leo(&dir)
        .args(["protocol", "record-compaction"])
        .assert()
        .success()
        .stdout(predicate::str::contains("compaction #1"));
    let v = stdout_json(leo(&dir).args(["--json", "protocol", "reads"]));
    assert_eq!(v["CLAUDE_CORE.md"], "NEVER_READ");
}

#[test]
fn watch_once_records_state() {
    let dir = init_project();
    leo(&dir)
        .args(["protocol", "version", "--new-version", "3.0.0"])
        .assert()
        .success();

    leo(&dir)
        .args(["protocol", "watch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("protocol at v3.0.0"));
    leo(&dir)
        .args(["protocol", "watch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("protocol unchanged"));
    leo(&dir)
        .args(["protocol", "watch", "--silent"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    let state: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(".leo-watcher.json")).unwrap())
            .unwrap();
    assert_eq!(state["last_version"], "3.0.0");
}

// ---------------------------------------------------------------------------
// leo uat
// ---------------------------------------------------------------------------

fn seed_uat(dir: &TempDir) {
    seed(
        dir,
        "uat_test_cases",
        json!([{"id": "case-1", "title": "Export CSV", "section": "Reports", "priority": "medium"}]),
    );
    seed(
        dir,
        "uat_test_results",
        json!([
            {"id": "res-1", "run_id": "run-9", "case_id": "case-1", "status": "PASS"},
            {"id": "res-2", "run_id": "run-9", "case_id": "case-1", "status": "FAIL", "notes": "file is empty"},
            {"id": "res-3", "run_id": "run-9", "case_id": "case-1", "status": "BLOCKED"},
        ]),
    );
}

#[test]
fn uat_summary_counts() {
    let dir = init_project();
    seed_uat(&dir);
    let v = stdout_json(leo(&dir).args(["--json", "uat", "summary", "run-9"]));
    assert_eq!(v["total"], 3);
    assert_eq!(v["failed"], 1);
    assert_eq!(v["pass_rate"], 33.3);
}

#[test]
fn uat_convert_creates_corrective_sd() {
    let dir = init_project();
    seed_uat(&dir);

    leo(&dir)
        .args(["uat", "convert", "res-1", "--no-ai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("only FAIL results convert"));

    leo(&dir)
        .args(["uat", "convert", "res-2", "--no-ai"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created SD-UAT-RES2"));

    let results = read_table(&dir, "uat_test_results");
    let converted = results.iter().find(|r| r["id"] == "res-2").unwrap();
    assert!(converted["generated_sd_id"].is_string());

    let v = stdout_json(leo(&dir).args(["--json", "sd", "type", "SD-UAT-RES2", "--no-ai"]));
    assert_eq!(v["resolution"]["sd_type"], "bugfix");

    leo(&dir)
        .args(["uat", "convert", "res-2", "--no-ai"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already converted"));
    let sds = read_table(&dir, "strategic_directives_v2");
    assert_eq!(sds.iter().filter(|s| s["sd_key"] == "SD-UAT-RES2").count(), 1);
}
