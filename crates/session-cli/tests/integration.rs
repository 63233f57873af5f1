#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn sessions(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sessions").unwrap();
    cmd.current_dir(dir.path())
        .env("SESSIONS_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    sessions(dir).arg("init").assert().success();
}

fn json_out(dir: &TempDir, args: &[&str]) -> Value {
    let out = sessions(dir)
        .arg("--json")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&out).unwrap()
}

fn create(dir: &TempDir, id: &str) {
    sessions(dir)
        .args(["session", "create", id, "Auth", "flow"])
        .assert()
        .success();
}

/// Session `id` in the execute phase with `total` checkpoints tracked.
fn executing(dir: &TempDir, id: &str, total: &str) {
    create(dir, id);
    sessions(dir).args(["phase", id, "design"]).assert().success();
    sessions(dir).args(["phase", id, "execute"]).assert().success();
    sessions(dir)
        .args(["progress", "init", id, total])
        .assert()
        .success();
}

fn manifest(dir: &TempDir, id: &str) -> Value {
    let data =
        std::fs::read_to_string(dir.path().join(format!("agents/sessions/{id}/state.json"))).unwrap();
    serde_json::from_str(&data).unwrap()
}

// ---------------------------------------------------------------------------
// sessions init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_layout() {
    let dir = TempDir::new().unwrap();
    sessions(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: agents/config.yaml"));

    assert!(dir.path().join("agents/sessions").is_dir());
    assert!(dir.path().join("agents/config.yaml").exists());
    assert!(dir.path().join("agents/index.db").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join("agents/config.yaml"),
        "project:\n  name: custom\nsync:\n  max_parallel: 2\n",
    )
    .unwrap();
    sessions(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  agents/config.yaml"));

    let data = std::fs::read_to_string(dir.path().join("agents/config.yaml")).unwrap();
    let cfg: serde_yaml::Value = serde_yaml::from_str(&data).unwrap();
    assert_eq!(cfg["project"]["name"].as_str(), Some("custom"));
    assert_eq!(cfg["sync"]["max_parallel"].as_u64(), Some(2));
}

#[test]
fn init_rejects_invalid_config() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("agents")).unwrap();
    std::fs::write(
        dir.path().join("agents/config.yaml"),
        "sync:\n  max_parallel: 0\n",
    )
    .unwrap();
    sessions(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_parallel"));
}

// ---------------------------------------------------------------------------
// sessions session create / show / list
// ---------------------------------------------------------------------------

#[test]
fn session_create_show_list() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    sessions(&dir)
        .args([
            "session",
            "create",
            "2026-02-14_auth",
            "Auth",
            "flow",
            "--type",
            "quick",
            "--description",
            "Token based login",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created session '2026-02-14_auth'"));

    let m = manifest(&dir, "2026-02-14_auth");
    assert_eq!(m["topic"], "Auth flow");
    assert_eq!(m["session_type"], "quick");
    assert_eq!(m["current_phase"], "intent");
    assert_eq!(m["status"], "active");
    assert!(m["phase_history"]["intent"]["started_at"].is_string());

    let shown = json_out(&dir, &["session", "show", "2026-02-14_auth"]);
    assert_eq!(shown["manifest"]["description"], "Token based login");
    assert_eq!(shown["plan_exists"], false);

    sessions(&dir)
        .args(["session", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2026-02-14_auth"))
        .stdout(predicate::str::contains("intent"));
}

#[test]
fn session_create_duplicate_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");
    sessions(&dir)
        .args(["session", "create", "s1", "Again"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn session_create_invalid_id_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sessions(&dir)
        .args(["session", "create", "Bad Id!", "Topic"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid session id"));
}

#[test]
fn session_list_filters_by_phase() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");
    create(&dir, "s2");
    sessions(&dir).args(["phase", "s2", "design"]).assert().success();

    let listed = json_out(&dir, &["session", "list", "--phase", "design"]);
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["session_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["s2"]);
}

#[test]
fn show_missing_session_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sessions(&dir)
        .args(["session", "show", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("session not found"));
}

// ---------------------------------------------------------------------------
// sessions phase
// ---------------------------------------------------------------------------

#[test]
fn phase_walks_forward_and_rejects_skips() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");

    sessions(&dir)
        .args(["phase", "s1", "execute"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid transition from intent to execute"));

    sessions(&dir)
        .args(["phase", "s1", "design"])
        .assert()
        .success()
        .stdout(predicate::str::contains("intent -> design"));
    sessions(&dir).args(["phase", "s1", "execute"]).assert().success();
    sessions(&dir).args(["phase", "s1", "complete"]).assert().success();

    let m = manifest(&dir, "s1");
    assert_eq!(m["current_phase"], "complete");
    assert!(m["phase_history"]["execute"]["completed_at"].is_string());
    assert!(m["phase_history"]["document"]["started_at"].is_null());

    sessions(&dir)
        .args(["phase", "s1", "document"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// sessions progress
// ---------------------------------------------------------------------------

#[test]
fn progress_runs_through_checkpoints() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    executing(&dir, "s1", "2");

    sessions(&dir)
        .args(["progress", "start", "s1", "1"])
        .assert()
        .success();
    let done = json_out(
        &dir,
        &["progress", "complete", "s1", "1", "--pass", "cargo test"],
    );
    assert_eq!(done["checkpoints_completed"], serde_json::json!([1]));
    assert_eq!(done["next_checkpoint"], 2);

    sessions(&dir)
        .args(["progress", "complete", "s1", "2", "--fail", "cargo clippy"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("verification failed for checkpoint 2"));

    let m = manifest(&dir, "s1");
    assert_eq!(m["build_progress"]["checkpoints_completed"], serde_json::json!([1]));
    assert_eq!(m["build_progress"]["current_checkpoint"], 2);
}

#[test]
fn progress_override_is_recorded() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    executing(&dir, "s1", "1");

    sessions(&dir)
        .args([
            "progress",
            "complete",
            "s1",
            "1",
            "--fail",
            "cargo clippy",
            "--override",
            "lint noise from generated code",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("overridden: cargo clippy"));

    let notes = json_out(&dir, &["note", "list", "s1", "--category", "override"]);
    let notes = notes.as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert!(notes[0]["content"]
        .as_str()
        .unwrap()
        .contains("lint noise from generated code"));
    assert_eq!(notes[0]["checkpoint"], 1);
}

#[test]
fn progress_init_conflict_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    executing(&dir, "s1", "3");

    sessions(&dir)
        .args(["progress", "init", "s1", "3"])
        .assert()
        .success();
    sessions(&dir)
        .args(["progress", "init", "s1", "4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn progress_out_of_sequence_start_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    executing(&dir, "s1", "3");
    sessions(&dir)
        .args(["progress", "start", "s1", "2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid checkpoint 2"));
}

// ---------------------------------------------------------------------------
// sessions commit / status / git / note
// ---------------------------------------------------------------------------

#[test]
fn commit_add_and_list() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");

    sessions(&dir)
        .args(["commit", "add", "s1", "abc1234", "Add", "token", "store"])
        .assert()
        .success();
    sessions(&dir)
        .args(["commit", "add", "s1", "def5678", "Wire", "handler"])
        .assert()
        .success();

    let commits = json_out(&dir, &["commit", "list", "s1"]);
    let shas: Vec<&str> = commits
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["sha"].as_str().unwrap())
        .collect();
    assert_eq!(shas, ["abc1234", "def5678"]);
    assert_eq!(commits[0]["message"], "Add token store");
}

#[test]
fn status_terminal_is_final() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");

    sessions(&dir).args(["status", "s1", "paused"]).assert().success();
    sessions(&dir).args(["status", "s1", "complete"]).assert().success();
    sessions(&dir)
        .args(["status", "s1", "active"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("terminal"));
    assert_eq!(manifest(&dir, "s1")["status"], "complete");
}

#[test]
fn git_partial_update() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");

    sessions(&dir)
        .args(["git", "s1", "--branch", "feat/auth", "--base-branch", "main"])
        .assert()
        .success();
    let git = json_out(&dir, &["git", "s1", "--worktree", "../wt"]);
    assert_eq!(git["branch"], "feat/auth");
    assert_eq!(git["worktree"], "../wt");
    assert_eq!(git["base_branch"], "main");
}

#[test]
fn note_add_and_list() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");

    sessions(&dir)
        .args(["note", "add", "s1", "Chose", "JWT", "--category", "decision"])
        .assert()
        .success();
    sessions(&dir)
        .args(["note", "add", "s1", "fake", "--category", "override"])
        .assert()
        .failure();

    let notes = json_out(&dir, &["note", "list", "s1"]);
    assert_eq!(notes.as_array().unwrap().len(), 1);
    assert_eq!(notes[0]["content"], "Chose JWT");
}

// ---------------------------------------------------------------------------
// sessions task (plan-driven)
// ---------------------------------------------------------------------------

fn write_plan(dir: &TempDir, id: &str) {
    let plan = serde_json::json!({
        "session_id": id,
        "created_at": "2026-02-14T10:00:00Z",
        "updated_at": "2026-02-14T10:00:00Z",
        "checkpoints": [{
            "id": 1,
            "title": "Token store",
            "testing_strategy": {"verification_steps": ["cargo test"]},
            "task_groups": [{
                "id": "g1",
                "title": "Storage",
                "tasks": [
                    {"id": "t1", "title": "Schema"},
                    {"id": "t2", "title": "Queries", "depends_on": ["t1"]}
                ]
            }]
        }]
    });
    std::fs::write(
        dir.path().join(format!("agents/sessions/{id}/plan.json")),
        serde_json::to_string_pretty(&plan).unwrap(),
    )
    .unwrap();
}

#[test]
fn task_flow_gates_checkpoint() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");
    write_plan(&dir, "s1");
    sessions(&dir).args(["phase", "s1", "design"]).assert().success();
    sessions(&dir).args(["phase", "s1", "execute"]).assert().success();
    sessions(&dir)
        .args(["progress", "init", "s1", "1"])
        .assert()
        .success();

    let next = json_out(&dir, &["task", "next", "s1"]);
    assert_eq!(next[0]["id"], "t1");
    assert_eq!(next.as_array().unwrap().len(), 1);

    sessions(&dir)
        .args(["task", "start", "s1", "t2"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("waiting on: t1"));

    sessions(&dir)
        .args(["progress", "complete", "s1", "1", "--pass", "cargo test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 incomplete task(s)"));

    sessions(&dir).args(["task", "complete", "s1", "t1"]).assert().success();
    sessions(&dir).args(["task", "complete", "s1", "t2"]).assert().success();

    sessions(&dir)
        .args(["task", "list", "s1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("t2"))
        .stdout(predicate::str::contains("complete"));

    sessions(&dir)
        .args(["progress", "complete", "s1", "1", "--pass", "cargo test"])
        .assert()
        .success();

    let plan: Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("agents/sessions/s1/plan.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(plan["status"], "complete");
    assert_eq!(plan["checkpoints"][0]["status"], "complete");
}

#[test]
fn task_block_requires_reason_text() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");
    write_plan(&dir, "s1");

    let out = json_out(&dir, &["task", "block", "s1", "t1", "waiting", "on", "review"]);
    assert_eq!(out["task"]["status"], "blocked");
    assert_eq!(out["task"]["blocker"], "waiting on review");
}

// ---------------------------------------------------------------------------
// sessions sync / index
// ---------------------------------------------------------------------------

#[test]
fn key_transitions_sync_into_index() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");

    let row = json_out(&dir, &["index", "show", "s1"]);
    assert_eq!(row["phase"], "intent");

    sessions(&dir).args(["phase", "s1", "design"]).assert().success();
    let row = json_out(&dir, &["index", "show", "s1"]);
    assert_eq!(row["phase"], "design");
}

#[test]
fn sync_all_onboards_and_reports_failures() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");
    create(&dir, "s2");
    std::fs::create_dir_all(dir.path().join("agents/sessions/broken")).unwrap();
    std::fs::write(
        dir.path().join("agents/sessions/broken/state.json"),
        "{ not json",
    )
    .unwrap();

    sessions(&dir)
        .args(["index", "clear", "--yes"])
        .assert()
        .success();

    let summary = json_out(&dir, &["sync", "all", "--max-parallel", "2"]);
    assert_eq!(summary["synced"].as_array().unwrap().len(), 2);
    assert_eq!(summary["failed"].as_array().unwrap().len(), 1);

    let stats = json_out(&dir, &["index", "stats"]);
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["by_phase"]["intent"], 2);

    sessions(&dir)
        .args(["index", "list", "--status", "active"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s1"))
        .stdout(predicate::str::contains("s2"));
}

#[test]
fn sync_one_by_id() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("agents/sessions")).unwrap();
    create(&dir, "s1");

    let row = json_out(&dir, &["sync", "one", "s1"]);
    assert_eq!(row["session_id"], "s1");
    assert_eq!(row["spec_exists"], false);
    assert!(dir.path().join("agents/index.db").exists());
}

#[test]
fn index_clear_requires_confirmation() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    sessions(&dir)
        .args(["index", "clear"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn index_remove_drops_one_row() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");
    create(&dir, "s2");
    sessions(&dir).args(["sync", "one", "s1"]).assert().success();
    sessions(&dir).args(["sync", "one", "s2"]).assert().success();

    let removed = json_out(&dir, &["index", "remove", "s1"]);
    assert_eq!(removed["removed"], true);

    let stats = json_out(&dir, &["index", "stats"]);
    assert_eq!(stats["total"], 1);
    sessions(&dir)
        .args(["index", "remove", "s1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not indexed"));
    assert!(dir.path().join("agents/sessions/s1/state.json").exists());
}

// ---------------------------------------------------------------------------
// sessions mcp
// ---------------------------------------------------------------------------

#[test]
fn mcp_serves_tool_calls_over_stdio() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    create(&dir, "s1");

    let input = [
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"session_transition_phase","arguments":{"session_id":"s1","new_phase":"design"}}}"#,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"session_set_status","arguments":{"session_id":"s1","status":"bogus"}}}"#,
    ]
    .join("\n");

    let out = sessions(&dir)
        .arg("mcp")
        .write_stdin(input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let lines: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["result"]["serverInfo"]["name"], "sessions");
    assert_eq!(lines[1]["result"]["isError"], false);
    assert_eq!(lines[2]["result"]["isError"], true);
    let err: Value =
        serde_json::from_str(lines[2]["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(err["error"], "invalid_status");

    assert_eq!(manifest(&dir, "s1")["current_phase"], "design");
    // The background worker synced the transition before the server exited.
    let row = json_out(&dir, &["index", "show", "s1"]);
    assert_eq!(row["phase"], "design");
}
