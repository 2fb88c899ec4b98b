//! Integration tests for system and config commands via CLI.

mod common;

use common::TestEnv;
use predicates::prelude::*;
use std::path::PathBuf;

fn storage_path(env: &TestEnv) -> PathBuf {
    let info = env.json(&["system", "info"]);
    PathBuf::from(info["storage_path"].as_str().unwrap())
}

#[test]
fn test_init_is_idempotent() {
    let env = TestEnv::new();

    let first = env.json(&["system", "init"]);
    assert_eq!(first["initialized"], true);

    let second = env.json(&["system", "init"]);
    assert_eq!(second["initialized"], false);
    assert_eq!(first["storage_path"], second["storage_path"]);
}

#[test]
fn test_storage_lives_under_data_dir() {
    let env = TestEnv::init();
    assert!(storage_path(&env).starts_with(env.data_path()));
}

#[test]
fn test_commands_before_init_fail() {
    let env = TestEnv::new();

    env.wbs()
        .args(["project", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""))
        .stderr(predicate::str::contains("Not initialized"));

    env.wbs()
        .args(["-H", "project", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error: Not initialized"));
}

#[test]
fn test_info_counts_documents() {
    let env = TestEnv::init();
    let project = env.project("Tower A", &[]);
    env.node("Frame", &["--project", &project]);

    let info = env.json(&["system", "info"]);
    assert_eq!(info["initialized"], true);
    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(info["documents"]["projects"], 1);
    assert_eq!(info["documents"]["wbs_nodes"], 1);
    assert_eq!(info["documents"]["tasks"], 0);
}

#[test]
fn test_info_before_init() {
    let env = TestEnv::new();
    let info = env.json(&["system", "info"]);
    assert_eq!(info["initialized"], false);
    assert!(info.get("documents").is_none());
}

#[test]
fn test_rebuild_reindexes_documents() {
    let env = TestEnv::init();
    let project = env.project("Tower A", &[]);
    env.node("Frame", &["--project", &project]);
    env.task("Excavate", &["-p", &project]);

    let rebuilt = env.json(&["system", "rebuild"]);
    assert_eq!(rebuilt["documents"], 3);
    assert_eq!(env.json(&["node", "list"])["count"], 1);
}

#[test]
fn test_repo_flag_must_exist() {
    let env = TestEnv::init();
    env.wbs()
        .args(["-C", "/nonexistent/trestle/repo", "project", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_config_list_reports_defaults() {
    let env = TestEnv::init();
    let list = env.json(&["config", "list"]);
    let entries = list["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 4);
    for entry in entries {
        assert_eq!(entry["source"], "default", "{}", entry["key"]);
    }
}

#[test]
fn test_config_set_session_and_get() {
    let env = TestEnv::init();

    let set = env.json(&["config", "set", "max-cascade-depth", "4"]);
    assert_eq!(set["value"], "4");
    assert!(set["path"].as_str().unwrap().ends_with("config.kdl"));

    let got = env.json(&["config", "get", "max-cascade-depth"]);
    assert_eq!(got["value"], "4");
    assert_eq!(got["source"], "session");
}

#[test]
fn test_config_precedence() {
    let env = TestEnv::init();
    env.json(&["config", "set", "--system", "max-cascade-depth", "8"]);
    assert_eq!(env.json(&["config", "get", "max-cascade-depth"])["source"], "system");

    env.json(&["config", "set", "max-cascade-depth", "4"]);
    assert_eq!(env.json(&["config", "get", "max-cascade-depth"])["value"], "4");

    let output = env
        .wbs()
        .env("TRESTLE_MAX_CASCADE_DEPTH", "2")
        .args(["config", "get", "max-cascade-depth"])
        .assert()
        .success()
        .get_output()
        .clone();
    let got: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(got["value"], "2");
    assert_eq!(got["source"], "env:TRESTLE_MAX_CASCADE_DEPTH");

    let got = env.json(&["--max-cascade-depth", "1", "config", "get", "max-cascade-depth"]);
    assert_eq!(got["value"], "1");
    assert_eq!(got["source"], "cli");
}

#[test]
fn test_config_rejects_bad_values() {
    let env = TestEnv::init();

    env.wbs()
        .args(["config", "set", "max-cascade-depth", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config error"));

    env.wbs()
        .args(["config", "set", "colour", "blue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config key"));

    env.wbs()
        .args(["config", "get", "colour"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config key"));
}

#[test]
fn test_session_config_requires_init() {
    let env = TestEnv::new();
    env.wbs()
        .args(["config", "set", "action-log", "false"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not initialized"));
}

#[test]
fn test_output_format_config_switches_to_human() {
    let env = TestEnv::init();
    env.json(&["config", "set", "output-format", "human"]);

    env.wbs()
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No projects."));
}

#[test]
fn test_action_log_records_commands() {
    let env = TestEnv::init();
    env.project("Tower A", &[]);
    env.wbs().args(["node", "show", "wbs-zzzz"]).assert().failure();

    let log = std::fs::read_to_string(storage_path(&env).join("action.log")).unwrap();
    let entries: Vec<serde_json::Value> = log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    let create = entries
        .iter()
        .find(|e| e["command"] == "project create")
        .unwrap();
    assert_eq!(create["success"], true);
    assert_eq!(create["actor"], "site-engineer");

    let show = entries.iter().find(|e| e["command"] == "node show").unwrap();
    assert_eq!(show["success"], false);
    assert!(show["error"].as_str().unwrap().contains("wbs-zzzz"));
}

#[test]
fn test_action_log_can_be_disabled() {
    let env = TestEnv::init();
    let log_path = storage_path(&env).join("action.log");
    env.json(&["config", "set", "action-log", "false"]);
    let before = std::fs::read_to_string(&log_path).unwrap_or_default();

    env.project("Tower A", &[]);

    let after = std::fs::read_to_string(&log_path).unwrap_or_default();
    assert_eq!(before, after);
}
