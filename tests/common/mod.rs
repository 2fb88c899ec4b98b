//! Common test utilities for trestle integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't touch
//! the user's `~/.local/share/trestle/` or `~/.config/trestle/` directories.

#![allow(dead_code)]

use assert_cmd::Command;
use serde_json::Value;
pub use tempfile::TempDir;

/// A test environment with isolated data and config storage.
///
/// The `wbs()` method returns a `Command` that sets `TRESTLE_DATA_DIR` and
/// `TRESTLE_CONFIG_DIR` per invocation, making tests parallel-safe.
pub struct TestEnv {
    pub repo_dir: TempDir,
    pub data_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            repo_dir: TempDir::new().unwrap(),
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Create a new test environment and run `wbs system init`.
    pub fn init() -> Self {
        let env = Self::new();
        env.wbs().args(["system", "init"]).assert().success();
        env
    }

    /// Get a Command for the wbs binary with isolated directories.
    pub fn wbs(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_wbs"));
        cmd.current_dir(self.repo_dir.path());
        cmd.env("TRESTLE_DATA_DIR", self.data_dir.path());
        cmd.env("TRESTLE_CONFIG_DIR", self.config_dir.path());
        cmd.env("TRESTLE_ACTOR", "site-engineer");
        cmd.env_remove("TRESTLE_REPO");
        cmd.env_remove("TRESTLE_MAX_CASCADE_DEPTH");
        cmd.env_remove("TRESTLE_LOG");
        cmd
    }

    /// Run a command that must succeed and parse its JSON stdout.
    pub fn json(&self, args: &[&str]) -> Value {
        let output = self.wbs().args(args).assert().success().get_output().clone();
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// Create a project and return its id.
    pub fn project(&self, name: &str, extra: &[&str]) -> String {
        let mut args = vec!["project", "create", name];
        args.extend_from_slice(extra);
        id_of(&self.json(&args))
    }

    /// Create a WBS node and return its id.
    pub fn node(&self, name: &str, extra: &[&str]) -> String {
        let mut args = vec!["node", "create", name];
        args.extend_from_slice(extra);
        id_of(&self.json(&args))
    }

    /// Create a task and return its id.
    pub fn task(&self, subject: &str, extra: &[&str]) -> String {
        let mut args = vec!["task", "create", subject];
        args.extend_from_slice(extra);
        id_of(&self.json(&args))
    }

    pub fn path(&self) -> &std::path::Path {
        self.repo_dir.path()
    }

    pub fn data_path(&self) -> &std::path::Path {
        self.data_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}
