//! Action log for `wbs` commands.
//!
//! Every CLI invocation against an initialized repository appends one JSONL
//! record to `<storage-dir>/action.log`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::Result;

pub const ACTION_LOG_FILE: &str = "action.log";

/// Represents a single action log entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionLog {
    pub timestamp: DateTime<Utc>,

    /// Repository the command ran against
    pub repo_path: String,

    /// Command name (e.g., "node create", "task depend")
    pub command: String,

    /// Command arguments as JSON
    pub args: serde_json::Value,

    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub duration_ms: u64,

    /// Actor the command ran as
    pub actor: String,
}

pub fn log_path(storage_root: &Path) -> PathBuf {
    storage_root.join(ACTION_LOG_FILE)
}

/// Append an entry to the action log.
///
/// Write failures are logged and swallowed so a full disk never fails a
/// command that already succeeded.
pub fn log_action(storage_root: &Path, mut entry: ActionLog) {
    entry.args = sanitize_args(&entry.args);
    let path = log_path(storage_root);
    if let Err(e) = write_log_entry(&path, &entry) {
        tracing::warn!(path = %path.display(), error = %e, "failed to write action log");
    }
}

fn write_log_entry(path: &Path, entry: &ActionLog) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string(entry)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", json)?;
    Ok(())
}

/// Read every entry in the log, skipping lines that fail to parse.
pub fn read_entries(storage_root: &Path) -> Result<Vec<ActionLog>> {
    let path = log_path(storage_root);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}

/// Shorten long strings and large arrays so the log stays readable.
fn sanitize_args(args: &serde_json::Value) -> serde_json::Value {
    match args {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_args(v)))
                .collect(),
        ),
        serde_json::Value::Array(arr) => {
            if arr.len() > 10 {
                serde_json::Value::String(format!("[Array with {} items]", arr.len()))
            } else {
                serde_json::Value::Array(arr.iter().map(sanitize_args).collect())
            }
        }
        serde_json::Value::String(s) => {
            let len = s.chars().count();
            if len > 100 {
                let head: String = s.chars().take(97).collect();
                serde_json::Value::String(format!("{}... ({} chars)", head, len))
            } else {
                serde_json::Value::String(s.clone())
            }
        }
        other => other.clone(),
    }
}

/// Actor name from the environment, falling back to "unknown".
pub fn get_current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry(command: &str, args: serde_json::Value) -> ActionLog {
        ActionLog {
            timestamp: Utc::now(),
            repo_path: "/tmp/site".to_string(),
            command: command.to_string(),
            args,
            success: true,
            error: None,
            duration_ms: 3,
            actor: "site-engineer".to_string(),
        }
    }

    #[test]
    fn test_log_action_appends_lines() {
        let dir = TempDir::new().unwrap();
        log_action(dir.path(), entry("node create", json!({"name": "Piling"})));
        log_action(dir.path(), entry("node show", json!({"id": "wbs-ab12"})));

        let entries = read_entries(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].command, "node create");
        assert_eq!(entries[1].actor, "site-engineer");
    }

    #[test]
    fn test_read_entries_without_log() {
        let dir = TempDir::new().unwrap();
        assert!(read_entries(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_sanitize_truncates_long_strings() {
        let long = "x".repeat(150);
        let sanitized = sanitize_args(&json!({ "description": long }));
        let text = sanitized["description"].as_str().unwrap();
        assert!(text.ends_with("(150 chars)"));
        assert!(text.starts_with(&"x".repeat(97)));
    }

    #[test]
    fn test_sanitize_summarizes_large_arrays() {
        let sanitized = sanitize_args(&json!({ "ids": (0..12).collect::<Vec<_>>() }));
        assert_eq!(sanitized["ids"], json!("[Array with 12 items]"));
    }

    #[test]
    fn test_sanitize_keeps_unicode_boundaries() {
        let s = "é".repeat(120);
        let sanitized = sanitize_args(&json!(s));
        assert!(sanitized.as_str().unwrap().contains("(120 chars)"));
    }
}
