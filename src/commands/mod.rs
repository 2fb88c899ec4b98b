//! Command implementations for the `wbs` CLI.
//!
//! Commands are organized by entity type:
//! - `system` - Initialize storage and report build info
//! - `project` - Project CRUD
//! - `node` - WBS node CRUD, tree export, resource lines
//! - `task` - Task CRUD and dependency management
//! - `config` - Read and write config.kdl

pub mod config;
pub mod node;
pub mod project;
pub mod system;
pub mod task;

use std::path::Path;

use serde::Serialize;

use crate::Result;
use crate::config::{ConfigOverrides, ResolvedConfig, resolve_config};
use crate::engine::{Context, Engine};
use crate::models::Advisory;
use crate::storage::Storage;

pub use config::{config_get, config_list, config_set};
pub use node::{
    node_child, node_create, node_delete, node_list, node_resource, node_show, node_tree,
    node_update,
};
pub use project::{project_create, project_list, project_show};
pub use system::{system_info, system_init, system_rebuild};
pub use task::{
    task_create, task_depend, task_from_wbs, task_list, task_show, task_undepend, task_update,
};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

/// An opened repository: engine over its storage, resolved config, and the caller's context.
pub struct Session {
    pub engine: Engine<Storage>,
    pub config: ResolvedConfig,
    pub ctx: Context,
}

impl Session {
    /// Open initialized storage for `repo_path` and resolve its config.
    pub fn open(repo_path: &Path, overrides: &ConfigOverrides, actor: &str) -> Result<Self> {
        let storage = Storage::open(repo_path)?;
        let config = resolve_config(Some(storage.root()), overrides)?;
        Ok(Self::with_storage(storage, config, Context::new(actor)))
    }

    pub fn with_storage(storage: Storage, config: ResolvedConfig, ctx: Context) -> Self {
        let engine = Engine::with_settings(storage, config.engine_settings());
        Self {
            engine,
            config,
            ctx,
        }
    }

    pub fn storage(&self) -> &Storage {
        self.engine.store()
    }
}

/// Serialize to a JSON string, reporting serializer failures as an error object.
pub(crate) fn to_json_string<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
}

/// Append advisory lines to human output.
pub(crate) fn push_advisories(lines: &mut Vec<String>, advisories: &[Advisory]) {
    if advisories.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push("Advisories:".to_string());
    for advisory in advisories {
        lines.push(format!("  ! {}", advisory));
    }
}

pub(crate) fn fmt_date(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}

pub(crate) fn fmt_money(value: f64) -> String {
    format!("{:.2}", value)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::test_utils::TestEnv;
    use chrono::NaiveDate;

    /// Session over freshly initialized storage, dated 2026-03-15.
    pub fn session(env: &TestEnv) -> Session {
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        Session::with_storage(
            env.init_storage(),
            ResolvedConfig::default(),
            Context::on("site-engineer", today),
        )
    }
}
