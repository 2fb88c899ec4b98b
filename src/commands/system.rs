//! `wbs system` commands.

use std::path::Path;

use serde::Serialize;

use super::{Output, Session, to_json_string};
use crate::Result;
use crate::storage::{DocumentStore, Storage, TaskFilter, WbsFilter, get_storage_dir};

#[derive(Serialize)]
pub struct InitResult {
    pub initialized: bool,
    pub storage_path: String,
}

impl Output for InitResult {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        if self.initialized {
            format!("Initialized trestle storage at {}", self.storage_path)
        } else {
            format!("Already initialized at {}", self.storage_path)
        }
    }
}

/// Create storage for the repository. Re-running on initialized storage is a no-op.
pub fn system_init(repo_path: &Path) -> Result<InitResult> {
    let already = Storage::exists(repo_path)?;
    let storage = if already {
        Storage::open(repo_path)?
    } else {
        Storage::init(repo_path)?
    };

    Ok(InitResult {
        initialized: !already,
        storage_path: storage.root().display().to_string(),
    })
}

#[derive(Serialize)]
pub struct DocumentCounts {
    pub projects: usize,
    pub wbs_nodes: usize,
    pub tasks: usize,
}

#[derive(Serialize)]
pub struct InfoResult {
    pub version: String,
    pub build_timestamp: String,
    pub git_commit: String,
    pub storage_path: String,
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<DocumentCounts>,
}

impl Output for InfoResult {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("trestle {} ({})", self.version, self.git_commit),
            format!("Built: {}", self.build_timestamp),
            format!("Storage: {}", self.storage_path),
        ];
        match self.documents {
            Some(ref counts) => lines.push(format!(
                "Documents: {} projects, {} WBS nodes, {} tasks",
                counts.projects, counts.wbs_nodes, counts.tasks
            )),
            None => lines.push("Not initialized: run `wbs system init` first".to_string()),
        }
        lines.join("\n")
    }
}

pub fn system_info(repo_path: &Path) -> Result<InfoResult> {
    let storage_path = get_storage_dir(repo_path)?;
    let initialized = Storage::exists(repo_path)?;

    let documents = if initialized {
        let storage = Storage::open(repo_path)?;
        Some(DocumentCounts {
            projects: storage.list_projects()?.len(),
            wbs_nodes: storage.list_wbs(&WbsFilter::default())?.len(),
            tasks: storage.list_tasks(&TaskFilter::default())?.len(),
        })
    } else {
        None
    };

    Ok(InfoResult {
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_timestamp: env!("TRESTLE_BUILD_TIMESTAMP").to_string(),
        git_commit: env!("TRESTLE_GIT_COMMIT").to_string(),
        storage_path: storage_path.display().to_string(),
        initialized,
        documents,
    })
}

#[derive(Serialize)]
pub struct RebuildResult {
    pub documents: usize,
}

impl Output for RebuildResult {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        format!("Rebuilt cache: {} documents indexed", self.documents)
    }
}

pub fn system_rebuild(session: &mut Session) -> Result<RebuildResult> {
    let documents = session.engine.store_mut().rebuild_cache()?;
    tracing::info!(documents, "rebuilt cache");
    Ok(RebuildResult { documents })
}
