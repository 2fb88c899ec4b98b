//! Storage layer for Trestle documents.
//!
//! This module handles persistence of projects, WBS nodes, and tasks.
//!
//! ## Layout
//!
//! Data lives outside the repository at `~/.local/share/trestle/<repo-hash>/`
//! (or under `$TRESTLE_DATA_DIR/<repo-hash>/` when set):
//! - JSONL files for append-only data (projects.jsonl, wbs.jsonl, tasks.jsonl)
//! - SQLite for indexed queries (cache.db)
//!
//! The JSONL files are the source of truth. Every save appends the full
//! document; the latest line for an id wins, and a tombstone line removes it.
//! The SQLite cache indexes ids, filter columns, and the byte offset of each
//! document's latest line, and can be rebuilt from the JSONL files at any time.
//! A get seeks straight to the indexed line and only scans the whole log when
//! the offset is missing or no longer points at that document.

pub mod backend;
pub mod memory;

pub use backend::{DocType, DocumentStore, TaskFilter, WbsFilter};
pub use memory::MemoryStore;

use crate::models::{Project, TaskNode, WbsNode};
use crate::{Error, Result};
use backend::check_version;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Environment variable overriding the data root directory.
pub const DATA_DIR_ENV: &str = "TRESTLE_DATA_DIR";

const PROJECTS_FILE: &str = "projects.jsonl";
const WBS_FILE: &str = "wbs.jsonl";
const TASKS_FILE: &str = "tasks.jsonl";

/// Marker line that removes a document from the log.
#[derive(Debug, Serialize)]
struct Tombstone<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    entity_type: &'a str,
    deleted: bool,
    deleted_at: DateTime<Utc>,
}

/// Storage manager for a single repository.
pub struct Storage {
    /// Root directory for this repository's data
    pub root: PathBuf,
    /// SQLite connection for indexed queries
    conn: Connection,
}

impl Storage {
    /// Open existing storage for the given repository path.
    pub fn open(repo_path: &Path) -> Result<Self> {
        Self::open_at(get_storage_dir(repo_path)?)
    }

    /// Open existing storage under an explicit data directory.
    pub fn open_with_data_dir(repo_path: &Path, data_dir: &Path) -> Result<Self> {
        Self::open_at(storage_dir_in(data_dir, repo_path)?)
    }

    /// Initialize storage for a new repository.
    pub fn init(repo_path: &Path) -> Result<Self> {
        Self::init_at(get_storage_dir(repo_path)?)
    }

    /// Initialize storage under an explicit data directory.
    pub fn init_with_data_dir(repo_path: &Path, data_dir: &Path) -> Result<Self> {
        Self::init_at(storage_dir_in(data_dir, repo_path)?)
    }

    /// Check if storage exists for the given repository.
    pub fn exists(repo_path: &Path) -> Result<bool> {
        let root = get_storage_dir(repo_path)?;
        Ok(root.exists() && root.join("cache.db").exists())
    }

    fn open_at(root: PathBuf) -> Result<Self> {
        if !root.exists() {
            return Err(Error::NotInitialized);
        }

        let conn = Connection::open(root.join("cache.db"))?;
        Self::init_schema(&conn)?;

        Ok(Self { root, conn })
    }

    fn init_at(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;

        for file in [PROJECTS_FILE, WBS_FILE, TASKS_FILE] {
            let path = root.join(file);
            if !path.exists() {
                File::create(&path)?;
            }
        }

        let conn = Connection::open(root.join("cache.db"))?;
        Self::init_schema(&conn)?;
        tracing::info!(root = %root.display(), "initialized storage");

        Ok(Self { root, conn })
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS wbs_nodes (
                id TEXT PRIMARY KEY,
                project_id TEXT,
                parent_id TEXT,
                level INTEGER NOT NULL,
                is_group INTEGER NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                wbs_id TEXT,
                status TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS task_dependencies (
                task_id TEXT NOT NULL,
                depends_on TEXT NOT NULL,
                PRIMARY KEY (task_id, depends_on)
            );

            CREATE TABLE IF NOT EXISTS doc_offsets (
                file TEXT NOT NULL,
                id TEXT NOT NULL,
                byte_offset INTEGER NOT NULL,
                PRIMARY KEY (file, id)
            );

            CREATE INDEX IF NOT EXISTS idx_wbs_parent ON wbs_nodes(parent_id);
            CREATE INDEX IF NOT EXISTS idx_wbs_project ON wbs_nodes(project_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
            CREATE INDEX IF NOT EXISTS idx_tasks_wbs ON tasks(wbs_id);
            CREATE INDEX IF NOT EXISTS idx_task_deps_target ON task_dependencies(depends_on);
            "#,
        )?;
        Ok(())
    }

    /// Get the storage root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rebuild the SQLite cache from the JSONL files.
    ///
    /// Returns the number of live documents indexed.
    pub fn rebuild_cache(&mut self) -> Result<usize> {
        self.conn.execute_batch(
            "DELETE FROM projects; DELETE FROM wbs_nodes; DELETE FROM tasks; DELETE FROM task_dependencies; DELETE FROM doc_offsets;",
        )?;

        let projects: Vec<(u64, Project)> = self.replay(PROJECTS_FILE)?;
        let nodes: Vec<(u64, WbsNode)> = self.replay(WBS_FILE)?;
        let tasks: Vec<(u64, TaskNode)> = self.replay(TASKS_FILE)?;

        for (offset, project) in &projects {
            self.cache_project(project)?;
            self.cache_offset(PROJECTS_FILE, &project.id, *offset)?;
        }
        for (offset, node) in &nodes {
            self.cache_wbs(node)?;
            self.cache_offset(WBS_FILE, &node.id, *offset)?;
        }
        for (offset, task) in &tasks {
            self.cache_task(task)?;
            self.cache_offset(TASKS_FILE, &task.id, *offset)?;
        }

        let count = projects.len() + nodes.len() + tasks.len();
        tracing::info!(count, "rebuilt cache");
        Ok(count)
    }

    // === JSONL helpers ===

    /// Append a document line, returning the byte offset it starts at.
    fn append_line<T: Serialize>(&self, file: &str, doc: &T) -> Result<u64> {
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(file))?;
        let offset = handle.metadata()?.len();
        let json = serde_json::to_string(doc)?;
        writeln!(handle, "{}", json)?;
        Ok(offset)
    }

    /// Read the latest live version of a document from a JSONL file.
    fn read_latest<T: DeserializeOwned>(&self, file: &str, id: &str) -> Result<Option<T>> {
        if let Some(value) = self.read_indexed(file, id)? {
            return Ok(Some(serde_json::from_value(value)?));
        }
        self.scan_latest(file, id)
    }

    /// Read the line the offset index points at for `id`.
    ///
    /// Returns `None` when there is no offset, or when the line there is not a
    /// live version of `id`.
    fn read_indexed(&self, file: &str, id: &str) -> Result<Option<serde_json::Value>> {
        let Some(offset) = self.stored_offset(file, id)? else {
            return Ok(None);
        };

        let mut handle = File::open(self.root.join(file))?;
        handle.seek(SeekFrom::Start(offset))?;
        let mut line = String::new();
        if BufReader::new(handle).read_line(&mut line)? == 0 {
            return Ok(None);
        }

        let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
            return Ok(None);
        };
        let live = value.get("id").and_then(|v| v.as_str()) == Some(id)
            && value.get("deleted").and_then(|v| v.as_bool()) != Some(true);
        if !live {
            tracing::debug!(file, id, offset, "stale offset, scanning log");
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// Scan the whole log for the last line naming `id`.
    fn scan_latest<T: DeserializeOwned>(&self, file: &str, id: &str) -> Result<Option<T>> {
        let reader = BufReader::new(File::open(self.root.join(file))?);

        let mut latest: Option<serde_json::Value> = None;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
                continue;
            };
            if value.get("id").and_then(|v| v.as_str()) != Some(id) {
                continue;
            }
            if value.get("deleted").and_then(|v| v.as_bool()) == Some(true) {
                latest = None;
            } else {
                latest = Some(value);
            }
        }

        match latest {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Replay a JSONL file into the set of live documents, in first-seen order.
    ///
    /// Each document comes paired with the byte offset of its latest line.
    fn replay<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<(u64, T)>> {
        let mut reader = BufReader::new(File::open(self.root.join(file))?);

        let mut order: Vec<String> = Vec::new();
        let mut live: HashMap<String, (u64, serde_json::Value)> = HashMap::new();
        let mut line = String::new();
        let mut next = 0u64;
        loop {
            line.clear();
            let read = reader.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            let offset = next;
            next += read as u64;

            if line.trim().is_empty() {
                continue;
            }
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
                continue;
            };
            let Some(id) = value.get("id").and_then(|v| v.as_str()).map(str::to_string) else {
                continue;
            };
            if value.get("deleted").and_then(|v| v.as_bool()) == Some(true) {
                live.remove(&id);
                continue;
            }
            if !live.contains_key(&id) {
                order.push(id.clone());
            }
            live.insert(id, (offset, value));
        }

        let mut docs = Vec::new();
        for id in order {
            if let Some((offset, value)) = live.remove(&id) {
                docs.push((offset, serde_json::from_value(value)?));
            }
        }
        Ok(docs)
    }

    fn stored_version(&self, table: &str, id: &str) -> Result<Option<u64>> {
        let sql = format!("SELECT version FROM {} WHERE id = ?1", table);
        let version: Option<i64> = self
            .conn
            .query_row(&sql, [id], |row| row.get(0))
            .optional()?;
        Ok(version.map(|v| v as u64))
    }

    fn stored_offset(&self, file: &str, id: &str) -> Result<Option<u64>> {
        let offset: Option<i64> = self
            .conn
            .query_row(
                "SELECT byte_offset FROM doc_offsets WHERE file = ?1 AND id = ?2",
                params![file, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(offset.map(|o| o as u64))
    }

    fn query_ids(&self, sql: &str, params_vec: &[Box<dyn rusqlite::ToSql>]) -> Result<Vec<String>> {
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(sql)?;
        let ids: Vec<String> = stmt
            .query_map(params_refs.as_slice(), |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    // === Cache ===

    fn cache_offset(&self, file: &str, id: &str, offset: u64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO doc_offsets (file, id, byte_offset) VALUES (?1, ?2, ?3)",
            params![file, id, offset as i64],
        )?;
        Ok(())
    }

    fn cache_project(&self, project: &Project) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO projects (id, name, version, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                project.id,
                project.name,
                project.version as i64,
                project.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn cache_wbs(&self, node: &WbsNode) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO wbs_nodes
             (id, project_id, parent_id, level, is_group, version, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                node.id,
                node.project_id,
                node.parent_id,
                node.level,
                node.is_group,
                node.version as i64,
                node.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn cache_task(&self, task: &TaskNode) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tasks (id, project_id, wbs_id, status, version, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                task.id,
                task.project_id,
                task.wbs_id,
                task.status.as_str(),
                task.version as i64,
                task.updated_at.to_rfc3339(),
            ],
        )?;

        self.conn
            .execute("DELETE FROM task_dependencies WHERE task_id = ?1", [&task.id])?;
        for dep in &task.depends_on {
            self.conn.execute(
                "INSERT OR IGNORE INTO task_dependencies (task_id, depends_on) VALUES (?1, ?2)",
                params![task.id, dep],
            )?;
        }
        Ok(())
    }
}

impl DocumentStore for Storage {
    fn get_project(&self, id: &str) -> Result<Project> {
        self.read_latest(PROJECTS_FILE, id)?
            .ok_or_else(|| Error::NotFound(format!("Project not found: {}", id)))
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let ids = self.query_ids("SELECT id FROM projects ORDER BY id ASC", &[])?;
        let mut projects = Vec::new();
        for id in ids {
            if let Ok(project) = self.get_project(&id) {
                projects.push(project);
            }
        }
        Ok(projects)
    }

    fn save_project(&mut self, project: &Project) -> Result<Project> {
        check_version(
            &project.id,
            project.version,
            self.stored_version("projects", &project.id)?,
        )?;

        let mut saved = project.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();

        let offset = self.append_line(PROJECTS_FILE, &saved)?;
        self.cache_project(&saved)?;
        self.cache_offset(PROJECTS_FILE, &saved.id, offset)?;
        Ok(saved)
    }

    fn get_wbs(&self, id: &str) -> Result<WbsNode> {
        self.read_latest(WBS_FILE, id)?
            .ok_or_else(|| Error::NotFound(format!("WBS node not found: {}", id)))
    }

    fn list_wbs(&self, filter: &WbsFilter) -> Result<Vec<WbsNode>> {
        let mut sql = String::from("SELECT id FROM wbs_nodes WHERE 1=1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref p) = filter.project_id {
            sql.push_str(" AND project_id = ?");
            params_vec.push(Box::new(p.clone()));
        }
        if let Some(ref p) = filter.parent_id {
            sql.push_str(" AND parent_id = ?");
            params_vec.push(Box::new(p.clone()));
        }
        sql.push_str(" ORDER BY level ASC, id ASC");

        let mut nodes = Vec::new();
        for id in self.query_ids(&sql, &params_vec)? {
            if let Ok(node) = self.get_wbs(&id) {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    fn save_wbs(&mut self, node: &WbsNode) -> Result<WbsNode> {
        check_version(&node.id, node.version, self.stored_version("wbs_nodes", &node.id)?)?;

        let mut saved = node.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();

        let offset = self.append_line(WBS_FILE, &saved)?;
        self.cache_wbs(&saved)?;
        self.cache_offset(WBS_FILE, &saved.id, offset)?;
        Ok(saved)
    }

    fn delete_wbs(&mut self, id: &str) -> Result<()> {
        // Verify node exists
        self.get_wbs(id)?;

        // The log is append-only; a tombstone hides earlier versions
        self.append_line(
            WBS_FILE,
            &Tombstone {
                id,
                entity_type: "wbs",
                deleted: true,
                deleted_at: Utc::now(),
            },
        )?;
        self.conn.execute("DELETE FROM wbs_nodes WHERE id = ?", [id])?;
        self.conn.execute(
            "DELETE FROM doc_offsets WHERE file = ?1 AND id = ?2",
            params![WBS_FILE, id],
        )?;
        Ok(())
    }

    fn get_task(&self, id: &str) -> Result<TaskNode> {
        self.read_latest(TASKS_FILE, id)?
            .ok_or_else(|| Error::NotFound(format!("Task not found: {}", id)))
    }

    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskNode>> {
        let mut sql = String::from(
            "SELECT DISTINCT t.id FROM tasks t
             LEFT JOIN task_dependencies d ON t.id = d.task_id
             WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref p) = filter.project_id {
            sql.push_str(" AND t.project_id = ?");
            params_vec.push(Box::new(p.clone()));
        }
        if let Some(ref w) = filter.wbs_id {
            sql.push_str(" AND t.wbs_id = ?");
            params_vec.push(Box::new(w.clone()));
        }
        if let Some(ref d) = filter.depends_on {
            sql.push_str(" AND d.depends_on = ?");
            params_vec.push(Box::new(d.clone()));
        }
        sql.push_str(" ORDER BY t.id ASC");

        let mut tasks = Vec::new();
        for id in self.query_ids(&sql, &params_vec)? {
            if let Ok(task) = self.get_task(&id) {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    fn save_task(&mut self, task: &TaskNode) -> Result<TaskNode> {
        check_version(&task.id, task.version, self.stored_version("tasks", &task.id)?)?;

        let mut saved = task.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();

        let offset = self.append_line(TASKS_FILE, &saved)?;
        self.cache_task(&saved)?;
        self.cache_offset(TASKS_FILE, &saved.id, offset)?;
        Ok(saved)
    }
}

/// Root directory under which all repositories' data lives.
///
/// `$TRESTLE_DATA_DIR` wins over the platform data directory.
pub fn data_root() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let data_dir = dirs::data_dir()
        .ok_or_else(|| Error::Other("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("trestle"))
}

/// Get the storage directory for a repository.
///
/// Uses a hash of the repository path to create a unique directory under
/// [`data_root`].
pub fn get_storage_dir(repo_path: &Path) -> Result<PathBuf> {
    storage_dir_in(&data_root()?, repo_path)
}

/// Find the nearest ancestor of `start` (inclusive) containing a `.git` entry.
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

fn storage_dir_in(data_dir: &Path, repo_path: &Path) -> Result<PathBuf> {
    let repo_canonical = repo_path
        .canonicalize()
        .map_err(|e| Error::Other(format!("Could not canonicalize repo path: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(repo_canonical.to_string_lossy().as_bytes());
    let hash_hex = format!("{:x}", hasher.finalize());

    Ok(data_dir.join(&hash_hex[..12]))
}

/// Generate a unique ID for a document.
///
/// Format: `<prefix>-<4 hex chars>`, e.g. `wbs-3f9a`.
pub fn generate_id(prefix: &str, seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(
        Utc::now()
            .timestamp_nanos_opt()
            .unwrap_or(0)
            .to_le_bytes(),
    );
    let hash_hex = format!("{:x}", hasher.finalize());
    format!("{}-{}", prefix, &hash_hex[..4])
}

/// Validate that an ID matches the expected format.
pub fn validate_id(id: &str, prefix: &str) -> Result<()> {
    if !id.starts_with(&format!("{}-", prefix)) {
        return Err(Error::InvalidId(format!(
            "ID must start with '{}-', got: {}",
            prefix, id
        )));
    }

    let suffix = &id[prefix.len() + 1..];
    if suffix.is_empty()
        || !suffix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidId(format!(
            "ID suffix must be non-empty and alphanumeric, got: {}",
            suffix
        )));
    }

    Ok(())
}
