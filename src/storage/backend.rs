//! Document store contract consumed by the engines.
//!
//! The engines never touch files or SQL directly. They go through
//! [`DocumentStore`], a typed rendition of `get` / `list` / `save` / `exists`
//! for each document type. Two implementations ship with the crate:
//! - [`crate::storage::MemoryStore`] - in-process maps
//! - [`crate::storage::Storage`] - JSONL files plus a SQLite index

use crate::models::{Project, TaskNode, WbsNode};
use crate::{Error, Result};

/// Document types held by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocType {
    Project,
    Wbs,
    Task,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Wbs => "wbs",
            Self::Task => "task",
        }
    }

    /// ID prefix for generated identifiers.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Project => "prj",
            Self::Wbs => "wbs",
            Self::Task => "tsk",
        }
    }
}

impl std::fmt::Display for DocType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filter for WBS node listings. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct WbsFilter {
    pub project_id: Option<String>,
    pub parent_id: Option<String>,
}

impl WbsFilter {
    /// Direct children of a node.
    pub fn children_of(parent_id: &str) -> Self {
        Self {
            parent_id: Some(parent_id.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, node: &WbsNode) -> bool {
        if let Some(ref p) = self.project_id {
            if node.project_id.as_deref() != Some(p.as_str()) {
                return false;
            }
        }
        if let Some(ref p) = self.parent_id {
            if node.parent_id.as_deref() != Some(p.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Filter for task listings. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<String>,
    pub wbs_id: Option<String>,
    /// Tasks whose dependency set contains this exact id
    pub depends_on: Option<String>,
}

impl TaskFilter {
    /// Tasks of a project linked to a WBS node.
    pub fn linked_to(project_id: &str, wbs_id: &str) -> Self {
        Self {
            project_id: Some(project_id.to_string()),
            wbs_id: Some(wbs_id.to_string()),
            ..Default::default()
        }
    }

    /// Tasks of a project that depend on `task_id`.
    pub fn dependents_of(project_id: &str, task_id: &str) -> Self {
        Self {
            project_id: Some(project_id.to_string()),
            depends_on: Some(task_id.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, task: &TaskNode) -> bool {
        if let Some(ref p) = self.project_id {
            if &task.project_id != p {
                return false;
            }
        }
        if let Some(ref w) = self.wbs_id {
            if task.wbs_id.as_deref() != Some(w.as_str()) {
                return false;
            }
        }
        if let Some(ref d) = self.depends_on {
            if !task.depends_on.contains(d) {
                return false;
            }
        }
        true
    }
}

/// Typed document store.
///
/// `save_*` persists the document and returns it with store-assigned fields
/// populated. Saves are optimistic: the incoming `version` must equal the
/// stored one (0 for a new document) and the stored copy gets `version + 1`.
pub trait DocumentStore {
    fn get_project(&self, id: &str) -> Result<Project>;
    fn list_projects(&self) -> Result<Vec<Project>>;
    fn save_project(&mut self, project: &Project) -> Result<Project>;

    fn get_wbs(&self, id: &str) -> Result<WbsNode>;
    fn list_wbs(&self, filter: &WbsFilter) -> Result<Vec<WbsNode>>;
    fn save_wbs(&mut self, node: &WbsNode) -> Result<WbsNode>;
    fn delete_wbs(&mut self, id: &str) -> Result<()>;

    fn get_task(&self, id: &str) -> Result<TaskNode>;
    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskNode>>;
    fn save_task(&mut self, task: &TaskNode) -> Result<TaskNode>;

    fn exists_wbs(&self, filter: &WbsFilter) -> Result<bool> {
        Ok(!self.list_wbs(filter)?.is_empty())
    }

    fn exists_task(&self, filter: &TaskFilter) -> Result<bool> {
        Ok(!self.list_tasks(filter)?.is_empty())
    }

    /// Look up a WBS node, mapping "not found" to `None`.
    fn find_wbs(&self, id: &str) -> Result<Option<WbsNode>> {
        match self.get_wbs(id) {
            Ok(node) => Ok(Some(node)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Look up a project, mapping "not found" to `None`.
    fn find_project(&self, id: &str) -> Result<Option<Project>> {
        match self.get_project(id) {
            Ok(project) => Ok(Some(project)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Compare an incoming version with the stored one.
pub fn check_version(id: &str, incoming: u64, stored: Option<u64>) -> Result<()> {
    let found = stored.unwrap_or(0);
    if incoming != found {
        return Err(Error::Conflict {
            id: id.to_string(),
            expected: incoming,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_filter_uses_exact_membership() {
        let mut task = TaskNode::new("tsk-0010".to_string(), "Pour".to_string(), "prj-1".to_string());
        task.depends_on.insert("T10".to_string());

        assert!(TaskFilter::dependents_of("prj-1", "T10").matches(&task));
        assert!(!TaskFilter::dependents_of("prj-1", "T1").matches(&task));
        assert!(!TaskFilter::dependents_of("prj-2", "T10").matches(&task));
    }

    #[test]
    fn test_wbs_filter_children_of() {
        let mut node = WbsNode::new("wbs-0002".to_string(), "Child".to_string());
        node.parent_id = Some("wbs-0001".to_string());

        assert!(WbsFilter::children_of("wbs-0001").matches(&node));
        assert!(!WbsFilter::children_of("wbs-0003").matches(&node));
        assert!(WbsFilter::default().matches(&node));
    }

    #[test]
    fn test_check_version() {
        assert!(check_version("wbs-1", 0, None).is_ok());
        assert!(check_version("wbs-1", 2, Some(2)).is_ok());
        assert!(matches!(
            check_version("wbs-1", 1, Some(2)),
            Err(Error::Conflict { expected: 1, found: 2, .. })
        ));
        assert!(matches!(
            check_version("wbs-1", 3, None),
            Err(Error::Conflict { found: 0, .. })
        ));
    }

    #[test]
    fn test_doc_type_prefixes() {
        assert_eq!(DocType::Wbs.id_prefix(), "wbs");
        assert_eq!(DocType::Task.id_prefix(), "tsk");
        assert_eq!(DocType::Project.to_string(), "project");
    }
}
