//! In-memory document store.

use std::collections::BTreeMap;

use chrono::Utc;

use super::backend::{DocumentStore, TaskFilter, WbsFilter, check_version};
use crate::models::{Project, TaskNode, WbsNode};
use crate::{Error, Result};

/// Document store backed by ordered maps. Nothing is persisted.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    projects: BTreeMap<String, Project>,
    wbs: BTreeMap<String, WbsNode>,
    tasks: BTreeMap<String, TaskNode>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn get_project(&self, id: &str) -> Result<Project> {
        self.projects
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Project not found: {}", id)))
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        Ok(self.projects.values().cloned().collect())
    }

    fn save_project(&mut self, project: &Project) -> Result<Project> {
        let stored = self.projects.get(&project.id).map(|p| p.version);
        check_version(&project.id, project.version, stored)?;

        let mut saved = project.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();
        self.projects.insert(saved.id.clone(), saved.clone());
        Ok(saved)
    }

    fn get_wbs(&self, id: &str) -> Result<WbsNode> {
        self.wbs
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("WBS node not found: {}", id)))
    }

    fn list_wbs(&self, filter: &WbsFilter) -> Result<Vec<WbsNode>> {
        Ok(self
            .wbs
            .values()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect())
    }

    fn save_wbs(&mut self, node: &WbsNode) -> Result<WbsNode> {
        let stored = self.wbs.get(&node.id).map(|n| n.version);
        check_version(&node.id, node.version, stored)?;

        let mut saved = node.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();
        self.wbs.insert(saved.id.clone(), saved.clone());
        Ok(saved)
    }

    fn delete_wbs(&mut self, id: &str) -> Result<()> {
        self.wbs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("WBS node not found: {}", id)))
    }

    fn get_task(&self, id: &str) -> Result<TaskNode> {
        self.tasks
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Task not found: {}", id)))
    }

    fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<TaskNode>> {
        Ok(self
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    fn save_task(&mut self, task: &TaskNode) -> Result<TaskNode> {
        let stored = self.tasks.get(&task.id).map(|t| t.version);
        check_version(&task.id, task.version, stored)?;

        let mut saved = task.clone();
        saved.version += 1;
        saved.updated_at = Utc::now();
        self.tasks.insert(saved.id.clone(), saved.clone());
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_assigns_version() {
        let mut store = MemoryStore::new();
        let node = WbsNode::new("wbs-0001".to_string(), "Site works".to_string());

        let saved = store.save_wbs(&node).unwrap();
        assert_eq!(saved.version, 1);

        let again = store.save_wbs(&saved).unwrap();
        assert_eq!(again.version, 2);
    }

    #[test]
    fn test_stale_save_is_rejected() {
        let mut store = MemoryStore::new();
        let node = WbsNode::new("wbs-0001".to_string(), "Site works".to_string());
        let first = store.save_wbs(&node).unwrap();
        store.save_wbs(&first).unwrap();

        // `first` still carries version 1 while the store holds version 2
        let err = store.save_wbs(&first).unwrap_err();
        assert!(matches!(err, Error::Conflict { expected: 1, found: 2, .. }));
    }

    #[test]
    fn test_list_wbs_children() {
        let mut store = MemoryStore::new();
        let root = WbsNode::new("wbs-root".to_string(), "Root".to_string());
        let mut child = WbsNode::new("wbs-child".to_string(), "Child".to_string());
        child.parent_id = Some("wbs-root".to_string());
        store.save_wbs(&root).unwrap();
        store.save_wbs(&child).unwrap();

        let children = store.list_wbs(&WbsFilter::children_of("wbs-root")).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "wbs-child");
        assert!(store.exists_wbs(&WbsFilter::children_of("wbs-root")).unwrap());
        assert!(!store.exists_wbs(&WbsFilter::children_of("wbs-child")).unwrap());
    }

    #[test]
    fn test_delete_missing_wbs() {
        let mut store = MemoryStore::new();
        assert!(matches!(store.delete_wbs("wbs-none"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_find_wbs_maps_not_found() {
        let store = MemoryStore::new();
        assert!(store.find_wbs("wbs-none").unwrap().is_none());
    }
}
