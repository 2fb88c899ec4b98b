//! WBS engine: hierarchy validation, roll-ups, and the parent cascade.
//!
//! A save runs `validate dates -> validate hierarchy -> duration -> progress
//! -> costs -> project alignment`, persists the node, auto-creates a linked
//! task when asked to, and then re-saves each ancestor through the same
//! pipeline so roll-ups stay current up the tree.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;

use super::task::{calculate_resource_cost, calculate_task_duration, update_task_progress};
use super::{Context, Engine, Saved, advise, inclusive_days, validate_dates, validate_progress};
use crate::models::graph::{ParentChain, format_path, walk_parent_chain};
use crate::models::{Advisory, ProgressMode, TaskNode, TaskStatus, WbsNode};
use crate::storage::{DocType, DocumentStore, TaskFilter, WbsFilter};
use crate::{Error, Result};

/// Nested export of a WBS subtree, shaped for gantt rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WbsTree {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
    pub progress: f64,
    pub is_group: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<WbsTree>,
}

/// Set the inclusive duration when both dates are known; otherwise leave it alone.
pub fn calculate_duration(node: &mut WbsNode) {
    if let Some(days) = inclusive_days(node.start_date, node.end_date) {
        node.duration_days = Some(days);
    }
}

/// Roll progress up from direct children (groups) or linked tasks (leaves).
///
/// A group without children keeps its current progress. A leaf in
/// [`ProgressMode::DerivedFromTasks`] takes the plain mean of `linked_tasks`
/// whenever there are any.
pub fn update_progress(node: &mut WbsNode, children: &[WbsNode], linked_tasks: &[TaskNode]) {
    if node.is_group {
        if children.is_empty() {
            return;
        }
        let total_weight: f64 = children.iter().map(WbsNode::effective_weight).sum();
        let weighted: f64 = children
            .iter()
            .map(|c| c.progress * c.effective_weight())
            .sum();
        node.progress = if total_weight != 0.0 {
            weighted / total_weight
        } else {
            0.0
        };
        return;
    }

    if node.progress_mode == ProgressMode::DerivedFromTasks
        && node.project_id.is_some()
        && !linked_tasks.is_empty()
    {
        let total: f64 = linked_tasks.iter().map(|t| t.progress).sum();
        node.progress = total / linked_tasks.len() as f64;
    }
}

/// Roll costs up from children (groups) or resource lines (leaves), then derive variance.
pub fn calculate_costs(node: &mut WbsNode, children: &[WbsNode]) {
    if node.is_group {
        node.estimated_cost = children.iter().map(|c| c.estimated_cost).sum();
        node.actual_cost = children.iter().map(|c| c.actual_cost).sum();
    } else if !node.resources.is_empty() {
        node.estimated_cost = node.resources.iter().map(|r| r.estimated_cost).sum();
        node.actual_cost = node.resources.iter().map(|r| r.actual_cost).sum();
    }

    if node.estimated_cost != 0.0 {
        let variance = node.actual_cost - node.estimated_cost;
        node.cost_variance = Some(variance);
        node.cost_variance_percent = Some(variance / node.estimated_cost * 100.0);
    } else {
        node.cost_variance = None;
        node.cost_variance_percent = None;
    }
}

/// Next dotted code under `parent_code` given the current child count.
pub fn child_code(parent_code: &str, existing_children: usize) -> String {
    format!("{}.{}", parent_code, existing_children + 1)
}

fn validate_inputs(node: &WbsNode) -> Result<()> {
    validate_progress(&node.id, node.progress)?;
    if let Some(weight) = node.weight {
        if weight < 0.0 || !weight.is_finite() {
            return Err(Error::InvalidInput(format!(
                "Weight of {} must be a non-negative number, got {}",
                node.id, weight
            )));
        }
    }
    Ok(())
}

impl<S: DocumentStore> Engine<S> {
    /// Check the parent exists, sits at a lower level, and is not a descendant.
    pub fn validate_hierarchy(&self, node: &WbsNode) -> Result<()> {
        let Some(ref parent_id) = node.parent_id else {
            return Ok(());
        };

        let parent = self
            .store
            .find_wbs(parent_id)?
            .ok_or_else(|| Error::InvalidParent(parent_id.clone()))?;

        if parent.level >= node.level {
            return Err(Error::InvalidHierarchy {
                node: node.id.clone(),
                parent: parent.id,
                parent_level: parent.level,
                level: node.level,
            });
        }

        self.check_circular_reference(node)
    }

    /// Walk the `parent_id` chain and fail if it loops.
    pub fn check_circular_reference(&self, node: &WbsNode) -> Result<()> {
        let chain = walk_parent_chain(&node.id, node.parent_id.as_deref(), |id| {
            Ok::<_, Error>(self.store.find_wbs(id)?.and_then(|n| n.parent_id))
        })?;

        match chain {
            ParentChain::Acyclic(_) => Ok(()),
            ParentChain::Cycle(ids) => {
                let mut path = vec![node.id.clone()];
                path.extend(ids);
                Err(Error::CircularReference(format_path(&path)))
            }
        }
    }

    /// Run validation and every derived-field step on `node` without saving it.
    pub fn recompute_wbs(&self, node: &mut WbsNode, advisories: &mut Vec<Advisory>) -> Result<()> {
        validate_dates(node.start_date, node.end_date)?;
        validate_inputs(node)?;
        self.validate_hierarchy(node)?;

        calculate_duration(node);

        let children = if node.is_group {
            self.store.list_wbs(&WbsFilter::children_of(&node.id))?
        } else {
            Vec::new()
        };
        let linked_tasks = match (&node.project_id, node.is_group) {
            (Some(project_id), false) => self
                .store
                .list_tasks(&TaskFilter::linked_to(project_id, &node.id))?,
            _ => Vec::new(),
        };

        update_progress(node, &children, &linked_tasks);
        calculate_costs(node, &children);
        tracing::debug!(
            node = %node.id,
            children = children.len(),
            tasks = linked_tasks.len(),
            progress = node.progress,
            "recomputed wbs node"
        );

        if let Some(ref project_id) = node.project_id {
            self.check_alignment(&node.id, project_id, node.start_date, node.end_date, advisories)?;
        }
        Ok(())
    }

    /// Validate, derive, and persist a WBS node, then cascade to its ancestors.
    pub fn save_wbs(&mut self, mut node: WbsNode, ctx: &Context) -> Result<Saved<WbsNode>> {
        let mut advisories = Vec::new();

        if node.version == 0 && node.prepared_by.is_none() {
            node.prepared_by = Some(ctx.actor.clone());
        }

        let previous_parent = self.store.find_wbs(&node.id)?.and_then(|n| n.parent_id);

        let saved = self.commit_wbs(node, ctx, &mut advisories)?;
        self.propagate_to_parent(&saved, ctx, &mut advisories)?;

        // A moved node leaves stale totals on its old ancestors
        if previous_parent.is_some() && previous_parent != saved.parent_id {
            tracing::debug!(node = %saved.id, "re-parented, refreshing previous ancestors");
            self.cascade_from(previous_parent, ctx, &mut advisories)?;
        }

        Ok(Saved {
            doc: saved,
            advisories,
        })
    }

    fn commit_wbs(
        &mut self,
        mut node: WbsNode,
        ctx: &Context,
        advisories: &mut Vec<Advisory>,
    ) -> Result<WbsNode> {
        self.recompute_wbs(&mut node, advisories)?;
        node.updated_by = Some(ctx.actor.clone());

        let saved = self.store.save_wbs(&node)?;
        tracing::info!(node = %saved.id, version = saved.version, actor = %ctx.actor, "saved wbs node");

        self.create_project_tasks(&saved, ctx, advisories)?;
        Ok(saved)
    }

    /// Re-save each ancestor of `node`, nearest first, up to the cascade bound.
    ///
    /// Returns the number of ancestors saved.
    pub fn propagate_to_parent(
        &mut self,
        node: &WbsNode,
        ctx: &Context,
        advisories: &mut Vec<Advisory>,
    ) -> Result<usize> {
        self.cascade_from(node.parent_id.clone(), ctx, advisories)
    }

    fn cascade_from(
        &mut self,
        mut next: Option<String>,
        ctx: &Context,
        advisories: &mut Vec<Advisory>,
    ) -> Result<usize> {
        let max_depth = self.settings.max_cascade_depth;
        let mut depth = 0;

        while let Some(parent_id) = next {
            if depth >= max_depth {
                advise(
                    advisories,
                    Advisory::CascadeTruncated {
                        stopped_at: parent_id,
                        max_depth,
                    },
                );
                break;
            }

            let Some(parent) = self.store.find_wbs(&parent_id)? else {
                tracing::debug!(parent = %parent_id, "cascade reached a missing ancestor");
                break;
            };

            let saved = self.commit_wbs(parent, ctx, advisories)?;
            depth += 1;
            next = saved.parent_id;
        }

        if depth > 0 {
            tracing::info!(depth, "cascaded roll-up to ancestors");
        }
        Ok(depth)
    }

    /// Create the linked task for a leaf that asks for one, unless it already exists.
    fn create_project_tasks(
        &mut self,
        node: &WbsNode,
        ctx: &Context,
        advisories: &mut Vec<Advisory>,
    ) -> Result<()> {
        let Some(ref project_id) = node.project_id else {
            return Ok(());
        };
        if node.is_group || !node.create_tasks {
            return Ok(());
        }
        if self
            .store
            .exists_task(&TaskFilter::linked_to(project_id, &node.id))?
        {
            return Ok(());
        }

        let mut task = self.create_task_from_wbs(&node.id)?;
        update_task_progress(&mut task, ctx.today);
        calculate_task_duration(&mut task);
        calculate_resource_cost(&mut task);
        task.prepared_by = Some(ctx.actor.clone());
        task.updated_by = Some(ctx.actor.clone());

        let saved = self.store.save_task(&task)?;
        self.refresh_project_progress(project_id)?;
        advise(
            advisories,
            Advisory::TaskCreated {
                task_id: saved.id,
                wbs_id: node.id.clone(),
            },
        );
        Ok(())
    }

    /// Build an unsaved child of `parent_id` with linkage and outline code filled in.
    pub fn create_child_wbs(&self, parent_id: &str, name: &str) -> Result<WbsNode> {
        let parent = self.store.get_wbs(parent_id)?;
        let id = self.fresh_id(DocType::Wbs, name)?;

        let mut child = WbsNode::new(id, name.to_string());
        child.project_id = parent.project_id.clone();
        child.parent_id = Some(parent.id.clone());
        child.level = parent.level + 1;
        child.progress_mode = parent.progress_mode;

        if let Some(ref code) = parent.code {
            let existing = self.store.list_wbs(&WbsFilter::children_of(parent_id))?.len();
            child.code = Some(child_code(code, existing));
        }

        Ok(child)
    }

    /// Build an unsaved task mapped from a WBS node.
    pub fn create_task_from_wbs(&self, wbs_id: &str) -> Result<TaskNode> {
        let node = self.store.get_wbs(wbs_id)?;
        let project_id = node.project_id.clone().ok_or_else(|| {
            Error::InvalidInput(format!("WBS node {} has no project", wbs_id))
        })?;
        let id = self.fresh_id(DocType::Task, &node.name)?;

        let mut task = TaskNode::new(id, node.name.clone(), project_id);
        task.wbs_id = Some(node.id.clone());
        task.description = node.description.clone();
        task.start_date = node.start_date;
        task.end_date = node.end_date;
        task.status = TaskStatus::NotStarted;
        Ok(task)
    }

    /// Direct children of a node.
    pub fn wbs_children(&self, id: &str) -> Result<Vec<WbsNode>> {
        self.store.list_wbs(&WbsFilter::children_of(id))
    }

    /// Tasks linked to a node within its project.
    pub fn wbs_tasks(&self, node: &WbsNode) -> Result<Vec<TaskNode>> {
        match node.project_id {
            Some(ref project_id) => self
                .store
                .list_tasks(&TaskFilter::linked_to(project_id, &node.id)),
            None => Ok(Vec::new()),
        }
    }

    /// Export the subtree rooted at `root_id`. Only group nodes list children.
    pub fn wbs_tree(&self, root_id: &str) -> Result<WbsTree> {
        let root = self.store.get_wbs(root_id)?;
        let mut seen = HashSet::new();
        self.build_tree(root, &mut seen)
    }

    fn build_tree(&self, node: WbsNode, seen: &mut HashSet<String>) -> Result<WbsTree> {
        if !seen.insert(node.id.clone()) {
            return Err(Error::CircularReference(node.id));
        }

        let mut children = Vec::new();
        if node.is_group {
            for child in self.wbs_children(&node.id)? {
                children.push(self.build_tree(child, seen)?);
            }
        }

        Ok(WbsTree {
            id: node.id,
            name: node.name,
            code: node.code,
            start: node.start_date,
            end: node.end_date,
            progress: node.progress,
            is_group: node.is_group,
            dependencies: node.dependencies,
            children,
        })
    }

    /// Delete a node without touching its children, then refresh its ancestors.
    pub fn delete_wbs(&mut self, id: &str, ctx: &Context) -> Result<Saved<WbsNode>> {
        let node = self.store.get_wbs(id)?;
        let children: Vec<String> = self
            .wbs_children(id)?
            .into_iter()
            .map(|c| c.id)
            .collect();

        self.store.delete_wbs(id)?;
        tracing::info!(node = %id, actor = %ctx.actor, "deleted wbs node");

        let mut advisories = Vec::new();
        if !children.is_empty() {
            advise(
                &mut advisories,
                Advisory::OrphanedChildren {
                    deleted_id: id.to_string(),
                    children,
                },
            );
        }
        self.cascade_from(node.parent_id.clone(), ctx, &mut advisories)?;

        Ok(Saved {
            doc: node,
            advisories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineSettings;
    use crate::engine::testing::*;
    use crate::models::{Project, ResourceLine};
    use crate::storage::MemoryStore;

    fn node(id: &str, level: u32, parent: Option<&str>) -> WbsNode {
        let mut n = WbsNode::new(id.to_string(), id.to_string());
        n.level = level;
        n.parent_id = parent.map(str::to_string);
        n.project_id = Some("prj-1".to_string());
        n
    }

    fn group(id: &str, level: u32, parent: Option<&str>) -> WbsNode {
        let mut n = node(id, level, parent);
        n.is_group = true;
        n
    }

    #[test]
    fn test_duration_is_inclusive() {
        let mut n = node("a", 1, None);
        n.start_date = Some(day(1));
        n.end_date = Some(day(5));
        calculate_duration(&mut n);
        assert_eq!(n.duration_days, Some(5));
    }

    #[test]
    fn test_duration_left_unset_without_both_dates() {
        let mut n = node("a", 1, None);
        n.start_date = Some(day(1));
        calculate_duration(&mut n);
        assert_eq!(n.duration_days, None);
    }

    #[test]
    fn test_weighted_group_progress() {
        let mut parent = group("root", 1, None);
        let mut a = node("a", 2, Some("root"));
        a.progress = 50.0;
        a.weight = Some(1.0);
        let mut b = node("b", 2, Some("root"));
        b.progress = 100.0;
        b.weight = Some(3.0);

        update_progress(&mut parent, &[a, b], &[]);
        assert_eq!(parent.progress, 87.5);
    }

    #[test]
    fn test_group_without_children_keeps_progress() {
        let mut parent = group("root", 1, None);
        parent.progress = 42.0;
        update_progress(&mut parent, &[], &[]);
        assert_eq!(parent.progress, 42.0);
    }

    #[test]
    fn test_leaf_progress_derived_from_tasks() {
        let mut leaf = node("a", 2, None);
        leaf.progress = 90.0;
        let mut t1 = TaskNode::new("T1".to_string(), "t".to_string(), "prj-1".to_string());
        t1.progress = 20.0;
        let mut t2 = TaskNode::new("T2".to_string(), "t".to_string(), "prj-1".to_string());
        t2.progress = 60.0;

        update_progress(&mut leaf, &[], &[t1, t2]);
        assert_eq!(leaf.progress, 40.0);
    }

    #[test]
    fn test_manual_leaf_progress_is_kept() {
        let mut leaf = node("a", 2, None);
        leaf.progress = 90.0;
        leaf.progress_mode = ProgressMode::Manual;
        let t1 = TaskNode::new("T1".to_string(), "t".to_string(), "prj-1".to_string());

        update_progress(&mut leaf, &[], &[t1]);
        assert_eq!(leaf.progress, 90.0);
    }

    #[test]
    fn test_group_costs_and_variance() {
        let mut parent = group("root", 1, None);
        let mut a = node("a", 2, Some("root"));
        a.estimated_cost = 1000.0;
        a.actual_cost = 1200.0;
        let mut b = node("b", 2, Some("root"));
        b.estimated_cost = 1000.0;
        b.actual_cost = 900.0;
        let children = vec![a, b];

        calculate_costs(&mut parent, &children);
        assert_eq!(parent.estimated_cost, 2000.0);
        assert_eq!(parent.actual_cost, 2100.0);
        assert_eq!(parent.cost_variance, Some(100.0));
        assert_eq!(parent.cost_variance_percent, Some(5.0));

        // Recomputing with unchanged children is idempotent
        let before = (parent.estimated_cost, parent.actual_cost);
        calculate_costs(&mut parent, &children);
        assert_eq!((parent.estimated_cost, parent.actual_cost), before);
    }

    #[test]
    fn test_resources_override_leaf_costs() {
        let mut leaf = node("a", 2, None);
        leaf.estimated_cost = 5.0;
        leaf.actual_cost = 5.0;
        leaf.resources = vec![
            ResourceLine {
                description: "Rebar".to_string(),
                estimated_cost: 300.0,
                actual_cost: 250.0,
            },
            ResourceLine {
                description: "Crane".to_string(),
                estimated_cost: 200.0,
                actual_cost: 200.0,
            },
        ];

        calculate_costs(&mut leaf, &[]);
        assert_eq!(leaf.estimated_cost, 500.0);
        assert_eq!(leaf.actual_cost, 450.0);
        assert_eq!(leaf.cost_variance, Some(-50.0));
        assert_eq!(leaf.cost_variance_percent, Some(-10.0));
    }

    #[test]
    fn test_zero_estimate_clears_variance() {
        let mut leaf = node("a", 2, None);
        leaf.actual_cost = 10.0;
        leaf.cost_variance = Some(1.0);
        calculate_costs(&mut leaf, &[]);
        assert_eq!(leaf.cost_variance, None);
        assert_eq!(leaf.cost_variance_percent, None);
    }

    #[test]
    fn test_child_code() {
        assert_eq!(child_code("1.2", 0), "1.2.1");
        assert_eq!(child_code("1", 4), "1.5");
    }

    #[test]
    fn test_save_rejects_end_before_start() {
        let mut engine = engine_with_project();
        let mut n = node("a", 1, None);
        n.start_date = Some(day(5));
        n.end_date = Some(day(1));

        let err = engine.save_wbs(n, &ctx()).unwrap_err();
        assert!(matches!(err, Error::DateOrderingViolation { .. }));
        assert!(engine.store().find_wbs("a").unwrap().is_none());
    }

    #[test]
    fn test_save_rejects_missing_parent() {
        let mut engine = engine_with_project();
        let err = engine.save_wbs(node("a", 2, Some("ghost")), &ctx()).unwrap_err();
        assert!(matches!(err, Error::InvalidParent(ref p) if p == "ghost"));
    }

    #[test]
    fn test_save_rejects_level_not_below_parent() {
        let mut engine = engine_with_project();
        engine.save_wbs(group("root", 2, None), &ctx()).unwrap();

        let err = engine.save_wbs(node("a", 2, Some("root")), &ctx()).unwrap_err();
        assert!(matches!(err, Error::InvalidHierarchy { parent_level: 2, level: 2, .. }));
    }

    #[test]
    fn test_three_node_cycle_rejected() {
        let mut engine = engine_with_project();
        let c = &ctx();
        engine.save_wbs(group("A", 1, None), c).unwrap();
        engine.save_wbs(group("B", 2, Some("A")), c).unwrap();
        engine.save_wbs(group("C", 3, Some("B")), c).unwrap();

        // Re-parent A under C: A -> C -> B -> A
        let mut a = engine.store().get_wbs("A").unwrap();
        a.parent_id = Some("C".to_string());
        a.level = 4;

        let err = engine.save_wbs(a, c).unwrap_err();
        match err {
            Error::CircularReference(path) => assert_eq!(path, "A -> C -> B -> A"),
            other => panic!("expected CircularReference, got {:?}", other),
        }

        // Nothing was committed
        let stored = engine.store().get_wbs("A").unwrap();
        assert_eq!(stored.parent_id, None);
        assert_eq!(stored.level, 1);
    }

    #[test]
    fn test_root_progress_rolls_up_from_leaves() {
        let mut engine = engine_with_project();
        let c = &ctx();
        engine.save_wbs(group("root", 1, None), c).unwrap();

        let mut a = node("a", 2, Some("root"));
        a.progress = 0.0;
        let mut b = node("b", 2, Some("root"));
        b.progress = 100.0;
        engine.save_wbs(a, c).unwrap();
        engine.save_wbs(b, c).unwrap();

        let root = engine.store().get_wbs("root").unwrap();
        let saved = engine.save_wbs(root, c).unwrap();
        assert_eq!(saved.doc.progress, 50.0);
    }

    #[test]
    fn test_leaf_save_cascades_to_all_ancestors() {
        let mut engine = engine_with_project();
        let c = &ctx();
        engine.save_wbs(group("root", 1, None), c).unwrap();
        engine.save_wbs(group("mid", 2, Some("root")), c).unwrap();

        let mut leaf = node("leaf", 3, Some("mid"));
        leaf.estimated_cost = 400.0;
        leaf.actual_cost = 300.0;
        leaf.progress = 80.0;
        engine.save_wbs(leaf, c).unwrap();

        let mid = engine.store().get_wbs("mid").unwrap();
        let root = engine.store().get_wbs("root").unwrap();
        assert_eq!(mid.progress, 80.0);
        assert_eq!(mid.estimated_cost, 400.0);
        assert_eq!(root.progress, 80.0);
        assert_eq!(root.actual_cost, 300.0);
        assert_eq!(root.cost_variance, Some(-100.0));
    }

    #[test]
    fn test_cascade_is_bounded() {
        let store = {
            let mut s = MemoryStore::new();
            s.save_project(&Project::new("prj-1".to_string(), "Tower".to_string()))
                .unwrap();
            s
        };
        let mut engine = Engine::with_settings(store, EngineSettings { max_cascade_depth: 1 });
        let c = &ctx();
        engine.save_wbs(group("root", 1, None), c).unwrap();
        engine.save_wbs(group("mid", 2, Some("root")), c).unwrap();

        let mut leaf = node("leaf", 3, Some("mid"));
        leaf.progress = 60.0;
        let saved = engine.save_wbs(leaf, c).unwrap();

        assert!(saved.advisories.iter().any(|a| matches!(
            a,
            Advisory::CascadeTruncated { stopped_at, max_depth: 1 } if stopped_at == "root"
        )));
        assert_eq!(engine.store().get_wbs("mid").unwrap().progress, 60.0);
        assert_eq!(engine.store().get_wbs("root").unwrap().progress, 0.0);
    }

    #[test]
    fn test_project_alignment_is_advisory() {
        let mut store = MemoryStore::new();
        let mut project = Project::new("prj-1".to_string(), "Tower".to_string());
        project.expected_start_date = Some(day(10));
        store.save_project(&project).unwrap();
        let mut engine = Engine::new(store);

        let mut n = node("a", 1, None);
        n.start_date = Some(day(2));
        n.end_date = Some(day(12));
        let saved = engine.save_wbs(n, &ctx()).unwrap();

        assert_eq!(saved.advisories.len(), 1);
        assert!(engine.store().find_wbs("a").unwrap().is_some());
    }

    #[test]
    fn test_unknown_project_rejected() {
        let mut engine = engine_with_project();
        let mut n = node("a", 1, None);
        n.project_id = Some("prj-none".to_string());
        assert!(matches!(
            engine.save_wbs(n, &ctx()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_create_tasks_flag_creates_linked_task_once() {
        let mut engine = engine_with_project();
        let c = &ctx();
        let mut leaf = node("leaf", 1, None);
        leaf.create_tasks = true;
        leaf.start_date = Some(day(1));
        leaf.end_date = Some(day(4));

        let saved = engine.save_wbs(leaf, c).unwrap();
        assert!(saved
            .advisories
            .iter()
            .any(|a| matches!(a, Advisory::TaskCreated { wbs_id, .. } if wbs_id == "leaf")));

        let tasks = engine
            .store()
            .list_tasks(&TaskFilter::linked_to("prj-1", "leaf"))
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].subject, "leaf");
        assert_eq!(tasks[0].duration_days, Some(4));
        assert_eq!(tasks[0].prepared_by.as_deref(), Some("site-engineer"));

        // Saving again does not create a second task
        engine.save_wbs(saved.doc, c).unwrap();
        let tasks = engine
            .store()
            .list_tasks(&TaskFilter::linked_to("prj-1", "leaf"))
            .unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_create_child_wbs_numbers_codes() {
        let mut engine = engine_with_project();
        let c = &ctx();
        let mut root = group("root", 1, None);
        root.code = Some("1".to_string());
        engine.save_wbs(root, c).unwrap();

        let first = engine.create_child_wbs("root", "Excavation").unwrap();
        assert_eq!(first.code.as_deref(), Some("1.1"));
        assert_eq!(first.level, 2);
        assert_eq!(first.parent_id.as_deref(), Some("root"));
        assert_eq!(first.project_id.as_deref(), Some("prj-1"));
        assert!(!first.is_group);
        engine.save_wbs(first, c).unwrap();

        let second = engine.create_child_wbs("root", "Piling").unwrap();
        assert_eq!(second.code.as_deref(), Some("1.2"));
        // Nothing is persisted until the caller saves
        assert_eq!(engine.wbs_children("root").unwrap().len(), 1);
    }

    #[test]
    fn test_create_task_from_wbs_maps_fields() {
        let mut engine = engine_with_project();
        let mut leaf = node("leaf", 1, None);
        leaf.name = "Formwork".to_string();
        leaf.description = Some("Level 2 slab".to_string());
        leaf.start_date = Some(day(3));
        leaf.end_date = Some(day(9));
        engine.save_wbs(leaf, &ctx()).unwrap();

        let task = engine.create_task_from_wbs("leaf").unwrap();
        assert_eq!(task.subject, "Formwork");
        assert_eq!(task.project_id, "prj-1");
        assert_eq!(task.wbs_id.as_deref(), Some("leaf"));
        assert_eq!(task.description.as_deref(), Some("Level 2 slab"));
        assert_eq!(task.start_date, Some(day(3)));
        assert_eq!(task.status, TaskStatus::NotStarted);
        assert_eq!(task.version, 0);
    }

    #[test]
    fn test_create_task_from_wbs_requires_project() {
        let mut engine = engine_with_project();
        let mut leaf = node("leaf", 1, None);
        leaf.project_id = None;
        engine.save_wbs(leaf, &ctx()).unwrap();

        assert!(matches!(
            engine.create_task_from_wbs("leaf"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_move_refreshes_previous_parent() {
        let mut engine = engine_with_project();
        let c = &ctx();
        engine.save_wbs(group("a", 1, None), c).unwrap();
        engine.save_wbs(group("b", 1, None), c).unwrap();
        let mut leaf = node("leaf", 2, Some("a"));
        leaf.estimated_cost = 500.0;
        leaf.progress = 80.0;
        engine.save_wbs(leaf, c).unwrap();
        assert_eq!(engine.store().get_wbs("a").unwrap().estimated_cost, 500.0);

        let mut moved = engine.store().get_wbs("leaf").unwrap();
        moved.parent_id = Some("b".to_string());
        engine.save_wbs(moved, c).unwrap();

        let a = engine.store().get_wbs("a").unwrap();
        assert_eq!(a.estimated_cost, 0.0);
        let b = engine.store().get_wbs("b").unwrap();
        assert_eq!(b.estimated_cost, 500.0);
        assert_eq!(b.progress, 80.0);
    }

    #[test]
    fn test_detach_refreshes_previous_parent() {
        let mut engine = engine_with_project();
        let c = &ctx();
        engine.save_wbs(group("a", 1, None), c).unwrap();
        let mut leaf = node("leaf", 2, Some("a"));
        leaf.estimated_cost = 500.0;
        engine.save_wbs(leaf, c).unwrap();

        let mut detached = engine.store().get_wbs("leaf").unwrap();
        detached.parent_id = None;
        detached.level = 1;
        engine.save_wbs(detached, c).unwrap();

        assert_eq!(engine.store().get_wbs("a").unwrap().estimated_cost, 0.0);
    }

    #[test]
    fn test_wbs_tree_nests_group_children() {
        let mut engine = engine_with_project();
        let c = &ctx();
        engine.save_wbs(group("root", 1, None), c).unwrap();
        engine.save_wbs(group("mid", 2, Some("root")), c).unwrap();
        let mut leaf = node("leaf", 3, Some("mid"));
        leaf.dependencies = Some("1.1".to_string());
        engine.save_wbs(leaf, c).unwrap();

        let tree = engine.wbs_tree("root").unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].id, "mid");
        assert_eq!(tree.children[0].children[0].id, "leaf");
        assert!(tree.children[0].children[0].children.is_empty());
        assert_eq!(tree.children[0].children[0].dependencies.as_deref(), Some("1.1"));
        assert_eq!(tree.dependencies, None);
    }

    #[test]
    fn test_delete_refreshes_parent_and_reports_orphans() {
        let mut engine = engine_with_project();
        let c = &ctx();
        engine.save_wbs(group("root", 1, None), c).unwrap();
        engine.save_wbs(group("mid", 2, Some("root")), c).unwrap();
        let mut leaf = node("leaf", 3, Some("mid"));
        leaf.estimated_cost = 100.0;
        engine.save_wbs(leaf, c).unwrap();
        let mut other = node("other", 2, Some("root"));
        other.estimated_cost = 50.0;
        engine.save_wbs(other, c).unwrap();
        assert_eq!(engine.store().get_wbs("root").unwrap().estimated_cost, 150.0);

        let deleted = engine.delete_wbs("mid", c).unwrap();
        assert!(deleted.advisories.iter().any(|a| matches!(
            a,
            Advisory::OrphanedChildren { children, .. } if children == &vec!["leaf".to_string()]
        )));
        assert_eq!(engine.store().get_wbs("root").unwrap().estimated_cost, 50.0);
        // The child is left in place
        assert!(engine.store().find_wbs("leaf").unwrap().is_some());
    }

    #[test]
    fn test_save_stamps_actor() {
        let mut engine = engine_with_project();
        let saved = engine.save_wbs(node("a", 1, None), &ctx()).unwrap();
        assert_eq!(saved.doc.prepared_by.as_deref(), Some("site-engineer"));
        assert_eq!(saved.doc.updated_by.as_deref(), Some("site-engineer"));

        let later = Context::on("quantity-surveyor", day(16));
        let resaved = engine.save_wbs(saved.doc, &later).unwrap();
        assert_eq!(resaved.doc.prepared_by.as_deref(), Some("site-engineer"));
        assert_eq!(resaved.doc.updated_by.as_deref(), Some("quantity-surveyor"));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut engine = engine_with_project();
        let mut n = node("a", 1, None);
        n.weight = Some(-2.0);
        assert!(matches!(
            engine.save_wbs(n, &ctx()),
            Err(Error::InvalidInput(_))
        ));
    }
}
