//! `wbs node` commands.

use serde::Serialize;

use super::{Output, Session, fmt_date, fmt_money, push_advisories, to_json_string};
use crate::cli::NodeFields;
use crate::engine::{Saved, WbsTree};
use crate::models::{Advisory, ProgressMode, ResourceLine, WbsNode};
use crate::storage::{DocType, DocumentStore, WbsFilter, validate_id};
use crate::{Error, Result};

fn parse_progress_mode(raw: &str) -> Result<ProgressMode> {
    ProgressMode::parse(raw).ok_or_else(|| {
        Error::InvalidInput(format!(
            "Invalid progress mode: {} (expected manual or derived-from-tasks)",
            raw
        ))
    })
}

fn apply_fields(node: &mut WbsNode, fields: NodeFields) -> Result<()> {
    if let Some(code) = fields.code {
        node.code = Some(code);
    }
    if let Some(description) = fields.description {
        node.description = Some(description);
    }
    if let Some(start) = fields.start {
        node.start_date = Some(start);
    }
    if let Some(end) = fields.end {
        node.end_date = Some(end);
    }
    if let Some(progress) = fields.progress {
        node.progress = progress;
    }
    if let Some(weight) = fields.weight {
        node.weight = Some(weight);
    }
    if let Some(cost) = fields.estimated_cost {
        node.estimated_cost = cost;
    }
    if let Some(cost) = fields.actual_cost {
        node.actual_cost = cost;
    }
    if let Some(ref mode) = fields.progress_mode {
        node.progress_mode = parse_progress_mode(mode)?;
    }
    if let Some(create_tasks) = fields.create_tasks {
        node.create_tasks = create_tasks;
    }
    if let Some(dependencies) = fields.dependencies {
        node.dependencies = Some(dependencies);
    }
    Ok(())
}

fn node_lines(node: &WbsNode) -> Vec<String> {
    let kind = if node.is_group { "group" } else { "leaf" };
    let mut lines = vec![format!(
        "{} {}{} [{} L{}]",
        node.id,
        node.code.as_deref().map(|c| format!("{} ", c)).unwrap_or_default(),
        node.name,
        kind,
        node.level
    )];
    if let Some(ref parent) = node.parent_id {
        lines.push(format!("  Parent: {}", parent));
    }
    lines.push(format!(
        "  Dates: {} .. {}{}",
        fmt_date(node.start_date),
        fmt_date(node.end_date),
        node.duration_days
            .map(|d| format!(" ({} days)", d))
            .unwrap_or_default()
    ));
    lines.push(format!(
        "  Progress: {:.1}% ({})",
        node.progress, node.progress_mode
    ));
    lines.push(format!(
        "  Cost: estimated {} / actual {}",
        fmt_money(node.estimated_cost),
        fmt_money(node.actual_cost)
    ));
    if let (Some(variance), Some(percent)) = (node.cost_variance, node.cost_variance_percent) {
        lines.push(format!("  Variance: {} ({:+.1}%)", fmt_money(variance), percent));
    }
    lines
}

impl Output for Saved<WbsNode> {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Saved WBS node {}", self.doc.id)];
        lines.extend(node_lines(&self.doc));
        push_advisories(&mut lines, &self.advisories);
        lines.join("\n")
    }
}

/// Create a node. Without `project`, the parent's project is used.
pub fn node_create(
    session: &mut Session,
    name: &str,
    project: Option<String>,
    parent: Option<String>,
    level: Option<u32>,
    group: bool,
    fields: NodeFields,
) -> Result<Saved<WbsNode>> {
    let parent_node = match parent {
        Some(ref parent_id) => Some(
            session
                .storage()
                .find_wbs(parent_id)?
                .ok_or_else(|| Error::InvalidParent(parent_id.clone()))?,
        ),
        None => None,
    };

    let id = session.engine.fresh_id(DocType::Wbs, name)?;
    let mut node = WbsNode::new(id, name.to_string());
    node.is_group = group;
    node.progress_mode = session.config.progress_mode();
    node.project_id = project.or_else(|| parent_node.as_ref().and_then(|p| p.project_id.clone()));
    node.parent_id = parent;
    node.level = level.unwrap_or_else(|| parent_node.as_ref().map_or(1, |p| p.level + 1));
    apply_fields(&mut node, fields)?;

    session.engine.save_wbs(node, &session.ctx)
}

pub fn node_child(
    session: &mut Session,
    parent: &str,
    name: &str,
    group: bool,
    fields: NodeFields,
) -> Result<Saved<WbsNode>> {
    validate_id(parent, DocType::Wbs.id_prefix())?;
    let mut node = session.engine.create_child_wbs(parent, name)?;
    node.is_group = group;
    apply_fields(&mut node, fields)?;
    session.engine.save_wbs(node, &session.ctx)
}

#[allow(clippy::too_many_arguments)]
pub fn node_update(
    session: &mut Session,
    id: &str,
    name: Option<String>,
    parent: Option<String>,
    no_parent: bool,
    level: Option<u32>,
    group: Option<bool>,
    fields: NodeFields,
) -> Result<Saved<WbsNode>> {
    validate_id(id, DocType::Wbs.id_prefix())?;
    let mut node = session.storage().get_wbs(id)?;

    if let Some(name) = name {
        node.name = name;
    }
    if no_parent {
        node.parent_id = None;
        node.level = level.unwrap_or(1);
    } else if let Some(parent_id) = parent {
        let parent_node = session
            .storage()
            .find_wbs(&parent_id)?
            .ok_or_else(|| Error::InvalidParent(parent_id.clone()))?;
        node.level = level.unwrap_or(parent_node.level + 1);
        node.parent_id = Some(parent_id);
    } else if let Some(level) = level {
        node.level = level;
    }
    if let Some(group) = group {
        node.is_group = group;
    }
    apply_fields(&mut node, fields)?;

    session.engine.save_wbs(node, &session.ctx)
}

#[derive(Serialize)]
pub struct NodeDetail {
    #[serde(flatten)]
    pub node: WbsNode,
    pub children: Vec<String>,
    pub tasks: Vec<String>,
}

impl Output for NodeDetail {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = node_lines(&self.node);
        if !self.node.resources.is_empty() {
            lines.push("  Resources:".to_string());
            for r in &self.node.resources {
                lines.push(format!(
                    "    {} {} / {}",
                    r.description,
                    fmt_money(r.estimated_cost),
                    fmt_money(r.actual_cost)
                ));
            }
        }
        if !self.children.is_empty() {
            lines.push(format!("  Children: {}", self.children.join(", ")));
        }
        if !self.tasks.is_empty() {
            lines.push(format!("  Tasks: {}", self.tasks.join(", ")));
        }
        lines.join("\n")
    }
}

pub fn node_show(session: &Session, id: &str) -> Result<NodeDetail> {
    validate_id(id, DocType::Wbs.id_prefix())?;
    let node = session.storage().get_wbs(id)?;
    let children = session
        .engine
        .wbs_children(id)?
        .into_iter()
        .map(|c| c.id)
        .collect();
    let tasks = session
        .engine
        .wbs_tasks(&node)?
        .into_iter()
        .map(|t| t.id)
        .collect();
    Ok(NodeDetail {
        node,
        children,
        tasks,
    })
}

#[derive(Serialize)]
pub struct NodeList {
    pub nodes: Vec<WbsNode>,
    pub count: usize,
}

impl Output for NodeList {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        if self.nodes.is_empty() {
            return "No WBS nodes.".to_string();
        }
        self.nodes
            .iter()
            .map(|n| {
                format!(
                    "{}  {:>5.1}%  {}{}",
                    n.id,
                    n.progress,
                    n.code.as_deref().map(|c| format!("{} ", c)).unwrap_or_default(),
                    n.name
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn node_list(
    session: &Session,
    project: Option<String>,
    parent: Option<String>,
) -> Result<NodeList> {
    let nodes = session.storage().list_wbs(&WbsFilter {
        project_id: project,
        parent_id: parent,
    })?;
    let count = nodes.len();
    Ok(NodeList { nodes, count })
}

fn tree_lines(tree: &WbsTree, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!(
        "{}{}{} ({}) {:.1}% {} .. {}",
        "  ".repeat(depth),
        tree.code.as_deref().map(|c| format!("{} ", c)).unwrap_or_default(),
        tree.name,
        tree.id,
        tree.progress,
        fmt_date(tree.start),
        fmt_date(tree.end)
    ));
    for child in &tree.children {
        tree_lines(child, depth + 1, lines);
    }
}

impl Output for WbsTree {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        tree_lines(self, 0, &mut lines);
        lines.join("\n")
    }
}

pub fn node_tree(session: &Session, id: &str) -> Result<WbsTree> {
    validate_id(id, DocType::Wbs.id_prefix())?;
    session.engine.wbs_tree(id)
}

#[derive(Serialize)]
pub struct NodeDeleted {
    pub deleted: String,
    pub advisories: Vec<Advisory>,
}

impl Output for NodeDeleted {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Deleted WBS node {}", self.deleted)];
        push_advisories(&mut lines, &self.advisories);
        lines.join("\n")
    }
}

pub fn node_delete(session: &mut Session, id: &str) -> Result<NodeDeleted> {
    validate_id(id, DocType::Wbs.id_prefix())?;
    let deleted = session.engine.delete_wbs(id, &session.ctx)?;
    Ok(NodeDeleted {
        deleted: deleted.doc.id,
        advisories: deleted.advisories,
    })
}

/// Append a resource line. Resource lines replace a leaf's entered costs.
pub fn node_resource(
    session: &mut Session,
    id: &str,
    description: &str,
    estimated: f64,
    actual: f64,
) -> Result<Saved<WbsNode>> {
    validate_id(id, DocType::Wbs.id_prefix())?;
    let mut node = session.storage().get_wbs(id)?;
    if node.is_group {
        return Err(Error::InvalidInput(format!(
            "{} is a group node; resources belong on leaves",
            id
        )));
    }
    node.resources.push(ResourceLine {
        description: description.to_string(),
        estimated_cost: estimated,
        actual_cost: actual,
    });
    session.engine.save_wbs(node, &session.ctx)
}
