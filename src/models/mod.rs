//! Data models for Trestle documents.
//!
//! This module defines the core data structures:
//! - `Project` - Owning project with its expected schedule window
//! - `WbsNode` - Work-breakdown-structure node (group or leaf)
//! - `TaskNode` - Schedule task, optionally linked to a leaf WBS node
//! - `Advisory` - Non-fatal findings reported alongside a save

pub mod graph;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How a leaf WBS node obtains its progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressMode {
    /// Progress entered on the node is authoritative.
    Manual,
    /// Progress is the mean of linked tasks whenever linked tasks exist.
    #[default]
    DerivedFromTasks,
}

impl ProgressMode {
    /// Parse from string, case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "derived-from-tasks" | "derived" | "tasks" => Some(Self::DerivedFromTasks),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::DerivedFromTasks => "derived-from-tasks",
        }
    }
}

impl fmt::Display for ProgressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A project owning WBS nodes and tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier (e.g., "prj-a1b2")
    pub id: String,

    /// Entity type marker
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Project name
    pub name: String,

    /// Planned start of the project window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_start_date: Option<NaiveDate>,

    /// Planned end of the project window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_end_date: Option<NaiveDate>,

    /// Share of completed tasks (0-100)
    #[serde(default)]
    pub progress: f64,

    /// Who created the project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepared_by: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Store-assigned revision counter
    #[serde(default)]
    pub version: u64,
}

impl Project {
    /// Create a new project with the given ID and name.
    pub fn new(id: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            entity_type: "project".to_string(),
            name,
            expected_start_date: None,
            expected_end_date: None,
            progress: 0.0,
            prepared_by: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// A cost line on a leaf WBS node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLine {
    pub description: String,
    #[serde(default)]
    pub estimated_cost: f64,
    #[serde(default)]
    pub actual_cost: f64,
}

/// A node in a project's work breakdown structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WbsNode {
    /// Unique identifier (e.g., "wbs-a1b2")
    pub id: String,

    /// Entity type marker
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Display name
    pub name: String,

    /// Dotted outline code (e.g., "1.2.3")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Detailed description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Owning project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    /// Parent WBS node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    /// Depth indicator supplied by the caller
    #[serde(default = "default_level")]
    pub level: u32,

    /// Group nodes aggregate their children
    #[serde(default)]
    pub is_group: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,

    /// Inclusive day count, unset until both dates are known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<i64>,

    /// Progress from 0 to 100
    #[serde(default)]
    pub progress: f64,

    /// Weight in the parent's progress average (treated as 1 when unset or zero)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,

    #[serde(default)]
    pub progress_mode: ProgressMode,

    #[serde(default)]
    pub estimated_cost: f64,

    #[serde(default)]
    pub actual_cost: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_variance: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_variance_percent: Option<f64>,

    /// Free-text predecessor note shown in the gantt export (e.g. "1.2, 1.3")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<String>,

    /// Cost lines; when present they replace manually entered leaf costs
    #[serde(default)]
    pub resources: Vec<ResourceLine>,

    /// Auto-create a linked task for this leaf after save
    #[serde(default)]
    pub create_tasks: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepared_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Store-assigned revision counter
    #[serde(default)]
    pub version: u64,
}

fn default_level() -> u32 {
    1
}

impl WbsNode {
    /// Create a new root-level leaf node with the given ID and name.
    pub fn new(id: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            entity_type: "wbs".to_string(),
            name,
            code: None,
            description: None,
            project_id: None,
            parent_id: None,
            level: default_level(),
            is_group: false,
            start_date: None,
            end_date: None,
            duration_days: None,
            progress: 0.0,
            weight: None,
            progress_mode: ProgressMode::default(),
            estimated_cost: 0.0,
            actual_cost: 0.0,
            cost_variance: None,
            cost_variance_percent: None,
            dependencies: None,
            resources: Vec::new(),
            create_tasks: false,
            prepared_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Weight used when averaging this node into its parent.
    pub fn effective_weight(&self) -> f64 {
        match self.weight {
            Some(w) if w != 0.0 => w,
            _ => 1.0,
        }
    }
}

/// Task status in the schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Parse a status string, accepting the common spellings.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "not_started" | "not-started" | "notstarted" | "open" => Some(Self::NotStarted),
            "in_progress" | "in-progress" | "inprogress" => Some(Self::InProgress),
            "completed" | "complete" | "done" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cost heads booked against a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    #[serde(default)]
    pub labor: f64,
    #[serde(default)]
    pub material: f64,
    #[serde(default)]
    pub equipment: f64,
    #[serde(default)]
    pub subcontract: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.labor + self.material + self.equipment + self.subcontract
    }
}

/// A schedule task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    /// Unique identifier (e.g., "tsk-a1b2")
    pub id: String,

    /// Entity type marker
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Task subject
    pub subject: String,

    /// Owning project
    pub project_id: String,

    /// Back-reference to the leaf WBS node this task implements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wbs_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Task IDs this task depends on
    #[serde(default)]
    pub depends_on: BTreeSet<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start_date: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<NaiveDate>,

    #[serde(default)]
    pub status: TaskStatus,

    /// Progress from 0 to 100
    #[serde(default)]
    pub progress: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_duration_days: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_variance_days: Option<i64>,

    /// Set when the task has any dependency or dependent
    #[serde(default)]
    pub is_critical_path: bool,

    #[serde(default)]
    pub costs: CostBreakdown,

    #[serde(default)]
    pub total_cost: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepared_by: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Store-assigned revision counter
    #[serde(default)]
    pub version: u64,
}

impl TaskNode {
    /// Create a new task with the given ID, subject and project.
    pub fn new(id: String, subject: String, project_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            entity_type: "task".to_string(),
            subject,
            project_id,
            wbs_id: None,
            description: None,
            depends_on: BTreeSet::new(),
            start_date: None,
            end_date: None,
            actual_start_date: None,
            actual_end_date: None,
            status: TaskStatus::default(),
            progress: 0.0,
            duration_days: None,
            actual_duration_days: None,
            duration_variance_days: None,
            is_critical_path: false,
            costs: CostBreakdown::default(),
            total_cost: 0.0,
            prepared_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// Which side of the project window a date falls outside of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowEdge {
    StartsBeforeProject,
    EndsAfterProject,
}

/// A non-fatal finding reported alongside a successful save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// A node or task date falls outside the project's expected window.
    ProjectAlignment {
        entity_id: String,
        project_id: String,
        edge: WindowEdge,
        date: NaiveDate,
        project_date: NaiveDate,
    },
    /// A dependent task can start now that its dependencies are complete.
    SuggestedStart {
        task_id: String,
        completed_task_id: String,
        suggested_start: NaiveDate,
    },
    /// A linked task was created for a leaf WBS node.
    TaskCreated { task_id: String, wbs_id: String },
    /// The parent cascade stopped before reaching the root.
    CascadeTruncated { stopped_at: String, max_depth: usize },
    /// A deleted node left children pointing at it.
    OrphanedChildren { deleted_id: String, children: Vec<String> },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::ProjectAlignment {
                entity_id,
                edge: WindowEdge::StartsBeforeProject,
                date,
                project_date,
                ..
            } => write!(
                f,
                "{} start date {} is before project start date {}",
                entity_id, date, project_date
            ),
            Advisory::ProjectAlignment {
                entity_id,
                edge: WindowEdge::EndsAfterProject,
                date,
                project_date,
                ..
            } => write!(
                f,
                "{} end date {} is after project end date {}",
                entity_id, date, project_date
            ),
            Advisory::SuggestedStart {
                task_id,
                suggested_start,
                ..
            } => write!(
                f,
                "Task {} can now start. Suggested start date: {}",
                task_id, suggested_start
            ),
            Advisory::TaskCreated { task_id, wbs_id } => {
                write!(f, "Task {} created from WBS {}", task_id, wbs_id)
            }
            Advisory::CascadeTruncated {
                stopped_at,
                max_depth,
            } => write!(
                f,
                "Roll-up stopped at {} after {} ancestors; higher ancestors are stale",
                stopped_at, max_depth
            ),
            Advisory::OrphanedChildren {
                deleted_id,
                children,
            } => write!(
                f,
                "Deleted {} still has children: {}",
                deleted_id,
                children.join(", ")
            ),
        }
    }
}
