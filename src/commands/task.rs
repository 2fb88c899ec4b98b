//! `wbs task` commands.

use serde::Serialize;

use super::{Output, Session, fmt_date, fmt_money, push_advisories, to_json_string};
use crate::cli::TaskFields;
use crate::engine::Saved;
use crate::engine::task::schedule_variance_days;
use crate::models::{TaskNode, TaskStatus};
use crate::storage::{DocType, DocumentStore, TaskFilter, validate_id};
use crate::{Error, Result};

fn parse_status(raw: &str) -> Result<TaskStatus> {
    TaskStatus::parse(raw).ok_or_else(|| {
        Error::InvalidInput(format!(
            "Invalid status: {} (expected not_started, in_progress, or completed)",
            raw
        ))
    })
}

fn apply_fields(task: &mut TaskNode, fields: TaskFields) -> Result<()> {
    if let Some(description) = fields.description {
        task.description = Some(description);
    }
    if let Some(start) = fields.start {
        task.start_date = Some(start);
    }
    if let Some(end) = fields.end {
        task.end_date = Some(end);
    }
    if let Some(start) = fields.actual_start {
        task.actual_start_date = Some(start);
    }
    if let Some(end) = fields.actual_end {
        task.actual_end_date = Some(end);
    }
    if let Some(ref status) = fields.status {
        task.status = parse_status(status)?;
    }
    if let Some(progress) = fields.progress {
        task.progress = progress;
    }
    if let Some(labor) = fields.labor {
        task.costs.labor = labor;
    }
    if let Some(material) = fields.material {
        task.costs.material = material;
    }
    if let Some(equipment) = fields.equipment {
        task.costs.equipment = equipment;
    }
    if let Some(subcontract) = fields.subcontract {
        task.costs.subcontract = subcontract;
    }
    Ok(())
}

fn task_lines(task: &TaskNode) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} [{}]{}",
        task.id,
        task.subject,
        task.status,
        if task.is_critical_path { " critical" } else { "" }
    )];
    if let Some(ref wbs) = task.wbs_id {
        lines.push(format!("  WBS: {}", wbs));
    }
    lines.push(format!(
        "  Planned: {} .. {}",
        fmt_date(task.start_date),
        fmt_date(task.end_date)
    ));
    if task.actual_start_date.is_some() || task.actual_end_date.is_some() {
        lines.push(format!(
            "  Actual: {} .. {}",
            fmt_date(task.actual_start_date),
            fmt_date(task.actual_end_date)
        ));
    }
    lines.push(format!("  Progress: {:.1}%", task.progress));
    if !task.depends_on.is_empty() {
        let deps: Vec<&str> = task.depends_on.iter().map(String::as_str).collect();
        lines.push(format!("  Depends on: {}", deps.join(", ")));
    }
    if task.total_cost != 0.0 {
        lines.push(format!("  Cost: {}", fmt_money(task.total_cost)));
    }
    lines
}

impl Output for Saved<TaskNode> {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Saved task {}", self.doc.id)];
        lines.extend(task_lines(&self.doc));
        push_advisories(&mut lines, &self.advisories);
        lines.join("\n")
    }
}

pub fn task_create(
    session: &mut Session,
    subject: &str,
    project: &str,
    wbs: Option<String>,
    depends_on: Vec<String>,
    fields: TaskFields,
) -> Result<Saved<TaskNode>> {
    validate_id(project, DocType::Project.id_prefix())?;
    let id = session.engine.fresh_id(DocType::Task, subject)?;
    let mut task = TaskNode::new(id, subject.to_string(), project.to_string());
    task.wbs_id = wbs;
    task.depends_on = depends_on.into_iter().collect();
    apply_fields(&mut task, fields)?;
    session.engine.save_task(task, &session.ctx)
}

pub fn task_from_wbs(session: &mut Session, wbs_id: &str) -> Result<Saved<TaskNode>> {
    validate_id(wbs_id, DocType::Wbs.id_prefix())?;
    let task = session.engine.create_task_from_wbs(wbs_id)?;
    session.engine.save_task(task, &session.ctx)
}

pub fn task_update(
    session: &mut Session,
    id: &str,
    subject: Option<String>,
    fields: TaskFields,
) -> Result<Saved<TaskNode>> {
    validate_id(id, DocType::Task.id_prefix())?;
    let mut task = session.storage().get_task(id)?;
    if let Some(subject) = subject {
        task.subject = subject;
    }
    apply_fields(&mut task, fields)?;
    session.engine.save_task(task, &session.ctx)
}

pub fn task_depend(session: &mut Session, id: &str, depends_on: &str) -> Result<Saved<TaskNode>> {
    validate_id(id, DocType::Task.id_prefix())?;
    validate_id(depends_on, DocType::Task.id_prefix())?;
    session.engine.add_dependency(id, depends_on, &session.ctx)
}

pub fn task_undepend(
    session: &mut Session,
    id: &str,
    depends_on: &str,
) -> Result<Saved<TaskNode>> {
    validate_id(id, DocType::Task.id_prefix())?;
    session.engine.remove_dependency(id, depends_on, &session.ctx)
}

#[derive(Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: TaskNode,
    pub dependents: Vec<String>,
    pub schedule_variance_days: f64,
}

impl Output for TaskDetail {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = task_lines(&self.task);
        if !self.dependents.is_empty() {
            lines.push(format!("  Blocks: {}", self.dependents.join(", ")));
        }
        if self.schedule_variance_days != 0.0 {
            lines.push(format!(
                "  Schedule variance: {:+.1} days",
                self.schedule_variance_days
            ));
        }
        lines.join("\n")
    }
}

pub fn task_show(session: &Session, id: &str) -> Result<TaskDetail> {
    validate_id(id, DocType::Task.id_prefix())?;
    let task = session.storage().get_task(id)?;
    let dependents = session
        .storage()
        .list_tasks(&TaskFilter::dependents_of(&task.project_id, &task.id))?
        .into_iter()
        .map(|t| t.id)
        .collect();
    let schedule_variance_days = schedule_variance_days(&task);
    Ok(TaskDetail {
        task,
        dependents,
        schedule_variance_days,
    })
}

#[derive(Serialize)]
pub struct TaskList {
    pub tasks: Vec<TaskNode>,
    pub count: usize,
}

impl Output for TaskList {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        if self.tasks.is_empty() {
            return "No tasks.".to_string();
        }
        self.tasks
            .iter()
            .map(|t| {
                format!(
                    "{}  {:<11}  {} .. {}  {}",
                    t.id,
                    t.status.as_str(),
                    fmt_date(t.start_date),
                    fmt_date(t.end_date),
                    t.subject
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn task_list(
    session: &Session,
    project: Option<String>,
    wbs: Option<String>,
    depends_on: Option<String>,
) -> Result<TaskList> {
    let tasks = session.storage().list_tasks(&TaskFilter {
        project_id: project,
        wbs_id: wbs,
        depends_on,
    })?;
    let count = tasks.len();
    Ok(TaskList { tasks, count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::project::project_create;
    use crate::commands::testing::session;
    use crate::test_utils::TestEnv;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn setup(env: &TestEnv) -> (Session, String) {
        let mut s = session(env);
        let project = project_create(&mut s, "Tower A", None, None).unwrap().doc.id;
        (s, project)
    }

    fn planned(start: u32, end: u32) -> TaskFields {
        TaskFields {
            start: Some(day(start)),
            end: Some(day(end)),
            ..Default::default()
        }
    }

    #[test]
    fn test_dependency_flow() {
        let env = TestEnv::new();
        let (mut s, project) = setup(&env);
        let a = task_create(&mut s, "Excavate", &project, None, vec![], planned(1, 10))
            .unwrap()
            .doc;
        let b = task_create(&mut s, "Pour footing", &project, None, vec![], planned(11, 12))
            .unwrap()
            .doc;

        let linked = task_depend(&mut s, &b.id, &a.id).unwrap();
        assert!(linked.doc.is_critical_path);

        let shown = task_show(&s, &a.id).unwrap();
        assert_eq!(shown.dependents, vec![b.id.clone()]);
        assert!(shown.task.is_critical_path);

        let unlinked = task_undepend(&mut s, &b.id, &a.id).unwrap();
        assert!(unlinked.doc.depends_on.is_empty());
    }

    #[test]
    fn test_depend_rejects_early_start() {
        let env = TestEnv::new();
        let (mut s, project) = setup(&env);
        let a = task_create(&mut s, "Excavate", &project, None, vec![], planned(1, 10))
            .unwrap()
            .doc;
        let err = task_create(&mut s, "Pour", &project, None, vec![a.id], planned(9, 12))
            .unwrap_err();
        assert!(matches!(err, Error::DependencyNotSatisfied { .. }));
        assert_eq!(task_list(&s, None, None, None).unwrap().count, 1);
    }

    #[test]
    fn test_update_status_completes_task() {
        let env = TestEnv::new();
        let (mut s, project) = setup(&env);
        let a = task_create(&mut s, "Excavate", &project, None, vec![], planned(1, 10))
            .unwrap()
            .doc;

        let fields = TaskFields {
            status: Some("done".to_string()),
            ..Default::default()
        };
        let done = task_update(&mut s, &a.id, None, fields).unwrap().doc;
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100.0);
        assert_eq!(done.actual_end_date, Some(day(15)));

        let project = s.storage().get_project(&project).unwrap();
        assert_eq!(project.progress, 100.0);
    }

    #[test]
    fn test_invalid_status_rejected() {
        let env = TestEnv::new();
        let (mut s, project) = setup(&env);
        let fields = TaskFields {
            status: Some("someday".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            task_create(&mut s, "X", &project, None, vec![], fields),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_cost_heads_total() {
        let env = TestEnv::new();
        let (mut s, project) = setup(&env);
        let fields = TaskFields {
            labor: Some(100.0),
            equipment: Some(50.5),
            ..Default::default()
        };
        let t = task_create(&mut s, "Hire crane", &project, None, vec![], fields)
            .unwrap()
            .doc;
        assert_eq!(t.total_cost, 150.5);
    }
}
