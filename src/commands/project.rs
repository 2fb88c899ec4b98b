//! `wbs project` commands.

use chrono::NaiveDate;
use serde::Serialize;

use super::{Output, Session, fmt_date, push_advisories, to_json_string};
use crate::Result;
use crate::engine::Saved;
use crate::models::Project;
use crate::storage::{DocType, DocumentStore, TaskFilter, WbsFilter, validate_id};

fn project_lines(project: &Project) -> Vec<String> {
    vec![
        format!("{} {}", project.id, project.name),
        format!(
            "  Window: {} .. {}",
            fmt_date(project.expected_start_date),
            fmt_date(project.expected_end_date)
        ),
        format!("  Progress: {:.1}%", project.progress),
    ]
}

impl Output for Saved<Project> {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!("Saved project {}", self.doc.id)];
        lines.extend(project_lines(&self.doc));
        push_advisories(&mut lines, &self.advisories);
        lines.join("\n")
    }
}

pub fn project_create(
    session: &mut Session,
    name: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Saved<Project>> {
    let id = session.engine.fresh_id(DocType::Project, name)?;
    let mut project = Project::new(id, name.to_string());
    project.expected_start_date = start;
    project.expected_end_date = end;
    session.engine.save_project(project, &session.ctx)
}

#[derive(Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub wbs_nodes: usize,
    pub tasks: usize,
}

impl Output for ProjectDetail {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        let mut lines = project_lines(&self.project);
        lines.push(format!("  WBS nodes: {}", self.wbs_nodes));
        lines.push(format!("  Tasks: {}", self.tasks));
        lines.join("\n")
    }
}

pub fn project_show(session: &Session, id: &str) -> Result<ProjectDetail> {
    validate_id(id, DocType::Project.id_prefix())?;
    let store = session.storage();
    let project = store.get_project(id)?;
    let wbs_nodes = store
        .list_wbs(&WbsFilter {
            project_id: Some(id.to_string()),
            ..Default::default()
        })?
        .len();
    let tasks = store
        .list_tasks(&TaskFilter {
            project_id: Some(id.to_string()),
            ..Default::default()
        })?
        .len();

    Ok(ProjectDetail {
        project,
        wbs_nodes,
        tasks,
    })
}

#[derive(Serialize)]
pub struct ProjectList {
    pub projects: Vec<Project>,
    pub count: usize,
}

impl Output for ProjectList {
    fn to_json(&self) -> String {
        to_json_string(self)
    }

    fn to_human(&self) -> String {
        if self.projects.is_empty() {
            return "No projects.".to_string();
        }
        self.projects
            .iter()
            .map(|p| format!("{}  {:>5.1}%  {}", p.id, p.progress, p.name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn project_list(session: &Session) -> Result<ProjectList> {
    let projects = session.storage().list_projects()?;
    let count = projects.len();
    Ok(ProjectList { projects, count })
}
