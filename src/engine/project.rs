//! Project documents: schedule window checks and progress roll-up.

use chrono::NaiveDate;

use super::{Context, Engine, Saved, advise, validate_dates};
use crate::models::{Advisory, Project, TaskNode, TaskStatus, WindowEdge};
use crate::storage::{DocumentStore, TaskFilter};
use crate::Result;

/// Advisories for dates falling outside the project's expected window.
pub fn project_alignment(
    entity_id: &str,
    project: &Project,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<Advisory> {
    let mut advisories = Vec::new();

    if let (Some(date), Some(project_date)) = (start, project.expected_start_date) {
        if date < project_date {
            advisories.push(Advisory::ProjectAlignment {
                entity_id: entity_id.to_string(),
                project_id: project.id.clone(),
                edge: WindowEdge::StartsBeforeProject,
                date,
                project_date,
            });
        }
    }

    if let (Some(date), Some(project_date)) = (end, project.expected_end_date) {
        if date > project_date {
            advisories.push(Advisory::ProjectAlignment {
                entity_id: entity_id.to_string(),
                project_id: project.id.clone(),
                edge: WindowEdge::EndsAfterProject,
                date,
                project_date,
            });
        }
    }

    advisories
}

/// Share of completed tasks, 0 for a project without tasks.
pub fn completion_percent(tasks: &[TaskNode]) -> f64 {
    if tasks.is_empty() {
        return 0.0;
    }
    let completed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .count();
    completed as f64 / tasks.len() as f64 * 100.0
}

impl<S: DocumentStore> Engine<S> {
    /// Validate and persist a project.
    pub fn save_project(&mut self, mut project: Project, ctx: &Context) -> Result<Saved<Project>> {
        validate_dates(project.expected_start_date, project.expected_end_date)?;

        let tasks = self.store.list_tasks(&TaskFilter {
            project_id: Some(project.id.clone()),
            ..Default::default()
        })?;
        project.progress = completion_percent(&tasks);
        if project.prepared_by.is_none() {
            project.prepared_by = Some(ctx.actor.clone());
        }

        let saved = self.store.save_project(&project)?;
        tracing::info!(project = %saved.id, actor = %ctx.actor, "saved project");
        Ok(Saved {
            doc: saved,
            advisories: Vec::new(),
        })
    }

    /// Recompute a project's progress from its tasks, saving only on change.
    pub fn refresh_project_progress(&mut self, project_id: &str) -> Result<Project> {
        let mut project = self.store.get_project(project_id)?;
        let tasks = self.store.list_tasks(&TaskFilter {
            project_id: Some(project_id.to_string()),
            ..Default::default()
        })?;

        let progress = completion_percent(&tasks);
        if progress == project.progress {
            return Ok(project);
        }

        tracing::debug!(project = %project_id, progress, "project progress changed");
        project.progress = progress;
        self.store.save_project(&project)
    }

    /// Check a date range against a project's window, recording advisories.
    pub(crate) fn check_alignment(
        &self,
        entity_id: &str,
        project_id: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        advisories: &mut Vec<Advisory>,
    ) -> Result<()> {
        let project = self.store.get_project(project_id)?;
        for advisory in project_alignment(entity_id, &project, start, end) {
            advise(advisories, advisory);
        }
        Ok(())
    }
}
