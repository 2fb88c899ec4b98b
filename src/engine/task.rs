//! Task engine: dependency checks, status-driven dates, and the critical flag.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};

use super::{Context, Engine, Saved, advise, inclusive_days, validate_dates, validate_progress};
use crate::models::graph::{find_dependency_cycle, format_path};
use crate::models::{Advisory, TaskNode, TaskStatus};
use crate::storage::{DocumentStore, TaskFilter};
use crate::{Error, Result};

/// Apply status-driven progress and actual-date defaults.
pub fn update_task_progress(task: &mut TaskNode, today: NaiveDate) {
    match task.status {
        TaskStatus::Completed => {
            task.progress = 100.0;
            if task.actual_end_date.is_none() {
                task.actual_end_date = Some(today);
            }
        }
        TaskStatus::InProgress => {
            if task.actual_start_date.is_none() {
                task.actual_start_date = Some(today);
            }
        }
        TaskStatus::NotStarted => {
            task.progress = 0.0;
            task.actual_start_date = None;
            task.actual_end_date = None;
        }
    }
}

/// Planned and actual inclusive durations, plus their difference.
pub fn calculate_task_duration(task: &mut TaskNode) {
    task.duration_days = inclusive_days(task.start_date, task.end_date);
    task.actual_duration_days = inclusive_days(task.actual_start_date, task.actual_end_date);
    task.duration_variance_days = match (task.duration_days, task.actual_duration_days) {
        (Some(planned), Some(actual)) => Some(actual - planned),
        _ => None,
    };
}

pub fn calculate_resource_cost(task: &mut TaskNode) {
    task.total_cost = task.costs.total();
}

/// Average slip in days between planned and actual dates.
///
/// Returns 0 until both start dates are known. The end slip is averaged in
/// once both end dates are known; until then the start slip stands alone.
pub fn schedule_variance_days(task: &TaskNode) -> f64 {
    let slip = |planned: Option<NaiveDate>, actual: Option<NaiveDate>| match (planned, actual) {
        (Some(p), Some(a)) => Some((a - p).num_days() as f64),
        _ => None,
    };

    let Some(start) = slip(task.start_date, task.actual_start_date) else {
        return 0.0;
    };
    match slip(task.end_date, task.actual_end_date) {
        Some(end) => (start + end) / 2.0,
        None => start,
    }
}

impl<S: DocumentStore> Engine<S> {
    /// Fail if the task's dependency set leads back to a task on the path.
    ///
    /// The task's own dependencies come from `task`, not the store, so an
    /// unsaved edit is checked as written.
    pub fn check_circular_dependency(&self, task: &TaskNode) -> Result<()> {
        let cycle = find_dependency_cycle(&task.id, |id| {
            if id == task.id {
                Ok(task.depends_on.iter().cloned().collect())
            } else {
                Ok::<_, Error>(self.store.get_task(id)?.depends_on.into_iter().collect())
            }
        })?;

        match cycle {
            Some(path) => Err(Error::CircularDependency(format_path(&path))),
            None => Ok(()),
        }
    }

    /// Fail if the task is planned to start before all its dependencies end.
    pub fn validate_dependencies(&self, task: &TaskNode) -> Result<()> {
        let mut latest_end: Option<NaiveDate> = None;
        for dep_id in &task.depends_on {
            let dep = self.store.get_task(dep_id)?;
            if let Some(end) = dep.end_date {
                latest_end = Some(latest_end.map_or(end, |l| l.max(end)));
            }
        }

        if let (Some(start), Some(earliest)) = (task.start_date, latest_end) {
            if start < earliest {
                return Err(Error::DependencyNotSatisfied {
                    task: task.id.clone(),
                    earliest,
                });
            }
        }
        Ok(())
    }

    /// Flag a task that has a dependency or a same-project dependent.
    pub fn check_critical_path(&self, task: &mut TaskNode) -> Result<()> {
        task.is_critical_path = !task.depends_on.is_empty()
            || self
                .store
                .exists_task(&TaskFilter::dependents_of(&task.project_id, &task.id))?;
        Ok(())
    }

    /// Suggested start dates for dependents freed up by a completed task.
    pub fn update_dependent_tasks(&self, task: &TaskNode) -> Result<Vec<Advisory>> {
        let mut advisories = Vec::new();
        if task.status != TaskStatus::Completed {
            return Ok(advisories);
        }
        let Some(actual_end) = task.actual_end_date else {
            return Ok(advisories);
        };
        let Some(suggested_start) = actual_end.checked_add_days(Days::new(1)) else {
            return Ok(advisories);
        };

        let dependents = self
            .store
            .list_tasks(&TaskFilter::dependents_of(&task.project_id, &task.id))?;
        for dependent in dependents {
            if dependent.actual_start_date.is_some() {
                continue;
            }
            if dependent.start_date.is_some_and(|s| s >= suggested_start) {
                continue;
            }
            if !self.dependencies_completed(&dependent, task)? {
                continue;
            }
            advise(
                &mut advisories,
                Advisory::SuggestedStart {
                    task_id: dependent.id,
                    completed_task_id: task.id.clone(),
                    suggested_start,
                },
            );
        }
        Ok(advisories)
    }

    fn dependencies_completed(&self, dependent: &TaskNode, completed: &TaskNode) -> Result<bool> {
        for dep_id in &dependent.depends_on {
            let status = if *dep_id == completed.id {
                completed.status
            } else {
                self.store.get_task(dep_id)?.status
            };
            if status != TaskStatus::Completed {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Validate, derive, and persist a task, then refresh everything that depends on it.
    pub fn save_task(&mut self, mut task: TaskNode, ctx: &Context) -> Result<Saved<TaskNode>> {
        let mut advisories = Vec::new();

        validate_dates(task.start_date, task.end_date)?;
        validate_progress(&task.id, task.progress)?;
        self.check_alignment(&task.id, &task.project_id, task.start_date, task.end_date, &mut advisories)?;
        if let Some(ref wbs_id) = task.wbs_id {
            self.store.get_wbs(wbs_id)?;
        }

        self.check_circular_dependency(&task)?;
        self.validate_dependencies(&task)?;

        update_task_progress(&mut task, ctx.today);
        validate_dates(task.actual_start_date, task.actual_end_date)?;
        calculate_task_duration(&mut task);
        calculate_resource_cost(&mut task);
        self.check_critical_path(&mut task)?;

        // Dependencies removed by this save may lose their critical flag
        let previous_deps = match self.store.get_task(&task.id) {
            Ok(prev) => prev.depends_on,
            Err(Error::NotFound(_)) => BTreeSet::new(),
            Err(e) => return Err(e),
        };

        if task.version == 0 && task.prepared_by.is_none() {
            task.prepared_by = Some(ctx.actor.clone());
        }
        task.updated_by = Some(ctx.actor.clone());

        let saved = self.store.save_task(&task)?;
        tracing::info!(
            task = %saved.id,
            version = saved.version,
            status = %saved.status,
            actor = %ctx.actor,
            "saved task"
        );

        for dep_id in previous_deps.union(&saved.depends_on) {
            self.refresh_critical_flag(dep_id)?;
        }

        self.refresh_project_progress(&saved.project_id)?;
        advisories.extend(self.update_dependent_tasks(&saved)?);

        if let Some(ref wbs_id) = saved.wbs_id {
            if let Some(node) = self.store.find_wbs(wbs_id)? {
                let synced = self.save_wbs(node, ctx)?;
                advisories.extend(synced.advisories);
            }
        }

        Ok(Saved {
            doc: saved,
            advisories,
        })
    }

    /// Recompute the critical flag of a stored task, saving only on change.
    fn refresh_critical_flag(&mut self, id: &str) -> Result<()> {
        let mut task = match self.store.get_task(id) {
            Ok(task) => task,
            Err(Error::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        let was_critical = task.is_critical_path;
        self.check_critical_path(&mut task)?;
        if task.is_critical_path != was_critical {
            tracing::debug!(task = %id, critical = task.is_critical_path, "critical flag changed");
            self.store.save_task(&task)?;
        }
        Ok(())
    }

    /// Add `depends_on` to a task's dependency set and re-save it.
    pub fn add_dependency(&mut self, task_id: &str, depends_on: &str, ctx: &Context) -> Result<Saved<TaskNode>> {
        let mut task = self.store.get_task(task_id)?;
        if !task.depends_on.insert(depends_on.to_string()) {
            return Err(Error::InvalidInput(format!(
                "{} already depends on {}",
                task_id, depends_on
            )));
        }
        self.save_task(task, ctx)
    }

    /// Remove `depends_on` from a task's dependency set and re-save it.
    pub fn remove_dependency(&mut self, task_id: &str, depends_on: &str, ctx: &Context) -> Result<Saved<TaskNode>> {
        let mut task = self.store.get_task(task_id)?;
        if !task.depends_on.remove(depends_on) {
            return Err(Error::NotFound(format!(
                "Dependency not found: {} -> {}",
                task_id, depends_on
            )));
        }
        self.save_task(task, ctx)
    }
}
