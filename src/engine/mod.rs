//! Validation and roll-up engines.
//!
//! [`Engine`] wraps a [`DocumentStore`] and runs the save pipelines:
//! - `wbs` - hierarchy validation, duration/progress/cost roll-ups, parent cascade
//! - `task` - dependency cycle and date checks, critical-path flag, advisories
//! - `project` - project progress roll-up and schedule-window advisories
//!
//! Every mutating operation takes an explicit [`Context`] naming the actor and
//! the calendar day the save happens on. Validation failures reject the save
//! before anything is written; advisories never block it.

pub mod project;
pub mod task;
pub mod wbs;

use chrono::NaiveDate;
use serde::Serialize;

use crate::models::Advisory;
use crate::storage::{DocType, DocumentStore, generate_id};
use crate::{Error, Result};

pub use wbs::WbsTree;

/// Default bound on the number of ancestors re-saved after a node changes.
pub const DEFAULT_MAX_CASCADE_DEPTH: usize = 32;

/// Who performs a mutation, and on which day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub actor: String,
    pub today: NaiveDate,
}

impl Context {
    /// Context for `actor` dated with the local calendar day.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            today: chrono::Local::now().date_naive(),
        }
    }

    /// Context pinned to a specific day.
    pub fn on(actor: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            actor: actor.into(),
            today,
        }
    }
}

/// A persisted document together with the advisories raised while saving it.
#[derive(Debug, Clone, Serialize)]
pub struct Saved<T> {
    #[serde(flatten)]
    pub doc: T,
    pub advisories: Vec<Advisory>,
}

/// Tunables for the engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Maximum number of ancestors re-saved by one cascade
    pub max_cascade_depth: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_cascade_depth: DEFAULT_MAX_CASCADE_DEPTH,
        }
    }
}

/// Save pipelines over a document store.
pub struct Engine<S: DocumentStore> {
    store: S,
    settings: EngineSettings,
}

impl<S: DocumentStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self::with_settings(store, EngineSettings::default())
    }

    pub fn with_settings(store: S, settings: EngineSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Generate an id of the given type that is not yet in use.
    pub fn fresh_id(&self, doc_type: DocType, seed: &str) -> Result<String> {
        for attempt in 0..64 {
            let id = generate_id(doc_type.id_prefix(), &format!("{}:{}", seed, attempt));
            let taken = match doc_type {
                DocType::Project => self.store.find_project(&id)?.is_some(),
                DocType::Wbs => self.store.find_wbs(&id)?.is_some(),
                DocType::Task => match self.store.get_task(&id) {
                    Ok(_) => true,
                    Err(Error::NotFound(_)) => false,
                    Err(e) => return Err(e),
                },
            };
            if !taken {
                return Ok(id);
            }
        }
        Err(Error::Other(format!("Could not allocate a free {} id", doc_type)))
    }
}

/// Reject an end date earlier than its start date.
pub fn validate_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(Error::DateOrderingViolation { start, end });
        }
    }
    Ok(())
}

/// Inclusive day count between two dates, when both are known.
pub fn inclusive_days(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<i64> {
    match (start, end) {
        (Some(start), Some(end)) => Some((end - start).num_days() + 1),
        _ => None,
    }
}

/// Reject a progress value outside 0-100.
pub fn validate_progress(entity_id: &str, progress: f64) -> Result<()> {
    if !(0.0..=100.0).contains(&progress) {
        return Err(Error::InvalidInput(format!(
            "Progress of {} must be between 0 and 100, got {}",
            entity_id, progress
        )));
    }
    Ok(())
}

/// Record an advisory and surface it in the log.
pub(crate) fn advise(advisories: &mut Vec<Advisory>, advisory: Advisory) {
    tracing::warn!("{}", advisory);
    advisories.push(advisory);
}
