//! Trestle - A work-breakdown-structure engine for construction projects.
//!
//! This library provides the core functionality for the `wbs` CLI tool:
//! WBS hierarchy validation, duration/cost/progress roll-ups, and task
//! dependency checking on top of a pluggable document store.

pub mod action_log;
pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod models;
pub mod storage;

use chrono::NaiveDate;


/// Library-level error type for Trestle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Not initialized: run `wbs system init` first")]
    NotInitialized,

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("End Date cannot be before Start Date ({start} > {end})")]
    DateOrderingViolation { start: NaiveDate, end: NaiveDate },

    #[error(
        "Parent WBS level must be lower than current WBS level \
         (parent {parent} is level {parent_level}, {node} is level {level})"
    )]
    InvalidHierarchy {
        node: String,
        parent: String,
        parent_level: u32,
        level: u32,
    },

    #[error("Invalid Parent WBS: {0}")]
    InvalidParent(String),

    #[error("Circular Reference detected in WBS hierarchy: {0}")]
    CircularReference(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error(
        "Task cannot start before its dependencies are completed. \
         Earliest possible start date is {earliest}"
    )]
    DependencyNotSatisfied { task: String, earliest: NaiveDate },

    #[error("Stale write for {id}: expected version {expected}, stored version is {found}")]
    Conflict { id: String, expected: u64, found: u64 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Trestle operations.
pub type Result<T> = std::result::Result<T, Error>;
