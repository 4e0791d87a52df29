//! Error types for `ontrack`.

use crate::graph::ScheduleViolation;

/// Errors that can occur in the task tracking engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON serialization error occurred.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error occurred.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A `SQLite` database error occurred. Any transaction in progress
    /// is rolled back before this propagates.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// One or more required fields were missing or malformed.
    /// Every problem found is collected, not just the first.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// One or more selected prerequisites are due after the task that
    /// would depend on them. All violations are collected.
    #[error("Schedule violation: {}", format_violations(.0))]
    Schedule(Vec<ScheduleViolation>),

    /// A task cannot be deleted because other tasks list it as a
    /// prerequisite.
    #[error("Cannot delete task '{task}': depended on by {}", .dependents.join(", "))]
    BlockedByDependents {
        /// Name of the task that was to be deleted.
        task: String,
        /// Names of the tasks that declare it as a prerequisite.
        dependents: Vec<String>,
    },

    /// A referenced task, group, or user does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A username is already taken (usernames compare case-insensitively).
    #[error("Username already taken: {0}")]
    DuplicateUser(String),
}

fn format_violations(violations: &[ScheduleViolation]) -> String {
    violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
