//! Calendar event projection.
//!
//! Flattens a user's tasks into all-day events for a calendar or list
//! front end. Completed tasks render green with a check mark, pending
//! tasks orange with a cycle mark.

use crate::error::Result;
use crate::store::{SqliteStore, Task};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Color for a completed task's event.
pub const COLOR_COMPLETED: &str = "#4CAF50";
/// Color for a pending task's event.
pub const COLOR_PENDING: &str = "#FF5722";

/// An all-day calendar event derived from a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Task name prefixed with a completion marker.
    pub title: String,
    /// The task's due date.
    pub start: NaiveDate,
    /// Always true; tasks have no time of day.
    #[serde(rename = "allDay")]
    pub all_day: bool,
    /// Display color keyed off completion.
    pub color: String,
}

impl CalendarEvent {
    /// Project one task into its event.
    #[must_use]
    pub fn from_task(task: &Task) -> Self {
        let (marker, color) = if task.completed {
            ("\u{2705}", COLOR_COMPLETED)
        } else {
            ("\u{1f504}", COLOR_PENDING)
        };
        Self {
            title: format!("{marker} {}", task.name),
            start: task.due_date,
            all_day: true,
            color: color.to_string(),
        }
    }
}

/// Project every task a user created into calendar events, ordered by
/// due date.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn events_for_user(store: &SqliteStore, username: &str) -> Result<Vec<CalendarEvent>> {
    let tasks = store.list_user_tasks(username)?;
    Ok(tasks.iter().map(CalendarEvent::from_task).collect())
}
