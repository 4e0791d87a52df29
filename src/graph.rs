//! Dependency graph engine: status derivation and schedule validation.
//!
//! Everything here is a pure function of the supplied data and `today`;
//! no storage access and no ambient time. The store provides thin wrappers
//! that load a task plus its direct prerequisites and delegate here.
//!
//! The blocking rule is deliberately non-recursive: a task is blocked by
//! the raw `completed` flag of its *direct* prerequisites only, never by
//! their derived status. Recursing on derived status gives inconsistent
//! depth semantics and risks unbounded chains.

use crate::store::{Task, TrackStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Derive the status of a task from its own state and its direct
/// prerequisites.
///
/// Priority order: completed beats everything; overdue beats blocked;
/// an incomplete direct prerequisite forces `Offtrack`; otherwise the
/// task is `Ontrack`. A task that could not be loaded at all is
/// represented by the store as [`TrackStatus::Inactive`] before this
/// function is reached.
#[must_use]
pub fn task_status(task: &Task, prerequisites: &[Task], today: NaiveDate) -> TrackStatus {
    if task.completed {
        return TrackStatus::Completed;
    }
    if task.due_date < today {
        return TrackStatus::Offtrack;
    }
    if prerequisites.iter().any(|p| !p.completed) {
        return TrackStatus::Offtrack;
    }
    TrackStatus::Ontrack
}

/// Derive the overall status of a group from all of its tasks.
///
/// Independent of per-task dependency state: any overdue incomplete task
/// makes the group `Offtrack`; any incomplete task makes it `Ontrack`;
/// all-complete (with at least one task) is `Completed`; an empty group
/// is `Inactive`.
#[must_use]
pub fn group_status(tasks: &[Task], today: NaiveDate) -> TrackStatus {
    if tasks.iter().any(|t| !t.completed && t.due_date < today) {
        return TrackStatus::Offtrack;
    }
    if tasks.iter().any(|t| !t.completed) {
        return TrackStatus::Ontrack;
    }
    if tasks.is_empty() {
        TrackStatus::Inactive
    } else {
        TrackStatus::Completed
    }
}

/// A prerequisite that is due after the task that would depend on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleViolation {
    /// The offending prerequisite task.
    pub prerequisite_id: i64,
    /// Its name, for display.
    pub prerequisite_name: String,
    /// When the prerequisite is due.
    pub prerequisite_due: NaiveDate,
    /// When the dependent task is due.
    pub task_due: NaiveDate,
}

impl std::fmt::Display for ScheduleViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "task '{}' due on {} cannot be a prerequisite for a task due on {}",
            self.prerequisite_name, self.prerequisite_due, self.task_due
        )
    }
}

/// Check the date-ordering rule for every selected prerequisite.
///
/// A prerequisite must be due on or before the dependent task's due date.
/// All violations are returned, not just the first, so the caller can
/// report them together.
#[must_use]
pub fn check_schedule(task_due: NaiveDate, prerequisites: &[Task]) -> Vec<ScheduleViolation> {
    prerequisites
        .iter()
        .filter(|p| p.due_date > task_due)
        .map(|p| ScheduleViolation {
            prerequisite_id: p.id,
            prerequisite_name: p.name.clone(),
            prerequisite_due: p.due_date,
            task_due,
        })
        .collect()
}

/// Day delta applied to direct dependents when a task's due date moves.
#[must_use]
pub fn cascade_delta(old_due: NaiveDate, new_due: NaiveDate) -> i64 {
    (new_due - old_due).num_days()
}
