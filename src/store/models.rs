//! Entity types for the task tracking store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Task priority levels (1 = most important).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(i64)]
pub enum Priority {
    /// High priority.
    High = 1,
    /// Medium priority (default).
    #[default]
    Medium = 2,
    /// Low priority.
    Low = 3,
}

impl Priority {
    /// Create a priority from its stored numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not 1, 2, or 3.
    pub const fn from_i64(value: i64) -> Result<Self, InvalidPriority> {
        match value {
            1 => Ok(Self::High),
            2 => Ok(Self::Medium),
            3 => Ok(Self::Low),
            _ => Err(InvalidPriority(value)),
        }
    }

    /// The numeric value stored in the database.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self as i64
    }
}

/// Error when an invalid priority value is provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPriority(pub i64);

impl std::fmt::Display for InvalidPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid priority: {} (must be 1-3)", self.0)
    }
}

impl std::error::Error for InvalidPriority {}

/// Derived schedule status for a task or a group.
///
/// `Offtrack` covers both "overdue" and "blocked by an incomplete
/// prerequisite"; `Inactive` is a dangling task reference or an empty
/// group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    /// Complete.
    Completed,
    /// Overdue or blocked.
    Offtrack,
    /// On schedule.
    Ontrack,
    /// Missing task or empty group.
    Inactive,
}

impl TrackStatus {
    /// Human-readable badge label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Completed => "Completed",
            Self::Offtrack => "Offtrack",
            Self::Ontrack => "Ontrack",
            Self::Inactive => "Inactive",
        }
    }

    /// Hex badge color used by the presentation layer.
    #[must_use]
    pub const fn badge_color(self) -> &'static str {
        match self {
            Self::Completed => "#2ecc71",
            Self::Offtrack => "#e74c3c",
            Self::Ontrack => "#f1c40f",
            Self::Inactive => "#95a5a6",
        }
    }
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Dashboard display preference for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Calendar grid view (default).
    #[default]
    Calendar,
    /// Flat list view.
    List,
}

impl ViewMode {
    /// Parse a view mode from its stored string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid view mode.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, InvalidViewMode> {
        match s.to_lowercase().as_str() {
            "calendar" => Ok(Self::Calendar),
            "list" => Ok(Self::List),
            _ => Err(InvalidViewMode(s.to_string())),
        }
    }

    /// The string representation stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Calendar => "calendar",
            Self::List => "list",
        }
    }
}

/// Error when an invalid view mode string is provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidViewMode(pub String);

impl std::fmt::Display for InvalidViewMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid view mode: '{}' (must be 'calendar' or 'list')", self.0)
    }
}

impl std::error::Error for InvalidViewMode {}

/// A registered user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier; comparisons are case-insensitive.
    pub username: String,
    /// Stored credential. Plain equality check only; hashing is out of scope.
    pub password: String,
    /// Display name.
    pub full_name: String,
    /// Contact email.
    pub email: String,
    /// Postal address.
    pub address: String,
    /// Self-described gender.
    pub gender: String,
    /// Phone or other contact detail.
    pub contact: String,
    /// Telegram chat to escalate overdue alerts to, if any.
    pub telegram_chat_id: Option<String>,
    /// Dashboard display preference.
    pub view_mode: ViewMode,
    /// Last date a notification scan ran for this user.
    pub last_notification_date: Option<NaiveDate>,
}

/// A named collection of tasks: either a reusable template or an active
/// group owned by an end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Owning username (`admin` for built-in templates).
    pub created_by: String,
    /// Hex color tag for display.
    pub color: String,
    /// Free-text remarks.
    pub remarks: String,
    /// Whether this group is a read-only template pattern.
    pub is_template: bool,
    /// Optional category tag (e.g. "academic", "agriculture").
    pub category: Option<String>,
    /// Optional nominal start of the group's date range.
    pub start_date: Option<NaiveDate>,
    /// Optional nominal end of the group's date range.
    pub end_date: Option<NaiveDate>,
}

/// A task within a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: i64,
    /// Owning group.
    pub group_id: i64,
    /// Task name.
    pub name: String,
    /// Longer description.
    pub description: String,
    /// Days before the due date at which to remind.
    pub notification_days: i64,
    /// Date the task is due.
    pub due_date: NaiveDate,
    /// Whether the task is complete.
    pub completed: bool,
    /// Whether the one-time reminder has fired.
    pub notified: bool,
    /// Username that created the task.
    pub created_by: String,
    /// Recurrence pattern (declared, not expanded by the engine).
    pub recurrence_pattern: Option<String>,
    /// End date of the recurrence, if any.
    pub recurrence_end_date: Option<NaiveDate>,
    /// Whether overdue escalations go to Telegram.
    pub telegram_notify: bool,
    /// Priority level.
    pub priority: Priority,
    /// Estimated duration in days.
    pub estimated_duration: Option<i64>,
    /// Actual duration in days, recorded after completion.
    pub actual_duration: Option<i64>,
    /// Date the task was completed, if complete.
    pub completion_date: Option<NaiveDate>,
    /// Last date an overdue escalation fired for this task.
    pub last_notification_date: Option<NaiveDate>,
}

/// Default link type for prerequisite edges.
pub const LINK_TYPE_PREREQUISITE: &str = "prerequisite";

/// A directed edge declaring that `task_id` depends on `pre_task_id`
/// being complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLink {
    /// The dependent task.
    pub task_id: i64,
    /// The prerequisite task.
    pub pre_task_id: i64,
    /// Edge tag; `prerequisite` unless a caller supplies another.
    pub link_type: String,
    /// Schedule slip carried along this edge, in days.
    pub delay_days: i64,
}

/// A recorded completion-state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusChange {
    /// The task was marked complete.
    Completed,
    /// The task was reopened.
    Reopened,
}

impl StatusChange {
    /// Parse a status change from its stored string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid status change.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, InvalidStatusChange> {
        match s {
            "completed" => Ok(Self::Completed),
            "reopened" => Ok(Self::Reopened),
            _ => Err(InvalidStatusChange(s.to_string())),
        }
    }

    /// The string representation stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Reopened => "reopened",
        }
    }
}

/// Error when an invalid status change string is provided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStatusChange(pub String);

impl std::fmt::Display for InvalidStatusChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid status change: '{}' (must be 'completed' or 'reopened')", self.0)
    }
}

impl std::error::Error for InvalidStatusChange {}

/// An append-only entry in a task's completion history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unique identifier for the entry.
    pub id: i64,
    /// The task that transitioned.
    pub task_id: i64,
    /// The transition that occurred.
    pub change: StatusChange,
    /// Date of the transition (engine clock, not wall clock).
    pub changed_at: NaiveDate,
    /// Username that performed the transition.
    pub changed_by: String,
    /// Optional free-text note.
    pub notes: Option<String>,
}
